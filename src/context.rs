//! Per-worker scratch state
//!
//! Every worker owns exactly one context for its whole lifetime. Processing
//! functions write into the context's private output buffer; after each batch
//! the engine moves the buffered output out with [`WorkerContext::take_output`]
//! and hands it to the sequencer tagged with the batch's sequence number.

use std::collections::VecDeque;

/// State private to one worker thread
pub trait WorkerContext: Send {
    /// Output accumulated for one batch
    type Output: Send;

    /// Move out the output buffered since the last call
    fn take_output(&mut self) -> Self::Output;
}

impl<T: Send> WorkerContext for Vec<T> {
    type Output = Vec<T>;

    fn take_output(&mut self) -> Self::Output {
        std::mem::take(self)
    }
}

impl<T: Send> WorkerContext for VecDeque<T> {
    type Output = VecDeque<T>;

    fn take_output(&mut self) -> Self::Output {
        std::mem::take(self)
    }
}

impl WorkerContext for String {
    type Output = String;

    fn take_output(&mut self) -> Self::Output {
        std::mem::take(self)
    }
}

impl WorkerContext for () {
    type Output = ();

    fn take_output(&mut self) -> Self::Output {}
}

/// Caller state paired with a private output buffer
///
/// `state` survives across batches (counters, open handles, caches); `out`
/// is drained after every batch.
#[derive(Debug, Default, Clone)]
pub struct Buffered<S, B> {
    /// Auxiliary state kept for the worker's lifetime
    pub state: S,

    /// Output buffer for the current batch
    pub out: B,
}

impl<S, B: Default> Buffered<S, B> {
    /// Create a context around `state` with an empty buffer
    pub fn new(state: S) -> Self {
        Self {
            state,
            out: B::default(),
        }
    }
}

impl<S, B> WorkerContext for Buffered<S, B>
where
    S: Send,
    B: Default + Send,
{
    type Output = B;

    fn take_output(&mut self) -> Self::Output {
        std::mem::take(&mut self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_buffer_drains() {
        let mut ctx = String::new();
        ctx.push_str("a\n");
        assert_eq!(ctx.take_output(), "a\n");
        assert!(ctx.take_output().is_empty());
    }

    #[test]
    fn test_buffered_keeps_state() {
        let mut ctx: Buffered<u64, Vec<u32>> = Buffered::new(0);
        ctx.state += 2;
        ctx.out.push(9);

        assert_eq!(ctx.take_output(), vec![9]);
        assert_eq!(ctx.state, 2);
        assert!(ctx.out.is_empty());
    }
}
