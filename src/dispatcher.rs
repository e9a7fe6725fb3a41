//! Batch dispatcher
//!
//! Serializes access to the item source. Every call to [`Dispatcher::next_batch`]
//! pulls up to `batch_size` items and tags them with the next sequence
//! number, all inside one critical section, so sequence numbers follow draw
//! order exactly even when every worker asks at once.

use crate::batch::{Batch, Dispatch, SeqNo};
use crate::config::check_batch_size;
use crate::error::{Error, Result};
use crate::source::ItemSource;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Phase of the underlying source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    /// Still yielding items
    Open,

    /// Reported exhaustion; never called again
    Exhausted,

    /// Returned an error; never called again
    Failed,

    /// Stopped by the engine after a fatal error elsewhere
    Halted,
}

struct Inner<S> {
    source: S,
    state: SourceState,
    next_seq: SeqNo,
    items_pulled: u64,
}

/// Hands out sequenced batches drawn from a single source
pub struct Dispatcher<S> {
    inner: Mutex<Inner<S>>,
    batch_size: usize,
}

impl<S> Dispatcher<S> {
    /// Create a dispatcher pulling `batch_size` items per batch
    pub fn new(source: S, batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;

        Ok(Self {
            inner: Mutex::new(Inner {
                source,
                state: SourceState::Open,
                next_seq: 0,
                items_pulled: 0,
            }),
            batch_size,
        })
    }

    /// Draw the next batch
    ///
    /// The source is called with the requesting worker's context. Once the
    /// source reports exhaustion (or fails, or the dispatcher is halted) every
    /// later call returns [`Dispatch::Exhausted`] carrying the number of
    /// batches issued, without touching the source again.
    pub fn next_batch<C>(&self, ctx: &mut C) -> Result<Dispatch<S::Item>>
    where
        S: ItemSource<C>,
    {
        let mut inner = self.inner.lock();

        if inner.state != SourceState::Open {
            return Ok(Dispatch::Exhausted(inner.next_seq));
        }

        let mut items = Vec::with_capacity(self.batch_size);
        while items.len() < self.batch_size {
            match inner.source.next_item(ctx) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {
                    inner.state = SourceState::Exhausted;
                    debug!(
                        batches = inner.next_seq + u64::from(!items.is_empty()),
                        items = inner.items_pulled + items.len() as u64,
                        "source exhausted"
                    );
                    break;
                }
                Err(e) => {
                    inner.state = SourceState::Failed;
                    return Err(Error::Source {
                        seq: inner.next_seq,
                        source: Box::new(e),
                    });
                }
            }
        }

        if items.is_empty() {
            return Ok(Dispatch::Exhausted(inner.next_seq));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.items_pulled += items.len() as u64;
        trace!(seq, items = items.len(), "dispatched batch");

        Ok(Dispatch::Batch(Batch::new(seq, items)))
    }

    /// Stop handing out batches
    pub fn halt(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SourceState::Open {
            debug!(batches = inner.next_seq, "dispatcher halted");
            inner.state = SourceState::Halted;
        }
    }

    /// Whether the source can still yield batches
    pub fn is_open(&self) -> bool {
        self.inner.lock().state == SourceState::Open
    }

    /// Batches issued so far
    pub fn batches_issued(&self) -> SeqNo {
        self.inner.lock().next_seq
    }

    /// Items pulled into issued batches so far
    pub fn items_pulled(&self) -> u64 {
        self.inner.lock().items_pulled
    }

    /// Recover the source
    pub fn into_source(self) -> S {
        self.inner.into_inner().source
    }

    /// Configured batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
