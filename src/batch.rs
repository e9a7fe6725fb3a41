//! Sequenced batches and the output units produced from them

use crate::worker::WorkerIndex;

/// Batch sequence number, assigned in the order batches are drawn
pub type SeqNo = u64;

/// A group of items drawn from the source together
///
/// Only the final batch of a run may hold fewer than `batch_size` items;
/// a batch is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// Position of this batch in input order
    pub seq: SeqNo,

    /// Items, in source order
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    /// Create a batch
    pub fn new(seq: SeqNo, items: Vec<T>) -> Self {
        Self { seq, items }
    }

    /// Number of items in the batch
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Result of processing one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit<O> {
    /// Sequence number inherited from the batch
    pub seq: SeqNo,

    /// Worker that produced the unit
    pub worker: WorkerIndex,

    /// Number of items the unit covers
    pub items: usize,

    /// The output payload
    pub payload: O,
}

impl<O> OutputUnit<O> {
    /// Create a unit for batch `seq`
    pub fn new(seq: SeqNo, payload: O) -> Self {
        Self {
            seq,
            worker: 0,
            items: 0,
            payload,
        }
    }

    /// Set the producing worker
    pub fn with_worker(mut self, worker: WorkerIndex) -> Self {
        self.worker = worker;
        self
    }

    /// Set the number of items covered
    pub fn with_items(mut self, items: usize) -> Self {
        self.items = items;
        self
    }

    /// Transform the payload, keeping the tags
    pub fn map<P>(self, f: impl FnOnce(O) -> P) -> OutputUnit<P> {
        OutputUnit {
            seq: self.seq,
            worker: self.worker,
            items: self.items,
            payload: f(self.payload),
        }
    }
}

/// Outcome of asking the dispatcher for work
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch<T> {
    /// A batch to process
    Batch(Batch<T>),

    /// No more work; carries the sequence number one past the final batch
    Exhausted(SeqNo),
}

impl<T> Dispatch<T> {
    /// Whether this is the end marker
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Dispatch::Exhausted(_))
    }
}
