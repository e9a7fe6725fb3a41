//! Order-restoring commit stage
//!
//! Workers finish batches in whatever order the scheduler allows. The
//! sequencer holds early arrivals in a pending map keyed by sequence number
//! and forwards units to the sink strictly in ascending order, so the
//! committed stream always matches the input order.

use crate::batch::{OutputUnit, SeqNo};
use crate::error::{Error, Result};
use crate::sink::Sink;
use crate::stats::CommitCounters;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Reorders output units and commits them to a sink
pub struct OutputSequencer<O, K> {
    /// Next sequence number allowed to commit
    next_expected: SeqNo,

    /// Units that arrived before their predecessors
    pending: BTreeMap<SeqNo, OutputUnit<O>>,

    /// First batch affected by a fatal error; nothing at or after it commits
    poisoned_at: Option<SeqNo>,

    /// Pending depth above which a warning is logged
    warn_pending: Option<usize>,

    /// Committed-unit counters
    counters: Arc<CommitCounters>,

    sink: K,
}

impl<O, K> OutputSequencer<O, K>
where
    K: Sink<O>,
{
    /// Create a sequencer expecting batch 0 first
    pub fn new(sink: K) -> Self {
        Self::starting_at(0, sink)
    }

    /// Create a sequencer expecting `first` first
    pub fn starting_at(first: SeqNo, sink: K) -> Self {
        Self {
            next_expected: first,
            pending: BTreeMap::new(),
            poisoned_at: None,
            warn_pending: None,
            counters: Arc::new(CommitCounters::default()),
            sink,
        }
    }

    /// Log a warning when the pending map grows beyond `limit`
    pub fn with_pending_warning(mut self, limit: Option<usize>) -> Self {
        self.warn_pending = limit;
        self
    }

    /// Share commit counters with the caller
    pub fn with_counters(mut self, counters: Arc<CommitCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Submit the output of one batch
    ///
    /// Returns the number of units committed by this call (0 when the unit
    /// was parked or dropped after poisoning).
    pub fn submit(&mut self, unit: OutputUnit<O>) -> Result<usize> {
        let seq = unit.seq;

        if self.is_blocked(seq) {
            trace!(seq, "dropping unit after fatal error");
            return Ok(0);
        }

        if seq < self.next_expected || self.pending.contains_key(&seq) {
            return Err(Error::Sequence(format!(
                "batch {} submitted twice (next expected {})",
                seq, self.next_expected
            )));
        }

        if seq > self.next_expected {
            self.pending.insert(seq, unit);
            let depth = self.pending.len();
            self.counters.observe_pending(depth);
            if let Some(limit) = self.warn_pending {
                if depth > limit {
                    warn!(
                        seq,
                        waiting_for = self.next_expected,
                        depth,
                        "pending output exceeds limit"
                    );
                }
            }
            return Ok(0);
        }

        self.commit(unit)?;
        let mut committed = 1;

        while let Some(next) = self.pending.remove(&self.next_expected) {
            self.commit(next)?;
            committed += 1;
        }

        Ok(committed)
    }

    /// Stop committing batch `seq` and everything after it
    ///
    /// Earlier batches keep committing as they arrive. Poisoning twice keeps
    /// the lowest sequence number.
    pub fn poison(&mut self, seq: SeqNo) {
        let at = self.poisoned_at.map_or(seq, |cur| cur.min(seq));
        self.poisoned_at = Some(at);
        self.pending.retain(|&s, _| s < at);
    }

    /// Whether a fatal error has been recorded
    pub fn is_poisoned(&self) -> bool {
        self.poisoned_at.is_some()
    }

    /// Next sequence number allowed to commit
    pub fn next_expected(&self) -> SeqNo {
        self.next_expected
    }

    /// Units waiting for a predecessor
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Borrow the sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Flush the sink and return it
    ///
    /// Fails if units are still waiting for a predecessor that never arrived,
    /// unless the sequencer was poisoned.
    pub fn finish(mut self) -> Result<K> {
        if self.poisoned_at.is_none() {
            if let Some(&first) = self.pending.keys().next() {
                return Err(Error::Sequence(format!(
                    "{} units left pending, batch {} never arrived (first pending {})",
                    self.pending.len(),
                    self.next_expected,
                    first
                )));
            }
        }
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn is_blocked(&self, seq: SeqNo) -> bool {
        matches!(self.poisoned_at, Some(at) if seq >= at)
    }

    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        let seq = unit.seq;
        self.sink.commit(unit).map_err(|e| Error::Sink {
            seq,
            source: Box::new(e),
        })?;
        self.next_expected = seq + 1;
        self.counters.record_commit();
        trace!(seq, "committed");
        Ok(())
    }
}
