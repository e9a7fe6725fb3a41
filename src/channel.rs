//! Streaming committed output to another thread
//!
//! [`ChannelSink`] forwards every committed unit over a `flume` channel, so a
//! consumer thread can handle results while the run is still going. Units
//! arrive on the [`OrderedReceiver`] in input order.
//!
//! The sequencer commits while holding its lock. With a bounded channel a
//! slow consumer therefore throttles every worker, which is the intended
//! backpressure; the consumer must not run on the thread that called
//! [`Engine::run`](crate::engine::Engine::run).

use crate::batch::OutputUnit;
use crate::error::{Error, Result};
use crate::sink::Sink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Buffer capacity (None = unbounded)
    pub capacity: Option<usize>,

    /// Timeout for a single send (None = block until there is room)
    pub send_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: Some(1024),
            send_timeout: None,
        }
    }
}

impl ChannelConfig {
    /// Create a new channel configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Remove the capacity limit
    pub fn unbounded(mut self) -> Self {
        self.capacity = None;
        self
    }

    /// Fail a commit that cannot be delivered within `timeout`
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }
}

/// Counters shared by both halves of a channel
#[derive(Debug, Default)]
pub struct ChannelStats {
    sent: AtomicU64,
    received: AtomicU64,
}

impl ChannelStats {
    /// Units sent
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Units received
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Units sent but not received yet
    pub fn in_flight(&self) -> u64 {
        self.sent().saturating_sub(self.received())
    }
}

/// Sink half: forwards committed units
pub struct ChannelSink<O> {
    tx: flume::Sender<OutputUnit<O>>,
    timeout: Option<Duration>,
    stats: Arc<ChannelStats>,
}

impl<O: Send> Sink<O> for ChannelSink<O> {
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        match self.timeout {
            Some(timeout) => self.tx.send_timeout(unit, timeout).map_err(|e| match e {
                flume::SendTimeoutError::Timeout(unit) => Error::Other(format!(
                    "output consumer did not accept batch {} within {:?}",
                    unit.seq, timeout
                )),
                flume::SendTimeoutError::Disconnected(_) => Error::Disconnected,
            })?,
            None => self.tx.send(unit)?,
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl<O> ChannelSink<O> {
    /// Channel statistics
    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }
}

/// Receiver half: yields units in input order
pub struct OrderedReceiver<O> {
    rx: flume::Receiver<OutputUnit<O>>,
    stats: Arc<ChannelStats>,
}

impl<O> OrderedReceiver<O> {
    /// Block for the next unit; `Err(Disconnected)` once the run is over
    pub fn recv(&self) -> Result<OutputUnit<O>> {
        let unit = self.rx.recv()?;
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        Ok(unit)
    }

    /// Take a unit if one is ready
    pub fn try_recv(&self) -> Option<OutputUnit<O>> {
        let unit = self.rx.try_recv().ok()?;
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        Some(unit)
    }

    /// Iterate over payloads until the sink is dropped
    pub fn payloads(&self) -> impl Iterator<Item = O> + '_ {
        self.iter().map(|unit| unit.payload)
    }

    /// Iterate over units until the sink is dropped
    pub fn iter(&self) -> ReceiverIterator<'_, O> {
        ReceiverIterator { receiver: self }
    }

    /// Channel statistics
    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }
}

/// Iterator for receiving units
pub struct ReceiverIterator<'a, O> {
    receiver: &'a OrderedReceiver<O>,
}

impl<'a, O> Iterator for ReceiverIterator<'a, O> {
    type Item = OutputUnit<O>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

impl<O> IntoIterator for OrderedReceiver<O> {
    type Item = OutputUnit<O>;
    type IntoIter = flume::IntoIter<OutputUnit<O>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}

/// Create a connected sink/receiver pair
pub fn ordered<O>(config: ChannelConfig) -> (ChannelSink<O>, OrderedReceiver<O>) {
    let (tx, rx) = match config.capacity {
        Some(capacity) => flume::bounded(capacity),
        None => flume::unbounded(),
    };
    let stats = Arc::new(ChannelStats::default());

    (
        ChannelSink {
            tx,
            timeout: config.send_timeout,
            stats: Arc::clone(&stats),
        },
        OrderedReceiver { rx, stats },
    )
}

/// Create a bounded pair (most common use case)
pub fn bounded<O>(capacity: usize) -> (ChannelSink<O>, OrderedReceiver<O>) {
    ordered(ChannelConfig::new().with_capacity(capacity))
}

/// Create an unbounded pair
pub fn unbounded<O>() -> (ChannelSink<O>, OrderedReceiver<O>) {
    ordered(ChannelConfig::new().unbounded())
}
