//! Destinations for committed output
//!
//! The sequencer calls [`Sink::commit`] exactly once per batch, in ascending
//! sequence order, while holding its lock.

use crate::batch::OutputUnit;
use crate::error::Result;
use std::fmt;
use std::io::Write;

/// Receiver of output units in input order
pub trait Sink<O>: Send {
    /// Accept the next unit in order
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()>;

    /// Flush buffered data at the end of a run
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<O: Send> Sink<O> for Vec<O> {
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        self.push(unit.payload);
        Ok(())
    }
}

impl<O, K: Sink<O> + ?Sized> Sink<O> for &mut K {
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        (**self).commit(unit)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<O, K: Sink<O> + ?Sized> Sink<O> for Box<K> {
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        (**self).commit(unit)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Sink that keeps whole units, tags included
#[derive(Debug)]
pub struct CollectSink<O> {
    units: Vec<OutputUnit<O>>,
}

impl<O> Default for CollectSink<O> {
    fn default() -> Self {
        Self { units: Vec::new() }
    }
}

impl<O> CollectSink<O> {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Units committed so far
    pub fn units(&self) -> &[OutputUnit<O>] {
        &self.units
    }

    /// Consume the collector
    pub fn into_units(self) -> Vec<OutputUnit<O>> {
        self.units
    }

    /// Concatenate the payloads of `Vec` outputs
    pub fn into_flat<T>(self) -> Vec<T>
    where
        O: IntoIterator<Item = T>,
    {
        self.units
            .into_iter()
            .flat_map(|unit| unit.payload)
            .collect()
    }
}

impl<O: Send> Sink<O> for CollectSink<O> {
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        self.units.push(unit);
        Ok(())
    }
}

/// Sink writing byte-like outputs to an `io::Write`
#[derive(Debug)]
pub struct WriteSink<W> {
    writer: W,
    bytes: u64,
}

impl<W: Write> WriteSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer, bytes: 0 }
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<O, W> Sink<O> for WriteSink<W>
where
    O: AsRef<[u8]>,
    W: Write + Send,
{
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        let bytes = unit.payload.as_ref();
        self.writer.write_all(bytes)?;
        self.bytes += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Sink calling a closure per unit
pub struct FnSink<F> {
    func: F,
}

impl<F> FnSink<F> {
    /// Wrap a closure
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

impl<O, F> Sink<O> for FnSink<F>
where
    F: FnMut(OutputUnit<O>) -> Result<()> + Send,
{
    fn commit(&mut self, unit: OutputUnit<O>) -> Result<()> {
        (self.func)(unit)
    }
}

/// Sink that drops every unit
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl<O> Sink<O> for Discard {
    fn commit(&mut self, _unit: OutputUnit<O>) -> Result<()> {
        Ok(())
    }
}
