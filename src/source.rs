//! Item sources
//!
//! A source is a stateful pull function. It is never shared: the dispatcher
//! keeps it behind a mutex and calls it from whichever worker asked for the
//! next batch, passing that worker's context along.

use crate::error::Result;
use std::marker::PhantomData;

/// Sequential, non-thread-safe producer of items
pub trait ItemSource<C>: Send {
    /// The item type
    type Item: Send;

    /// Pull the next item; `Ok(None)` signals exhaustion
    ///
    /// Called only while the dispatcher lock is held, so it must not block
    /// indefinitely.
    fn next_item(&mut self, ctx: &mut C) -> Result<Option<Self::Item>>;
}

/// Source backed by a closure
pub struct FnSource<F, T> {
    func: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> FnSource<F, T> {
    /// Wrap a pull closure
    pub fn new(func: F) -> Self {
        Self {
            func,
            _item: PhantomData,
        }
    }
}

impl<C, F, T> ItemSource<C> for FnSource<F, T>
where
    F: FnMut(&mut C) -> Result<Option<T>> + Send,
    T: Send,
{
    type Item = T;

    fn next_item(&mut self, ctx: &mut C) -> Result<Option<T>> {
        (self.func)(ctx)
    }
}

/// Source backed by an iterator
#[derive(Debug)]
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    /// Wrap an iterator
    pub fn new(iter: I) -> Self {
        Self { iter }
    }

    /// Recover the iterator with whatever it has not yielded
    pub fn into_inner(self) -> I {
        self.iter
    }
}

impl<C, I> ItemSource<C> for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    type Item = I::Item;

    fn next_item(&mut self, _ctx: &mut C) -> Result<Option<I::Item>> {
        Ok(self.iter.next())
    }
}

/// Source over anything iterable
pub fn from_iter<I: IntoIterator>(items: I) -> IterSource<I::IntoIter> {
    IterSource::new(items.into_iter())
}

/// Source over a closure
pub fn from_fn<C, F, T>(func: F) -> FnSource<F, T>
where
    F: FnMut(&mut C) -> Result<Option<T>> + Send,
{
    FnSource::new(func)
}

/// Source over an iterator of fallible items; the first `Err` ends the run
#[derive(Debug)]
pub struct TryIterSource<I> {
    iter: I,
}

impl<I> TryIterSource<I> {
    /// Wrap an iterator of results
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<C, I, T, E> ItemSource<C> for TryIterSource<I>
where
    I: Iterator<Item = std::result::Result<T, E>> + Send,
    T: Send,
    E: Into<crate::error::Error>,
{
    type Item = T;

    fn next_item(&mut self, _ctx: &mut C) -> Result<Option<T>> {
        self.iter.next().transpose().map_err(Into::into)
    }
}
