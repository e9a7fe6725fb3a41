//! Worker threads
//!
//! Each worker owns one context for its whole life. It repeatedly asks the
//! dispatcher for a batch, runs the job over every item with no lock held,
//! and submits the batch's buffered output to the sequencer.

use crate::batch::{Dispatch, OutputUnit, SeqNo};
use crate::config::EngineConfig;
use crate::context::WorkerContext;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::sequencer::OutputSequencer;
use crate::sink::Sink;
use crate::source::ItemSource;
use crate::stats::WorkerCounters;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Instant;
use tracing::{debug, error, trace};

/// Position of a worker in the pool, `0..worker_count`
pub type WorkerIndex = usize;

/// Caller-supplied processing logic
///
/// The engine shares one `Job` between all workers, so it only gets `&self`;
/// anything mutable belongs in the context.
pub trait Job: Sync {
    /// The type of items this job processes
    type Item: Send;

    /// Per-worker state, including the private output buffer
    type Context: WorkerContext;

    /// Build the context of worker `worker`
    fn init(&self, worker: WorkerIndex) -> Result<Self::Context>;

    /// Process one item, buffering any output in `ctx`
    fn process(&self, ctx: &mut Self::Context, item: Self::Item) -> Result<()>;

    /// Called once when the worker shuts down (optional)
    ///
    /// Runs after the last batch, and also after a failed or panicked batch.
    /// In that case the failed batch's buffered output has already been
    /// discarded, so only state from committed batches remains.
    fn finish(&self, _worker: WorkerIndex, _ctx: Self::Context) -> Result<()> {
        Ok(())
    }
}

/// Output type produced by a job's context
pub type JobOutput<J> = <<J as Job>::Context as WorkerContext>::Output;

/// State shared by all workers of one run
pub(crate) struct Shared<'a, S, O, K> {
    pub dispatcher: &'a Dispatcher<S>,
    pub sequencer: &'a Mutex<OutputSequencer<O, K>>,
    pub counters: &'a [WorkerCounters],
    fatal: Mutex<Option<Error>>,
}

impl<'a, S, O, K> Shared<'a, S, O, K>
where
    K: Sink<O>,
{
    pub fn new(
        dispatcher: &'a Dispatcher<S>,
        sequencer: &'a Mutex<OutputSequencer<O, K>>,
        counters: &'a [WorkerCounters],
    ) -> Self {
        Self {
            dispatcher,
            sequencer,
            counters,
            fatal: Mutex::new(None),
        }
    }

    /// Record a fatal error; the first one wins
    ///
    /// Stops the dispatcher and, when the failing batch is known, keeps that
    /// batch and every later one from committing.
    pub fn fail(&self, err: Error, seq: Option<SeqNo>) {
        self.dispatcher.halt();
        if let Some(seq) = seq {
            self.sequencer.lock().poison(seq);
        }

        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            error!(error = %err, "fatal error, draining workers");
            *fatal = Some(err);
        } else {
            debug!(error = %err, "additional error after fatal error");
        }
    }

    pub fn take_error(&self) -> Option<Error> {
        self.fatal.lock().take()
    }
}

/// Spawn worker `index` inside `scope`
///
/// Mirrors the thread setup of a long-lived worker: a named thread, optional
/// stack size and optional core pinning.
pub(crate) fn spawn_scoped<'scope, 'env, J, S, K>(
    scope: &'scope Scope<'scope, 'env>,
    index: WorkerIndex,
    config: &EngineConfig,
    job: &'env J,
    shared: &'env Shared<'env, S, JobOutput<J>, K>,
) -> Result<ScopedJoinHandle<'scope, ()>>
where
    J: Job,
    S: ItemSource<J::Context, Item = J::Item>,
    K: Sink<JobOutput<J>>,
{
    let mut builder = thread::Builder::new().name(format!("{}-{}", config.thread_name, index));
    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let pin = config.cpu_affinity;

    builder
        .spawn_scoped(scope, move || {
            if pin {
                pin_to_core(index);
            }
            run(index, job, shared);
        })
        .map_err(Error::Spawn)
}

fn pin_to_core(index: WorkerIndex) {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if !core_ids.is_empty() {
            let core = core_ids[index % core_ids.len()];
            if !core_affinity::set_for_current(core) {
                debug!(worker = index, core = core.id, "failed to pin worker");
            }
        }
    }
}

/// Body of one worker thread
fn run<J, S, K>(index: WorkerIndex, job: &J, shared: &Shared<'_, S, JobOutput<J>, K>)
where
    J: Job,
    S: ItemSource<J::Context, Item = J::Item>,
    K: Sink<JobOutput<J>>,
{
    let mut ctx = match job.init(index) {
        Ok(ctx) => ctx,
        Err(e) => {
            shared.fail(
                Error::Init {
                    worker: index,
                    source: Box::new(e),
                },
                None,
            );
            return;
        }
    };

    debug!(worker = index, "worker started");

    let mut current: Option<SeqNo> = None;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        process_batches(index, job, &mut ctx, shared, &mut current)
    }));

    let failed = match outcome {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            let seq = e.seq();
            shared.fail(e, seq);
            true
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            shared.fail(
                Error::WorkerPanicked(format!("worker {}: {}", index, msg)),
                current,
            );
            true
        }
    };

    let finished = panic::catch_unwind(AssertUnwindSafe(move || {
        if failed {
            // Output of the failed batch never reaches the finalizer
            drop(ctx.take_output());
        }
        job.finish(index, ctx)
    }));

    match finished {
        Ok(Ok(())) => {}
        Ok(Err(e)) => shared.fail(
            Error::Finalize {
                worker: index,
                source: Box::new(e),
            },
            None,
        ),
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            shared.fail(
                Error::WorkerPanicked(format!("worker {} finalizer: {}", index, msg)),
                None,
            );
        }
    }

    debug!(worker = index, "worker stopped");
}

fn process_batches<J, S, K>(
    index: WorkerIndex,
    job: &J,
    ctx: &mut J::Context,
    shared: &Shared<'_, S, JobOutput<J>, K>,
    current: &mut Option<SeqNo>,
) -> Result<()>
where
    J: Job,
    S: ItemSource<J::Context, Item = J::Item>,
    K: Sink<JobOutput<J>>,
{
    loop {
        let batch = match shared.dispatcher.next_batch(ctx)? {
            Dispatch::Batch(batch) => batch,
            Dispatch::Exhausted(end) => {
                trace!(worker = index, end, "no more batches");
                return Ok(());
            }
        };

        let seq = batch.seq;
        let len = batch.len();
        *current = Some(seq);

        let started = Instant::now();
        for item in batch {
            job.process(ctx, item).map_err(|e| Error::Processing {
                seq,
                worker: index,
                source: Box::new(e),
            })?;
        }
        let output = ctx.take_output();
        shared.counters[index].record_batch(len, started.elapsed());

        let unit = OutputUnit::new(seq, output)
            .with_worker(index)
            .with_items(len);
        shared.sequencer.lock().submit(unit)?;
        *current = None;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
