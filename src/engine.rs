//! Engine driver
//!
//! The driver validates the configuration, spawns the worker pool as scoped
//! threads, waits for every worker to observe exhaustion (or a fatal error)
//! and hands back the sink together with the run statistics.

use crate::config::EngineConfig;
use crate::context::WorkerContext;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::sequencer::OutputSequencer;
use crate::sink::{CollectSink, Sink};
use crate::source::{self, ItemSource};
use crate::stats::{CommitCounters, RunStats, WorkerCounters};
use crate::worker::{self, Job, JobOutput, Shared, WorkerIndex};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of a successful run
#[derive(Debug)]
pub struct RunReport<K> {
    /// The sink, after every unit was committed and flushed
    pub sink: K,

    /// Run statistics
    pub stats: RunStats,
}

impl<K> RunReport<K> {
    /// Discard the statistics
    pub fn into_sink(self) -> K {
        self.sink
    }
}

/// Order-preserving parallel engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Create an engine with `workers` threads and default batching
    pub fn with_workers(workers: usize) -> Self {
        Self::new(EngineConfig::new().with_workers(workers))
    }

    /// The engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `job` over every item of `source`, committing outputs to `sink`
    /// in input order
    ///
    /// Returns only after every worker thread has terminated. On failure the
    /// first fatal error is returned; units of batches before the failing
    /// one may already have been committed.
    pub fn run<S, J, K>(&self, source: S, job: &J, sink: K) -> Result<RunReport<K>>
    where
        J: Job,
        S: ItemSource<J::Context, Item = J::Item>,
        K: Sink<JobOutput<J>>,
    {
        self.config.validate()?;

        let workers = self.config.worker_count;
        info!(
            workers,
            batch_size = self.config.batch_size,
            "starting parallel run"
        );
        let started = Instant::now();

        let dispatcher = Dispatcher::new(source, self.config.batch_size)?;
        let commit_counters = Arc::new(CommitCounters::default());
        let sequencer = Mutex::new(
            OutputSequencer::new(sink)
                .with_pending_warning(self.config.max_pending)
                .with_counters(Arc::clone(&commit_counters)),
        );
        let counters: Vec<WorkerCounters> =
            (0..workers).map(|_| WorkerCounters::default()).collect();
        let shared = Shared::new(&dispatcher, &sequencer, &counters);

        thread::scope(|s| {
            let mut handles = Vec::with_capacity(workers);
            for index in 0..workers {
                match worker::spawn_scoped(s, index, &self.config, job, &shared) {
                    Ok(handle) => handles.push((index, handle)),
                    Err(e) => {
                        shared.fail(e, None);
                        break;
                    }
                }
            }

            for (index, handle) in handles {
                if handle.join().is_err() {
                    shared.fail(
                        Error::WorkerPanicked(format!("worker {} panicked outside a batch", index)),
                        None,
                    );
                }
            }
        });

        debug!("all workers joined");

        if let Some(err) = shared.take_error() {
            return Err(err);
        }

        let batches = dispatcher.batches_issued();
        let items = dispatcher.items_pulled();
        let sink = sequencer.into_inner().finish()?;

        let stats = RunStats {
            batches,
            items,
            committed: commit_counters.committed(),
            max_pending: commit_counters.max_pending(),
            elapsed: started.elapsed(),
            workers: counters.iter().map(WorkerCounters::snapshot).collect(),
        };

        info!(
            batches = stats.batches,
            items = stats.items,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "parallel run finished"
        );

        Ok(RunReport { sink, stats })
    }

    /// Apply `f` to every item in parallel and collect results in input order
    pub fn map<I, F, O>(&self, items: I, f: F) -> Result<Vec<O>>
    where
        I: IntoIterator,
        I::IntoIter: Send,
        I::Item: Send,
        F: Fn(I::Item) -> Result<O> + Sync,
        O: Send,
    {
        let job = FnJob::new(
            |_| Ok(Vec::new()),
            |out: &mut Vec<O>, item| {
                out.push(f(item)?);
                Ok(())
            },
        );
        let report = self.run(source::from_iter(items), &job, CollectSink::new())?;
        Ok(report.sink.into_flat())
    }
}

/// Job assembled from closures
pub struct FnJob<T, C, I, P, F> {
    init: I,
    process: P,
    finish: F,
    _types: PhantomData<fn(T) -> C>,
}

/// Finalizer that does nothing
pub type NoFinish<C> = fn(WorkerIndex, C) -> Result<()>;

fn no_finish<C>(_worker: WorkerIndex, _ctx: C) -> Result<()> {
    Ok(())
}

impl<T, C, I, P> FnJob<T, C, I, P, NoFinish<C>>
where
    I: Fn(WorkerIndex) -> Result<C> + Sync,
    P: Fn(&mut C, T) -> Result<()> + Sync,
{
    /// Build a job from an initializer and a per-item function
    pub fn new(init: I, process: P) -> Self {
        Self {
            init,
            process,
            finish: no_finish::<C>,
            _types: PhantomData,
        }
    }
}

impl<T, C, I, P, F> FnJob<T, C, I, P, F> {
    /// Replace the finalizer
    pub fn with_finish<G>(self, finish: G) -> FnJob<T, C, I, P, G>
    where
        G: Fn(WorkerIndex, C) -> Result<()> + Sync,
    {
        FnJob {
            init: self.init,
            process: self.process,
            finish,
            _types: PhantomData,
        }
    }
}

impl<T, C, I, P, F> Job for FnJob<T, C, I, P, F>
where
    T: Send,
    C: WorkerContext,
    I: Fn(WorkerIndex) -> Result<C> + Sync,
    P: Fn(&mut C, T) -> Result<()> + Sync,
    F: Fn(WorkerIndex, C) -> Result<()> + Sync,
{
    type Item = T;
    type Context = C;

    fn init(&self, worker: WorkerIndex) -> Result<C> {
        (self.init)(worker)
    }

    fn process(&self, ctx: &mut C, item: T) -> Result<()> {
        (self.process)(ctx, item)
    }

    fn finish(&self, worker: WorkerIndex, ctx: C) -> Result<()> {
        (self.finish)(worker, ctx)
    }
}

/// Run with default-constructed contexts and no finalizer
///
/// `process` is called once per item, in parallel, with the context of the
/// worker that drew the item's batch. Whatever it buffers in the context is
/// committed to `sink` in input order.
pub fn run<T, C, S, P, K>(config: &EngineConfig, source: S, process: P, sink: K) -> Result<RunReport<K>>
where
    T: Send,
    C: WorkerContext + Default,
    S: ItemSource<C, Item = T>,
    P: Fn(&mut C, T) -> Result<()> + Sync,
    K: Sink<C::Output>,
{
    run_with(config, |_| Ok(C::default()), source, process, no_finish::<C>, sink)
}

/// Run with an explicit initializer and finalizer
///
/// `init` builds the context of each worker on that worker's thread;
/// `finish` receives it back once the worker has drawn its last batch.
pub fn run_with<T, C, I, S, P, F, K>(
    config: &EngineConfig,
    init: I,
    source: S,
    process: P,
    finish: F,
    sink: K,
) -> Result<RunReport<K>>
where
    T: Send,
    C: WorkerContext,
    I: Fn(WorkerIndex) -> Result<C> + Sync,
    S: ItemSource<C, Item = T>,
    P: Fn(&mut C, T) -> Result<()> + Sync,
    F: Fn(WorkerIndex, C) -> Result<()> + Sync,
    K: Sink<C::Output>,
{
    let job = FnJob::new(init, process).with_finish(finish);
    Engine::new(config.clone()).run(source, &job, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::from_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(workers: usize, batch: usize) -> EngineConfig {
        EngineConfig::new().with_workers(workers).with_batch_size(batch)
    }

    #[test]
    fn test_identity_scenario() {
        let report = run(
            &config(3, 4),
            source::from_iter(1..=20u32),
            |out: &mut Vec<u32>, item| {
                out.push(item);
                Ok(())
            },
            Vec::new(),
        )
        .unwrap();

        let flat: Vec<u32> = report.sink.iter().flatten().copied().collect();
        assert_eq!(flat, (1..=20).collect::<Vec<_>>());
        assert_eq!(report.sink.len(), 5);
        assert_eq!(report.stats.batches, 5);
        assert_eq!(report.stats.items, 20);
        assert_eq!(report.stats.committed, 5);
        assert_eq!(report.stats.items_processed(), 20);
        assert_eq!(report.stats.workers.len(), 3);
    }

    #[test]
    fn test_invalid_config_spawns_nothing() {
        let pulled = AtomicUsize::new(0);
        let result = run(
            &config(0, 4),
            from_fn(|_: &mut Vec<u8>| {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok(Some(1u8))
            }),
            |_: &mut Vec<u8>, _| Ok(()),
            Vec::new(),
        );

        assert!(result.unwrap_err().is_config());
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_map_preserves_order_under_delay() {
        let engine = Engine::new(config(4, 1));
        let out = engine
            .map(0..40u64, |x| {
                // Early items sleep longest so they finish last
                std::thread::sleep(Duration::from_micros((40 - x) * 50));
                Ok(x * x)
            })
            .unwrap();
        assert_eq!(out, (0..40u64).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_processing_error_is_fatal() {
        let engine = Engine::new(config(2, 2));
        let err = engine
            .map(0..100u32, |x| {
                if x == 37 {
                    Err(Error::msg("bad item"))
                } else {
                    Ok(x)
                }
            })
            .unwrap_err();

        match err {
            Error::Processing { seq, source, .. } => {
                assert_eq!(seq, 18);
                assert_eq!(source.to_string(), "bad item");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_init_and_finish_run_once_per_worker() {
        let inits = AtomicUsize::new(0);
        let finishes = AtomicUsize::new(0);
        let total = AtomicUsize::new(0);

        run_with(
            &config(3, 5),
            |_| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(crate::context::Buffered::<usize, ()>::new(0))
            },
            source::from_iter(0..50usize),
            |ctx, _item| {
                ctx.state += 1;
                Ok(())
            },
            |_, ctx| {
                finishes.fetch_add(1, Ordering::SeqCst);
                total.fetch_add(ctx.state, Ordering::SeqCst);
                Ok(())
            },
            crate::sink::Discard,
        )
        .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 3);
        assert_eq!(finishes.load(Ordering::SeqCst), 3);
        assert_eq!(total.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_panic_is_reported() {
        let engine = Engine::new(config(2, 1));
        let err = engine
            .map(0..10u32, |x| {
                if x == 3 {
                    panic!("worker exploded");
                }
                Ok(x)
            })
            .unwrap_err();

        match err {
            Error::WorkerPanicked(msg) => assert!(msg.contains("worker exploded")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_every_finalizer_runs_when_a_worker_panics() {
        let finishes = AtomicUsize::new(0);

        let err = run_with(
            &config(2, 1),
            |_| Ok(Vec::<u32>::new()),
            source::from_iter(0..10u32),
            |out: &mut Vec<u32>, x: u32| {
                if x == 3 {
                    panic!("boom");
                }
                out.push(x);
                Ok(())
            },
            |_, _| {
                finishes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            crate::sink::Discard,
        )
        .err()
        .unwrap();

        assert!(matches!(err, Error::WorkerPanicked(_)));
        assert_eq!(finishes.load(Ordering::SeqCst), 2);
    }
}
