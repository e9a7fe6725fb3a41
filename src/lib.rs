//! # pfor
//!
//! Order-preserving parallel processing of a sequential item stream over a
//! fixed pool of worker threads.
//!
//! ## Key Features
//!
//! - **Single-threaded sources**: the item source is pulled under one mutex
//!   and never needs to be thread-safe
//! - **Batched dispatch**: items are drawn in sequence-numbered batches to
//!   amortize synchronization
//! - **Private worker contexts**: each worker owns its scratch state and
//!   output buffer for the whole run
//! - **Ordered output**: batch outputs are committed strictly in input order,
//!   whatever order the workers finish in
//! - **Fatal errors**: the first failure stops dispatch, lets in-flight
//!   batches drain and is returned after every worker has been joined
//!
//! ## Architecture
//!
//! ```text
//!               ┌────────────┐
//!  Item Source ─┤ Dispatcher │  (mutex, assigns seq numbers)
//!               └─────┬──────┘
//!        ┌────────────┼────────────┐
//!        ▼            ▼            ▼
//!  ┌──────────┐ ┌──────────┐ ┌──────────┐
//!  │ Worker 0 │ │ Worker 1 │ │ Worker 2 │   (private contexts)
//!  └────┬─────┘ └────┬─────┘ └────┬─────┘
//!       └────────────┼────────────┘
//!                    ▼
//!           ┌─────────────────┐
//!           │ OutputSequencer │  (pending map, ascending commit)
//!           └────────┬────────┘
//!                    ▼
//!                   Sink
//! ```
//!
//! ## Example
//!
//! ```
//! use pfor::prelude::*;
//!
//! let config = EngineConfig::new().with_workers(3).with_batch_size(4);
//! let report = pfor::run(
//!     &config,
//!     pfor::source::from_iter(1..=20u32),
//!     |out: &mut String, n: u32| {
//!         out.push_str(&format!("{}\n", n * n));
//!         Ok(())
//!     },
//!     WriteSink::new(Vec::new()),
//! )?;
//!
//! let text = String::from_utf8(report.sink.into_inner()).unwrap();
//! assert!(text.starts_with("1\n4\n9\n"));
//! assert_eq!(report.stats.batches, 5);
//! # Ok::<(), pfor::Error>(())
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod batch;
pub mod channel;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod sequencer;
pub mod sink;
pub mod source;
pub mod stats;
pub mod worker;

// Re-exports
pub use batch::{Batch, Dispatch, OutputUnit, SeqNo};
pub use config::EngineConfig;
pub use context::{Buffered, WorkerContext};
pub use dispatcher::Dispatcher;
pub use engine::{run, run_with, Engine, FnJob, RunReport};
pub use error::{BoxError, Error, Result};
pub use sequencer::OutputSequencer;
pub use sink::{CollectSink, Discard, FnSink, Sink, WriteSink};
pub use source::{FnSource, ItemSource, IterSource, TryIterSource};
pub use stats::{RunStats, WorkerStats};
pub use worker::{Job, WorkerIndex};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::batch::{OutputUnit, SeqNo};
    pub use crate::config::EngineConfig;
    pub use crate::context::{Buffered, WorkerContext};
    pub use crate::engine::{Engine, FnJob, RunReport};
    pub use crate::error::{Error, Result};
    pub use crate::sink::{CollectSink, Sink, WriteSink};
    pub use crate::source::ItemSource;
    pub use crate::worker::{Job, WorkerIndex};
}
