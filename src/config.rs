//! Engine configuration

use crate::error::{Error, Result};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Default number of items per batch
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default worker thread name prefix
pub const DEFAULT_THREAD_NAME: &str = "pfor-worker";

/// Engine configuration, immutable for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct EngineConfig {
    /// Number of worker threads
    pub worker_count: usize,

    /// Maximum number of items pulled per batch
    pub batch_size: usize,

    /// Prefix for worker thread names
    pub thread_name: String,

    /// Stack size for worker threads (None = platform default)
    pub stack_size: Option<usize>,

    /// Whether to pin worker `i` to core `i % cores`
    pub cpu_affinity: bool,

    /// Pending out-of-order units above which a warning is logged
    pub max_pending: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            batch_size: DEFAULT_BATCH_SIZE,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
            cpu_affinity: false,
            max_pending: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set worker stack size
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Enable CPU affinity pinning
    pub fn with_cpu_affinity(mut self, enable: bool) -> Self {
        self.cpu_affinity = enable;
        self
    }

    /// Warn when more than `limit` units wait for an earlier batch
    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = Some(limit);
        self
    }

    /// Check the configuration before any thread is spawned
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        check_batch_size(self.batch_size)?;
        if self.stack_size == Some(0) {
            return Err(Error::InvalidConfig(
                "stack_size must be non-zero when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reject a batch size of zero
pub(crate) fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig(
            "batch_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}
