//! Error types for the pfor engine

use crate::batch::SeqNo;
use crate::worker::WorkerIndex;
use thiserror::Error;

/// Boxed error type accepted from callers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for pfor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while running the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration, detected before any thread is spawned
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The item source failed for a reason other than exhaustion
    #[error("Item source failed in batch {seq}: {source}")]
    Source {
        /// Sequence number the failing batch would have received
        seq: SeqNo,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// The processing function failed for an item
    #[error("Worker {worker} failed processing batch {seq}: {source}")]
    Processing {
        /// Batch containing the failing item
        seq: SeqNo,
        /// Worker that observed the failure
        worker: WorkerIndex,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// A worker context could not be created
    #[error("Worker {worker} failed to initialize its context: {source}")]
    Init {
        /// Worker index
        worker: WorkerIndex,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// A worker context finalizer failed
    #[error("Worker {worker} failed to finalize its context: {source}")]
    Finalize {
        /// Worker index
        worker: WorkerIndex,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// The output sink rejected a committed unit
    #[error("Sink failed committing batch {seq}: {source}")]
    Sink {
        /// Batch being committed
        seq: SeqNo,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Worker thread panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// I/O error raised by a source, sink or processing function
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output ordering was violated
    #[error("Sequencing error: {0}")]
    Sequence(String),

    /// The receiving end of an output channel went away
    #[error("Output channel disconnected")]
    Disconnected,

    /// Caller-defined error
    #[error(transparent)]
    Custom(BoxError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap any caller error
    pub fn custom<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Custom(Box::new(err))
    }

    /// Build an error from a message
    pub fn msg(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Returns true for configuration errors
    pub fn is_config(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Sequence number of the batch this error is attributed to, if any
    pub fn seq(&self) -> Option<SeqNo> {
        match self {
            Error::Source { seq, .. } | Error::Processing { seq, .. } | Error::Sink { seq, .. } => {
                Some(*seq)
            }
            _ => None,
        }
    }
}

impl<T> From<flume::SendError<T>> for Error {
    fn from(_: flume::SendError<T>) -> Self {
        Error::Disconnected
    }
}

impl From<flume::RecvError> for Error {
    fn from(_: flume::RecvError) -> Self {
        Error::Disconnected
    }
}
