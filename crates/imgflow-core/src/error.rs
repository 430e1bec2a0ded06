//! Error types for the imgflow transformation pipeline.
//!
//! Setup-time failures (configuration, lifecycle misuse, thread spawn) are
//! returned synchronously as `Result`s. Per-record failures never surface as
//! `Err`: they travel inside [`OutputRecord`](crate::record::OutputRecord) as an
//! [`ErrorCode`] plus message so a single bad image cannot abort the pipeline.

use thiserror::Error;

/// Numeric error codes carried by output records.
///
/// Values are stable and non-overlapping; callers on the other side of a
/// language boundary match on the integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    /// A stage finished without producing an image
    NoOutput = 1,
    /// A panic escaped an operator or processor
    ProcessingException = 2,
    ScriptException = 3,
    ScriptInvalidOutput = 4,
    /// Reserved. Records are never emitted for a stopped transformer; `put`
    /// returns [`TransformerError::InvalidState`] instead.
    Stopped = 1000,
    /// Reserved. Unknown operators are rejected by `add_op` with
    /// [`TransformerError::UnknownOperator`] before any record runs.
    InvalidOpName = 1001,
    ResizeNoInput = 1002,
    ResizeInvalidParam = 1003,
    CropNoInput = 1004,
    CropInvalidParam = 1005,
    TransposeNoInput = 1006,
    RotateNoInput = 1007,
    RotateInvalidParam = 1008,
    RandCropInvalidParam = 1009,
    FlipInvalidParam = 1010,
    DecodeFailed = 1011,
}

impl ErrorCode {
    /// The integer value written into output records.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.as_i32())
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing required key 'thread_num'")]
    MissingThreadNum,

    #[error("Invalid thread_num {0}: must be in (0, 100]")]
    InvalidThreadNum(i64),

    #[error("Missing required key 'worker_queue_limit'")]
    MissingQueueLimit,

    #[error("Invalid worker_queue_limit {0}: must be > 0")]
    InvalidQueueLimit(i64),

    /// A key is present but its value cannot be parsed
    #[error("Invalid value for '{key}': {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Worker pool errors.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool was told to exit and no longer accepts tasks
    #[error("Worker pool is exiting, task rejected")]
    Exiting,

    /// The OS refused to spawn a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Coarse classification of transformer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation attempted in the wrong lifecycle state
    State,
    /// Invalid settings, unknown operator or empty pipeline
    Configuration,
    /// The worker pool rejected or failed a submission
    Submission,
    /// Transformer is stopped and every record has been consumed
    Exhausted,
}

/// Errors returned by [`Transformer`](crate::transformer::Transformer) operations.
#[derive(Error, Debug)]
pub enum TransformerError {
    #[error("Operation '{op}' not allowed in state '{state}'")]
    InvalidState { op: &'static str, state: String },

    /// `start` was called before a successful `init`
    #[error("Transformer has not been configured")]
    NotConfigured,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unsupported operator '{0}'")]
    UnknownOperator(String),

    #[error("Pipeline is empty, add at least one operator before start")]
    EmptyPipeline,

    /// The processor rejected the operator chain
    #[error("Processor setup failed: {0}")]
    Processor(String),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Transformer is stopped and has no more data")]
    Exhausted,
}

impl TransformerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformerError::InvalidState { .. } => ErrorKind::State,
            TransformerError::NotConfigured
            | TransformerError::Config(_)
            | TransformerError::UnknownOperator(_)
            | TransformerError::EmptyPipeline
            | TransformerError::Processor(_) => ErrorKind::Configuration,
            TransformerError::Pool(_) => ErrorKind::Submission,
            TransformerError::Exhausted => ErrorKind::Exhausted,
        }
    }
}

/// A per-record processing failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProcessError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProcessError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Convenience type alias for transformer results.
pub type Result<T> = std::result::Result<T, TransformerError>;

/// Convenience type alias for per-record processing results.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
