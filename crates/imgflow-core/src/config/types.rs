//! Sub-configuration structs with their defaults.

use crate::error::ConfigError;
use crate::params::{KvConf, OpParams};
use crate::processor::{Layout, IMAGE_PROCESSOR};
use serde::{Deserialize, Serialize};

/// Upper bound for `thread_num`.
pub const MAX_THREAD_NUM: usize = 100;

/// Transformer settings: worker threads, queue depth, output layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Number of worker threads, 1..=100
    pub thread_num: usize,

    /// Capacity of both the task queue and the output queue
    pub worker_queue_limit: usize,

    /// Emit `[C,H,W]` tensors instead of `[H,W,C]`
    pub swapaxis: bool,

    /// Processor variant: "image" or "script"
    pub processor: String,

    /// Seed for random operators; unset means non-deterministic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            thread_num: 4,
            worker_queue_limit: 16,
            swapaxis: false,
            processor: IMAGE_PROCESSOR.to_string(),
            seed: None,
        }
    }
}

impl TransformerConfig {
    pub fn new(thread_num: usize, worker_queue_limit: usize) -> Self {
        Self {
            thread_num,
            worker_queue_limit,
            ..Self::default()
        }
    }

    /// Parse the flat key/value form (`thread_num`, `worker_queue_limit`,
    /// `swapaxis`, `processor`, `seed`).
    ///
    /// `thread_num` and `worker_queue_limit` are required; each missing or
    /// out-of-range value has its own error.
    pub fn from_kv(conf: &KvConf) -> Result<Self, ConfigError> {
        let params = OpParams::new(conf);
        let int = |key: &str| -> Result<Option<i64>, ConfigError> {
            match params.get(key) {
                None => Ok(None),
                Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
            }
        };

        let thread_num = int("thread_num")?.ok_or(ConfigError::MissingThreadNum)?;
        if thread_num <= 0 || thread_num > MAX_THREAD_NUM as i64 {
            return Err(ConfigError::InvalidThreadNum(thread_num));
        }
        let queue_limit = int("worker_queue_limit")?.ok_or(ConfigError::MissingQueueLimit)?;
        if queue_limit <= 0 {
            return Err(ConfigError::InvalidQueueLimit(queue_limit));
        }
        let swapaxis = int("swapaxis")?.unwrap_or(0) != 0;
        let seed = match int("seed")? {
            None => None,
            Some(v) => Some(u64::try_from(v).map_err(|_| ConfigError::InvalidValue {
                key: "seed".to_string(),
                value: v.to_string(),
            })?),
        };

        Ok(Self {
            thread_num: thread_num as usize,
            worker_queue_limit: queue_limit as usize,
            swapaxis,
            processor: params.get("processor").unwrap_or(IMAGE_PROCESSOR).to_string(),
            seed,
        })
    }

    /// Range checks shared by the TOML and key/value paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_num == 0 || self.thread_num > MAX_THREAD_NUM {
            return Err(ConfigError::InvalidThreadNum(self.thread_num as i64));
        }
        if self.worker_queue_limit == 0 {
            return Err(ConfigError::InvalidQueueLimit(0));
        }
        if self.processor.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "processor".to_string(),
                value: self.processor.clone(),
            });
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::from_flag(self.swapaxis as i64)
    }
}

/// Input discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// File extensions treated as images (lowercase, no dot)
    pub extensions: Vec<String>,

    /// Shuffle this reader's partition after it has been selected
    pub shuffle: bool,

    /// This reader's partition index, `0..part_num`
    pub part_id: usize,

    /// Total number of partitions
    pub part_num: usize,

    /// Files larger than this are skipped
    pub max_file_size_mb: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            extensions: ["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            shuffle: false,
            part_id: 0,
            part_num: 1,
            max_file_size_mb: 100,
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// "jsonl" (one record per line) or "json" (single array)
    pub format: String,

    /// Include base64 tensor bytes in each record
    pub embed_data: bool,

    /// Emit records in input order instead of completion order
    pub ordered: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "jsonl".to_string(),
            embed_data: false,
            ordered: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
