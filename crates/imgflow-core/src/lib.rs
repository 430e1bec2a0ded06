//! imgflow core - multi-threaded image transformation pipeline.
//!
//! A [`Transformer`] accepts raw encoded images, runs a configurable operator
//! chain (decode, resize, crop, random crop, rotate, flip, layout swap, or
//! user scripts) on a pool of worker threads, and hands back tensors in
//! completion order.
//!
//! # Architecture
//!
//! ```text
//! put(InputRecord) → task queue → workers → Processor → output queue → get()
//! ```
//!
//! Both queues are bounded, so a slow consumer throttles the producer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use imgflow_core::{IdGenerator, InputRecord, KvConf, Transformer, TransformerConfig};
//!
//! let ids = IdGenerator::new();
//! let transformer = Transformer::new(&ids);
//! transformer.init(&TransformerConfig::new(4, 16))?;
//! transformer.add_op("decode", KvConf::new())?;
//! transformer.start()?;
//!
//! transformer.put(InputRecord::new(1, std::fs::read("cat.jpg")?, "cat"))?;
//! transformer.stop()?;
//! while let Ok(record) = transformer.get() {
//!     println!("{} -> {:?}", record.id, record.shape);
//! }
//! ```

// Module declarations
pub mod concurrent;
pub mod config;
pub mod error;
pub mod params;
pub mod processor;
pub mod record;
pub mod reorder;
pub mod source;
pub mod transformer;

// Re-exports for convenient access
pub use config::{Config, TransformerConfig};
pub use error::{
    ConfigError, ErrorCode, ErrorKind, PoolError, ProcessError, ProcessResult, Result,
    TransformerError,
};
pub use params::{KvConf, OpConfig, OpParams};
pub use processor::{
    Frame, Layout, Operator, OperatorRegistry, Processor, ProcessorFactory, ScriptEngine,
    ScriptRegistry,
};
pub use record::{InputRecord, OutputRecord};
pub use reorder::ReorderBuffer;
pub use source::{FileSource, SourceFile};
pub use transformer::{IdGenerator, Transformer, TransformerState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
