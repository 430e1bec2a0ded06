//! Processors turn one input record into one frame.
//!
//! - **ops**: built-in operators and the operator registry
//! - **image**: the built-in decode/resize/crop/... chain
//! - **script**: chains of user-provided script engines
//! - **layout**: frames and `[H,W,C]` / `[C,H,W]` output layout

pub mod image;
pub mod layout;
pub mod ops;
pub mod script;

pub use self::image::ImageProcessor;
pub use layout::{Frame, Layout};
pub use ops::{Operator, OperatorRegistry};
pub use script::{ScriptEngine, ScriptProcessor, ScriptRegistry};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::concurrent::task::panic_message;
use crate::error::{ConfigError, ErrorCode, ProcessError, ProcessResult, TransformerError};
use crate::params::OpConfig;
use crate::record::{InputRecord, OutputRecord};

/// Pseudo-operator decoding the raw input bytes.
pub const DECODE_OP: &str = "decode";
/// Pseudo-operator selecting `[C,H,W]` output.
pub const TOCHW_OP: &str = "tochw";
/// Operator delegating to a named script engine.
pub const SCRIPT_OP: &str = "script";

pub const IMAGE_PROCESSOR: &str = "image";
pub const SCRIPT_PROCESSOR: &str = "script";

/// Executes a configured operator chain against one record.
///
/// Called concurrently from every worker thread. Failures are values, never
/// panics; a panic that still escapes is caught by [`process_record`].
pub trait Processor: Send + Sync {
    /// Variant name, e.g. `"image"`.
    fn kind(&self) -> &str;

    fn process(&self, input: &InputRecord) -> ProcessResult<Frame>;
}

/// Run `processor` on `input` and build the output record.
///
/// A panic inside the processor becomes a `ProcessingException` record.
pub fn process_record(
    processor: &dyn Processor,
    input: &InputRecord,
    layout: Layout,
) -> OutputRecord {
    let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(input)))
        .unwrap_or_else(|payload| {
            Err(ProcessError::new(
                ErrorCode::ProcessingException,
                format!("processor panicked: {}", panic_message(payload.as_ref())),
            ))
        });
    OutputRecord::build(input, result, layout)
}

/// Builds processors by kind name from an operator chain.
#[derive(Clone)]
pub struct ProcessorFactory {
    operators: OperatorRegistry,
    scripts: ScriptRegistry,
}

impl Default for ProcessorFactory {
    fn default() -> Self {
        Self::new(OperatorRegistry::builtin(), ScriptRegistry::new())
    }
}

impl ProcessorFactory {
    pub fn new(operators: OperatorRegistry, scripts: ScriptRegistry) -> Self {
        Self { operators, scripts }
    }

    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    pub fn operators_mut(&mut self) -> &mut OperatorRegistry {
        &mut self.operators
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    /// Whether `name` may appear in a pipeline.
    pub fn is_known_op(&self, name: &str) -> bool {
        matches!(name, DECODE_OP | TOCHW_OP | SCRIPT_OP) || self.operators.contains(name)
    }

    /// Create and initialise a processor of `kind` for `ops`.
    pub fn create(
        &self,
        kind: &str,
        ops: &[OpConfig],
        seed: Option<u64>,
    ) -> Result<Arc<dyn Processor>, TransformerError> {
        match kind {
            IMAGE_PROCESSOR => Ok(Arc::new(
                ImageProcessor::new(ops, &self.operators)?.with_seed(seed),
            )),
            SCRIPT_PROCESSOR => Ok(Arc::new(ScriptProcessor::new(ops, &self.scripts)?)),
            other => Err(ConfigError::InvalidValue {
                key: "processor".to_string(),
                value: other.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl Processor for Panicking {
        fn kind(&self) -> &str {
            "panicking"
        }

        fn process(&self, _input: &InputRecord) -> ProcessResult<Frame> {
            panic!("operator blew up")
        }
    }

    #[test]
    fn test_process_record_catches_panics() {
        let input = InputRecord::new(3, vec![9u8, 9], "l");
        let out = process_record(&Panicking, &input, Layout::Hwc);
        assert_eq!(out.id, 3);
        assert_eq!(out.err_code, ErrorCode::ProcessingException.as_i32());
        assert!(out.err_message.contains("operator blew up"));
        assert_eq!(out.data, input.data);
        assert!(out.shape.is_empty());
    }

    #[test]
    fn test_factory_known_ops() {
        let factory = ProcessorFactory::default();
        for name in ["decode", "tochw", "script", "resize", "random_crop", "flip"] {
            assert!(factory.is_known_op(name), "{} should be known", name);
        }
        assert!(!factory.is_known_op("blur"));
    }

    #[test]
    fn test_factory_creates_by_kind() {
        let factory = ProcessorFactory::default();
        let p = factory
            .create("image", &[OpConfig::new("decode")], None)
            .unwrap();
        assert_eq!(p.kind(), "image");

        let err = factory
            .create("lua", &[OpConfig::new("decode")], None)
            .err()
            .unwrap();
        assert!(matches!(err, TransformerError::Config(ConfigError::InvalidValue { .. })));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_factory_custom_operator_becomes_known() {
        let mut factory = ProcessorFactory::default();
        factory
            .operators_mut()
            .register_fn("identity", |img, _, _| Ok(img));
        assert!(factory.is_known_op("identity"));
        assert!(factory
            .create("image", &[OpConfig::new("decode"), OpConfig::new("identity")], None)
            .is_ok());
    }
}
