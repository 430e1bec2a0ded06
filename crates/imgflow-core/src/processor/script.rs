//! Processor delegating each stage to a named script engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::layout::Frame;
use super::{Processor, SCRIPT_OP, SCRIPT_PROCESSOR, TOCHW_OP};
use crate::error::{ErrorCode, ProcessError, ProcessResult, TransformerError};
use crate::params::{KvConf, OpConfig, OpParams};
use crate::record::InputRecord;

/// Bridge to a user-defined transformation, typically hosted by a scripting runtime.
///
/// `previous` is the frame produced by the preceding engine in the chain,
/// `None` for the first one.
pub trait ScriptEngine: Send + Sync {
    fn run(
        &self,
        input: &InputRecord,
        previous: Option<&Frame>,
        params: &OpParams<'_>,
    ) -> ProcessResult<Frame>;
}

type ScriptFn = dyn Fn(&InputRecord, Option<&Frame>, &OpParams<'_>) -> ProcessResult<Frame>
    + Send
    + Sync;

struct FnScript {
    f: Box<ScriptFn>,
}

impl ScriptEngine for FnScript {
    fn run(
        &self,
        input: &InputRecord,
        previous: Option<&Frame>,
        params: &OpParams<'_>,
    ) -> ProcessResult<Frame> {
        (self.f)(input, previous, params)
    }
}

/// Name → script engine table.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    engines: HashMap<String, Arc<dyn ScriptEngine>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, engine: impl ScriptEngine + 'static) {
        self.engines.insert(name.into(), Arc::new(engine));
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&InputRecord, Option<&Frame>, &OpParams<'_>) -> ProcessResult<Frame>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnScript { f: Box::new(f) });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScriptEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

struct ScriptStep {
    name: String,
    params: KvConf,
    engine: Arc<dyn ScriptEngine>,
}

/// Runs a chain of `script` operators, each naming a registered engine.
pub struct ScriptProcessor {
    steps: Vec<ScriptStep>,
}

impl ScriptProcessor {
    pub fn new(ops: &[OpConfig], scripts: &ScriptRegistry) -> Result<Self, TransformerError> {
        let mut steps = Vec::with_capacity(ops.len());
        for entry in ops {
            match entry.name.as_str() {
                TOCHW_OP => continue,
                SCRIPT_OP => {}
                other => {
                    return Err(TransformerError::Processor(format!(
                        "script processor only runs 'script' operators, got '{}'",
                        other
                    )))
                }
            }
            let name = entry.params().get("name").ok_or_else(|| {
                TransformerError::Processor("'script' operator needs a 'name' param".to_string())
            })?;
            let engine = scripts
                .get(name)
                .ok_or_else(|| TransformerError::Processor(format!("no script named '{}'", name)))?;
            steps.push(ScriptStep {
                name: name.to_string(),
                params: entry.params.clone(),
                engine,
            });
        }
        if steps.is_empty() {
            return Err(TransformerError::EmptyPipeline);
        }
        Ok(Self { steps })
    }
}

impl Processor for ScriptProcessor {
    fn kind(&self) -> &str {
        SCRIPT_PROCESSOR
    }

    fn process(&self, input: &InputRecord) -> ProcessResult<Frame> {
        let started = Instant::now();
        let mut current: Option<Frame> = None;
        for step in &self.steps {
            let frame = step
                .engine
                .run(input, current.as_ref(), &OpParams::new(&step.params))
                .map_err(|e| {
                    let code = match e.code {
                        ErrorCode::ScriptInvalidOutput | ErrorCode::NoOutput => e.code,
                        _ => ErrorCode::ScriptException,
                    };
                    ProcessError::new(code, format!("script '{}': {}", step.name, e.message))
                })?;
            current = Some(frame);
        }
        tracing::debug!(
            id = input.id,
            scripts = self.steps.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Record processed by scripts"
        );
        current.ok_or_else(|| ProcessError::new(ErrorCode::NoOutput, "no script produced a frame"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScriptRegistry {
        let mut scripts = ScriptRegistry::new();
        // 1x1 gray frame holding the input length
        scripts.register_fn("length", |input: &InputRecord, _: Option<&Frame>, _: &OpParams<'_>| {
            Frame::new(1, 1, 1, vec![input.data.len() as u8])
        });
        scripts.register_fn("double", |_: &InputRecord, prev: Option<&Frame>, _: &OpParams<'_>| {
            let prev = prev.ok_or_else(|| ProcessError::new(ErrorCode::NoOutput, "nothing"))?;
            let data = prev.data().iter().map(|v| v.saturating_mul(2)).collect();
            Frame::new(prev.height(), prev.width(), prev.channels(), data)
        });
        scripts.register_fn("broken", |_: &InputRecord, _: Option<&Frame>, _: &OpParams<'_>| {
            Frame::new(2, 2, 3, vec![0u8; 5])
        });
        scripts.register_fn("raises", |_: &InputRecord, _: Option<&Frame>, params: &OpParams<'_>| {
            Err(ProcessError::new(
                ErrorCode::ProcessingException,
                params.get("msg").unwrap_or("failed").to_string(),
            ))
        });
        scripts
    }

    fn script(name: &str) -> OpConfig {
        OpConfig::new("script").param("name", name)
    }

    #[test]
    fn test_scripts_chain_previous_frame() {
        let p = ScriptProcessor::new(&[script("length"), script("double")], &registry()).unwrap();
        let frame = p.process(&InputRecord::new(1, vec![0u8; 21], "")).unwrap();
        assert_eq!(frame.data(), &[42]);
        assert_eq!(p.kind(), "script");
    }

    #[test]
    fn test_invalid_frame_maps_to_invalid_output() {
        let p = ScriptProcessor::new(&[script("broken")], &registry()).unwrap();
        let err = p.process(&InputRecord::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ScriptInvalidOutput);
    }

    #[test]
    fn test_engine_error_maps_to_script_exception() {
        let op = script("raises").param("msg", "boom");
        let p = ScriptProcessor::new(&[op], &registry()).unwrap();
        let err = p.process(&InputRecord::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ScriptException);
        assert!(err.message.contains("boom"));
    }

    #[test]
    fn test_new_validates_chain() {
        let scripts = registry();
        assert!(matches!(
            ScriptProcessor::new(&[OpConfig::new("script")], &scripts),
            Err(TransformerError::Processor(_))
        ));
        assert!(matches!(
            ScriptProcessor::new(&[script("missing")], &scripts),
            Err(TransformerError::Processor(_))
        ));
        assert!(matches!(
            ScriptProcessor::new(&[OpConfig::new("resize")], &scripts),
            Err(TransformerError::Processor(_))
        ));
        assert!(matches!(
            ScriptProcessor::new(&[], &scripts),
            Err(TransformerError::EmptyPipeline)
        ));
        assert_eq!(scripts.names(), vec!["broken", "double", "length", "raises"]);
    }
}
