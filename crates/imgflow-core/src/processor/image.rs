//! Processor running the built-in operator chain.

use image::DynamicImage;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use std::time::Instant;

use super::layout::Frame;
use super::ops::{decode, DecodeMode, Operator, OperatorRegistry};
use super::{Processor, DECODE_OP, IMAGE_PROCESSOR, SCRIPT_OP, TOCHW_OP};
use crate::error::{ErrorCode, ProcessError, ProcessResult, TransformerError};
use crate::params::{KvConf, OpConfig, OpParams};
use crate::record::InputRecord;

enum Stage {
    Decode {
        mode: DecodeMode,
    },
    Op {
        name: String,
        params: KvConf,
        op: Arc<dyn Operator>,
    },
}

impl Stage {
    fn name(&self) -> &str {
        match self {
            Stage::Decode { .. } => DECODE_OP,
            Stage::Op { name, .. } => name,
        }
    }
}

/// Runs `decode` followed by registered operators, stopping at the first failure.
///
/// Stateless across calls: every record gets its own random source, so the
/// processor can be shared by all worker threads.
pub struct ImageProcessor {
    stages: Vec<Stage>,
    seed: Option<u64>,
}

impl ImageProcessor {
    /// Resolve every entry of `ops` against `registry`.
    ///
    /// `tochw` entries are layout flags and are skipped here.
    pub fn new(ops: &[OpConfig], registry: &OperatorRegistry) -> Result<Self, TransformerError> {
        let mut stages = Vec::with_capacity(ops.len());
        for entry in ops {
            match entry.name.as_str() {
                TOCHW_OP => continue,
                DECODE_OP => stages.push(Stage::Decode {
                    mode: DecodeMode::from_code(entry.params().get_int_or("mode", -1)),
                }),
                SCRIPT_OP => {
                    return Err(TransformerError::Processor(
                        "'script' operators need the script processor".to_string(),
                    ))
                }
                name => {
                    let op = registry
                        .get(name)
                        .ok_or_else(|| TransformerError::UnknownOperator(name.to_string()))?;
                    stages.push(Stage::Op {
                        name: name.to_string(),
                        params: entry.params.clone(),
                        op,
                    });
                }
            }
        }
        if stages.is_empty() {
            return Err(TransformerError::EmptyPipeline);
        }
        Ok(Self { stages, seed: None })
    }

    /// Make random operators reproducible: each record draws from a generator
    /// seeded with `seed` mixed with its id.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Names of the resolved stages, in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::name).collect()
    }

    fn rng_for(&self, id: u32) -> Box<dyn RngCore> {
        match self.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed ^ u64::from(id))),
            None => Box::new(rand::thread_rng()),
        }
    }
}

impl Processor for ImageProcessor {
    fn kind(&self) -> &str {
        IMAGE_PROCESSOR
    }

    fn process(&self, input: &InputRecord) -> ProcessResult<Frame> {
        let started = Instant::now();
        let mut rng = self.rng_for(input.id);
        let mut current: Option<DynamicImage> = None;

        for stage in &self.stages {
            let stage_start = Instant::now();
            let next = match stage {
                // Decoding always starts again from the raw bytes.
                Stage::Decode { mode } => decode(&input.data, *mode)?,
                Stage::Op { name, params, op } => {
                    let image = current.take().ok_or_else(|| {
                        ProcessError::new(
                            op.missing_input_code(),
                            format!("operator '{}' has no input image", name),
                        )
                    })?;
                    op.apply(image, &OpParams::new(params), rng.as_mut())
                        .map_err(|e| ProcessError::new(e.code, format!("{}: {}", name, e.message)))?
                }
            };
            if next.width() == 0 || next.height() == 0 {
                return Err(ProcessError::new(
                    ErrorCode::NoOutput,
                    format!("operator '{}' produced an empty image", stage.name()),
                ));
            }
            tracing::trace!(
                id = input.id,
                op = stage.name(),
                width = next.width(),
                height = next.height(),
                elapsed_us = stage_start.elapsed().as_micros() as u64,
                "Operator finished"
            );
            current = Some(next);
        }

        let image = current.ok_or_else(|| ProcessError::new(ErrorCode::NoOutput, "no image produced"))?;
        let frame = Frame::from_image(image)?;
        tracing::debug!(
            id = input.id,
            stages = self.stages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Record processed"
        );
        Ok(frame)
    }
}
