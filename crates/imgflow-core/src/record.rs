//! Records flowing into and out of a transformer.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Serialize, Serializer};

use crate::error::{ErrorCode, ProcessError, ProcessResult};
use crate::processor::layout::{Frame, Layout};

/// One raw sample submitted by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRecord {
    /// Caller-chosen id used to correlate outputs with inputs
    pub id: u32,
    /// Encoded image bytes
    pub data: Vec<u8>,
    /// Opaque label passed through unchanged
    pub label: Vec<u8>,
}

impl InputRecord {
    pub fn new(id: u32, data: impl Into<Vec<u8>>, label: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
            label: label.into(),
        }
    }

    /// Copy caller-owned buffers into an owned record.
    pub fn from_slices(id: u32, data: &[u8], label: &[u8]) -> Self {
        Self {
            id,
            data: data.to_vec(),
            label: label.to_vec(),
        }
    }
}

/// One transformed sample, or the failure for its input.
///
/// On failure `data` holds the original input bytes and `shape` is empty, so
/// the caller always receives a payload for every id it submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    pub id: u32,
    pub err_code: i32,
    pub err_message: String,
    /// Rank-3 shape, `[H, W, C]` or `[C, H, W]` depending on layout
    pub shape: Vec<i32>,
    #[serde(serialize_with = "serialize_base64")]
    pub label: Vec<u8>,
    #[serde(serialize_with = "serialize_base64")]
    pub data: Vec<u8>,
}

impl OutputRecord {
    /// Build the record for `input` from a processing result.
    ///
    /// This is where the layout flag is applied and where failures fall back
    /// to the raw input payload.
    pub fn build(input: &InputRecord, result: ProcessResult<Frame>, layout: Layout) -> Self {
        match result.and_then(|frame| frame.into_layout(layout)) {
            Ok((shape, data)) => Self {
                id: input.id,
                err_code: ErrorCode::Ok.as_i32(),
                err_message: String::new(),
                shape,
                label: input.label.clone(),
                data,
            },
            Err(err) => Self::failure(input, &err),
        }
    }

    /// Build a failed record carrying the raw input bytes.
    pub fn failure(input: &InputRecord, error: &ProcessError) -> Self {
        Self {
            id: input.id,
            err_code: error.code.as_i32(),
            err_message: error.message.clone(),
            shape: Vec::new(),
            label: input.label.clone(),
            data: input.data.clone(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err_code == ErrorCode::Ok.as_i32()
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}
