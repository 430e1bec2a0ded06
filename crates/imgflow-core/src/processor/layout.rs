//! Processed image frames and output tensor layout.

use image::DynamicImage;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ProcessError, ProcessResult};

/// Memory layout of output tensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Height, width, channels (interleaved pixels)
    #[default]
    Hwc,
    /// Channels, height, width (planar)
    Chw,
}

impl Layout {
    /// Map the integer `swapaxis` / `tochw` flag to a layout.
    pub fn from_flag(flag: i64) -> Self {
        if flag != 0 {
            Layout::Chw
        } else {
            Layout::Hwc
        }
    }

    /// Combine two flags: planar if either asks for it.
    pub fn or(self, other: Layout) -> Self {
        if self == Layout::Chw || other == Layout::Chw {
            Layout::Chw
        } else {
            Layout::Hwc
        }
    }
}

/// An 8-bit image in `[H, W, C]` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    height: u32,
    width: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap raw interleaved pixels.
    ///
    /// Fails with [`ErrorCode::NoOutput`] for an empty frame and
    /// [`ErrorCode::ScriptInvalidOutput`] when `data` does not hold exactly
    /// `height * width * channels` bytes.
    pub fn new(height: u32, width: u32, channels: u8, data: Vec<u8>) -> ProcessResult<Self> {
        let expected = height as usize * width as usize * channels as usize;
        if expected == 0 {
            return Err(ProcessError::new(
                ErrorCode::NoOutput,
                format!("empty frame {}x{}x{}", height, width, channels),
            ));
        }
        if data.len() != expected {
            return Err(ProcessError::new(
                ErrorCode::ScriptInvalidOutput,
                format!(
                    "frame {}x{}x{} needs {} bytes, got {}",
                    height,
                    width,
                    channels,
                    expected,
                    data.len()
                ),
            ));
        }
        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    /// Flatten a decoded image, normalising to 8-bit channels.
    pub fn from_image(image: DynamicImage) -> ProcessResult<Self> {
        let (height, width) = (image.height(), image.width());
        let (channels, data) = match image.color().channel_count() {
            1 => (1, image.into_luma8().into_raw()),
            2 => (2, image.into_luma_alpha8().into_raw()),
            3 => (3, image.into_rgb8().into_raw()),
            _ => (4, image.into_rgba8().into_raw()),
        };
        Self::new(height, width, channels, data)
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shape and bytes in the requested layout.
    pub fn into_layout(self, layout: Layout) -> ProcessResult<(Vec<i32>, Vec<u8>)> {
        let (h, w, c) = (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        );
        match layout {
            Layout::Hwc => Ok((vec![h as i32, w as i32, c as i32], self.data)),
            Layout::Chw => {
                let hwc = Array3::from_shape_vec((h, w, c), self.data).map_err(|e| {
                    ProcessError::new(
                        ErrorCode::TransposeNoInput,
                        format!("cannot view frame as {}x{}x{}: {}", h, w, c, e),
                    )
                })?;
                let chw: Vec<u8> = hwc.permuted_axes([2, 0, 1]).iter().copied().collect();
                Ok((vec![c as i32, h as i32, w as i32], chw))
            }
        }
    }
}
