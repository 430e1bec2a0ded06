//! Built-in image operators and the registry that names them.
//!
//! Parameter names follow the key-value surface callers already use:
//! `resize_w`, `crop_center`, `final_size`, `flip_code` and so on. Every
//! failure is reported as a [`ProcessError`] with the operator's error code.

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Pixel};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use crate::error::{ErrorCode, ProcessError, ProcessResult};
use crate::params::OpParams;

/// A named transformation applied to one decoded image.
///
/// Implementations are shared by all worker threads and must not keep
/// per-call state; randomness comes from the `rng` handed in.
pub trait Operator: Send + Sync {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage>;

    /// Code reported when the operator runs before any image was decoded.
    fn missing_input_code(&self) -> ErrorCode {
        ErrorCode::NoOutput
    }
}

type OperatorFn =
    dyn Fn(DynamicImage, &OpParams<'_>, &mut dyn RngCore) -> ProcessResult<DynamicImage> + Send + Sync;

/// Adapts a closure into an [`Operator`].
pub struct FnOperator {
    f: Box<OperatorFn>,
}

impl Operator for FnOperator {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage> {
        (self.f)(image, params, rng)
    }
}

/// Name → operator table, owned by whoever builds processors.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `resize`, `crop`, `random_crop`, `rotate` and `flip`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("resize", Resize);
        registry.register("crop", Crop);
        registry.register("random_crop", RandomCrop);
        registry.register("rotate", Rotate);
        registry.register("flip", Flip);
        registry
    }

    /// Add or replace an operator.
    pub fn register(&mut self, name: impl Into<String>, op: impl Operator + 'static) {
        self.operators.insert(name.into(), Arc::new(op));
    }

    /// Register a closure as an operator.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(DynamicImage, &OpParams<'_>, &mut dyn RngCore) -> ProcessResult<DynamicImage>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnOperator { f: Box::new(f) });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operators.keys().cloned().collect();
        names.sort();
        names
    }
}

/// How `decode` converts colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Keep the stored channel count
    Unchanged,
    Gray,
    Rgb,
}

impl DecodeMode {
    /// `-1` unchanged, `0` grayscale, `1` RGB.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => DecodeMode::Gray,
            1 => DecodeMode::Rgb,
            _ => DecodeMode::Unchanged,
        }
    }
}

/// Decode encoded bytes, detecting the format from content.
///
/// The result is always 8 bits per channel.
pub fn decode(bytes: &[u8], mode: DecodeMode) -> ProcessResult<DynamicImage> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| {
            ProcessError::new(
                ErrorCode::DecodeFailed,
                format!("cannot detect image format: {}", e),
            )
        })?;
    if reader.format().is_none() {
        return Err(ProcessError::new(
            ErrorCode::DecodeFailed,
            format!("unrecognised image data ({} bytes)", bytes.len()),
        ));
    }
    let image = reader
        .decode()
        .map_err(|e| ProcessError::new(ErrorCode::DecodeFailed, e.to_string()))?;

    Ok(match mode {
        DecodeMode::Gray => DynamicImage::ImageLuma8(image.into_luma8()),
        DecodeMode::Rgb => DynamicImage::ImageRgb8(image.into_rgb8()),
        DecodeMode::Unchanged => match image.color().channel_count() {
            1 => DynamicImage::ImageLuma8(image.into_luma8()),
            2 => DynamicImage::ImageLumaA8(image.into_luma_alpha8()),
            3 => DynamicImage::ImageRgb8(image.into_rgb8()),
            _ => DynamicImage::ImageRgba8(image.into_rgba8()),
        },
    })
}

/// Map an interpolation code (0 nearest, 1 linear, 2 cubic, 3 area, 4 lanczos).
pub fn filter_for(code: i64) -> FilterType {
    match code {
        0 => FilterType::Nearest,
        2 => FilterType::CatmullRom,
        4 => FilterType::Lanczos3,
        _ => FilterType::Triangle,
    }
}

fn to_dim(value: i64, code: ErrorCode, what: &str) -> ProcessResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| ProcessError::new(code, format!("invalid {} {}", what, value)))
}

/// Uniform sample from `[a, b)`, order-insensitive.
fn uniform(rng: &mut dyn RngCore, a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
        lo
    } else {
        rng.gen_range(lo..hi)
    }
}

fn pair(values: Option<Vec<f64>>) -> Option<(f64, f64)> {
    match values.as_deref() {
        Some([a, b]) if a.is_finite() && b.is_finite() => Some((*a, *b)),
        _ => None,
    }
}

/// Scale to `resize_w` x `resize_h`, or so the shorter edge equals `short_size`.
pub struct Resize;

impl Operator for Resize {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        _rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage> {
        let code = ErrorCode::ResizeInvalidParam;
        let (w, h) = (image.width() as f64, image.height() as f64);
        let (resize_w, resize_h) = if let Some(short) = params.get_int("short_size") {
            if short <= 0 {
                return Err(ProcessError::new(code, format!("invalid short_size {}", short)));
            }
            let percent = short as f64 / w.min(h);
            ((w * percent).round() as i64, (h * percent).round() as i64)
        } else {
            match (params.get_int("resize_w"), params.get_int("resize_h")) {
                (Some(rw), Some(rh)) => (rw, rh),
                _ => {
                    return Err(ProcessError::new(
                        code,
                        "not found valid 'resize_w' or 'resize_h'",
                    ))
                }
            }
        };
        let resize_w = to_dim(resize_w, code, "resize width")?;
        let resize_h = to_dim(resize_h, code, "resize height")?;
        let filter = filter_for(params.get_int_or("interpolation", 1));
        Ok(image.resize_exact(resize_w, resize_h, filter))
    }

    fn missing_input_code(&self) -> ErrorCode {
        ErrorCode::ResizeNoInput
    }
}

/// Cut a rectangle given by `crop_x/y/w/h`, or a `crop_w` x `crop_h` box
/// placed at the centre (`crop_center=1`) or at random (`crop_center=0`).
pub struct Crop;

impl Operator for Crop {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage> {
        let code = ErrorCode::CropInvalidParam;
        let (img_w, img_h) = (image.width() as i64, image.height() as i64);

        let centered = (
            params.get_int("crop_center"),
            params.get_int("crop_w"),
            params.get_int("crop_h"),
        );
        let (x, y, w, h) = if let (Some(center), Some(w), Some(h)) = centered {
            if w <= 0 || h <= 0 || w > img_w || h > img_h {
                return Err(ProcessError::new(
                    code,
                    format!("crop {}x{} does not fit image {}x{}", w, h, img_w, img_h),
                ));
            }
            if center != 0 {
                ((img_w - w) / 2, (img_h - h) / 2, w, h)
            } else {
                (
                    rng.gen_range(0..=img_w - w),
                    rng.gen_range(0..=img_h - h),
                    w,
                    h,
                )
            }
        } else {
            match (
                params.get_int("crop_x"),
                params.get_int("crop_y"),
                params.get_int("crop_w"),
                params.get_int("crop_h"),
            ) {
                (Some(x), Some(y), Some(w), Some(h)) => (x, y, w, h),
                _ => {
                    return Err(ProcessError::new(
                        code,
                        "not found valid 'crop_[x|y|w|h]' params",
                    ))
                }
            }
        };

        let inside = |start: i64, len: i64, limit: i64| {
            start >= 0 && len > 0 && start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if !inside(x, w, img_w) || !inside(y, h, img_h) {
            return Err(ProcessError::new(
                code,
                format!(
                    "crop rect {{x:{},y:{},w:{},h:{}}} outside image {}x{}",
                    x, y, w, h, img_w, img_h
                ),
            ));
        }
        Ok(image.crop_imm(x as u32, y as u32, w as u32, h as u32))
    }

    fn missing_input_code(&self) -> ErrorCode {
        ErrorCode::CropNoInput
    }
}

/// Crop a random box of random area and aspect ratio, then resize it to
/// `final_size` (the usual training-time augmentation).
pub struct RandomCrop;

impl Operator for RandomCrop {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage> {
        let code = ErrorCode::RandCropInvalidParam;
        let (scale_lo, scale_hi) = pair(params.get_floats("scale"))
            .ok_or_else(|| ProcessError::new(code, "not found valid 'scale' param"))?;
        let (ratio_lo, ratio_hi) = pair(params.get_floats("ratio"))
            .filter(|(a, b)| *a > 0.0 && *b > 0.0)
            .ok_or_else(|| ProcessError::new(code, "not found valid 'ratio' param"))?;
        let (final_w, final_h) = match params.get_ints("final_size").as_deref() {
            Some([w, h]) if w.checked_mul(*h).is_some_and(|area| area > 0) => (
                to_dim(*w, code, "final width")?,
                to_dim(*h, code, "final height")?,
            ),
            _ => return Err(ProcessError::new(code, "not found valid 'final_size'")),
        };

        let (img_w, img_h) = (image.width() as f64, image.height() as f64);
        let aspect = uniform(rng, ratio_lo, ratio_hi).sqrt();
        let (w_factor, h_factor) = (aspect, 1.0 / aspect);

        // Largest area fraction that still fits inside the image at this aspect.
        let bound = ((img_w / img_h) / w_factor.powi(2)).min((img_h / img_w) / h_factor.powi(2));
        let scale_max = scale_hi.min(bound);
        let scale_min = scale_lo.min(bound);
        let target_area = img_w * img_h * uniform(rng, scale_min, scale_max);
        let target_size = target_area.sqrt();

        let crop_w = ((target_size * w_factor).floor() as i64).clamp(1, img_w as i64);
        let crop_h = ((target_size * h_factor).floor() as i64).clamp(1, img_h as i64);
        let x = rng.gen_range(0..=img_w as i64 - crop_w);
        let y = rng.gen_range(0..=img_h as i64 - crop_h);

        let cropped = image.crop_imm(x as u32, y as u32, crop_w as u32, crop_h as u32);
        let filter = filter_for(params.get_int_or("interpolation", 4));
        Ok(cropped.resize_exact(final_w, final_h, filter))
    }

    fn missing_input_code(&self) -> ErrorCode {
        ErrorCode::CropNoInput
    }
}

/// Rotate counter-clockwise about the centre by `angle` degrees, or by a
/// random integer angle in `[-random_range, random_range]`.
pub struct Rotate;

impl Operator for Rotate {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage> {
        let angle = if let Some(range) = params.get_int("random_range") {
            let range = range.checked_abs().ok_or_else(|| {
                ProcessError::new(
                    ErrorCode::RotateInvalidParam,
                    format!("invalid random_range {}", range),
                )
            })?;
            rng.gen_range(-range..=range) as f64
        } else if let Some(angle) = params.get_float("angle") {
            angle
        } else {
            return Err(ProcessError::new(
                ErrorCode::RotateInvalidParam,
                "rotate op not found valid 'random_range' or 'angle' param",
            ));
        };
        if !angle.is_finite() {
            return Err(ProcessError::new(
                ErrorCode::RotateInvalidParam,
                format!("invalid angle {}", angle),
            ));
        }
        let bilinear = params.get_int_or("resample", 0) != 0;
        Ok(rotate_image(image, angle, bilinear))
    }

    fn missing_input_code(&self) -> ErrorCode {
        ErrorCode::RotateNoInput
    }
}

/// Rotate keeping the original canvas; uncovered pixels are zero.
pub fn rotate_image(image: DynamicImage, angle_deg: f64, bilinear: bool) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(buf) => {
            DynamicImage::ImageLuma8(rotate_buffer(&buf, angle_deg, bilinear))
        }
        DynamicImage::ImageLumaA8(buf) => {
            DynamicImage::ImageLumaA8(rotate_buffer(&buf, angle_deg, bilinear))
        }
        DynamicImage::ImageRgb8(buf) => {
            DynamicImage::ImageRgb8(rotate_buffer(&buf, angle_deg, bilinear))
        }
        DynamicImage::ImageRgba8(buf) => {
            DynamicImage::ImageRgba8(rotate_buffer(&buf, angle_deg, bilinear))
        }
        other => DynamicImage::ImageRgba8(rotate_buffer(&other.into_rgba8(), angle_deg, bilinear)),
    }
}

fn rotate_buffer<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    angle_deg: f64,
    bilinear: bool,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    let mut out = ImageBuffer::<P, Vec<u8>>::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let (cx, cy) = (w as f64 * 0.5, h as f64 * 0.5);

    for (x, y, px) in out.enumerate_pixels_mut() {
        // Inverse mapping: find the source position that lands on (x, y).
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;

        if bilinear {
            sample_bilinear(src, sx, sy, px.channels_mut());
        } else {
            let (ix, iy) = (sx.round(), sy.round());
            if ix >= 0.0 && iy >= 0.0 && ix < w as f64 && iy < h as f64 {
                *px = *src.get_pixel(ix as u32, iy as u32);
            }
        }
    }
    out
}

fn sample_bilinear<P>(src: &ImageBuffer<P, Vec<u8>>, sx: f64, sy: f64, dst: &mut [u8])
where
    P: Pixel<Subpixel = u8>,
{
    let (w, h) = src.dimensions();
    let (max_x, max_y) = ((w - 1) as f64, (h - 1) as f64);
    if sx < 0.0 || sy < 0.0 || sx > max_x || sy > max_y {
        return;
    }
    let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (sx - x0 as f64, sy - y0 as f64);

    let p00 = src.get_pixel(x0, y0).channels();
    let p10 = src.get_pixel(x1, y0).channels();
    let p01 = src.get_pixel(x0, y1).channels();
    let p11 = src.get_pixel(x1, y1).channels();

    for (c, out) in dst.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        *out = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
}

/// Mirror the image: `flip_code` 0 vertical, >0 horizontal, <0 both.
/// With `random=1` the flip happens with probability one half.
pub struct Flip;

impl Operator for Flip {
    fn apply(
        &self,
        image: DynamicImage,
        params: &OpParams<'_>,
        rng: &mut dyn RngCore,
    ) -> ProcessResult<DynamicImage> {
        let flip_code = params.get_int("flip_code").ok_or_else(|| {
            ProcessError::new(ErrorCode::FlipInvalidParam, "not found valid 'flip_code'")
        })?;
        if params.get_int_or("random", 0) != 0 && !rng.gen_bool(0.5) {
            return Ok(image);
        }
        Ok(match flip_code.cmp(&0) {
            std::cmp::Ordering::Equal => image.flipv(),
            std::cmp::Ordering::Greater => image.fliph(),
            std::cmp::Ordering::Less => image.fliph().flipv(),
        })
    }

    fn missing_input_code(&self) -> ErrorCode {
        ErrorCode::FlipInvalidParam
    }
}
