use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use image::{imageops::FilterType, RgbImage};
use serde::Deserialize;
use std::path::Path;

/// CLIP normalization constants, the BLIP processor defaults.
pub const OPENAI_CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const OPENAI_CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// Interpolation mode for resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Bilinear (smooth)
    Bilinear,
    /// Nearest neighbor (fast, preserves hard edges, pixelated)
    Nearest,
    /// Bicubic, what the BLIP processor uses
    Bicubic,
}

impl ResizeMode {
    /// Maps a PIL resample code as stored in `preprocessor_config.json`.
    pub fn from_pil_code(code: u32) -> Self {
        match code {
            0 => Self::Nearest,
            2 => Self::Bilinear,
            _ => Self::Bicubic,
        }
    }

    fn filter(self) -> FilterType {
        match self {
            Self::Bilinear => FilterType::Triangle,
            Self::Nearest => FilterType::Nearest,
            Self::Bicubic => FilterType::CatmullRom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum SizeSpec {
    Square(usize),
    HeightWidth { height: usize, width: usize },
    ShortestEdge { shortest_edge: usize },
}

/// Subset of a HuggingFace `preprocessor_config.json` needed to prepare
/// pixel values for BLIP. Missing fields fall back to BLIP defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProcessorConfig {
    pub height: usize,
    pub width: usize,
    pub do_resize: bool,
    pub resize_mode: ResizeMode,
    pub rescale_factor: f64,
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for ImageProcessorConfig {
    fn default() -> Self {
        Self::square(384)
    }
}

#[derive(Debug, Deserialize)]
struct RawProcessorConfig {
    size: Option<SizeSpec>,
    image_size: Option<usize>,
    do_resize: Option<bool>,
    resample: Option<u32>,
    rescale_factor: Option<f64>,
    do_normalize: Option<bool>,
    image_mean: Option<Vec<f32>>,
    image_std: Option<Vec<f32>>,
}

fn channel_triplet(values: Option<Vec<f32>>, fallback: [f32; 3]) -> Result<[f32; 3]> {
    match values {
        None => Ok(fallback),
        Some(v) => <[f32; 3]>::try_from(v.as_slice())
            .map_err(|_| anyhow::anyhow!("expected 3 channel values, got {}", v.len())),
    }
}

impl ImageProcessorConfig {
    pub fn square(size: usize) -> Self {
        Self {
            height: size,
            width: size,
            do_resize: true,
            resize_mode: ResizeMode::Bicubic,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: OPENAI_CLIP_MEAN,
            image_std: OPENAI_CLIP_STD,
        }
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let raw: RawProcessorConfig =
            serde_json::from_str(data).context("Invalid preprocessor config")?;
        let defaults = Self::default();

        let (height, width) = match (raw.size, raw.image_size) {
            (Some(SizeSpec::Square(s)), _) => (s, s),
            (Some(SizeSpec::HeightWidth { height, width }), _) => (height, width),
            (Some(SizeSpec::ShortestEdge { shortest_edge }), _) => (shortest_edge, shortest_edge),
            (None, Some(s)) => (s, s),
            (None, None) => (defaults.height, defaults.width),
        };

        Ok(Self {
            height,
            width,
            do_resize: raw.do_resize.unwrap_or(defaults.do_resize),
            resize_mode: raw
                .resample
                .map(ResizeMode::from_pil_code)
                .unwrap_or(defaults.resize_mode),
            rescale_factor: raw.rescale_factor.unwrap_or(defaults.rescale_factor),
            do_normalize: raw.do_normalize.unwrap_or(defaults.do_normalize),
            image_mean: channel_triplet(raw.image_mean, defaults.image_mean)?,
            image_std: channel_triplet(raw.image_std, defaults.image_std)?,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&data)
    }
}

/// Opens an image file and converts it to 3-channel RGB.
///
/// The format is sniffed from the content, so a mislabeled extension still
/// decodes and a non-image file fails here instead of deeper in the model.
pub fn open_rgb_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    let img = image::ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image: {}", path.display()))?
        .decode()
        .with_context(|| format!("Image decoding failed: {}", path.display()))?
        .to_rgb8();
    Ok(img)
}

/// Converts an RGB image into a **B×C×H×W** tensor (batch=1, channels=3)
/// following the processor config: resize, rescale, then per-channel
/// normalization.
///
/// # Returns
/// F32 tensor of shape `[1, 3, config.height, config.width]` (or the source
/// size when `do_resize` is false).
pub fn preprocess_image(
    img: &RgbImage,
    config: &ImageProcessorConfig,
    device: &Device,
) -> Result<Tensor> {
    let (orig_w, orig_h) = img.dimensions();
    let needs_resize = config.do_resize
        && (orig_h as usize != config.height || orig_w as usize != config.width);

    let (h, w, raw) = if needs_resize {
        let resized = image::imageops::resize(
            img,
            config.width as u32,
            config.height as u32,
            config.resize_mode.filter(),
        );
        (config.height, config.width, resized.into_raw())
    } else {
        (orig_h as usize, orig_w as usize, img.as_raw().clone())
    };

    let mut tensor = Tensor::from_vec(raw, (h, w, 3), device)?
        .to_dtype(DType::F32)?
        .permute((2, 0, 1))?
        .affine(config.rescale_factor, 0.0)?;

    if config.do_normalize {
        let mean = Tensor::new(&config.image_mean, device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&config.image_std, device)?.reshape((3, 1, 1))?;
        tensor = tensor.broadcast_sub(&mean)?.broadcast_div(&std)?;
    }

    Ok(tensor.unsqueeze(0)?)
}
