pub mod blip;

use anyhow::Result;
use image::RgbImage;

pub use candle_core::{DType, Device};

#[derive(Debug, Clone)]
pub struct CaptionOutput {
    pub text: String,
    pub tokens_generated: usize,
    pub duration_secs: f32,
}

/// Anything that can turn an RGB bitmap into a caption.
pub trait ImageCaptioner {
    fn caption(&mut self, image: &RgbImage) -> Result<CaptionOutput>;
}
