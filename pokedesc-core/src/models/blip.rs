use anyhow::{Context, Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Activation, VarBuilder};
use candle_transformers::models::{blip, blip_text};
use image::RgbImage;
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{CaptionOutput, ImageCaptioner};
use crate::generation::based::ModelForCaptioning;
use crate::generation::{
    GenerationConfig, HfGenerationConfig, BLIP_BOS_TOKEN_ID, BLIP_SEP_TOKEN_ID,
    DEFAULT_MAX_NEW_TOKENS,
};
use crate::hub::{resolve_model_files, ModelFiles, ModelSource};
use crate::utils::image_utils::{self, ImageProcessorConfig};
use crate::utils::{effective_dtype, tokenizer_utils};

pub const EMPTY_CAPTION: &str = "[no description generated]";

#[derive(Debug, Clone)]
pub struct BlipOptions {
    pub device: Device,
    /// Requested precision; CPU always runs F32.
    pub dtype: DType,
    /// Overrides the checkpoint's `generation_config.json` when set.
    pub max_new_tokens: Option<usize>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
}

impl Default for BlipOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            dtype: DType::F32,
            max_new_tokens: None,
            temperature: None,
            top_p: None,
            seed: GenerationConfig::default().seed,
        }
    }
}

// ======================== config.json ========================

fn gelu() -> Activation {
    Activation::Gelu
}

/// `text_config` as written by transformers. Fields left at their library
/// default are omitted from saved configs, so every field has one here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlipTextConfigFile {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub encoder_hidden_size: usize,
    pub intermediate_size: usize,
    pub projection_dim: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub max_position_embeddings: usize,
    #[serde(default = "gelu")]
    pub hidden_act: Activation,
    pub layer_norm_eps: f64,
    pub is_decoder: bool,
    pub bos_token_id: u32,
    pub sep_token_id: u32,
}

impl Default for BlipTextConfigFile {
    fn default() -> Self {
        Self {
            vocab_size: 30524,
            hidden_size: 768,
            encoder_hidden_size: 768,
            intermediate_size: 3072,
            projection_dim: 768,
            num_hidden_layers: 12,
            num_attention_heads: 8,
            max_position_embeddings: 512,
            hidden_act: Activation::Gelu,
            layer_norm_eps: 1e-12,
            is_decoder: true,
            bos_token_id: BLIP_BOS_TOKEN_ID,
            sep_token_id: BLIP_SEP_TOKEN_ID,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlipVisionConfigFile {
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub projection_dim: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub image_size: usize,
    pub patch_size: usize,
    #[serde(default = "gelu")]
    pub hidden_act: Activation,
    pub layer_norm_eps: f64,
}

impl Default for BlipVisionConfigFile {
    fn default() -> Self {
        Self {
            hidden_size: 768,
            intermediate_size: 3072,
            projection_dim: 512,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            image_size: 384,
            patch_size: 16,
            hidden_act: Activation::Gelu,
            layer_norm_eps: 1e-5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlipConfigFile {
    pub text_config: BlipTextConfigFile,
    pub vision_config: BlipVisionConfigFile,
    pub projection_dim: usize,
    pub image_text_hidden_size: usize,
}

impl Default for BlipConfigFile {
    fn default() -> Self {
        Self {
            text_config: BlipTextConfigFile::default(),
            vision_config: BlipVisionConfigFile::default(),
            projection_dim: 512,
            image_text_hidden_size: 256,
        }
    }
}

impl BlipConfigFile {
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).context("Invalid BLIP config.json")
    }

    pub fn to_model_config(&self) -> blip::Config {
        let t = &self.text_config;
        let v = &self.vision_config;
        blip::Config {
            text_config: blip_text::Config {
                vocab_size: t.vocab_size,
                hidden_size: t.hidden_size,
                encoder_hidden_size: t.encoder_hidden_size,
                intermediate_size: t.intermediate_size,
                projection_dim: t.projection_dim,
                num_hidden_layers: t.num_hidden_layers,
                num_attention_heads: t.num_attention_heads,
                max_position_embeddings: t.max_position_embeddings,
                hidden_act: t.hidden_act,
                layer_norm_eps: t.layer_norm_eps,
                is_decoder: t.is_decoder,
            },
            vision_config: blip::VisionConfig {
                hidden_size: v.hidden_size,
                intermediate_size: v.intermediate_size,
                projection_dim: v.projection_dim,
                num_hidden_layers: v.num_hidden_layers,
                num_attention_heads: v.num_attention_heads,
                image_size: v.image_size,
                patch_size: v.patch_size,
                hidden_act: v.hidden_act,
                layer_norm_eps: v.layer_norm_eps,
            },
            projection_dim: self.projection_dim,
            image_text_hidden_size: self.image_text_hidden_size,
        }
    }
}

// ======================== Captioner ========================

/// BLIP image-captioning model together with its processor (image
/// preprocessing config + tokenizer). Load once, caption many.
pub struct BlipCaptioner {
    model: blip::BlipForConditionalGeneration,
    tokenizer: Tokenizer,
    processor: ImageProcessorConfig,
    generation: GenerationConfig,
    device: Device,
    dtype: DType,
}

impl BlipCaptioner {
    pub fn from_pretrained(
        model_id: &str,
        revision: Option<&str>,
        options: &BlipOptions,
    ) -> Result<Self> {
        Self::load(
            &ModelSource::Hub {
                model_id: model_id.to_string(),
                revision: revision.map(str::to_string),
            },
            options,
        )
    }

    pub fn from_local(path: impl AsRef<Path>, options: &BlipOptions) -> Result<Self> {
        Self::load(&ModelSource::Local(path.as_ref().to_path_buf()), options)
    }

    pub fn load(source: &ModelSource, options: &BlipOptions) -> Result<Self> {
        info!("Loading BLIP captioner from {}", source.describe());
        let start = Instant::now();
        let files = resolve_model_files(source)?;
        let captioner = Self::from_files(&files, options)?;
        info!(
            "BLIP captioner ready on {:?} ({:?}) in {:.2} s",
            captioner.device,
            captioner.dtype,
            start.elapsed().as_secs_f32()
        );
        Ok(captioner)
    }

    pub fn from_files(files: &ModelFiles, options: &BlipOptions) -> Result<Self> {
        let device = options.device.clone();
        let dtype = effective_dtype(options.dtype, &device);

        let config_data = std::fs::read_to_string(&files.config)
            .with_context(|| format!("Failed to read {}", files.config.display()))?;
        let config_file = BlipConfigFile::from_json(&config_data)?;
        let config = config_file.to_model_config();

        let tokenizer = tokenizer_utils::load_tokenizer_file(&files.tokenizer)?;

        let processor = match &files.preprocessor_config {
            Some(path) => ImageProcessorConfig::from_file(path)?,
            None => ImageProcessorConfig::square(config_file.vision_config.image_size),
        };

        let checkpoint_max_tokens = match &files.generation_config {
            Some(path) => HfGenerationConfig::from_file(path)?.max_new_tokens(),
            None => None,
        };
        let generation = GenerationConfig {
            max_new_tokens: options
                .max_new_tokens
                .or(checkpoint_max_tokens)
                .unwrap_or(DEFAULT_MAX_NEW_TOKENS),
            bos_token_id: config_file.text_config.bos_token_id,
            eos_token_id: config_file.text_config.sep_token_id,
            temperature: options.temperature,
            top_p: options.top_p,
            seed: options.seed,
        };

        debug!("Loading weights from: {}", files.weights.display());
        let vb = if files.weights_are_pth() {
            VarBuilder::from_pth(&files.weights, dtype, &device)?
        } else {
            unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], dtype, &device)? }
        };
        let model = blip::BlipForConditionalGeneration::new(&config, vb)
            .map_err(|e| E::msg(format!("Failed to build BLIP model: {e}")))?;

        Ok(Self {
            model,
            tokenizer,
            processor,
            generation,
            device,
            dtype,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn describe(&mut self, image: &RgbImage) -> Result<CaptionOutput> {
        let start = Instant::now();

        let pixel_values = image_utils::preprocess_image(image, &self.processor, &self.device)?
            .to_dtype(self.dtype)?;
        let image_embeds = pixel_values.apply(self.model.vision_model())?;

        let mut decoder = BlipTextDecoder {
            model: &mut self.model,
            image_embeds: &image_embeds,
            device: &self.device,
        };
        let output_tokens = decoder.generate(&self.generation)?;

        let mut text = self
            .tokenizer
            .decode(&output_tokens, true)
            .map_err(|e| anyhow::anyhow!("Tokenizer decode failed: {}", e))?
            .trim()
            .to_string();
        if text.is_empty() {
            text = EMPTY_CAPTION.to_string();
        }

        let duration = start.elapsed().as_secs_f32();
        debug!(
            "Generated {} tokens in {:.2} s",
            output_tokens.len(),
            duration
        );

        Ok(CaptionOutput {
            text,
            tokens_generated: output_tokens.len(),
            duration_secs: duration,
        })
    }
}

impl ImageCaptioner for BlipCaptioner {
    fn caption(&mut self, image: &RgbImage) -> Result<CaptionOutput> {
        self.describe(image)
    }
}

/// The BLIP text decoder bound to one image's vision embeddings.
struct BlipTextDecoder<'a> {
    model: &'a mut blip::BlipForConditionalGeneration,
    image_embeds: &'a Tensor,
    device: &'a Device,
}

impl ModelForCaptioning for BlipTextDecoder<'_> {
    fn device(&self) -> &Device {
        self.device
    }

    fn next_logits(&mut self, new_tokens: &[u32]) -> Result<Tensor> {
        let input_ids = Tensor::new(new_tokens, self.device)?.unsqueeze(0)?;
        let logits = self
            .model
            .text_decoder()
            .forward(&input_ids, self.image_embeds)?;
        let logits = logits.squeeze(0)?;
        Ok(logits.get(logits.dim(0)? - 1)?)
    }

    fn reset(&mut self) {
        self.model.text_decoder().reset_kv_cache();
    }
}
