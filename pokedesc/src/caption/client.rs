use image::RgbImage;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use super::{Caption, HubLoader, ModelLoader};
use crate::common::config::CaptionConfig;
use crate::common::{chain, DescriberError, DescriberResult};
use pokedesc_core::models::ImageCaptioner;
use pokedesc_core::utils::image_utils;

/// Caption generator: the single owner of a processor/model pair.
///
/// The model is loaded on first use (or by [`CaptionClient::preload`]) and
/// kept for the lifetime of the client. A failed load leaves the client
/// unloaded so the next call retries.
pub struct CaptionClient<L: ModelLoader = HubLoader> {
    loader: L,
    model: Option<L::Model>,
}

impl CaptionClient<HubLoader> {
    pub fn from_config(config: CaptionConfig) -> DescriberResult<Self> {
        Ok(Self::new(HubLoader::new(config)?))
    }
}

impl<L: ModelLoader> CaptionClient<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            model: None,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Loads the model now instead of on the first caption.
    pub fn preload(&mut self) -> DescriberResult<()> {
        self.model().map(|_| ())
    }

    /// Describes the image stored at `image_path`.
    ///
    /// Existence is checked before anything else: a missing file never
    /// triggers a model load.
    pub fn describe(&mut self, image_path: impl AsRef<Path>) -> DescriberResult<Caption> {
        let path = image_path.as_ref();
        if !path.exists() {
            warn!("Image file not found: {}", path.display());
            return Err(DescriberError::ImageNotFound(path.to_path_buf()));
        }

        let image =
            image_utils::open_rgb_image(path).map_err(|e| DescriberError::ImageDecode(chain(&e)))?;
        self.describe_image(&image)
    }

    /// Describes an already decoded RGB image.
    pub fn describe_image(&mut self, image: &RgbImage) -> DescriberResult<Caption> {
        let model = self.model()?;
        let caption = model
            .caption(image)
            .map_err(|e| DescriberError::Inference(chain(&e)))?;
        info!(
            "Caption ready: {} tokens in {:.2} s",
            caption.tokens_generated, caption.duration_secs
        );
        Ok(caption)
    }

    fn model(&mut self) -> DescriberResult<&mut L::Model> {
        let model = match self.model.take() {
            Some(model) => model,
            None => {
                info!("Loading model {}", self.loader.describe());
                let start = Instant::now();
                let model = self.loader.load()?;
                info!("Model loaded in {:.2} s", start.elapsed().as_secs_f32());
                model
            }
        };
        Ok(self.model.insert(model))
    }
}

/// One-shot helper: loads `model_id` and describes a single image.
///
/// Prefer a long-lived [`CaptionClient`] when describing more than one
/// image; this reloads the model every call.
pub fn invoke_model(model_id: &str, image_path: impl AsRef<Path>) -> DescriberResult<String> {
    let path = image_path.as_ref();
    if !path.exists() {
        return Err(DescriberError::ImageNotFound(path.to_path_buf()));
    }
    let mut client = CaptionClient::from_config(CaptionConfig::with_model_id(model_id))?;
    Ok(client.describe(path)?.text)
}
