mod client;

pub use client::{invoke_model, CaptionClient};
pub use pokedesc_core::models::CaptionOutput as Caption;

use pokedesc_core::hub::ModelSource;
use pokedesc_core::models::blip::{BlipCaptioner, BlipOptions};
use pokedesc_core::models::ImageCaptioner;

use crate::common::config::CaptionConfig;
use crate::common::{DescriberError, DescriberResult};

/// Produces a ready processor/model pair. Called at most once per
/// [`CaptionClient`] on success.
pub trait ModelLoader {
    type Model: ImageCaptioner;

    fn load(&self) -> DescriberResult<Self::Model>;

    /// Human-readable name of what gets loaded, for logs.
    fn describe(&self) -> String;
}

/// Loads BLIP checkpoints from the Hugging Face hub or a local directory.
#[derive(Debug, Clone)]
pub struct HubLoader {
    config: CaptionConfig,
}

impl HubLoader {
    pub fn new(config: CaptionConfig) -> DescriberResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.config
    }

    fn options(&self) -> DescriberResult<BlipOptions> {
        Ok(BlipOptions {
            device: self.config.device.to_device()?,
            dtype: self.config.resolved_dtype(),
            max_new_tokens: self.config.max_new_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            seed: self.config.seed,
        })
    }
}

impl ModelLoader for HubLoader {
    type Model = BlipCaptioner;

    fn load(&self) -> DescriberResult<BlipCaptioner> {
        let options = self.options()?;
        let source = ModelSource::from(&self.config.model);
        BlipCaptioner::load(&source, &options)
            .map_err(|e| DescriberError::ModelLoad(crate::common::chain(&e)))
    }

    fn describe(&self) -> String {
        ModelSource::from(&self.config.model).describe()
    }
}
