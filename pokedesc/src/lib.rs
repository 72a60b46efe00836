//! # pokedesc
//!
//! SDK for generating descriptions of images with a pretrained BLIP
//! captioning model. [`caption::CaptionClient`] owns the loaded model and
//! reuses it for every call.

pub mod caption;
pub mod common;

pub use caption::{invoke_model, Caption, CaptionClient, HubLoader, ModelLoader};
pub use common::{DescriberError, DescriberResult};

pub mod prelude {
    pub use crate::caption::{Caption, CaptionClient, HubLoader, ModelLoader};
    pub use crate::common::config::{
        CaptionConfig, ConfigOverrides, DataType, DeviceConfig, ModelSourceConfig,
    };
    pub use crate::common::{DescriberError, DescriberResult};
}
