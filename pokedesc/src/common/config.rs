use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{DescriberError, DescriberResult};
use pokedesc_core::hub::{validate_model_id, validate_revision, ModelSource};
use pokedesc_core::models::{DType, Device};

pub const DEFAULT_MODEL_ID: &str = "RidzIn/Pokemon-Describer";

/// Configuration for the caption client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Where the checkpoint comes from
    pub model: ModelSourceConfig,

    /// Device to run the model on
    pub device: DeviceConfig,

    /// Data type for computations
    pub dtype: DataType,

    /// Generation length cap; `None` defers to the checkpoint
    pub max_new_tokens: Option<usize>,

    /// Sampling temperature; `None` is greedy decoding
    pub temperature: Option<f64>,

    pub top_p: Option<f64>,

    pub seed: u64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            model: ModelSourceConfig::default(),
            device: DeviceConfig::Auto,
            dtype: DataType::F32,
            max_new_tokens: None,
            temperature: None,
            top_p: None,
            seed: 299792458,
        }
    }
}

impl CaptionConfig {
    pub fn from_file(path: impl AsRef<Path>) -> DescriberResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| DescriberError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> DescriberResult<Self> {
        let config: Self =
            serde_json::from_str(data).map_err(|e| DescriberError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_model_id(model_id: impl Into<String>) -> Self {
        Self {
            model: ModelSourceConfig::Hub {
                model_id: model_id.into(),
                revision: None,
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> DescriberResult<()> {
        if let ModelSourceConfig::Hub { model_id, revision } = &self.model {
            validate_model_id(model_id).map_err(|e| DescriberError::Config(e.to_string()))?;
            if let Some(rev) = revision {
                validate_revision(rev).map_err(|e| DescriberError::Config(e.to_string()))?;
            }
        }
        if self.max_new_tokens == Some(0) {
            return Err(DescriberError::Config(
                "max_new_tokens must be at least 1".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if t <= 0.0 {
                return Err(DescriberError::Config(format!(
                    "temperature must be positive, got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(DescriberError::Config(format!(
                    "top_p must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    /// Applies command-line overrides on top of file or default values.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> DescriberResult<Self> {
        match (overrides.model_dir, overrides.model_id) {
            (Some(path), _) => self.model = ModelSourceConfig::Local { path },
            (None, Some(model_id)) => {
                self.model = ModelSourceConfig::Hub {
                    model_id,
                    revision: overrides.revision,
                }
            }
            (None, None) => {
                if let (ModelSourceConfig::Hub { revision, .. }, Some(rev)) =
                    (&mut self.model, overrides.revision)
                {
                    *revision = Some(rev);
                }
            }
        }
        if overrides.cpu {
            self.device = DeviceConfig::Cpu;
        }
        if overrides.max_new_tokens.is_some() {
            self.max_new_tokens = overrides.max_new_tokens;
        }
        self.validate()?;
        Ok(self)
    }

    /// Precision actually used: CPU always computes in F32.
    pub fn resolved_dtype(&self) -> DType {
        match (&self.device, &self.dtype) {
            (DeviceConfig::Cpu, _) => DType::F32,
            (_, DataType::F16) => DType::F16,
            (_, DataType::F32) => DType::F32,
            (_, DataType::BF16) => DType::BF16,
        }
    }
}

/// Values given on the command line. A local directory wins over a model id.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model_id: Option<String>,
    pub revision: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub cpu: bool,
    pub max_new_tokens: Option<usize>,
}

/// Model checkpoint location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSourceConfig {
    Hub {
        model_id: String,
        #[serde(default)]
        revision: Option<String>,
    },
    Local {
        path: PathBuf,
    },
}

impl Default for ModelSourceConfig {
    fn default() -> Self {
        Self::Hub {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: None,
        }
    }
}

impl From<&ModelSourceConfig> for ModelSource {
    fn from(cfg: &ModelSourceConfig) -> Self {
        match cfg {
            ModelSourceConfig::Hub { model_id, revision } => ModelSource::Hub {
                model_id: model_id.clone(),
                revision: revision.clone(),
            },
            ModelSourceConfig::Local { path } => ModelSource::Local(path.clone()),
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceConfig {
    /// CUDA, then Metal, then CPU
    Auto,
    Cpu,
    Cuda(u32), // GPU ID
    Metal,
}

impl DeviceConfig {
    pub fn to_device(&self) -> DescriberResult<Device> {
        let device = match self {
            DeviceConfig::Auto => pokedesc_core::utils::select_device(false)
                .map_err(|e| DescriberError::ModelLoad(e.to_string()))?,
            DeviceConfig::Cpu => Device::Cpu,
            DeviceConfig::Cuda(gpu_id) => Device::cuda_if_available(*gpu_id as usize)
                .map_err(|e| DescriberError::ModelLoad(e.to_string()))?,
            DeviceConfig::Metal => {
                #[cfg(target_os = "macos")]
                {
                    Device::new_metal(0).map_err(|e| DescriberError::ModelLoad(e.to_string()))?
                }
                #[cfg(not(target_os = "macos"))]
                {
                    return Err(DescriberError::Config(
                        "Metal device not available on this platform".to_string(),
                    ));
                }
            }
        };
        Ok(device)
    }
}

impl std::fmt::Display for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceConfig::Auto => write!(f, "Auto"),
            DeviceConfig::Cpu => write!(f, "Cpu"),
            DeviceConfig::Cuda(gpu_id) => write!(f, "Cuda({})", gpu_id),
            DeviceConfig::Metal => write!(f, "Metal"),
        }
    }
}

/// Data type configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    F16,
    F32,
    BF16,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::F16 => write!(f, "F16"),
            DataType::F32 => write!(f, "F32"),
            DataType::BF16 => write!(f, "BF16"),
        }
    }
}
