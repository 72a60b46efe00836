//! Checkpoint resolution: turns a model identifier or a local directory into
//! concrete file paths, downloading through the `hf-hub` cache when needed.

use anyhow::{Context, Error as E, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_REVISION: &str = "main";

const VALID_CHARS: [char; 4] = ['-', '_', '.', '/'];

/// Where a checkpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Hub {
        model_id: String,
        revision: Option<String>,
    },
    Local(PathBuf),
}

impl ModelSource {
    pub fn hub(model_id: impl Into<String>) -> Self {
        Self::Hub {
            model_id: model_id.into(),
            revision: None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Hub { model_id, revision } => format!(
                "{} @ {}",
                model_id,
                revision.as_deref().unwrap_or(DEFAULT_REVISION)
            ),
            Self::Local(path) => path.display().to_string(),
        }
    }
}

/// Paths of every file a BLIP captioner needs. Optional entries are absent
/// from some checkpoints and have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
    pub preprocessor_config: Option<PathBuf>,
    pub generation_config: Option<PathBuf>,
}

impl ModelFiles {
    pub fn weights_are_pth(&self) -> bool {
        self.weights.extension().is_some_and(|ext| ext == "bin")
    }
}

fn check_chars(kind: &str, value: &str) -> Result<()> {
    let is_valid_char = |x: char| x.is_alphanumeric() || VALID_CHARS.contains(&x);
    if value.is_empty() {
        anyhow::bail!("{kind} must not be empty");
    }
    if !value.chars().all(is_valid_char) {
        let valid_chars_stringified = VALID_CHARS
            .iter()
            .map(|x| format!("'{}'", x))
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!(
            "{kind} \"{value}\" contains invalid characters, expected only alphanumeric or {valid_chars_stringified}"
        );
    }
    Ok(())
}

pub fn validate_model_id(model_id: &str) -> Result<()> {
    check_chars("Model", model_id)
}

pub fn validate_revision(revision: &str) -> Result<()> {
    check_chars("Revision", revision)
}

pub fn resolve_model_files(source: &ModelSource) -> Result<ModelFiles> {
    match source {
        ModelSource::Hub { model_id, revision } => {
            resolve_from_hub(model_id, revision.as_deref().unwrap_or(DEFAULT_REVISION))
        }
        ModelSource::Local(dir) => resolve_from_dir(dir),
    }
}

fn resolve_from_hub(model_id: &str, revision: &str) -> Result<ModelFiles> {
    validate_model_id(model_id)?;
    validate_revision(revision)?;

    info!("Resolving {} @ {} from the Hugging Face hub", model_id, revision);

    let api = Api::new()?;
    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config = repo
        .get("config.json")
        .with_context(|| format!("Failed to fetch config.json for {model_id}"))?;
    let tokenizer = repo
        .get("tokenizer.json")
        .or_else(|_| repo.get("vocab.txt"))
        .with_context(|| format!("Failed to fetch tokenizer for {model_id}"))?;
    // The WordPiece fallback reads tokenizer_config.json next to vocab.txt.
    if tokenizer.file_name().is_some_and(|n| n == "vocab.txt") {
        let _ = repo.get("tokenizer_config.json");
    }
    let weights = repo
        .get("model.safetensors")
        .or_else(|_| repo.get("pytorch_model.bin"))
        .with_context(|| format!("Failed to fetch weights for {model_id}"))?;

    let preprocessor_config = repo.get("preprocessor_config.json").ok();
    let generation_config = repo.get("generation_config.json").ok();

    debug!("Weights resolved to {}", weights.display());

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
        preprocessor_config,
        generation_config,
    })
}

fn resolve_from_dir(dir: &Path) -> Result<ModelFiles> {
    if !dir.is_dir() {
        return Err(E::msg(format!("Not a directory: {}", dir.display())));
    }

    let required = |name: &str| -> Result<PathBuf> {
        let p = dir.join(name);
        if p.exists() {
            Ok(p)
        } else {
            Err(E::msg(format!("{} not found in {}", name, dir.display())))
        }
    };
    let optional = |name: &str| Some(dir.join(name)).filter(|p| p.exists());

    let config = required("config.json")?;
    let tokenizer = optional("tokenizer.json")
        .or_else(|| optional("vocab.txt"))
        .ok_or_else(|| {
            E::msg(format!(
                "Neither tokenizer.json nor vocab.txt found in {}",
                dir.display()
            ))
        })?;
    let weights = optional("model.safetensors")
        .or_else(|| optional("pytorch_model.bin"))
        .ok_or_else(|| E::msg("Neither model.safetensors nor pytorch_model.bin found"))?;

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
        preprocessor_config: optional("preprocessor_config.json"),
        generation_config: optional("generation_config.json"),
    })
}
