pub mod based;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// BLIP text decoder start token (`[DEC]`).
pub const BLIP_BOS_TOKEN_ID: u32 = 30522;
/// BLIP text decoder stop token (`[SEP]`).
pub const BLIP_SEP_TOKEN_ID: u32 = 102;
/// Used when neither the caller nor the checkpoint sets a length.
pub const DEFAULT_MAX_NEW_TOKENS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub bos_token_id: u32,
    pub eos_token_id: u32,
    /// `None` means greedy (argmax) decoding.
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            bos_token_id: BLIP_BOS_TOKEN_ID,
            eos_token_id: BLIP_SEP_TOKEN_ID,
            temperature: None,
            top_p: None,
            seed: 299792458,
        }
    }
}

impl GenerationConfig {
    pub fn with_max_tokens(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            ..Default::default()
        }
    }
}

/// Length hints from a checkpoint's `generation_config.json`.
#[derive(Debug, Default, Deserialize)]
pub struct HfGenerationConfig {
    pub max_new_tokens: Option<usize>,
    pub max_length: Option<usize>,
}

impl HfGenerationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("Invalid {}", path.display()))
    }

    /// `max_length` counts the start token, `max_new_tokens` does not.
    pub fn max_new_tokens(&self) -> Option<usize> {
        self.max_new_tokens
            .or_else(|| self.max_length.map(|l| l.saturating_sub(1).max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_blip() {
        let cfg = GenerationConfig::default();
        assert_eq!(cfg.bos_token_id, 30522);
        assert_eq!(cfg.eos_token_id, 102);
        assert_eq!(cfg.temperature, None);
        assert_eq!(GenerationConfig::with_max_tokens(7).max_new_tokens, 7);
    }

    #[test]
    fn hf_generation_config_length_hints() {
        let cfg: HfGenerationConfig = serde_json::from_str(r#"{"max_length": 50}"#).unwrap();
        assert_eq!(cfg.max_new_tokens(), Some(49));

        let cfg: HfGenerationConfig =
            serde_json::from_str(r#"{"max_length": 50, "max_new_tokens": 30}"#).unwrap();
        assert_eq!(cfg.max_new_tokens(), Some(30));

        let cfg: HfGenerationConfig =
            serde_json::from_str(r#"{"_from_model_config": true}"#).unwrap();
        assert_eq!(cfg.max_new_tokens(), None);
    }
}
