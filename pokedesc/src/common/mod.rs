pub mod config;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DescriberError {
    #[error("Image file not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Could not decode image: {0}")]
    ImageDecode(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Caption worker is not running")]
    WorkerUnavailable,
}

impl DescriberError {
    /// Missing files are a user mistake, shown as a warning rather than an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ImageNotFound(_))
    }
}

pub type DescriberResult<T> = Result<T, DescriberError>;

/// Renders an `anyhow` error with its whole context chain on one line.
pub(crate) fn chain(e: &anyhow::Error) -> String {
    format!("{e:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_path() {
        let err = DescriberError::ImageNotFound(PathBuf::from("missing.png"));
        assert_eq!(err.to_string(), "Image file not found: missing.png");
        assert!(err.is_not_found());
    }

    #[test]
    fn other_errors_are_not_not_found() {
        assert!(!DescriberError::ImageDecode("bad".into()).is_not_found());
        assert!(!DescriberError::WorkerUnavailable.is_not_found());
    }

    #[test]
    fn chain_keeps_context() {
        let e = anyhow::anyhow!("network down").context("Failed to fetch config.json");
        assert_eq!(chain(&e), "Failed to fetch config.json: network down");
    }
}
