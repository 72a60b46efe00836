//! Window-independent application state. Every button handler goes through
//! [`AppState`], the egui layer only renders it.

use anyhow::{Context, Result};
use image::RgbaImage;
use pokedesc::{Caption, DescriberError, DescriberResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const THUMBNAIL_MAX_SIDE: u32 = 500;
pub const GENERATING_TEXT: &str = "Generating description...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
}

impl Dialog {
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct SelectedImage {
    pub path: PathBuf,
    /// Preview pixels not yet handed to the renderer.
    thumbnail: Option<RgbaImage>,
}

#[derive(Debug, Default)]
pub struct AppState {
    selected: Option<SelectedImage>,
    description: String,
    previous_description: String,
    dialog: Option<Dialog>,
    pending: bool,
    model_loading: bool,
    worker_gone: bool,
}

/// Decodes an image and shrinks it to fit a `max_side` square, keeping the
/// aspect ratio.
pub fn load_thumbnail(path: &Path, max_side: u32) -> Result<RgbaImage> {
    let img = image::ImageReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .with_guessed_format()?
        .decode()
        .context("Image decoding failed")?;
    if img.width() <= max_side && img.height() <= max_side {
        return Ok(img.to_rgba8());
    }
    Ok(img.thumbnail(max_side, max_side).to_rgba8())
}

impl AppState {
    pub fn selected_path(&self) -> Option<&Path> {
        self.selected.as_ref().map(|s| s.path.as_path())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        self.dialog.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Buttons are disabled while a dialog is open or a caption is running.
    pub fn can_upload(&self) -> bool {
        self.dialog.is_none() && !self.pending
    }

    /// Generate also waits for a startup preload to finish.
    pub fn can_generate(&self) -> bool {
        self.can_upload() && !self.model_loading
    }

    pub fn is_model_loading(&self) -> bool {
        self.model_loading
    }

    pub fn set_model_loading(&mut self, loading: bool) {
        self.model_loading = loading;
    }

    pub fn show_dialog(&mut self, dialog: Dialog) {
        self.dialog = Some(dialog);
    }

    pub fn dismiss_dialog(&mut self) {
        self.dialog = None;
    }

    /// Upload handler. A file that cannot be decoded keeps the previous
    /// selection and raises an error dialog.
    pub fn on_image_chosen(&mut self, path: PathBuf) {
        match load_thumbnail(&path, THUMBNAIL_MAX_SIDE) {
            Ok(thumbnail) => {
                info!("Selected image {}", path.display());
                self.selected = Some(SelectedImage {
                    path,
                    thumbnail: Some(thumbnail),
                });
            }
            Err(e) => {
                warn!("Could not open image {}: {e:#}", path.display());
                self.show_dialog(Dialog::error("Error", format!("Could not open image: {e:#}")));
            }
        }
    }

    /// Preview pixels for a freshly selected image, returned once.
    pub fn take_new_thumbnail(&mut self) -> Option<RgbaImage> {
        self.selected.as_mut().and_then(|s| s.thumbnail.take())
    }

    /// Generate handler. Returns the path to caption, or `None` when there is
    /// nothing to do (no image yet, or a caption already running).
    pub fn request_generate(&mut self) -> Option<PathBuf> {
        if self.pending {
            return None;
        }
        let Some(selected) = &self.selected else {
            self.show_dialog(Dialog::warning("No Image", "Please upload an image first."));
            return None;
        };
        let path = selected.path.clone();
        self.pending = true;
        self.previous_description =
            std::mem::replace(&mut self.description, GENERATING_TEXT.to_string());
        Some(path)
    }

    pub fn on_caption_result(&mut self, result: DescriberResult<Caption>) {
        self.pending = false;
        match result {
            Ok(caption) => {
                self.description = caption.text;
            }
            Err(e) => {
                self.description = std::mem::take(&mut self.previous_description);
                self.on_error(e);
            }
        }
    }

    fn on_error(&mut self, error: DescriberError) {
        let dialog = if error.is_not_found() {
            Dialog::warning("File Not Found", error.to_string())
        } else {
            Dialog::error("Error", format!("Failed to generate description: {error}"))
        };
        self.show_dialog(dialog);
    }

    /// Outcome of a startup preload. Failure is reported as a load problem,
    /// not as a failed Generate.
    pub fn on_model_loaded(&mut self, result: DescriberResult<()>) {
        self.model_loading = false;
        if let Err(error) = result {
            self.show_dialog(Dialog::error("Model Load Failed", error.to_string()));
        }
    }

    /// Records that the worker thread has gone away. Returns `true` only the
    /// first time, so callers report it once.
    pub fn on_worker_disconnected(&mut self) -> bool {
        if self.worker_gone {
            return false;
        }
        self.worker_gone = true;
        self.model_loading = false;
        if self.pending {
            self.on_caption_result(Err(DescriberError::WorkerUnavailable));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn caption(text: &str) -> Caption {
        Caption {
            text: text.to_string(),
            tokens_generated: 3,
            duration_secs: 0.1,
        }
    }

    fn write_png(dir: &Path, w: u32, h: u32) -> PathBuf {
        let path = dir.join("pikachu.png");
        RgbImage::from_pixel(w, h, Rgb([250, 210, 40]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn generate_without_upload_warns_and_requests_nothing() {
        let mut state = AppState::default();
        assert_eq!(state.request_generate(), None);
        assert!(!state.is_pending());

        let dialog = state.dialog().unwrap();
        assert_eq!(dialog.kind, DialogKind::Warning);
        assert_eq!(dialog.title, "No Image");
        assert_eq!(dialog.message, "Please upload an image first.");
        assert!(!state.can_generate());

        state.dismiss_dialog();
        assert!(state.can_generate());
    }

    #[test]
    fn upload_records_path_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 1000, 250);
        let mut state = AppState::default();

        state.on_image_chosen(path.clone());
        assert_eq!(state.selected_path(), Some(path.as_path()));

        let thumb = state.take_new_thumbnail().unwrap();
        assert_eq!(thumb.dimensions(), (500, 125));
        assert!(state.take_new_thumbnail().is_none());
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 40, 30);
        let thumb = load_thumbnail(&path, THUMBNAIL_MAX_SIDE).unwrap();
        assert_eq!(thumb.dimensions(), (40, 30));
    }

    #[test]
    fn bad_upload_shows_error_and_keeps_previous_selection() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_png(dir.path(), 8, 8);
        let bad = dir.path().join("notes.txt");
        std::fs::write(&bad, "hello").unwrap();

        let mut state = AppState::default();
        state.on_image_chosen(good.clone());
        state.on_image_chosen(bad);

        let dialog = state.dialog().unwrap();
        assert_eq!(dialog.kind, DialogKind::Error);
        assert!(dialog.message.starts_with("Could not open image:"));
        assert_eq!(state.selected_path(), Some(good.as_path()));
    }

    #[test]
    fn generate_then_success_updates_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 8);
        let mut state = AppState::default();
        state.on_image_chosen(path.clone());

        assert_eq!(state.request_generate(), Some(path));
        assert!(state.is_pending());
        assert_eq!(state.description(), GENERATING_TEXT);
        assert_eq!(state.request_generate(), None);

        state.on_caption_result(Ok(caption("a yellow electric mouse")));
        assert!(!state.is_pending());
        assert_eq!(state.description(), "a yellow electric mouse");
        assert!(state.dialog().is_none());
    }

    #[test]
    fn missing_file_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 8);
        let mut state = AppState::default();
        state.on_image_chosen(path);
        state.request_generate();

        state.on_caption_result(Err(DescriberError::ImageNotFound(PathBuf::from(
            "missing.png",
        ))));
        let dialog = state.dialog().unwrap();
        assert_eq!(dialog.kind, DialogKind::Warning);
        assert!(dialog.message.contains("Image file not found: missing.png"));
        assert_eq!(state.description(), "");
    }

    #[test]
    fn model_failure_is_an_error_and_app_stays_usable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 8);
        let mut state = AppState::default();
        state.on_image_chosen(path.clone());
        state.request_generate();
        state.on_caption_result(Ok(caption("first")));

        state.request_generate();
        state.on_caption_result(Err(DescriberError::ModelLoad("offline".into())));
        let dialog = state.dialog().unwrap().clone();
        assert_eq!(dialog.kind, DialogKind::Error);
        assert_eq!(
            dialog.message,
            "Failed to generate description: Failed to load model: offline"
        );
        assert_eq!(state.description(), "first");

        state.dismiss_dialog();
        assert_eq!(state.request_generate(), Some(path));
    }

    #[test]
    fn generate_waits_for_preload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 8);
        let mut state = AppState::default();
        state.set_model_loading(true);
        state.on_image_chosen(path.clone());

        assert!(state.can_upload());
        assert!(!state.can_generate());

        state.on_model_loaded(Ok(()));
        assert!(!state.is_model_loading());
        assert!(state.can_generate());
        assert!(state.dialog().is_none());
        assert_eq!(state.request_generate(), Some(path));
    }

    #[test]
    fn failed_preload_is_reported_as_a_load_error() {
        let mut state = AppState::default();
        state.set_model_loading(true);
        state.on_model_loaded(Err(DescriberError::ModelLoad("offline".into())));

        let dialog = state.dialog().unwrap();
        assert_eq!(dialog.kind, DialogKind::Error);
        assert_eq!(dialog.title, "Model Load Failed");
        assert_eq!(dialog.message, "Failed to load model: offline");
        assert!(!dialog.message.contains("generate description"));
        assert!(!state.is_model_loading());
    }

    #[test]
    fn worker_loss_is_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 8, 8);
        let mut state = AppState::default();
        state.on_image_chosen(path);
        state.request_generate();

        assert!(state.on_worker_disconnected());
        assert!(!state.is_pending());
        let dialog = state.dialog().unwrap();
        assert_eq!(
            dialog.message,
            "Failed to generate description: Caption worker is not running"
        );

        state.dismiss_dialog();
        assert!(!state.on_worker_disconnected());
        assert!(!state.on_worker_disconnected());
        assert!(state.dialog().is_none());
    }
}
