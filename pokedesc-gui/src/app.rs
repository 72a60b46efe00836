use eframe::egui::{self, Align2, CentralPanel, Color32, RichText};
use std::time::Duration;
use tracing::{error, info};

use crate::state::{AppState, DialogKind};
use crate::worker::{CaptionWorker, WorkerEvent, WorkerPoll};

pub const WINDOW_TITLE: &str = "Pokemon Description Generator";

const DESCRIPTION_WRAP_WIDTH: f32 = 800.;
const SPACING: f32 = 10.;

pub struct DescriberApp {
    state: AppState,
    worker: CaptionWorker,
    texture_handle: Option<egui::TextureHandle>,
    model_status: &'static str,
}

impl DescriberApp {
    pub fn new(worker: CaptionWorker, preloading: bool) -> Self {
        let mut state = AppState::default();
        state.set_model_loading(preloading);
        Self {
            state,
            worker,
            texture_handle: None,
            model_status: if preloading {
                "Loading model..."
            } else {
                "Model loads on first use"
            },
        }
    }

    fn upload_image(&mut self) {
        let picked = rfd::FileDialog::new()
            .set_title("Upload Image")
            .add_filter("Image files", &["png", "jpg", "jpeg"])
            .pick_file();
        if let Some(path) = picked {
            self.state.on_image_chosen(path);
        }
    }

    fn handle_generate(&mut self) {
        let Some(path) = self.state.request_generate() else {
            return;
        };
        info!("Generating description for {}", path.display());
        if let Err(e) = self.worker.submit(path) {
            self.state.on_caption_result(Err(e));
        }
    }

    fn poll_worker(&mut self) {
        match self.worker.try_poll() {
            WorkerPoll::Event(WorkerEvent::ModelReady) => {
                self.model_status = "Model ready";
                self.state.on_model_loaded(Ok(()));
            }
            WorkerPoll::Event(WorkerEvent::ModelFailed(e)) => {
                self.model_status = "Model failed to load";
                self.state.on_model_loaded(Err(e));
            }
            WorkerPoll::Event(WorkerEvent::Caption(result)) => {
                if result.is_ok() {
                    self.model_status = "Model ready";
                }
                self.state.on_caption_result(result);
            }
            WorkerPoll::Empty(_) => {}
            WorkerPoll::Disconnected => {
                if self.state.on_worker_disconnected() {
                    error!("Caption worker channel disconnected");
                    self.model_status = "Caption worker stopped";
                }
            }
        }
    }

    fn refresh_preview(&mut self, ctx: &egui::Context) {
        let Some(thumbnail) = self.state.take_new_thumbnail() else {
            return;
        };
        let size = [thumbnail.width() as usize, thumbnail.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, thumbnail.as_raw());

        if let Some(texture_handle) = self.texture_handle.as_mut() {
            texture_handle.set(color_image, egui::TextureOptions::default());
        } else {
            self.texture_handle =
                Some(ctx.load_texture("preview", color_image, egui::TextureOptions::default()));
        }
    }

    fn show_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.state.dialog() else {
            return;
        };
        let (icon, color) = match dialog.kind {
            DialogKind::Warning => ("⚠", Color32::from_rgb(230, 160, 0)),
            DialogKind::Error => ("⛔", Color32::from_rgb(210, 40, 40)),
        };

        let mut dismissed = false;
        egui::Window::new(dialog.title.clone())
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0., 0.])
            .show(ctx, |ui| {
                ui.set_max_width(DESCRIPTION_WRAP_WIDTH / 2.);
                ui.horizontal(|ui| {
                    ui.label(RichText::new(icon).color(color).size(24.));
                    ui.label(&dialog.message);
                });
                ui.add_space(SPACING);
                ui.vertical_centered(|ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });

        if dismissed {
            self.state.dismiss_dialog();
        }
    }
}

impl eframe::App for DescriberApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker();
        self.refresh_preview(ctx);

        CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(SPACING);
                if ui
                    .add_enabled(self.state.can_upload(), egui::Button::new("Upload Image"))
                    .clicked()
                {
                    self.upload_image();
                }

                ui.add_space(SPACING);
                if ui
                    .add_enabled(
                        self.state.can_generate(),
                        egui::Button::new("Generate Description"),
                    )
                    .clicked()
                {
                    self.handle_generate();
                }

                ui.add_space(SPACING);
                if let Some(texture_handle) = &self.texture_handle {
                    let sized_texture = egui::load::SizedTexture::new(
                        texture_handle.id(),
                        texture_handle.size_vec2(),
                    );
                    ui.image(sized_texture);
                }
                if let Some(name) = self.state.selected_path().and_then(|p| p.file_name()) {
                    ui.label(RichText::new(name.to_string_lossy()).weak());
                }

                ui.add_space(SPACING);
                ui.scope(|ui| {
                    ui.set_max_width(DESCRIPTION_WRAP_WIDTH);
                    ui.label(RichText::new(self.state.description()).size(18.));
                });

                ui.add_space(SPACING);
                ui.label(
                    RichText::new(format!(
                        "{} · worker {}",
                        self.model_status,
                        self.worker.state().as_str()
                    ))
                    .small()
                    .weak(),
                );
            });
        });

        self.show_dialog(ctx);

        if self.state.is_pending() || self.state.is_model_loading() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
