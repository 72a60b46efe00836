mod app;
mod state;
mod worker;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use app::{DescriberApp, WINDOW_TITLE};
use pokedesc::prelude::*;
use worker::CaptionWorker;

#[derive(Parser, Debug)]
#[command(
    name = "pokedesc-gui",
    about = "Desktop app that writes a short description of a Pokemon picture"
)]
struct Args {
    /// JSON config file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hugging Face model id
    #[arg(long)]
    model_id: Option<String>,

    /// Hub revision (branch, tag or commit)
    #[arg(long)]
    revision: Option<String>,

    /// Load the checkpoint from a local directory instead of the Hub
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Use CPU even if GPU is available
    #[arg(long)]
    cpu: bool,

    /// Maximum number of tokens to generate
    #[arg(long)]
    max_new_tokens: Option<usize>,

    /// Load the model at startup instead of on the first Generate click
    #[arg(long)]
    preload: bool,
}

impl Args {
    fn caption_config(&self) -> DescriberResult<CaptionConfig> {
        let base = match &self.config {
            Some(path) => CaptionConfig::from_file(path)?,
            None => CaptionConfig::default(),
        };
        base.with_overrides(ConfigOverrides {
            model_id: self.model_id.clone(),
            revision: self.revision.clone(),
            model_dir: self.model_dir.clone(),
            cpu: self.cpu,
            max_new_tokens: self.max_new_tokens,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.caption_config()?;
    let loader = HubLoader::new(config)?;
    info!(
        "Model source: {} on {} ({})",
        loader.describe(),
        loader.config().device,
        loader.config().dtype
    );

    let worker = CaptionWorker::spawn(loader, args.preload)?;
    let app = DescriberApp::new(worker, args.preload);

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([1280., 900.]),
        ..Default::default()
    };

    eframe::run_native(WINDOW_TITLE, options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow::anyhow!("{e}"))
}
