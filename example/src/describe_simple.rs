//! Simple Describe Example
//!
//! Captions one image from the command line with the Pokemon describer.
//!
//! ```bash
//! cargo run --bin describe_simple -- data/images/pikachu.png
//! cargo run --bin describe_simple -- --cpu --model-id RidzIn/Pokemon-Describer pikachu.png
//! ```

use clap::Parser;
use pokedesc::common::config::DEFAULT_MODEL_ID;
use pokedesc::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "describe_simple", about = "Describe a Pokemon image")]
struct Args {
    /// Image to describe
    image: PathBuf,

    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    model_id: String,

    #[arg(long)]
    revision: Option<String>,

    /// Local checkpoint directory; takes precedence over --model-id
    #[arg(long)]
    model_dir: Option<PathBuf>,

    #[arg(long)]
    cpu: bool,

    #[arg(long)]
    max_new_tokens: Option<usize>,
}

fn recognize_and_print(client: &mut CaptionClient, image: &Path) -> DescriberResult<()> {
    println!("Describing image: {}", image.display());
    let caption = client.describe(image)?;
    println!("{}", caption.text);
    println!(
        "\n[{} tokens in {:.2}s]",
        caption.tokens_generated, caption.duration_secs
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = CaptionConfig::default().with_overrides(ConfigOverrides {
        model_id: Some(args.model_id),
        revision: args.revision,
        model_dir: args.model_dir,
        cpu: args.cpu,
        max_new_tokens: args.max_new_tokens,
    })?;

    let mut client = CaptionClient::from_config(config)?;
    recognize_and_print(&mut client, &args.image)?;

    Ok(())
}
