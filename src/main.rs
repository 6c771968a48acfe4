mod api;
mod caption;
mod config;
mod error;
mod oauth;
mod posted;
mod publish;
mod selector;
mod session;

use anyhow::Context;
use api::XClient;
use caption::OllamaCaptioner;
use clap::Parser;
use config::Config;
use posted::PostedSetStore;
use session::{ItemOutcome, SessionReport, SessionSettings, UploadSession};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autopost-x")]
#[command(about = "Caption local images with a vision model and post the ones not yet posted to X")]
struct Cli {
    /// Config file (default: ~/.config/autopost-x/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to pick images from (overrides upload.image_dir)
    #[arg(short, long)]
    image_dir: Option<PathBuf>,

    /// Number of images to post this run (overrides upload.batch_size)
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
    PathBuf::from(home)
        .join(".config")
        .join("autopost-x")
        .join("config.toml")
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\
             Create it with your X OAuth credentials.\n\
             Example:\n\n\
             [x]\n\
             api_key = \"your-api-key\"\n\
             api_key_secret = \"your-api-key-secret\"\n\
             access_token = \"your-access-token\"\n\
             access_token_secret = \"your-access-token-secret\"\n\n\
             [upload]\n\
             image_dir = \"/path/to/images\"\n\n\
             Get credentials at https://developer.x.com/",
            path.display()
        )
    })?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    config.apply_env_overrides(|var| std::env::var(var).ok());

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config at {}: {e}", path.display()))?;

    tracing::info!("Config loaded and validated from {}", path.display());
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path)?;
    if let Some(dir) = cli.image_dir {
        config.upload.image_dir = dir;
    }
    if let Some(count) = cli.count {
        if count == 0 {
            anyhow::bail!("--count must be at least 1");
        }
        config.upload.batch_size = count;
    }

    let upload = &config.upload;
    let store = PostedSetStore::new(upload.record_path());
    let settings = SessionSettings {
        image_dir: upload.image_dir.clone(),
        batch_size: upload.batch_size,
        delay_secs: upload.min_delay_secs..=upload.max_delay_secs,
    };

    let captioner = OllamaCaptioner::new(&config.caption).context("Failed to set up captioner")?;
    let publisher = XClient::new(config.x.clone()).context("Failed to set up X client")?;

    tracing::info!(
        "Starting upload session for {} (record file {})",
        settings.image_dir.display(),
        store.path().display()
    );
    let mut session = UploadSession::new(captioner, publisher, store, settings, rand::thread_rng());
    match session.run().await? {
        SessionReport::NothingToDo => tracing::info!("Nothing to do"),
        SessionReport::Completed { outcomes } => {
            for outcome in &outcomes {
                match outcome {
                    ItemOutcome::Published { id, url, recorded } => {
                        if !recorded {
                            tracing::warn!(
                                "{id} was posted ({url}) but not recorded; it may be posted again"
                            );
                        }
                    }
                    ItemOutcome::Skipped { id, reason } => {
                        tracing::warn!("{id} was skipped and stays eligible: {reason}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        let code = e
            .downcast_ref::<error::Error>()
            .map_or(1, error::Error::exit_code);
        std::process::exit(code);
    }
}
