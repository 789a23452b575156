use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::api::{self, AppState, EmbeddingResponse};
use facegate::provider::{self, EmbeddingProvider, PipelineProvider};
use facegate::{config, matcher};
use log::info;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(version, about = "Face embedding and verification service")]
struct Cli {
    /// Config file (defaults to the compiled-in path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long, global = true)]
    host: Option<IpAddr>,

    /// Override the listen port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,
    /// Print the embedding of a local image as JSON
    Embed {
        /// Image file
        image: PathBuf,
    },
    /// Compare the faces in two local images
    Compare { first: PathBuf, second: PathBuf },
    /// Open config file in editor, writing defaults first if missing
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        cfg.host = host;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg),
        Commands::Embed { image } => embed(&cfg, &image),
        Commands::Compare { first, second } => compare(&cfg, &first, &second),
        Commands::Config => open_config(&cfg, cli.config.as_deref()),
    }
}

fn serve(cfg: config::Config) -> Result<()> {
    info!("Starting face embedding service...");
    let provider = provider::load_provider(&cfg).map(|p| Arc::new(p) as Arc<dyn EmbeddingProvider>);
    let state = AppState::new(&cfg, provider);

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(api::start_server(cfg.bind_addr(), state))
}

fn load_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("opening image {}", path.display()))
}

fn embed(cfg: &config::Config, image_path: &Path) -> Result<()> {
    let provider = PipelineProvider::load(cfg)?;
    let img = load_image(image_path)?;
    let embedding = provider.embed(&img, false)?;

    let out = serde_json::to_string(&EmbeddingResponse::success(embedding))?;
    println!("{}", out);
    Ok(())
}

fn compare(cfg: &config::Config, first: &Path, second: &Path) -> Result<()> {
    let provider = PipelineProvider::load(cfg)?;
    let a = provider.embed(&load_image(first)?, false)?;
    let b = provider.embed(&load_image(second)?, false)?;

    let Some(result) = matcher::compare(&a, &b, cfg.embedding_dim, cfg.threshold) else {
        anyhow::bail!(
            "cannot compare: expected non-zero {}-d embeddings, got {} and {} dims",
            cfg.embedding_dim,
            a.len(),
            b.len()
        );
    };

    info!(
        "Similarity: {:.3} (threshold: {:.3})",
        result.confidence, cfg.threshold
    );
    println!(
        "{}",
        serde_json::json!({"match": result.is_match, "confidence": result.confidence})
    );
    Ok(())
}

fn open_config(cfg: &config::Config, path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(cfg, Some(config_path))?;
        info!("Wrote default config to {}", config_path.display());
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
