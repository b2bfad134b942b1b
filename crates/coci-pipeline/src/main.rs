//! `coci`: process Calls for Papers from the command line.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coci_common::CociConfig;
use coci_pipeline::{cache_key, CfpPipeline, ResultCache};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coci", version, about = "Conference organising committee identifier")]
struct Cli {
    /// Configuration file (defaults to $COCI_CONFIG, then ./coci.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and link a Call for Papers, reusing a cached result when present
    Process {
        /// UTF-8 text file holding the Call for Papers
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Ignore the cache and process the text again
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Re-apply refinement and topic linking to a persisted record
    Refine {
        #[arg(value_name = "JSON")]
        record: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coci=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CociConfig::load_from(path),
        None => CociConfig::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not load configuration ({e}), using defaults");
            CociConfig::default()
        }
    };

    let cache = ResultCache::new(config.output.destination_folder.clone());
    let pipeline = CfpPipeline::from_config(config)
        .await
        .context("Failed to initialise the pipeline")?;

    let record = match cli.command {
        Command::Process { input, force } => {
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let key = cache_key(&text);

            match cache.load(&key).await? {
                Some(json) if !force => {
                    info!(key = %key, "Using cached result");
                    pipeline.resolve_cached(&json).await?
                }
                _ => {
                    let record = pipeline.process_call_for_papers(&text).await?;
                    let path = cache.store(&key, &record).await?;
                    info!(path = %path.display(), "Result saved");
                    record
                }
            }
        }
        Command::Refine { record } => {
            let json = tokio::fs::read_to_string(&record)
                .await
                .with_context(|| format!("Failed to read {}", record.display()))?;
            pipeline.resolve_cached(&json).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
