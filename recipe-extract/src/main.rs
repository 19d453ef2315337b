//! recipe-extract - Video Recipe Extraction microservice
//!
//! **Module Identity:**
//! - Name: recipe-extract
//! - Default bind address: 127.0.0.1:5750
//!
//! Turns cooking videos into structured recipes: download, transcribe,
//! read on-screen text and synthesize recipes with a language model.
//! Exposes job operations over HTTP REST + SSE.

use anyhow::{Context, Result};
use clap::Parser;
use recipe_common::config::{load_toml_config, RootFolderInitializer, RootFolderResolver};
use recipe_common::events::EventBus;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recipe_extract::config::{ExtractConfig, TomlSettings};
use recipe_extract::services::{
    ExtractionService, FfmpegTranscoder, InferenceClient, TesseractOcr, YtDlpSource,
};
use recipe_extract::types::Capabilities;
use recipe_extract::AppState;

const MODULE_NAME: &str = "recipe-extract";
const DEFAULT_LOG_FILTER: &str = "recipe_extract=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "recipe-extract", version, about = "Video recipe extraction service")]
struct Args {
    /// Root folder holding the database, config file and job directories
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "RECIPE_BIND_ADDR", default_value = "127.0.0.1:5750")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Resolve root folder and read module TOML
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let settings_path = initializer.module_config_path(MODULE_NAME);
    let toml_settings: TomlSettings = load_toml_config(&settings_path)?;

    // Step 2: Initialize tracing (RUST_LOG → TOML logging.level → default)
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directive = toml_settings.logging.level.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
            EnvFilter::try_new(directive).context("Invalid log filter")?
        }
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting recipe-extract (Video Recipe Extraction) microservice");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    info!("Root folder: {}", initializer.root_folder().display());
    info!("Settings file: {}", settings_path.display());

    // Step 3: Resolve service configuration
    let config = ExtractConfig::resolve(&toml_settings)?;

    // Step 4: Open or create database
    let db_path = initializer.database_path();
    if initializer.database_exists() {
        info!("Opening existing database: {}", db_path.display());
    } else {
        info!("Creating new database: {}", db_path.display());
    }
    let db_pool = recipe_extract::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let jobs_root = initializer.jobs_path();
    tokio::fs::create_dir_all(&jobs_root)
        .await
        .with_context(|| format!("Failed to create jobs directory {}", jobs_root.display()))?;

    // Step 5: Wire capabilities
    let inference = Arc::new(InferenceClient::new(
        config.inference_base_url.clone(),
        config.inference_api_key.clone(),
        config.transcription_model.clone(),
    )?);
    let capabilities = Capabilities {
        video_source: Arc::new(YtDlpSource::new(config.ytdlp_path.clone(), config.max_video_height)),
        transcoder: Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        ocr: Arc::new(TesseractOcr::new(config.tesseract_path.clone(), config.ocr_languages.clone())),
        speech_to_text: inference.clone(),
        chat: inference,
    };

    let event_bus = EventBus::new(100);
    let service = ExtractionService::new(db_pool.clone(), event_bus.clone(), config, capabilities, jobs_root);

    // Step 6: Fail jobs orphaned by a previous run
    let recovered = service.recover_interrupted_jobs().await?;
    if recovered > 0 {
        info!(recovered, "Recovered interrupted jobs");
    }

    let state = AppState::new(db_pool, event_bus, service);
    let app = recipe_extract::build_router(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!("Listening on http://{}", args.bind);
    info!("Health check: http://{}/health", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("recipe-extract stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
