use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use voicetranscript_common::{available_whisper_models, logger, AppConfig, ModelManager};
use voicetranscript_stt::TranscriptionEngine;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "voicetranscript")]
#[command(about = "VoiceTranscript - rate-limited speech-to-text HTTP service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides SERVER_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides SERVER_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Download a Whisper model into MODELS_DIR
    DownloadModel {
        /// Model name; defaults to WHISPER_MODEL
        name: Option<String>,
    },

    /// List known models and whether they are installed
    ListModels,
}

#[cfg(feature = "whisper")]
async fn load_engine(config: &AppConfig) -> Option<Arc<dyn TranscriptionEngine>> {
    use voicetranscript_stt::{WhisperEngine, WhisperOptions};

    let model_path = match &config.whisper_model_path {
        Some(path) => path.clone(),
        None => {
            let manager = match ModelManager::new(config.models_dir.clone()) {
                Ok(manager) => manager,
                Err(e) => {
                    tracing::error!("Failed to create model manager: {}", e);
                    return None;
                }
            };
            match manager.ensure_whisper_model(&config.whisper_model).await {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(
                        "Failed to fetch Whisper model '{}': {}",
                        config.whisper_model,
                        e
                    );
                    return None;
                }
            }
        }
    };

    let options = WhisperOptions {
        language: config.whisper_language.clone(),
        ..WhisperOptions::default()
    };
    let model_name = config.whisper_model.clone();

    let loaded =
        tokio::task::spawn_blocking(move || WhisperEngine::new(model_path, model_name, options))
            .await;
    match loaded {
        Ok(Ok(engine)) => {
            tracing::info!(
                "Whisper model '{}' loaded on {}",
                config.whisper_model,
                engine.device()
            );
            Some(Arc::new(engine))
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to load Whisper model: {}", e);
            None
        }
        Err(e) => {
            tracing::error!("Model loading task failed: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "whisper"))]
async fn load_engine(_config: &AppConfig) -> Option<Arc<dyn TranscriptionEngine>> {
    tracing::warn!("Built without the `whisper` feature, transcription is disabled");
    None
}

async fn serve(config: AppConfig) -> Result<()> {
    logger::setup_logging(&config.log_dir, &config.log_level)?;

    tracing::info!("VoiceTranscript starting...");
    tracing::info!("Configuration loaded:");
    tracing::info!("  Bind: {}", config.server_bind_address());
    tracing::info!(
        "  Model: {} ({}, {})",
        config.whisper_model,
        config.whisper_device,
        config.whisper_compute_type
    );
    tracing::info!("  Max upload: {}MB", config.max_file_size_mb());
    tracing::info!("  Temp dir: {}", config.temp_dir.display());

    let engine = load_engine(&config).await;
    if engine.is_none() {
        tracing::warn!(
            "Starting without a transcription model; /transcribe will fail until restart"
        );
    }

    println!("Server listening on http://{}", config.server_bind_address());

    voicetranscript_server::start_server(config, engine).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv_from_project_root();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = &host {
                std::env::set_var("SERVER_HOST", host);
            }
            if let Some(port) = port {
                std::env::set_var("SERVER_PORT", port.to_string());
            }

            serve(AppConfig::from_env()?).await?;
        }
        Some(Commands::DownloadModel { name }) => {
            let config = AppConfig::from_env()?;
            logger::setup_console_logging(&config.log_level)?;

            let name = name.unwrap_or_else(|| config.whisper_model.clone());
            let manager = ModelManager::new(config.models_dir.clone())?;
            let path = manager.ensure_whisper_model(&name).await?;
            println!("Model '{}' ready at {}", name, path.display());
        }
        Some(Commands::ListModels) => {
            let config = AppConfig::from_env()?;
            logger::setup_console_logging(&config.log_level)?;

            let manager = ModelManager::new(config.models_dir.clone())?;
            let installed = manager.list_installed_models().await?;

            println!("Models directory: {}", manager.models_dir().display());
            for model in available_whisper_models() {
                let marker = if installed.contains(&model.name) { "*" } else { " " };
                println!("{} {:<10} {:>7.0} MB", marker, model.name, model.size_mb());
            }
        }
        None => {
            serve(AppConfig::from_env()?).await?;
        }
    }

    Ok(())
}
