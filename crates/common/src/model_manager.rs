//! Model Manager for automatic model downloading
//!
//! Resolves Whisper model names to ggml files and fetches missing ones from
//! the whisper.cpp model repository.

use crate::{Result, VoiceTranscriptError};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Whisper model information
#[derive(Debug, Clone)]
pub struct WhisperModel {
    /// Model name (e.g., "tiny", "base", "small")
    pub name: String,

    /// Approximate file size in bytes
    pub size: u64,

    /// SHA256 hash for verification
    pub sha256: Option<String>,

    /// Download URL
    pub url: String,
}

impl WhisperModel {
    fn new(name: &str, size_mb: u64) -> Self {
        Self {
            name: name.to_string(),
            size: size_mb * 1024 * 1024,
            sha256: None,
            url: format!("{}/ggml-{}.bin", MODEL_BASE_URL, name),
        }
    }

    /// Get model filename
    pub fn filename(&self) -> String {
        format!("ggml-{}.bin", self.name)
    }

    /// Get size in MB
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }
}

/// Available Whisper models
pub fn available_whisper_models() -> Vec<WhisperModel> {
    vec![
        WhisperModel::new("tiny", 75),
        WhisperModel::new("tiny.en", 75),
        WhisperModel::new("base", 142),
        WhisperModel::new("base.en", 142),
        WhisperModel::new("small", 466),
        WhisperModel::new("medium", 1500),
        WhisperModel::new("large-v3", 3100),
    ]
}

/// Model Manager
pub struct ModelManager {
    models_dir: PathBuf,
    client: Client,
}

impl ModelManager {
    /// Create new model manager
    pub fn new(models_dir: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3600)) // 1 hour for large downloads
            .build()
            .map_err(|e| {
                VoiceTranscriptError::network(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { models_dir, client })
    }

    /// Get default models directory
    pub fn default_models_dir() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(".cache/voicetranscript/models");
            }
        }

        #[cfg(target_os = "macos")]
        {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join("Library/Caches/voicetranscript/models");
            }
        }

        #[cfg(target_os = "windows")]
        {
            if let Some(local_app_data) = std::env::var_os("LOCALAPPDATA") {
                return PathBuf::from(local_app_data).join("voicetranscript\\models");
            }
        }

        // Fallback
        PathBuf::from("models")
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Path a model would be stored at, whether or not it exists
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{}.bin", model_name))
    }

    /// Ensure Whisper model exists, download if missing
    pub async fn ensure_whisper_model(&self, model_name: &str) -> Result<PathBuf> {
        let model_path = self.model_path(model_name);

        if model_path.exists() {
            info!("Model already exists: {}", model_path.display());
            return Ok(model_path);
        }

        info!("Model not found, downloading: {}", model_name);

        let models = available_whisper_models();
        let model_info = models
            .iter()
            .find(|m| m.name == model_name)
            .ok_or_else(|| VoiceTranscriptError::config(format!("Unknown model: {}", model_name)))?;

        self.download_model(model_info, &model_path).await?;

        Ok(model_path)
    }

    /// Download model from URL
    pub async fn download_model(&self, model: &WhisperModel, dest: &Path) -> Result<()> {
        info!(
            "Downloading {} ({:.1} MB) from {}",
            model.filename(),
            model.size_mb(),
            model.url
        );

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let pb = ProgressBar::new(model.size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .map_err(|e| {
                    VoiceTranscriptError::internal(format!("Invalid progress template: {}", e))
                })?
                .progress_chars("#>-"),
        );

        let response = self
            .client
            .get(&model.url)
            .send()
            .await
            .map_err(|e| VoiceTranscriptError::network(format!("Failed to download: {}", e)))?;

        if !response.status().is_success() {
            return Err(VoiceTranscriptError::network(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        // Write to temporary file first
        let temp_path = dest.with_extension("tmp");
        write_stream(response.bytes_stream(), &temp_path, |downloaded| {
            pb.set_position(downloaded)
        })
        .await?;
        pb.finish_with_message("Download complete");

        let metadata = fs::metadata(&temp_path).await?;
        if metadata.len() < model.size / 2 {
            fs::remove_file(&temp_path).await?;
            return Err(VoiceTranscriptError::network(format!(
                "Downloaded file is too small ({} bytes, expected ~{} bytes)",
                metadata.len(),
                model.size
            )));
        }

        if !self.verify_model(&temp_path, model.sha256.as_deref()).await? {
            fs::remove_file(&temp_path).await?;
            return Err(VoiceTranscriptError::network(format!(
                "Checksum mismatch for {}",
                model.filename()
            )));
        }

        fs::rename(&temp_path, dest).await?;

        info!("Download successful: {}", dest.display());

        Ok(())
    }

    /// Verify model integrity
    pub async fn verify_model(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        // If no hash provided, just check file exists
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        info!("Verifying model: {}", path.display());

        let data = fs::read(path).await?;
        let mut hasher = Sha256::new();
        hasher.update(&data);
        let hash = format!("{:x}", hasher.finalize());

        if hash != expected {
            warn!("Model hash mismatch for {}: {}", path.display(), hash);
        }

        Ok(hash == expected)
    }

    /// List installed models
    pub async fn list_installed_models(&self) -> Result<Vec<String>> {
        if !self.models_dir.exists() {
            return Ok(Vec::new());
        }

        let mut models = Vec::new();
        let mut entries = fs::read_dir(&self.models_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("bin") {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some(model) = name.strip_prefix("ggml-") {
                        models.push(model.to_string());
                    }
                }
            }
        }

        models.sort();
        Ok(models)
    }
}

/// Stream chunks into `path`, reporting the running byte count.
///
/// A partially written file is removed when the stream or a write fails.
async fn write_stream<S, B, E>(stream: S, path: &Path, mut progress: impl FnMut(u64)) -> Result<u64>
where
    S: futures::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    use futures::StreamExt;

    async fn copy<S, B, E>(stream: S, path: &Path, progress: &mut impl FnMut(u64)) -> Result<u64>
    where
        S: futures::Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut file = fs::File::create(path).await?;
        let mut written: u64 = 0;
        futures::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| VoiceTranscriptError::network(format!("Download error: {}", e)))?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
            progress(written);
        }

        file.sync_all().await?;
        Ok(written)
    }

    let outcome = copy(stream, path, &mut progress).await;
    if outcome.is_err() {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial download {}: {}", path.display(), e);
            }
        }
    }
    outcome
}
