use crate::error::VoiceTranscriptError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// What the rate limiter does when the shared store fails mid-request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitFailureMode {
    /// Switch to the in-process store and count the request there
    Fallback,
    /// Let the request through uncounted
    Open,
    /// Reject the request until the window rolls over
    Closed,
}

impl FromStr for RateLimitFailureMode {
    type Err = VoiceTranscriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallback" => Ok(Self::Fallback),
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(VoiceTranscriptError::config(format!(
                "Unknown rate limit failure mode '{}' (expected fallback, open or closed)",
                other
            ))),
        }
    }
}

/// VoiceTranscript application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Whisper model name (tiny, base, small, ...)
    pub whisper_model: String,

    /// Explicit model file; resolved through the model manager when unset
    pub whisper_model_path: Option<PathBuf>,

    /// Compute device reported by the health endpoint
    pub whisper_device: String,

    /// Compute type reported by the health endpoint
    pub whisper_compute_type: String,

    /// Language hint passed to the engine
    pub whisper_language: Option<String>,

    /// Directory holding downloaded ggml models
    pub models_dir: PathBuf,

    /// Upload size ceiling in bytes
    pub max_file_size_bytes: u64,

    /// Advisory audio duration limit in seconds
    pub max_audio_duration_secs: u32,

    /// Status used for FILE_TOO_LARGE (400 or 413)
    pub file_too_large_status: u16,

    /// Requests allowed per client per window
    pub rate_limit_requests: u32,

    /// Rate limit window length in seconds
    pub rate_limit_window_secs: u64,

    /// Shared store connection string, e.g. redis://127.0.0.1:6379
    pub rate_limit_store_url: Option<String>,

    /// Startup connectivity probe timeout
    pub rate_limit_probe_timeout_ms: u64,

    /// Re-probe interval for a degraded limiter; unset keeps it degraded
    pub rate_limit_reprobe_secs: Option<u64>,

    /// Behaviour when the shared store fails after startup
    pub rate_limit_failure_mode: RateLimitFailureMode,

    /// Size of the transcription worker pool
    pub max_concurrent_transcriptions: usize,

    /// Directory for per-request upload artifacts
    pub temp_dir: PathBuf,

    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            whisper_model: "tiny".to_string(),
            whisper_model_path: None,
            whisper_device: "cpu".to_string(),
            whisper_compute_type: "int8".to_string(),
            whisper_language: None,
            models_dir: crate::ModelManager::default_models_dir(),
            max_file_size_bytes: 10 * MIB,
            max_audio_duration_secs: 300,
            file_too_large_status: 413,
            rate_limit_requests: 5,
            rate_limit_window_secs: 60,
            rate_limit_store_url: None,
            rate_limit_probe_timeout_ms: 2000,
            rate_limit_reprobe_secs: None,
            rate_limit_failure_mode: RateLimitFailureMode::Fallback,
            max_concurrent_transcriptions: 2,
            temp_dir: std::env::temp_dir(),
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            log_dir: PathBuf::from("./log"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, VoiceTranscriptError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Self::default();

        let rate_limit_failure_mode = match Self::get_env_string("RATE_LIMIT_FAILURE_MODE") {
            Some(mode) => mode.parse()?,
            None => defaults.rate_limit_failure_mode,
        };

        let config = Self {
            whisper_model: std::env::var("WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            whisper_model_path: Self::get_env_path("WHISPER_MODEL_PATH"),
            whisper_device: std::env::var("WHISPER_DEVICE").unwrap_or(defaults.whisper_device),
            whisper_compute_type: std::env::var("WHISPER_COMPUTE_TYPE")
                .unwrap_or(defaults.whisper_compute_type),
            whisper_language: Self::get_env_string("WHISPER_LANGUAGE"),
            models_dir: Self::get_env_path("MODELS_DIR").unwrap_or(defaults.models_dir),
            max_file_size_bytes: Self::get_env_parsed("MAX_FILE_SIZE_BYTES")
                .unwrap_or(defaults.max_file_size_bytes),
            max_audio_duration_secs: Self::get_env_parsed("MAX_AUDIO_DURATION_SECS")
                .unwrap_or(defaults.max_audio_duration_secs),
            file_too_large_status: Self::get_env_parsed("FILE_TOO_LARGE_STATUS")
                .unwrap_or(defaults.file_too_large_status),
            rate_limit_requests: Self::get_env_parsed("RATE_LIMIT_REQUESTS")
                .unwrap_or(defaults.rate_limit_requests),
            rate_limit_window_secs: Self::get_env_parsed("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(defaults.rate_limit_window_secs),
            rate_limit_store_url: Self::get_env_string("RATE_LIMIT_STORE_URL"),
            rate_limit_probe_timeout_ms: Self::get_env_parsed("RATE_LIMIT_PROBE_TIMEOUT_MS")
                .unwrap_or(defaults.rate_limit_probe_timeout_ms),
            rate_limit_reprobe_secs: Self::get_env_parsed("RATE_LIMIT_REPROBE_SECS"),
            rate_limit_failure_mode,
            max_concurrent_transcriptions: Self::get_env_parsed("MAX_CONCURRENT_TRANSCRIPTIONS")
                .unwrap_or(defaults.max_concurrent_transcriptions),
            temp_dir: Self::get_env_path("TEMP_DIR").unwrap_or(defaults.temp_dir),
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: Self::get_env_parsed("SERVER_PORT").unwrap_or(defaults.server_port),
            log_dir: Self::get_env_path("LOG_DIR").unwrap_or(defaults.log_dir),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;

        // Ensure required directories exist
        config.ensure_directories()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        Self::get_env_string(key).map(PathBuf::from)
    }

    /// Non-empty string from environment variable
    fn get_env_string(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_env_parsed<T: FromStr>(key: &str) -> Option<T> {
        Self::get_env_string(key).and_then(|s| s.parse().ok())
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), VoiceTranscriptError> {
        for dir in [&self.temp_dir, &self.log_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    VoiceTranscriptError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Upload ceiling in whole MB, as reported by /health
    pub fn max_file_size_mb(&self) -> u64 {
        self.max_file_size_bytes / MIB
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn rate_limit_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.rate_limit_probe_timeout_ms)
    }

    pub fn rate_limit_reprobe_interval(&self) -> Option<Duration> {
        self.rate_limit_reprobe_secs.map(Duration::from_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), VoiceTranscriptError> {
        if self.whisper_model.is_empty() {
            return Err(VoiceTranscriptError::config("Whisper model name cannot be empty"));
        }

        if self.max_file_size_bytes == 0 {
            return Err(VoiceTranscriptError::config("File size limit must be greater than 0"));
        }

        if !matches!(self.file_too_large_status, 400 | 413) {
            return Err(VoiceTranscriptError::config(format!(
                "FILE_TOO_LARGE_STATUS must be 400 or 413, got {}",
                self.file_too_large_status
            )));
        }

        if self.rate_limit_requests == 0 || self.rate_limit_window_secs == 0 {
            return Err(VoiceTranscriptError::config(
                "Rate limit quota and window must be greater than 0",
            ));
        }

        if let Some(url) = &self.rate_limit_store_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(VoiceTranscriptError::config(
                    "Rate limit store URL must start with redis:// or rediss://",
                ));
            }
        }

        if self.rate_limit_reprobe_secs == Some(0) {
            return Err(VoiceTranscriptError::config("Re-probe interval cannot be 0"));
        }

        if self.max_concurrent_transcriptions == 0 {
            return Err(VoiceTranscriptError::config(
                "At least one transcription worker is required",
            ));
        }

        // Validate port range
        if self.server_port == 0 {
            return Err(VoiceTranscriptError::config("Server port cannot be 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 8000);
        assert_eq!(config.whisper_model, "tiny");
        assert_eq!(config.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.max_file_size_mb(), 10);
        assert_eq!(config.rate_limit_requests, 5);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit_reprobe_interval(), None);
    }

    #[test]
    fn test_server_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.server_bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid_config = AppConfig::default();
        invalid_config.whisper_model = String::new();
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.file_too_large_status = 422;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.rate_limit_window_secs = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = AppConfig::default();
        invalid_config.rate_limit_store_url = Some("http://cache:6379".to_string());
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_failure_mode_parsing() {
        let parse = |s: &str| s.parse::<RateLimitFailureMode>();
        assert_eq!(parse("fallback").unwrap(), RateLimitFailureMode::Fallback);
        assert_eq!(parse(" OPEN ").unwrap(), RateLimitFailureMode::Open);
        assert_eq!(parse("closed").unwrap(), RateLimitFailureMode::Closed);
        assert!(parse("sometimes").is_err());
    }

    #[test]
    fn test_ensure_directories() {
        let scratch = tempfile::tempdir().unwrap();
        let config = AppConfig {
            temp_dir: scratch.path().join("uploads"),
            log_dir: scratch.path().join("log"),
            ..AppConfig::default()
        };

        config.ensure_directories().unwrap();
        assert!(config.temp_dir.is_dir());
        assert!(config.log_dir.is_dir());
    }
}
