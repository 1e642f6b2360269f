use std::sync::Arc;

use voicetranscript_common::AppConfig;
use voicetranscript_stt::{TranscriptionEngine, TranscriptionInvoker};

use crate::artifact::ArtifactStore;
use crate::error::ResponseMapper;
use crate::rate_limit::RateLimiter;
use crate::validation::InputValidator;

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Per-client request quota
    pub limiter: Arc<RateLimiter>,

    pub validator: InputValidator,

    /// Temporary upload files
    pub artifacts: ArtifactStore,

    /// Engine handle and worker pool
    pub invoker: TranscriptionInvoker,

    pub responses: ResponseMapper,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: AppConfig,
        limiter: Arc<RateLimiter>,
        engine: Option<Arc<dyn TranscriptionEngine>>,
    ) -> Self {
        let invoker = TranscriptionInvoker::new(
            engine,
            config.max_concurrent_transcriptions,
            config.max_audio_duration_secs,
        );

        Self {
            validator: InputValidator::new(config.max_file_size_bytes),
            artifacts: ArtifactStore::new(&config.temp_dir),
            responses: ResponseMapper::new(config.file_too_large_status),
            limiter,
            invoker,
            config,
        }
    }
}
