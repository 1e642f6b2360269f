use actix_web::{get, web, HttpResponse};
use std::sync::Arc;

use crate::state::AppState;
use crate::types::{HealthResponse, LimitsInfo, ModelHealth, RateLimitInfo};
use crate::validation::SUPPORTED_FORMATS;

pub const SERVICE_NAME: &str = "voice-transcription-service";
pub const SERVICE_VERSION: &str = "1.0.0";

/// Service, model and limit status
#[get("/health")]
pub async fn health(state: web::Data<Arc<AppState>>) -> actix_web::Result<HttpResponse> {
    let loaded = state.invoker.is_loaded();
    let quota = state.limiter.quota();

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: if loaded { "healthy" } else { "unhealthy" },
        service: SERVICE_NAME,
        version: SERVICE_VERSION,
        model: ModelHealth {
            name: state.config.whisper_model.clone(),
            device: state
                .invoker
                .device()
                .unwrap_or(&state.config.whisper_device)
                .to_string(),
            compute_type: state.config.whisper_compute_type.clone(),
            status: if loaded { "loaded" } else { "not_loaded" },
        },
        limits: LimitsInfo {
            max_file_size_mb: state.config.max_file_size_mb(),
            max_duration_seconds: state.config.max_audio_duration_secs,
            supported_formats: SUPPORTED_FORMATS.to_vec(),
        },
        rate_limit: RateLimitInfo {
            backend: state.limiter.backend().as_str(),
            requests: quota.limit,
            window_seconds: quota.window.as_secs(),
        },
    }))
}
