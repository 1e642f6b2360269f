use serde::Serialize;
use std::collections::BTreeMap;

use crate::identity::IdentitySource;

/// `POST /transcribe` success body
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResponse {
    pub transcript: String,
    pub metadata: TranscriptionMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionMetadata {
    /// Filename as sent by the client
    pub filename: String,

    /// Observed upload size
    pub file_size_bytes: u64,

    pub model_used: String,

    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_confidence: Option<f32>,

    pub duration_seconds: f32,
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` when a model is loaded, otherwise `unhealthy`
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub model: ModelHealth,
    pub limits: LimitsInfo,
    pub rate_limit: RateLimitInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelHealth {
    pub name: String,
    pub device: String,
    pub compute_type: String,
    /// `loaded` or `not_loaded`
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitsInfo {
    pub max_file_size_mb: u64,
    pub max_duration_seconds: u32,
    pub supported_formats: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitInfo {
    pub backend: &'static str,
    pub requests: u32,
    pub window_seconds: u64,
}

/// `GET /debug/client-info` body
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfoResponse {
    pub client_ip: String,
    pub source: IdentitySource,
    pub headers: BTreeMap<String, String>,
    pub method: String,
    pub url: String,
    pub user_agent: Option<String>,
}
