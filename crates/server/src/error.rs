use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};
use voicetranscript_common::{ErrorKind, VoiceTranscriptError};

use crate::rate_limit::retry_after_secs;

/// Wire body for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: String,
}

/// A failure already mapped to its HTTP shape
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: StatusCode,
    pub retry_after_secs: Option<u64>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status);
        if let Some(secs) = self.retry_after_secs {
            builder.insert_header((header::RETRY_AFTER, secs.to_string()));
        }

        builder.json(ErrorBody {
            error: self.kind.title(),
            kind: self.kind,
            message: self.message.clone(),
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}

/// Maps domain errors to [`ApiError`], logging the internal detail
#[derive(Debug, Clone, Copy)]
pub struct ResponseMapper {
    file_too_large_status: StatusCode,
}

impl ResponseMapper {
    /// `file_too_large_status` must be 400 or 413; anything else means 413
    pub fn new(file_too_large_status: u16) -> Self {
        let status = match file_too_large_status {
            400 => StatusCode::BAD_REQUEST,
            _ => StatusCode::PAYLOAD_TOO_LARGE,
        };
        Self {
            file_too_large_status: status,
        }
    }

    pub fn status_for(&self, kind: ErrorKind) -> StatusCode {
        if kind == ErrorKind::FileTooLarge {
            return self.file_too_large_status;
        }
        StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn map(&self, err: &VoiceTranscriptError, request_id: &str, client: &str) -> ApiError {
        let kind = err.kind();

        if kind.is_validation() || kind == ErrorKind::RateLimited {
            warn!("[{}] Request from {} rejected: {} ({})", request_id, client, kind, err);
        } else {
            error!("[{}] Request from {} failed: {} ({})", request_id, client, kind, err);
        }

        ApiError {
            kind,
            message: err.public_message(),
            status: self.status_for(kind),
            retry_after_secs: err.retry_after().map(retry_after_secs),
        }
    }
}

impl Default for ResponseMapper {
    fn default() -> Self {
        Self::new(413)
    }
}
