use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Stable, wire-level error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingFilename,
    UnsupportedFormat,
    EmptyFile,
    FileTooLarge,
    RateLimited,
    ModelNotLoaded,
    TranscriptionFailed,
    Unexpected,
}

impl ErrorKind {
    /// Wire code, e.g. `UNSUPPORTED_FORMAT`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFilename => "MISSING_FILENAME",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::EmptyFile => "EMPTY_FILE",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::RateLimited => "RATE_LIMITED",
            Self::ModelNotLoaded => "MODEL_NOT_LOADED",
            Self::TranscriptionFailed => "TRANSCRIPTION_FAILED",
            Self::Unexpected => "UNEXPECTED",
        }
    }

    /// Human-readable category shown in the `error` field of responses
    pub fn title(&self) -> &'static str {
        match self {
            Self::MissingFilename
            | Self::UnsupportedFormat
            | Self::EmptyFile
            | Self::FileTooLarge => "Validation Error",
            Self::RateLimited => "Rate Limit Error",
            Self::ModelNotLoaded | Self::TranscriptionFailed => "Transcription Error",
            Self::Unexpected => "Internal Error",
        }
    }

    /// Get HTTP status code
    ///
    /// `FILE_TOO_LARGE` reports 413 here; the server may be configured to
    /// answer 400 instead.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingFilename | Self::UnsupportedFormat | Self::EmptyFile => 400,
            Self::FileTooLarge => 413,
            Self::RateLimited => 429,
            Self::ModelNotLoaded | Self::TranscriptionFailed | Self::Unexpected => 500,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingFilename | Self::UnsupportedFormat | Self::EmptyFile | Self::FileTooLarge
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VoiceTranscript error types
#[derive(Debug, thiserror::Error)]
pub enum VoiceTranscriptError {
    /// Upload rejected by input validation
    #[error("{message}")]
    Validation { kind: ErrorKind, message: String },

    /// Client exceeded its request quota
    #[error("{message}")]
    RateLimited { message: String, retry_after: Duration },

    /// No engine was loaded at startup
    #[error("Transcription model not initialized")]
    ModelNotLoaded,

    /// Engine call failed; the detail is for logs only
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Rate limit store error
    #[error("Rate limit store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceTranscriptError {
    /// Create validation error
    pub fn validation<S: Into<String>>(kind: ErrorKind, msg: S) -> Self {
        Self::Validation {
            kind,
            message: msg.into(),
        }
    }

    /// Create rate limited error
    pub fn rate_limited<S: Into<String>>(msg: S, retry_after: Duration) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    /// Create transcription error
    pub fn transcription<S: Into<String>>(msg: S) -> Self {
        Self::Transcription(msg.into())
    }

    /// Create store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify into the closed wire taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { kind, .. } => *kind,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::ModelNotLoaded => ErrorKind::ModelNotLoaded,
            Self::Transcription(_) => ErrorKind::TranscriptionFailed,
            Self::Store(_)
            | Self::Config(_)
            | Self::Network(_)
            | Self::Internal(_)
            | Self::Io(_) => ErrorKind::Unexpected,
        }
    }

    /// Message safe to return to a caller. Never contains paths or engine output.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { message, .. } | Self::RateLimited { message, .. } => message.clone(),
            Self::ModelNotLoaded => "Transcription model not initialized".to_string(),
            Self::Transcription(_) => "Transcription failed".to_string(),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// Retry hint carried by rate limit denials
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_status_codes() {
        assert_eq!(ErrorKind::MissingFilename.status_code(), 400);
        assert_eq!(ErrorKind::UnsupportedFormat.status_code(), 400);
        assert_eq!(ErrorKind::EmptyFile.status_code(), 400);
        assert_eq!(ErrorKind::FileTooLarge.status_code(), 413);
        assert_eq!(ErrorKind::RateLimited.status_code(), 429);
        assert_eq!(ErrorKind::ModelNotLoaded.status_code(), 500);
        assert_eq!(ErrorKind::TranscriptionFailed.status_code(), 500);
        assert_eq!(ErrorKind::Unexpected.status_code(), 500);
    }

    #[test]
    fn test_kind_serializes_as_wire_code() {
        let json = serde_json::to_string(&ErrorKind::FileTooLarge).unwrap();
        assert_eq!(json, "\"FILE_TOO_LARGE\"");
        assert_eq!(ErrorKind::TranscriptionFailed.to_string(), "TRANSCRIPTION_FAILED");
    }

    #[test]
    fn test_error_classification() {
        let err = VoiceTranscriptError::validation(ErrorKind::EmptyFile, "Empty file uploaded");
        assert_eq!(err.kind(), ErrorKind::EmptyFile);
        assert_eq!(err.public_message(), "Empty file uploaded");

        let err = VoiceTranscriptError::transcription("decoder blew up at /tmp/upload-x.wav");
        assert_eq!(err.kind(), ErrorKind::TranscriptionFailed);
        assert!(!err.public_message().contains("/tmp"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/var/secret");
        let err: VoiceTranscriptError = io.into();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(!err.public_message().contains("secret"));
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        let err = VoiceTranscriptError::rate_limited("slow down", Duration::from_secs(12));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(VoiceTranscriptError::ModelNotLoaded.retry_after(), None);
    }
}
