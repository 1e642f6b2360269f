use tracing::{info, warn};
use voicetranscript_common::{ErrorKind, Result, VoiceTranscriptError};

/// Accepted upload extensions, sorted
pub const SUPPORTED_FORMATS: [&str; 7] = ["flac", "m4a", "mp3", "mp4", "ogg", "wav", "webm"];

const MIB: f64 = 1024.0 * 1024.0;

/// Outcome of inspecting an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid { kind: ErrorKind, detail: String },
}

impl ValidationResult {
    fn invalid(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Valid => Ok(()),
            Self::Invalid { kind, detail } => Err(VoiceTranscriptError::validation(kind, detail)),
        }
    }
}

/// Lower-cased text after the final `.`, or empty when there is none
pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Format, size and emptiness checks over an already-buffered upload
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_file_size: u64,
}

impl InputValidator {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Checks run in a fixed order and the first failure wins.
    pub fn validate(
        &self,
        filename: &str,
        byte_length: u64,
        declared_content_type: Option<&str>,
    ) -> ValidationResult {
        if filename.is_empty() {
            return ValidationResult::invalid(ErrorKind::MissingFilename, "No filename provided");
        }

        let extension = extension_of(filename);
        if !SUPPORTED_FORMATS.contains(&extension.as_str()) {
            return ValidationResult::invalid(
                ErrorKind::UnsupportedFormat,
                format!(
                    "Unsupported audio format: {}. Supported formats: {}",
                    extension,
                    SUPPORTED_FORMATS.join(", ")
                ),
            );
        }

        if byte_length == 0 {
            return ValidationResult::invalid(ErrorKind::EmptyFile, "Empty file uploaded");
        }

        if byte_length > self.max_file_size {
            return ValidationResult::invalid(
                ErrorKind::FileTooLarge,
                format!(
                    "File size ({:.1}MB) exceeds limit of {:.0}MB",
                    byte_length as f64 / MIB,
                    self.max_file_size as f64 / MIB
                ),
            );
        }

        if let Some(content_type) = declared_content_type {
            if !content_type.starts_with("audio/") && !content_type.starts_with("video/") {
                warn!("Unexpected content type: {}", content_type);
            }
        }

        info!("File validation passed: {} ({} bytes)", filename, byte_length);
        ValidationResult::Valid
    }
}
