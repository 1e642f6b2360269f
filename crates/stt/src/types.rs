use serde::{Deserialize, Serialize};

/// Transcript text returned when the engine ran but produced no text
pub const NO_SPEECH_DETECTED: &str = "[No speech detected]";

/// Single transcription segment with timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f32,

    /// End time in seconds
    pub end: f32,

    /// Transcribed text, exactly as emitted by the engine
    pub text: String,
}

impl Segment {
    /// Create a new segment
    pub fn new(start: f32, end: f32, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Language detection info reported alongside the segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Detected language (ISO code)
    pub language: Option<String>,

    /// Detection probability
    pub probability: Option<f32>,
}

/// Raw engine output: ordered segments plus language info
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub segments: Vec<Segment>,
    pub info: LanguageInfo,
}

impl EngineOutput {
    pub fn new(segments: Vec<Segment>, info: LanguageInfo) -> Self {
        Self { segments, info }
    }
}

/// Complete transcription result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptResult {
    /// Trimmed transcript, or [`NO_SPEECH_DETECTED`]
    pub text: String,

    pub language_guess: Option<String>,

    /// Always within [0, 1]
    pub language_confidence: Option<f32>,

    /// Largest segment end time
    pub duration_seconds: f32,
}

impl TranscriptResult {
    /// Assemble engine output into a transcript.
    ///
    /// Segment texts are joined in emission order with no separator and the
    /// result is trimmed.
    pub fn assemble(output: EngineOutput) -> Self {
        let mut text = String::new();
        let mut duration_seconds: f32 = 0.0;

        for segment in &output.segments {
            text.push_str(&segment.text);
            duration_seconds = duration_seconds.max(segment.end);
        }

        let trimmed = text.trim();
        let text = if trimmed.is_empty() {
            NO_SPEECH_DETECTED.to_string()
        } else {
            trimmed.to_string()
        };

        Self {
            text,
            language_guess: output.info.language,
            language_confidence: output
                .info
                .probability
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 1.0)),
            duration_seconds,
        }
    }

    /// True when the engine ran but found nothing to transcribe
    pub fn is_no_speech(&self) -> bool {
        self.text == NO_SPEECH_DETECTED
    }
}
