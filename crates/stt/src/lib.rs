//! VoiceTranscript STT (Speech-to-Text) layer
//!
//! The engine itself is an opaque capability behind [`TranscriptionEngine`];
//! [`TranscriptionInvoker`] owns everything around the call.

pub mod engine;
pub mod invoker;
pub mod scripted;
pub mod types;
#[cfg(feature = "whisper")]
pub mod whisper;

// Re-export main types
pub use engine::TranscriptionEngine;
pub use invoker::TranscriptionInvoker;
pub use scripted::ScriptedEngine;
pub use types::{EngineOutput, LanguageInfo, Segment, TranscriptResult, NO_SPEECH_DETECTED};
#[cfg(feature = "whisper")]
pub use whisper::{GpuDevice, WhisperEngine, WhisperOptions};
