use std::path::Path;

use voicetranscript_common::Result;

use crate::types::EngineOutput;

/// Speech-recognition capability.
///
/// Implementations are blocking and CPU-bound; callers dispatch them off the
/// async workers.
pub trait TranscriptionEngine: Send + Sync {
    /// Recognize speech in the audio file at `audio_path`
    fn transcribe(&self, audio_path: &Path) -> Result<EngineOutput>;

    /// Model identifier reported in responses
    fn model_name(&self) -> &str;

    /// Compute device the model runs on
    fn device(&self) -> &str;
}
