use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use voicetranscript_common::{Result, VoiceTranscriptError};

use crate::engine::TranscriptionEngine;
use crate::types::TranscriptResult;

/// Runs the engine on a bounded blocking pool and normalizes its output
pub struct TranscriptionInvoker {
    engine: Option<Arc<dyn TranscriptionEngine>>,
    permits: Arc<Semaphore>,
    max_duration_secs: f32,
}

impl TranscriptionInvoker {
    /// `engine` is `None` when no model could be loaded at startup
    pub fn new(
        engine: Option<Arc<dyn TranscriptionEngine>>,
        max_concurrent: usize,
        max_duration_secs: u32,
    ) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_duration_secs: max_duration_secs as f32,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.engine.as_deref().map(|e| e.model_name())
    }

    /// Device the loaded engine runs on
    pub fn device(&self) -> Option<&str> {
        self.engine.as_deref().map(|e| e.device())
    }

    /// Transcribe the audio at `audio_path`.
    ///
    /// The engine keeps running if the caller is dropped; its worker permit is
    /// held until the call returns.
    pub async fn run(&self, audio_path: &Path) -> Result<TranscriptResult> {
        let Some(engine) = self.engine.clone() else {
            return Err(VoiceTranscriptError::ModelNotLoaded);
        };

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| VoiceTranscriptError::internal(format!("Worker pool closed: {}", e)))?;

        let path = audio_path.to_path_buf();
        debug!("Dispatching {} to transcription worker", path.display());

        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.transcribe(&path)
        })
        .await
        .map_err(|e| {
            error!("Transcription worker aborted: {}", e);
            VoiceTranscriptError::transcription(format!("worker aborted: {}", e))
        })?
        .map_err(|e| {
            error!("Engine error: {}", e);
            VoiceTranscriptError::transcription(e.to_string())
        })?;

        let result = TranscriptResult::assemble(output);

        if result.duration_seconds > self.max_duration_secs {
            warn!(
                "Audio duration ({:.1}s) exceeds recommended limit of {:.0}s",
                result.duration_seconds, self.max_duration_secs
            );
        }

        if result.is_no_speech() {
            warn!("Empty transcription result for {}", audio_path.display());
        } else {
            info!(
                "Transcription completed: {} characters, {:.1}s duration, \
                 language: {} (confidence: {:.2})",
                result.text.len(),
                result.duration_seconds,
                result.language_guess.as_deref().unwrap_or("unknown"),
                result.language_confidence.unwrap_or(0.0)
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedEngine;
    use crate::types::NO_SPEECH_DETECTED;
    use std::time::Duration;
    use voicetranscript_common::ErrorKind;

    fn invoker(engine: ScriptedEngine) -> (TranscriptionInvoker, Arc<ScriptedEngine>) {
        let engine = Arc::new(engine);
        let invoker = TranscriptionInvoker::new(Some(engine.clone()), 2, 300);
        (invoker, engine)
    }

    #[tokio::test]
    async fn test_model_not_loaded_skips_engine() {
        let invoker = TranscriptionInvoker::new(None, 2, 300);
        let err = invoker.run(Path::new("/nonexistent.wav")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ModelNotLoaded);
        assert!(!invoker.is_loaded());
        assert_eq!(invoker.device(), None);
    }

    #[tokio::test]
    async fn test_successful_run_assembles_transcript() {
        let (invoker, engine) = invoker(ScriptedEngine::with_segments(&["Hello ", "world."]));
        let result = invoker.run(Path::new("clip.wav")).await.unwrap();

        assert_eq!(result.text, "Hello world.");
        assert_eq!(result.duration_seconds, 2.0);
        assert_eq!(result.language_guess.as_deref(), Some("en"));
        assert_eq!(engine.calls().len(), 1);
        assert_eq!(invoker.model_name(), Some("scripted"));
        assert_eq!(invoker.device(), Some("cpu"));
    }

    #[tokio::test]
    async fn test_silence_returns_sentinel() {
        let (invoker, _) = invoker(ScriptedEngine::silent());
        let result = invoker.run(Path::new("silent.wav")).await.unwrap();
        assert_eq!(result.text, NO_SPEECH_DETECTED);
    }

    #[tokio::test]
    async fn test_engine_error_is_normalized() {
        let (invoker, _) = invoker(ScriptedEngine::failing("CUDA out of memory"));
        let err = invoker.run(Path::new("clip.wav")).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TranscriptionFailed);
        assert_eq!(err.public_message(), "Transcription failed");
    }

    #[tokio::test]
    async fn test_engine_panic_is_normalized() {
        let (invoker, _) = invoker(ScriptedEngine::panicking());
        let err = invoker.run(Path::new("clip.wav")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranscriptionFailed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_is_bounded() {
        let engine = Arc::new(
            ScriptedEngine::with_segments(&["x"]).with_delay(Duration::from_millis(50)),
        );
        let invoker = Arc::new(TranscriptionInvoker::new(Some(engine.clone()), 2, 300));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let invoker = invoker.clone();
            handles.push(tokio::spawn(async move { invoker.run(Path::new("clip.wav")).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.calls().len(), 6);
        assert!(engine.peak_concurrency() <= 2);
    }
}
