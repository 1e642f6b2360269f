//! Deterministic engine that replays a fixed script.
//!
//! Used by tests and local smoke runs where loading a real model is not
//! wanted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use voicetranscript_common::{Result, VoiceTranscriptError};

use crate::engine::TranscriptionEngine;
use crate::types::{EngineOutput, LanguageInfo, Segment};

#[derive(Debug, Clone)]
enum Script {
    Output(EngineOutput),
    Fail(String),
    Panic,
}

/// What the engine observed on one call
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedCall {
    pub path: PathBuf,
    pub file_existed: bool,
}

pub struct ScriptedEngine {
    script: Script,
    delay: Option<Duration>,
    model_name: String,
    calls: Mutex<Vec<ObservedCall>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedEngine {
    fn from_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            model_name: "scripted".to_string(),
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// One-second segments with the given texts, detected as English
    pub fn with_segments(texts: &[&str]) -> Self {
        let segments = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Segment::new(i as f32, (i + 1) as f32, *text))
            .collect();
        let info = LanguageInfo {
            language: Some("en".to_string()),
            probability: Some(0.95),
        };
        Self::returning(EngineOutput::new(segments, info))
    }

    pub fn returning(output: EngineOutput) -> Self {
        Self::from_script(Script::Output(output))
    }

    /// Runs successfully but emits no segments
    pub fn silent() -> Self {
        Self::returning(EngineOutput::default())
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::from_script(Script::Fail(message.into()))
    }

    pub fn panicking() -> Self {
        Self::from_script(Script::Panic)
    }

    /// Sleep for `delay` inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn calls(&self) -> Vec<ObservedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls that were running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl TranscriptionEngine for ScriptedEngine {
    fn transcribe(&self, audio_path: &Path) -> Result<EngineOutput> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ObservedCall {
                path: audio_path.to_path_buf(),
                file_existed: audio_path.exists(),
            });
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.script {
            Script::Output(output) => Ok(output.clone()),
            Script::Fail(message) => Err(VoiceTranscriptError::internal(message.clone())),
            Script::Panic => panic!("scripted engine panic"),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> &str {
        "cpu"
    }
}
