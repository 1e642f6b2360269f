use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info, warn};
use voicetranscript_common::{Result, VoiceTranscriptError};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::engine::TranscriptionEngine;
use crate::types::{EngineOutput, LanguageInfo, Segment};

const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// GPU 디바이스 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuDevice {
    /// CUDA (NVIDIA GPU)
    Cuda,
    /// Metal (Apple GPU)
    Metal,
    /// CPU만 사용
    Cpu,
}

impl GpuDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Metal => "metal",
            Self::Cpu => "cpu",
        }
    }
}

/// Decoding options passed to whisper.cpp
#[derive(Debug, Clone)]
pub struct WhisperOptions {
    /// Language hint (e.g., "en"); auto-detect when unset
    pub language: Option<String>,

    /// Temperature for sampling (0.0 = greedy)
    pub temperature: f32,

    /// Beam width
    pub beam_size: i32,

    /// No speech threshold
    pub no_speech_threshold: f32,
}

impl Default for WhisperOptions {
    fn default() -> Self {
        Self {
            language: None,
            temperature: 0.0,
            beam_size: 5,
            no_speech_threshold: 0.6,
        }
    }
}

/// Whisper STT Engine
pub struct WhisperEngine {
    ctx: Arc<WhisperContext>,
    model_name: String,
    gpu_device: GpuDevice,
    options: WhisperOptions,
}

impl WhisperEngine {
    /// 사용 가능한 GPU 디바이스 감지 (우선순위: CUDA > Metal > CPU)
    ///
    /// CUDA/Metal 지원 여부는 feature flags 로 제어합니다.
    fn detect_gpu_device() -> GpuDevice {
        if cfg!(feature = "cuda") {
            GpuDevice::Cuda
        } else if cfg!(feature = "metal") {
            GpuDevice::Metal
        } else {
            GpuDevice::Cpu
        }
    }

    /// Load a ggml model from `model_path`
    pub fn new(
        model_path: impl AsRef<Path>,
        model_name: impl Into<String>,
        options: WhisperOptions,
    ) -> Result<Self> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(VoiceTranscriptError::config(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let path_str = path.to_str().ok_or_else(|| {
            VoiceTranscriptError::config(format!(
                "Model path is not valid UTF-8: {}",
                path.display()
            ))
        })?;

        let gpu_device = Self::detect_gpu_device();
        info!("Loading Whisper model from {} on {:?}", path.display(), gpu_device);

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| {
                VoiceTranscriptError::config(format!("Failed to load Whisper model: {}", e))
            })?;

        info!("Whisper model loaded successfully");

        Ok(Self {
            ctx: Arc::new(ctx),
            model_name: model_name.into(),
            gpu_device,
            options,
        })
    }

    /// Get GPU device being used
    pub fn gpu_device(&self) -> GpuDevice {
        self.gpu_device
    }

    /// Load audio as 16kHz mono f32 samples
    fn load_audio(&self, path: &Path) -> Result<Vec<f32>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if ext == "wav" {
            match load_wav(path) {
                Ok(samples) => return Ok(samples),
                Err(e) => warn!("Direct WAV load failed ({}), converting with FFmpeg", e),
            }
        }

        self.convert_and_load_audio(path)
    }

    /// Convert audio file to 16kHz mono WAV using FFmpeg and load it
    fn convert_and_load_audio(&self, path: &Path) -> Result<Vec<f32>> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let converted = tempfile::Builder::new()
            .prefix("converted-")
            .suffix(".wav")
            .tempfile_in(dir)?
            .into_temp_path();

        let ffmpeg_cmd = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
        debug!("Converting {} -> {}", path.display(), converted.display());

        let output = Command::new(&ffmpeg_cmd)
            .arg("-i")
            .arg(path)
            .args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le", "-y"])
            .arg(&*converted)
            .output()
            .map_err(|e| {
                VoiceTranscriptError::transcription(format!(
                    "Failed to run FFmpeg: {}. Make sure FFmpeg is installed.",
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceTranscriptError::transcription(format!(
                "FFmpeg conversion failed: {}",
                stderr
            )));
        }

        // `converted` is removed when it goes out of scope
        load_wav(&converted)
    }
}

impl TranscriptionEngine for WhisperEngine {
    fn transcribe(&self, audio_path: &Path) -> Result<EngineOutput> {
        info!("Transcribing audio file: {}", audio_path.display());

        let audio_data = self.load_audio(audio_path)?;

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: self.options.beam_size,
            patience: -1.0,
        });

        match &self.options.language {
            Some(lang) => params.set_language(Some(lang.as_str())),
            None => params.set_language(Some("auto")),
        }
        params.set_temperature(self.options.temperature);
        params.set_no_speech_thold(self.options.no_speech_threshold);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(inference_error("Failed to create Whisper state"))?;

        state
            .full(params, &audio_data)
            .map_err(inference_error("Inference failed"))?;

        let num_segments = state
            .full_n_segments()
            .map_err(inference_error("Failed to get segment count"))?;

        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);
        for i in 0..num_segments {
            let text = state
                .full_get_segment_text(i)
                .map_err(inference_error("Failed to get segment text"))?;
            let t0 = state
                .full_get_segment_t0(i)
                .map_err(inference_error("Failed to get segment start"))?;
            let t1 = state
                .full_get_segment_t1(i)
                .map_err(inference_error("Failed to get segment end"))?;

            // whisper.cpp timestamps are centiseconds
            segments.push(Segment::new(t0 as f32 / 100.0, t1 as f32 / 100.0, text));
        }

        debug!("Whisper produced {} segments", segments.len());

        let detected = match self.options.language {
            Some(_) => None,
            None => state.full_lang_id_from_state().ok(),
        };
        let language = resolve_language(self.options.language.as_deref(), detected);
        info!("Detected language: {}", language.as_deref().unwrap_or("unknown"));

        let info = LanguageInfo {
            language,
            probability: None,
        };

        Ok(EngineOutput::new(segments, info))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> &str {
        self.gpu_device.as_str()
    }
}

fn inference_error<E: std::fmt::Display>(
    context: &'static str,
) -> impl FnOnce(E) -> VoiceTranscriptError {
    move |e| VoiceTranscriptError::transcription(format!("{}: {}", context, e))
}

/// The configured hint wins; otherwise the id whisper.cpp detected
fn resolve_language(hint: Option<&str>, detected_id: Option<i32>) -> Option<String> {
    match hint {
        Some(lang) => Some(lang.to_string()),
        None => detected_id
            .and_then(whisper_rs::get_lang_str)
            .map(str::to_string),
    }
}

/// Read a canonical 44-byte-header PCM16 WAV file as mono f32 samples
fn load_wav(path: &Path) -> Result<Vec<f32>> {
    let mut reader = std::io::BufReader::new(std::fs::File::open(path)?);

    let mut header = [0u8; 44];
    reader
        .read_exact(&mut header)
        .map_err(inference_error("Failed to read WAV header"))?;

    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Err(VoiceTranscriptError::transcription("Invalid WAV file format"));
    }

    let num_channels = u16::from_le_bytes([header[22], header[23]]);
    let sample_rate = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);
    let bits_per_sample = u16::from_le_bytes([header[34], header[35]]);

    if bits_per_sample != 16 || sample_rate != WHISPER_SAMPLE_RATE || num_channels == 0 {
        return Err(VoiceTranscriptError::transcription(format!(
            "Unsupported WAV layout: {}Hz, {} channels, {} bits",
            sample_rate, num_channels, bits_per_sample
        )));
    }

    let mut pcm_data = Vec::new();
    reader.read_to_end(&mut pcm_data)?;

    let samples: Vec<f32> = pcm_data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();

    let channels = num_channels as usize;
    if channels == 1 {
        return Ok(samples);
    }

    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_with_missing_model() {
        let result = WhisperEngine::new("nonexistent_model.bin", "tiny", WhisperOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_language_hint_or_detected_id() {
        assert_eq!(resolve_language(Some("ko"), Some(0)).as_deref(), Some("ko"));
        // id 0 is English in whisper.cpp's language table
        assert_eq!(resolve_language(None, Some(0)).as_deref(), Some("en"));
        assert_eq!(resolve_language(None, None), None);
    }

    #[test]
    fn test_load_wav_rejects_non_riff() {
        let scratch = tempfile::tempdir().unwrap();
        let path = scratch.path().join("bogus.wav");
        std::fs::write(&path, [0u8; 64]).unwrap();
        assert!(load_wav(&path).is_err());
    }
}
