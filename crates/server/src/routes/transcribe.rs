use actix_multipart::Multipart;
use actix_web::{post, web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use voicetranscript_common::{ErrorKind, Result, VoiceTranscriptError};

use crate::error::ApiError;
use crate::identity::ClientIdentity;
use crate::state::AppState;
use crate::types::{TranscriptionMetadata, TranscriptionResponse};
use crate::validation::extension_of;

/// Multipart field carrying the audio
const FILE_FIELD: &str = "file";

/// A buffered `file` field
struct Upload {
    filename: String,
    content_type: Option<String>,
    /// At most `cap` bytes
    bytes: Vec<u8>,
    /// Full size of the field as received
    observed_len: u64,
}

/// Transcribe one uploaded audio file
#[post("/transcribe")]
pub async fn transcribe(
    req: HttpRequest,
    payload: Multipart,
    state: web::Data<Arc<AppState>>,
) -> std::result::Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let identity = ClientIdentity::from_request(&req);
    info!("[{}] Transcription request from {}", request_id, identity.key());

    match process(&state, &identity, payload, &request_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => Err(state.responses.map(&e, &request_id, identity.key())),
    }
}

async fn process(
    state: &AppState,
    identity: &ClientIdentity,
    payload: Multipart,
    request_id: &str,
) -> Result<TranscriptionResponse> {
    state.limiter.enforce(identity.key()).await?;

    // keep one byte past the limit so oversize uploads are still detectable
    let cap = state.validator.max_file_size().saturating_add(1);
    let upload = read_upload(payload, cap).await?;

    state
        .validator
        .validate(&upload.filename, upload.observed_len, upload.content_type.as_deref())
        .into_result()?;

    let mut artifact = state
        .artifacts
        .materialize(&upload.bytes, &extension_of(&upload.filename))?;
    drop(upload.bytes);

    let outcome = state.invoker.run(artifact.path()).await;
    artifact.release();
    let result = outcome?;

    let model_used = state
        .invoker
        .model_name()
        .unwrap_or(&state.config.whisper_model)
        .to_string();

    info!(
        "[{}] Transcription successful for {} ({} chars)",
        request_id,
        upload.filename,
        result.text.len()
    );

    Ok(TranscriptionResponse {
        transcript: result.text,
        metadata: TranscriptionMetadata {
            filename: upload.filename,
            file_size_bytes: upload.observed_len,
            model_used,
            request_id: request_id.to_string(),
            language: result.language_guess,
            language_confidence: result.language_confidence,
            duration_seconds: result.duration_seconds,
        },
    })
}

fn malformed(e: impl std::fmt::Display) -> VoiceTranscriptError {
    debug!("Malformed multipart body: {}", e);
    VoiceTranscriptError::validation(ErrorKind::MissingFilename, "No file provided")
}

/// Buffer the first `file` field, keeping at most `cap` bytes but counting all
async fn read_upload(mut payload: Multipart, cap: u64) -> Result<Upload> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(malformed)?;

        let disposition = field.content_disposition();
        if disposition.get_name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = disposition.get_filename().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut bytes = Vec::new();
        let mut observed_len: u64 = 0;
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(malformed)?;
            observed_len += chunk.len() as u64;

            let room = cap.saturating_sub(bytes.len() as u64) as usize;
            if room > 0 {
                bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
        }

        return Ok(Upload {
            filename,
            content_type,
            bytes,
            observed_len,
        });
    }

    Err(malformed("no file field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{multipart_file, state_with};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use voicetranscript_stt::{ScriptedEngine, TranscriptionEngine};

    const WAV_BYTES: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

    fn scripted(
        engine: ScriptedEngine,
    ) -> (Arc<ScriptedEngine>, Option<Arc<dyn TranscriptionEngine>>) {
        let engine = Arc::new(engine);
        let handle: Arc<dyn TranscriptionEngine> = engine.clone();
        (engine, Some(handle))
    }

    fn upload_request(filename: &str, content_type: &str, data: &[u8]) -> test::TestRequest {
        let (multipart_type, body) = multipart_file(filename, content_type, data);
        test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((header::CONTENT_TYPE, multipart_type))
            .insert_header(("X-Forwarded-For", "203.0.113.7"))
            .set_payload(body)
    }

    fn dir_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[actix_web::test]
    async fn test_successful_transcription() {
        let scratch = tempfile::tempdir().unwrap();
        let (engine, handle) = scripted(ScriptedEngine::with_segments(&["Hello ", "world."]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = upload_request("test.wav", "audio/wav", WAV_BYTES).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["transcript"], "Hello world.");
        assert_eq!(body["metadata"]["filename"], "test.wav");
        assert_eq!(body["metadata"]["file_size_bytes"], WAV_BYTES.len() as u64);
        assert_eq!(body["metadata"]["model_used"], "scripted");
        assert_eq!(body["metadata"]["language"], "en");
        assert!(body["metadata"]["request_id"].as_str().is_some_and(|id| !id.is_empty()));

        // the engine saw a real file, which is gone afterwards
        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].file_existed);
        assert!(calls[0].path.extension().is_some_and(|ext| ext == "wav"));
        assert!(!calls[0].path.exists());
        assert!(dir_is_empty(scratch.path()));
    }

    #[actix_web::test]
    async fn test_empty_file_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let (engine, handle) = scripted(ScriptedEngine::with_segments(&["x"]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = upload_request("empty.wav", "audio/wav", b"").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "EMPTY_FILE");
        assert_eq!(body["error"], "Validation Error");
        assert_eq!(body["message"], "Empty file uploaded");
        assert!(engine.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_unsupported_format_never_materializes() {
        let scratch = tempfile::tempdir().unwrap();
        let (engine, handle) = scripted(ScriptedEngine::with_segments(&["x"]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = upload_request("test.txt", "text/plain", b"hello").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "UNSUPPORTED_FORMAT");
        assert!(body["message"].as_str().unwrap().contains("txt"));
        assert!(engine.calls().is_empty());
        assert!(dir_is_empty(scratch.path()));
    }

    #[actix_web::test]
    async fn test_oversize_upload_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let (engine, handle) = scripted(ScriptedEngine::with_segments(&["x"]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        let data = vec![0u8; 10 * 1024 * 1024 + 1];
        let req = upload_request("big.wav", "audio/wav", &data).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "FILE_TOO_LARGE");
        assert_eq!(body["message"], "File size (10.0MB) exceeds limit of 10MB");
        assert!(engine.calls().is_empty());
        assert!(dir_is_empty(scratch.path()));
    }

    #[actix_web::test]
    async fn test_missing_file_field() {
        let scratch = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(None, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/transcribe")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{}")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "MISSING_FILENAME");
    }

    #[actix_web::test]
    async fn test_sixth_rapid_upload_is_rate_limited() {
        let scratch = tempfile::tempdir().unwrap();
        let (engine, handle) = scripted(ScriptedEngine::with_segments(&["ok"]));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        for _ in 0..5 {
            let req = upload_request("clip.mp3", "audio/mpeg", b"ID3data").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let req = upload_request("clip.mp3", "audio/mpeg", b"ID3data").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get(header::RETRY_AFTER).unwrap(), "60");

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "RATE_LIMITED");
        assert_eq!(
            body["message"],
            "Rate limit exceeded: 5 requests per 60s. Retry after 60s"
        );
        assert_eq!(engine.calls().len(), 5);
    }

    #[actix_web::test]
    async fn test_model_not_loaded() {
        let scratch = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(None, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = upload_request("clip.wav", "audio/wav", WAV_BYTES).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "MODEL_NOT_LOADED");
        assert!(dir_is_empty(scratch.path()));
    }

    #[actix_web::test]
    async fn test_engine_failure_is_generic_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let (engine, handle) =
            scripted(ScriptedEngine::failing("decoder crashed on /tmp/secret.wav"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = upload_request("clip.wav", "audio/wav", WAV_BYTES).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "TRANSCRIPTION_FAILED");
        assert_eq!(body["message"], "Transcription failed");
        assert!(!calls_path_exists(&engine));
        assert!(dir_is_empty(scratch.path()));
    }

    #[actix_web::test]
    async fn test_silence_returns_sentinel() {
        let scratch = tempfile::tempdir().unwrap();
        let (_, handle) = scripted(ScriptedEngine::silent());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(handle, scratch.path())))
                .service(transcribe),
        )
        .await;

        let req = upload_request("quiet.ogg", "audio/ogg", b"OggS").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["transcript"], "[No speech detected]");
    }

    fn calls_path_exists(engine: &ScriptedEngine) -> bool {
        engine.calls().iter().any(|call| call.path.exists())
    }
}
