pub mod debug;
pub mod health;
pub mod transcribe;

use actix_web::web;

/// Register every endpoint
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(transcribe::transcribe)
        .service(debug::client_info);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use voicetranscript_common::AppConfig;
    use voicetranscript_stt::TranscriptionEngine;

    use crate::rate_limit::{ManualClock, Quota, RateLimiter};
    use crate::state::AppState;

    /// Start of a 60 s window
    pub const T0: Duration = Duration::from_secs(1_700_000_040);

    pub const BOUNDARY: &str = "voicetranscript-test-boundary";

    pub fn state_with(
        engine: Option<Arc<dyn TranscriptionEngine>>,
        temp_dir: &Path,
    ) -> Arc<AppState> {
        let config = AppConfig {
            temp_dir: temp_dir.to_path_buf(),
            ..AppConfig::default()
        };
        state_from_config(config, engine)
    }

    pub fn state_from_config(
        config: AppConfig,
        engine: Option<Arc<dyn TranscriptionEngine>>,
    ) -> Arc<AppState> {
        let quota = Quota::new(config.rate_limit_requests, config.rate_limit_window());
        let limiter = RateLimiter::new(quota).with_clock(Arc::new(ManualClock::at(T0)));

        Arc::new(AppState::new(config, Arc::new(limiter), engine))
    }

    /// `(content-type, body)` for a single `file` field
    pub fn multipart_file(filename: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
        let mut body = format!("--{BOUNDARY}\r\n").into_bytes();
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }
}
