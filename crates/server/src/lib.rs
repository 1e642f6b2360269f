//! VoiceTranscript HTTP server
//!
//! Actix-web 기반 REST API: `/health`, `/transcribe`, `/debug/client-info`

pub mod artifact;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod types;
pub mod validation;

use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use voicetranscript_common::{AppConfig, Result};
use voicetranscript_stt::TranscriptionEngine;

pub use artifact::{Artifact, ArtifactStore};
pub use error::{ApiError, ResponseMapper};
pub use identity::{ClientIdentity, IdentitySource};
pub use rate_limit::{Backend, Quota, RateLimitDecision, RateLimitStore, RateLimiter};
pub use state::AppState;
pub use validation::{InputValidator, ValidationResult, SUPPORTED_FORMATS};

/// Start the HTTP server and run until shutdown
///
/// `engine` is `None` when no model could be loaded; the server still starts
/// and `/transcribe` answers `MODEL_NOT_LOADED`.
pub async fn start_server(
    config: AppConfig,
    engine: Option<Arc<dyn TranscriptionEngine>>,
) -> Result<()> {
    let limiter = Arc::new(RateLimiter::from_config(&config).await?);
    let reprobe = config
        .rate_limit_reprobe_interval()
        .and_then(|interval| limiter.spawn_reprobe(interval));

    let bind_addr = config.server_bind_address();
    info!(
        "Rate limit: {} requests per {}s on {} backend",
        config.rate_limit_requests,
        config.rate_limit_window_secs,
        limiter.backend().as_str()
    );

    let state = Arc::new(AppState::new(config, limiter, engine));

    info!("Starting server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    if let Some(handle) = reprobe {
        handle.abort();
    }

    info!("Server stopped");
    Ok(())
}
