use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use voicetranscript_common::{Result, VoiceTranscriptError};

use super::RateLimitStore;

/// Shared counters in Redis
///
/// Each window is a key `ratelimit:<client>:<window>` bumped with `INCR` and
/// given a TTL of one window with `EXPIRE`, both in a single MULTI/EXEC.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Parse the URL. No connection is opened until first use.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            VoiceTranscriptError::config(format!("Invalid rate limit store URL: {}", e))
        })?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        debug!("Opening rate limit store connection");
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| VoiceTranscriptError::store(e.to_string()))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection so the next call reconnects
    async fn reset(&self) {
        *self.connection.lock().await = None;
    }
}

/// Storage key for one client window
pub fn window_key(key: &str, window_id: u64) -> String {
    format!("ratelimit:{}:{}", key, window_id)
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn increment(&self, key: &str, window_id: u64, ttl: Duration) -> Result<u64> {
        let mut conn = self.connection().await?;
        let redis_key = window_key(key, window_id);

        let result: redis::RedisResult<(u64,)> = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(&redis_key)
            .cmd("EXPIRE")
            .arg(&redis_key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await;

        match result {
            Ok((count,)) => Ok(count),
            Err(e) => {
                warn!("Rate limit store increment failed: {}", e);
                self.reset().await;
                Err(VoiceTranscriptError::store(e.to_string()))
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;

        match pong {
            Ok(_) => Ok(()),
            Err(e) => {
                self.reset().await;
                Err(VoiceTranscriptError::store(e.to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
