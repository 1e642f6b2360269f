//! Fixed-window per-client rate limiting
//!
//! Counters live in a shared primary store when one is configured and
//! reachable, otherwise in process memory.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{window_key, RedisStore};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use voicetranscript_common::{AppConfig, RateLimitFailureMode, Result, VoiceTranscriptError};

/// Counter backend for fixed windows
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Create-or-increment the counter for `(key, window_id)` and return it
    async fn increment(&self, key: &str, window_id: u64, ttl: Duration) -> Result<u64>;

    /// Liveness check
    async fn ping(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Time source, as a duration since the Unix epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
    }
}

/// Clock that only moves when told to
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub fn at(now: Duration) -> Self {
        Self {
            millis: AtomicU64::new(now.as_millis() as u64),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Requests allowed per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl Quota {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    fn window_millis(&self) -> u64 {
        (self.window.as_millis() as u64).max(1)
    }
}

/// Which store answered a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Primary,
    Fallback,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Always set when `allowed` is false
    pub retry_after: Option<Duration>,
    /// Store the limiter consulted. A primary failure under the `open` or
    /// `closed` failure mode still reports `Primary`: the request was
    /// decided by the mode and counted nowhere.
    pub backend: Backend,
}

impl RateLimitDecision {
    fn allow(backend: Backend) -> Self {
        Self {
            allowed: true,
            retry_after: None,
            backend,
        }
    }

    fn deny(retry_after: Duration, backend: Backend) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
            backend,
        }
    }
}

/// Whole seconds for a `Retry-After` header: rounded up, at least 1
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let millis = retry_after.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

pub struct RateLimiter {
    quota: Quota,
    primary: Option<Arc<dyn RateLimitStore>>,
    fallback: MemoryStore,
    degraded: AtomicBool,
    failure_mode: RateLimitFailureMode,
    store_timeout: Duration,
    clock: Arc<dyn Clock>,
    last_sweep: AtomicU64,
}

impl RateLimiter {
    /// In-memory limiter with no primary store
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            primary: None,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
            failure_mode: RateLimitFailureMode::Fallback,
            store_timeout: Duration::from_secs(2),
            clock: Arc::new(SystemClock),
            last_sweep: AtomicU64::new(0),
        }
    }

    pub fn with_primary(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.primary = Some(store);
        self
    }

    pub fn with_failure_mode(mut self, mode: RateLimitFailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound on every primary store round trip, probes included
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Build from configuration and probe the primary store once
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let quota = Quota::new(config.rate_limit_requests, config.rate_limit_window());
        let mut limiter = Self::new(quota)
            .with_failure_mode(config.rate_limit_failure_mode)
            .with_store_timeout(config.rate_limit_probe_timeout());

        if let Some(url) = &config.rate_limit_store_url {
            limiter = limiter.with_primary(Arc::new(RedisStore::new(url)?));
            limiter.probe().await;
        } else {
            info!("No rate limit store configured, using in-memory counters");
        }

        Ok(limiter)
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Backend that the next check will try first
    pub fn backend(&self) -> Backend {
        match &self.primary {
            Some(_) if !self.degraded.load(Ordering::SeqCst) => Backend::Primary,
            _ => Backend::Fallback,
        }
    }

    /// Ping the primary store. Success clears the degraded flag and failure
    /// sets it. Returns whether the primary is usable.
    pub async fn probe(&self) -> bool {
        let Some(primary) = &self.primary else {
            return false;
        };

        let outcome = match tokio::time::timeout(self.store_timeout, primary.ping()).await {
            Ok(result) => result,
            Err(_) => Err(VoiceTranscriptError::store("probe timed out")),
        };

        match outcome {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!("Rate limit store {} reachable again, leaving fallback", primary.name());
                } else {
                    info!("Rate limit store {} connected", primary.name());
                }
                true
            }
            Err(e) => {
                self.degraded.store(true, Ordering::SeqCst);
                warn!(
                    "Rate limit store {} unavailable ({}), using in-memory fallback",
                    primary.name(),
                    e
                );
                false
            }
        }
    }

    /// Periodically re-probe while degraded. The task ends when the limiter
    /// is dropped.
    pub fn spawn_reprobe(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        self.primary.as_ref()?;

        let limiter: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                if limiter.degraded.load(Ordering::SeqCst) {
                    debug!("Re-probing rate limit store");
                    limiter.probe().await;
                }
            }
        }))
    }

    /// Count one request for `client_key`. Store failures are absorbed
    /// according to the failure mode.
    pub async fn check(&self, client_key: &str) -> RateLimitDecision {
        let now_ms = self.clock.now().as_millis() as u64;
        let window_ms = self.quota.window_millis();
        let window_id = now_ms / window_ms;
        let remaining = Duration::from_millis(window_ms - now_ms % window_ms);

        let (count, backend) = match self.active_primary() {
            Some(primary) => match self.increment_primary(primary, client_key, window_id).await {
                Ok(count) => (count, Backend::Primary),
                Err(e) => match self.failure_mode {
                    RateLimitFailureMode::Fallback => {
                        self.degraded.store(true, Ordering::SeqCst);
                        warn!("Rate limit store failed ({}), degrading to in-memory fallback", e);
                        (self.hit_fallback(client_key, window_id), Backend::Fallback)
                    }
                    // uncounted; see `RateLimitDecision::backend`
                    RateLimitFailureMode::Open => {
                        warn!("Rate limit store failed ({}), allowing request", e);
                        return RateLimitDecision::allow(Backend::Primary);
                    }
                    RateLimitFailureMode::Closed => {
                        error!("Rate limit store failed ({}), denying request", e);
                        return RateLimitDecision::deny(remaining, Backend::Primary);
                    }
                },
            },
            None => (self.hit_fallback(client_key, window_id), Backend::Fallback),
        };

        if count <= u64::from(self.quota.limit) {
            RateLimitDecision::allow(backend)
        } else {
            RateLimitDecision::deny(remaining, backend)
        }
    }

    /// Like [`check`](Self::check) but turns a denial into a `RATE_LIMITED` error
    pub async fn enforce(&self, client_key: &str) -> Result<RateLimitDecision> {
        let decision = self.check(client_key).await;
        if decision.allowed {
            return Ok(decision);
        }

        let retry_after = decision.retry_after.unwrap_or(self.quota.window);
        warn!("Rate limit exceeded for {}", client_key);
        Err(VoiceTranscriptError::rate_limited(
            format!(
                "Rate limit exceeded: {} requests per {}s. Retry after {}s",
                self.quota.limit,
                self.quota.window.as_secs(),
                retry_after_secs(retry_after)
            ),
            retry_after,
        ))
    }

    fn active_primary(&self) -> Option<&Arc<dyn RateLimitStore>> {
        self.primary
            .as_ref()
            .filter(|_| !self.degraded.load(Ordering::SeqCst))
    }

    async fn increment_primary(
        &self,
        primary: &Arc<dyn RateLimitStore>,
        client_key: &str,
        window_id: u64,
    ) -> Result<u64> {
        match tokio::time::timeout(
            self.store_timeout,
            primary.increment(client_key, window_id, self.quota.window),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(VoiceTranscriptError::store("increment timed out")),
        }
    }

    fn hit_fallback(&self, client_key: &str, window_id: u64) -> u64 {
        if self.last_sweep.swap(window_id, Ordering::SeqCst) < window_id {
            self.fallback.sweep(window_id);
        }
        self.fallback.hit(client_key, window_id)
    }
}
