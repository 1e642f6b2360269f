use actix_web::HttpRequest;
use serde::Serialize;

/// Key used when nothing identifies the caller
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Where a client key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    ForwardedFor,
    RealIp,
    Peer,
    Unknown,
}

/// Per-caller key used to bucket rate limit counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    key: String,
    source: IdentitySource,
}

impl ClientIdentity {
    /// Resolve a client key, first match wins:
    /// first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
    pub fn resolve(forwarded_for: Option<&str>, real_ip: Option<&str>, peer: Option<&str>) -> Self {
        if let Some(first_hop) = forwarded_for
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
        {
            return Self::new(first_hop, IdentitySource::ForwardedFor);
        }

        if let Some(real_ip) = real_ip.filter(|ip| !ip.trim().is_empty()) {
            return Self::new(real_ip, IdentitySource::RealIp);
        }

        if let Some(peer) = peer.filter(|p| !p.is_empty()) {
            return Self::new(peer, IdentitySource::Peer);
        }

        Self::new(UNKNOWN_CLIENT, IdentitySource::Unknown)
    }

    /// Resolve from an incoming request. Non-UTF-8 header values are ignored.
    pub fn from_request(req: &HttpRequest) -> Self {
        let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
        let peer = req.peer_addr().map(|addr| addr.ip().to_string());

        let identity = Self::resolve(
            header("x-forwarded-for"),
            header("x-real-ip"),
            peer.as_deref(),
        );
        tracing::debug!(
            "Client identity {} resolved from {:?}",
            identity.key,
            identity.source
        );
        identity
    }

    fn new(key: &str, source: IdentitySource) -> Self {
        Self {
            key: key.to_string(),
            source,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }
}
