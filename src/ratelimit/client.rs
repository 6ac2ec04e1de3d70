//! Client key resolution.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Header set by reverse proxies carrying the original client address.
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// The identity a rate limit bucket is keyed by.
///
/// Resolved from the first address in `X-Forwarded-For`, then from the
/// transport peer address. When neither is available the key is empty and
/// every such client shares one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ClientKey(String);

impl ClientKey {
    /// Use `key` as-is.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Resolve the key for a request from its headers and peer address.
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(forwarded) = forwarded_client(headers) {
            return Self(forwarded.to_string());
        }

        match peer {
            Some(addr) => Self(addr.ip().to_string()),
            None => Self::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if no client address could be determined.
    pub fn is_unidentified(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The left-most address of the first `X-Forwarded-For` header.
fn forwarded_client(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
}
