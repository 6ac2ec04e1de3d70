//! HTTP surface for admission checks.
//!
//! Exposes `/v1/check` for callers that want a decision over HTTP and
//! [`rate_limit_middleware`] for guarding any axum router. Both derive the
//! client key from `X-Forwarded-For` or the peer address and answer a
//! rejected request with `429 Too Many Requests`:
//!
//! ```json
//! {"success": false, "error": {"code": "TOO_MANY_REQUESTS", "message": "Rate limit exceeded"}}
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, ConnectInfo, Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::ratelimit::{ClientKey, Decision, RateLimiterBackend, RouteRules};

/// Error code sent with a 429 response.
pub const TOO_MANY_REQUESTS: &str = "TOO_MANY_REQUESTS";
/// Error code sent when a check names an unconfigured route.
pub const UNKNOWN_ROUTE: &str = "UNKNOWN_ROUTE";
/// Error code sent when the query string cannot be parsed.
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub rate_limiter: Arc<dyn RateLimiterBackend>,
    pub rules: Arc<RouteRules>,
}

impl HttpState {
    pub fn new(rate_limiter: Arc<dyn RateLimiterBackend>, rules: Arc<RouteRules>) -> Self {
        Self {
            rate_limiter,
            rules,
        }
    }
}

/// Error payload of a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

/// Payload of an admitted `/v1/check` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckBody {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
}

/// Query parameters for `/v1/check`.
///
/// Callers may only name a configured route. The burst size itself is never
/// taken from the request, since the client being limited sends it.
#[derive(Debug, Default, Deserialize)]
pub struct CheckParams {
    /// Named route rule to apply
    pub route: Option<String>,
}

/// The 429 response for a rejected request.
///
/// Carries `Retry-After` in whole seconds when a token will become
/// available.
pub fn too_many_requests(decision: &Decision) -> Response {
    let body = Json(ErrorBody::new(TOO_MANY_REQUESTS, "Rate limit exceeded"));

    match decision.retry_after {
        Some(wait) => {
            let secs = wait.as_millis().div_ceil(1000).max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                body,
            )
                .into_response()
        }
        None => (StatusCode::TOO_MANY_REQUESTS, body).into_response(),
    }
}

/// Key the request by its forwarded or peer address.
fn client_key(request: &Request) -> ClientKey {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    ClientKey::from_headers(request.headers(), peer)
}

/// Creates the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/v1/check", get(check_handler).post(check_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Consume a token for the calling client.
async fn check_handler(
    State(state): State<HttpState>,
    params: std::result::Result<Query<CheckParams>, QueryRejection>,
    request: Request,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            warn!(error = %rejection, "Received check with malformed query");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(INVALID_ARGUMENT, rejection.body_text())),
            )
                .into_response();
        }
    };

    let limit = match state.rules.resolve_limit(params.route.as_deref(), None) {
        Ok(limit) => limit,
        Err(e) => {
            warn!(route = ?params.route, "Received check for unknown route");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(UNKNOWN_ROUTE, e.to_string())),
            )
                .into_response();
        }
    };

    let key = client_key(&request);
    let decision = state.rate_limiter.check(key.as_str(), limit);

    if !decision.allowed {
        warn!(key = %key, route = ?params.route, "Rate limit exceeded");
        return too_many_requests(&decision);
    }

    debug!(key = %key, remaining = decision.remaining, "Request admitted");
    Json(CheckBody {
        success: true,
        limit: decision.limit,
        remaining: decision.remaining,
    })
    .into_response()
}

/// Per-router settings for [`rate_limit_middleware`].
#[derive(Clone)]
pub struct RateLimitGuard {
    rate_limiter: Arc<dyn RateLimiterBackend>,
    limit: Option<u32>,
}

impl RateLimitGuard {
    /// Guard with the limiter's default burst size.
    pub fn new(rate_limiter: Arc<dyn RateLimiterBackend>) -> Self {
        Self {
            rate_limiter,
            limit: None,
        }
    }

    /// Guard with the burst size of a named route rule.
    pub fn for_route(state: &HttpState, route: &str) -> Result<Self> {
        let limit = state.rules.resolve_limit(Some(route), None)?;
        Ok(Self {
            rate_limiter: state.rate_limiter.clone(),
            limit,
        })
    }
}

/// Middleware rejecting requests over their client's limit.
///
/// Install with `axum::middleware::from_fn_with_state(guard, rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let decision = guard.rate_limiter.check(key.as_str(), guard.limit);

    if !decision.allowed {
        warn!(
            key = %key,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        return too_many_requests(&decision);
    }

    next.run(request).await
}
