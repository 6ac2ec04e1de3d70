//! Rate limit service implementation.

use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::proto::tollgate::v1::{
    check_limit_response::Code, rate_limit_service_server::RateLimitService, CheckLimitRequest,
    CheckLimitResponse,
};

use crate::ratelimit::{RateLimiterBackend, RouteRules};

/// Implementation of the `tollgate.v1.RateLimitService` gRPC interface.
pub struct RateLimitServiceImpl<R: RateLimiterBackend> {
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Named route limits
    rules: Arc<RouteRules>,
}

impl<R: RateLimiterBackend> RateLimitServiceImpl<R> {
    /// Create a new RateLimitServiceImpl with the given rate limiter and rules.
    pub fn new(rate_limiter: Arc<R>, rules: Arc<RouteRules>) -> Self {
        Self {
            rate_limiter,
            rules,
        }
    }
}

#[tonic::async_trait]
impl<R: RateLimiterBackend + 'static> RateLimitService for RateLimitServiceImpl<R> {
    /// Consume one token for the requesting client.
    ///
    /// A rejected request is reported as `OVER_LIMIT` in a successful
    /// response; only malformed requests produce a gRPC error.
    #[instrument(
        skip(self, request),
        fields(
            key = %request.get_ref().key,
            route = %request.get_ref().route,
            limit = ?request.get_ref().limit
        )
    )]
    async fn check_limit(
        &self,
        request: Request<CheckLimitRequest>,
    ) -> Result<Response<CheckLimitResponse>, Status> {
        let req = request.into_inner();

        let limit = self
            .rules
            .resolve_limit(Some(req.route.as_str()), req.limit)
            .map_err(|e| {
                warn!(route = %req.route, "Received rate limit request for unknown route");
                Status::invalid_argument(e.to_string())
            })?;

        if req.key.is_empty() {
            debug!("Checking rate limit for unidentified client");
        }

        let decision = self.rate_limiter.check(&req.key, limit);

        let code = if decision.allowed {
            Code::Ok
        } else {
            Code::OverLimit
        };

        info!(
            key = %req.key,
            code = ?code,
            remaining = decision.remaining,
            "Rate limit decision made"
        );

        Ok(Response::new(CheckLimitResponse {
            code: code.into(),
            limit: decision.limit,
            limit_remaining: decision.remaining,
            retry_after: decision.retry_after.map(to_proto_duration),
        }))
    }
}

fn to_proto_duration(duration: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: duration.as_secs() as i64,
        nanos: duration.subsec_nanos() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{LimiterSettings, ManualClock, RateLimiter, RouteRule};

    fn create_service() -> RateLimitServiceImpl<RateLimiter> {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = RateLimiter::with_clock(LimiterSettings::default(), clock).unwrap();

        let mut rules = RouteRules::new();
        rules.insert("auth_callback", RouteRule::new(2));

        RateLimitServiceImpl::new(Arc::new(limiter), Arc::new(rules))
    }

    fn request(key: &str, limit: Option<u32>, route: &str) -> Request<CheckLimitRequest> {
        Request::new(CheckLimitRequest {
            key: key.to_string(),
            limit,
            route: route.to_string(),
        })
    }

    #[tokio::test]
    async fn test_valid_request_returns_ok() {
        let service = create_service();

        let response = service
            .check_limit(request("1.2.3.4", None, ""))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.code(), Code::Ok);
        assert_eq!(response.limit, 10);
        assert_eq!(response.limit_remaining, 9);
        assert!(response.retry_after.is_none());
    }

    #[tokio::test]
    async fn test_over_limit_is_not_an_error() {
        let service = create_service();

        for _ in 0..10 {
            service.check_limit(request("1.2.3.4", None, "")).await.unwrap();
        }

        let response = service
            .check_limit(request("1.2.3.4", None, ""))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.code(), Code::OverLimit);
        assert_eq!(response.limit_remaining, 0);
        let retry_after = response.retry_after.unwrap();
        assert_eq!(retry_after.seconds, 6);
        assert_eq!(retry_after.nanos, 0);
    }

    #[tokio::test]
    async fn test_route_limit_applies() {
        let service = create_service();

        for _ in 0..2 {
            let response = service
                .check_limit(request("1.2.3.4", None, "auth_callback"))
                .await
                .unwrap()
                .into_inner();
            assert_eq!(response.code(), Code::Ok);
            assert_eq!(response.limit, 2);
        }

        let response = service
            .check_limit(request("1.2.3.4", None, "auth_callback"))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.code(), Code::OverLimit);
    }

    #[tokio::test]
    async fn test_explicit_limit_overrides_route() {
        let service = create_service();

        let response = service
            .check_limit(request("1.2.3.4", Some(5), "auth_callback"))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.limit, 5);
        assert_eq!(response.limit_remaining, 4);
    }

    #[tokio::test]
    async fn test_unknown_route_rejected() {
        let service = create_service();

        let result = service
            .check_limit(request("1.2.3.4", None, "no_such_route"))
            .await;

        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_empty_key_is_accepted() {
        let service = create_service();

        let response = service
            .check_limit(request("", None, ""))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.code(), Code::Ok);
    }
}
