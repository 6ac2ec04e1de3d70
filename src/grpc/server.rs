//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::tollgate::v1::rate_limit_service_server::RateLimitServiceServer;
use super::service::RateLimitServiceImpl;
use crate::error::{Result, TollgateError};
use crate::ratelimit::{RateLimiterBackend, RouteRules};

/// gRPC server for the rate limit service.
pub struct GrpcServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<R>,
    /// Named route limits
    rules: Arc<RouteRules>,
}

impl<R: RateLimiterBackend + 'static> GrpcServer<R> {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<R>, rules: Arc<RouteRules>) -> Self {
        Self {
            addr,
            rate_limiter,
            rules,
        }
    }

    fn service(&self) -> RateLimitServiceServer<RateLimitServiceImpl<R>> {
        RateLimitServiceServer::new(RateLimitServiceImpl::new(
            self.rate_limiter.clone(),
            self.rules.clone(),
        ))
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(
            addr = %self.addr,
            "Starting gRPC server for RateLimitService with graceful shutdown"
        );

        Server::builder()
            .add_service(self.service())
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                TollgateError::Grpc(e)
            })
    }

    /// Serve on an already-bound listener until `signal` resolves.
    ///
    /// The configured address is ignored.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(
            addr = ?listener.local_addr().ok(),
            "Starting gRPC server for RateLimitService on bound listener"
        );

        Server::builder()
            .add_service(self.service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                TollgateError::Grpc(e)
            })
    }
}
