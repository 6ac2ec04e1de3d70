use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::grpc::GrpcServer;
use tollgate::http::{create_router, HttpState};
use tollgate::ratelimit::RateLimiter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Per-client token bucket admission control service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the gRPC listen address
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }

    info!("Starting Tollgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.grpc_addr {
        config.server.grpc_addr = addr;
    }
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    config.validate()?;
    info!(
        grpc_addr = %config.server.grpc_addr,
        http_addr = %config.server.http_addr,
        "Configuration loaded"
    );

    // Initialize the rate limiter
    let settings = config.rate_limiting.settings();
    let rate_limiter = Arc::new(RateLimiter::with_settings(settings.clone())?);
    let rules = Arc::new(config.route_rules()?);
    info!(
        window_ms = settings.window_ms,
        max_tokens = settings.max_tokens,
        cache_capacity = settings.cache_capacity,
        routes = rules.len(),
        "Rate limiter initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = tokio::spawn(sweep_expired(
        rate_limiter.clone(),
        Duration::from_millis(settings.cache_ttl_ms),
        shutdown_rx.clone(),
    ));

    let grpc_server = GrpcServer::new(config.server.grpc_addr, rate_limiter.clone(), rules.clone());

    let http_listener = TcpListener::bind(config.server.http_addr).await?;
    let app = create_router(HttpState::new(rate_limiter, rules));
    info!("Starting HTTP server on {}", config.server.http_addr);

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Run both servers until the shutdown signal fires
    let grpc = grpc_server.serve_with_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let http = async {
        axum::serve(
            http_listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()))
        .await
        .map_err(anyhow::Error::from)
    };

    tokio::try_join!(async { grpc.await.map_err(anyhow::Error::from) }, http)?;
    sweeper.await?;

    info!("Tollgate Rate Limiting Service stopped");
    Ok(())
}

/// Periodically drop buckets that have sat idle past their TTL.
async fn sweep_expired(
    rate_limiter: Arc<RateLimiter>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = rate_limiter.purge_expired();
                debug!(
                    purged = purged,
                    tracked = rate_limiter.tracked_keys(),
                    "Swept expired buckets"
                );
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Resolve once shutdown has been requested.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
