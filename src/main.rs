use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use traffic_monitor::aggregator::Aggregator;
use traffic_monitor::app;
use traffic_monitor::config::Args;
use traffic_monitor::error::StoreError;
use traffic_monitor::metrics::RequestMetrics;
use traffic_monitor::rate_limit::RateLimiter;
use traffic_monitor::request_log::RequestLog;
use traffic_monitor::state::AppState;
use traffic_monitor::store::RedisStore;

const DEFAULT_LOG_FILTER: &str = "traffic_monitor=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    std::fs::create_dir_all(&args.log_dir)?;

    let connect = tokio::time::timeout(args.store_timeout(), RedisStore::connect(&args.redis_url()))
        .await
        .unwrap_or(Err(StoreError::Timeout(args.store_timeout())));
    let limiter = match connect {
        Ok(store) => {
            RateLimiter::connect(
                Arc::new(store),
                args.rate_limit,
                args.rate_window(),
                args.store_timeout(),
            )
            .await
        }
        Err(e) => {
            tracing::warn!(
                redis_url = %args.redis_url(),
                error = %e,
                "Counter store unavailable, rate limiting disabled"
            );
            RateLimiter::disabled()
        }
    };

    let state = Arc::new(AppState::new(
        limiter,
        Aggregator::load(args.metrics_file()),
        RequestLog::open(&args.request_log_file())?,
        RequestMetrics::new()?,
    ));

    let app = app::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        address = %listener.local_addr()?,
        rate_limit = args.rate_limit,
        rate_window_secs = args.rate_window,
        log_dir = %args.log_dir.display(),
        "Traffic monitor listening"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter_names_only_this_crate() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert!(DEFAULT_LOG_FILTER
            .split(',')
            .all(|directive| directive.starts_with("traffic_monitor")));
    }
}
