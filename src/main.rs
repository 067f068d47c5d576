//! Order book stream - command line runner
//!
//! Replicates one market's order book, logs its status periodically and
//! serves health, book and metrics endpoints.

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_stream::{Config, GroupedBookSnapshot, OrderBookStream};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting order book stream");

    let config = Config::load()?;
    info!(pair = %config.pair, endpoint = %config.ws_endpoint, "Configuration loaded");

    let status_interval = Duration::from_secs(config.status_interval_secs.max(1));
    let health_port = config.health_port;
    let stream = Arc::new(OrderBookStream::start(config));

    let health_stream = stream.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_stream, health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    let status_stream = stream.clone();
    tokio::spawn(async move {
        let mut ticker = interval(status_interval);
        loop {
            ticker.tick().await;
            let metrics = status_stream.metrics();
            info!(
                state = %status_stream.session_state(),
                sequence = metrics.sequence,
                best_bid = ?metrics.best_bid,
                best_ask = ?metrics.best_ask,
                spread_bps = ?metrics.spread_bps,
                bids = metrics.bid_orders,
                asks = metrics.ask_orders,
                "Order book status"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    stream.close();

    Ok(())
}

/// Start HTTP server for health checks, the book and metrics
async fn start_health_server(stream: Arc<OrderBookStream>, port: u16) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/book", get(book))
        .route("/metrics", get(metrics))
        .with_state(stream);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(stream): State<Arc<OrderBookStream>>) -> Json<serde_json::Value> {
    let metrics = stream.metrics();
    Json(serde_json::json!({
        "status": if metrics.is_healthy() { "healthy" } else { "degraded" },
        "component": "orderbook-stream",
        "session": stream.session_state(),
        "sequence": metrics.sequence,
        "last_message": stream.last_message_at().map(|t| t.to_rfc3339()),
        "metrics": metrics,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn book(State(stream): State<Arc<OrderBookStream>>) -> Json<GroupedBookSnapshot> {
    Json(stream.grouped_snapshot())
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
