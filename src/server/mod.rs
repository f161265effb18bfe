pub mod handlers;
pub mod state;

use crate::{config::Config, sweeper};
use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use state::AppState;
use std::io;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Build the router around already-initialised state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::serve_metrics))
        .fallback(handlers::object::serve_object)
        .layer(middleware::from_fn(version_header))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Stamp every response with the running version
async fn version_header(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response.headers_mut().insert(
        "x-hlscache-version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Start the Axum HTTP server and the eviction sweeper
///
/// Runs until SIGINT/SIGTERM, then shuts down as described on [`serve_until`].
pub async fn start(
    config: Config,
    metrics: Option<PrometheusHandle>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);

    info!(
        "Caching {} (manifest TTL {}s, segment TTL {}s, sweep every {}s) in {}",
        config.origin_url,
        config.manifest_ttl_secs,
        config.segment_ttl_secs,
        config.sweep_interval().as_secs(),
        config.cache_dir.display()
    );

    let state = AppState::new(config)?.with_metrics(metrics);

    // Bind TCP listener
    let listener = match TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("🚀 Server listening on http://{}", addr);

    serve_until(listener, state, shutdown_signal()).await?;
    Ok(())
}

/// Serve on `listener` with the sweeper running until `shutdown` resolves.
///
/// Shutdown order: the listener stops accepting and in-flight responses
/// finish, then the sweeper stops, then every remaining cache entry is
/// drained and its backing file deleted.
pub async fn serve_until<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry().clone();
    let cancel = CancellationToken::new();
    let sweeper = sweeper::spawn(
        registry.clone(),
        state.config.sweep_interval(),
        cancel.clone(),
    );

    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await;

    info!("Closing down, draining cache");
    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }
    sweeper::drain(&registry).await;

    if let Err(e) = &served {
        error!("Server error: {}", e);
    }
    served
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
