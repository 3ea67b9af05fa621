use crate::config::Config;
use crate::delivery::DeliveryService;
use crate::transcode::JobQueue;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use vodforge_core::events::EventBus;
use vodforge_core::AssetLayout;
use vodforge_db::pool::DbPool;

pub mod auth;
pub mod error;
pub mod routes_jobs;
pub mod routes_stream;
pub mod routes_videos;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub db: DbPool,
    pub layout: AssetLayout,
    pub events: Arc<EventBus>,
    pub queue: Arc<JobQueue>,
    pub delivery: DeliveryService,
}

impl AppContext {
    pub fn new(config: Arc<Config>, db: DbPool, events: Arc<EventBus>, queue: Arc<JobQueue>) -> Self {
        let layout = AssetLayout::new(config.storage.media_root.clone());
        let delivery = DeliveryService::new(db.clone(), layout.clone());
        Self {
            config,
            db,
            layout,
            events,
            queue,
            delivery,
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes(&ctx))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn api_routes(ctx: &AppContext) -> Router<AppContext> {
    // The gate always runs: handlers need the capability it inserts, and
    // it passes everything through when auth is disabled.
    routes_stream::stream_routes()
        .merge(routes_videos::video_routes())
        .merge(routes_jobs::job_routes())
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_auth,
        ))
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server and serve until `shutdown` resolves.
pub async fn start_server(ctx: AppContext, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
