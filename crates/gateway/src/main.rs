//! Toponym API Gateway
//!
//! Owns the process lifecycle and exposes the resolver over HTTP:
//! - Configuration loading and validation
//! - Gazetteer and embedding cache bootstrap
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use toponym_common::{
    config::{AppConfig, GazetteerSource, ObservabilityConfig},
    db::DbPool,
    embeddings::create_embedder,
    metrics::{self, EMBEDDING_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    GazetteerRepository,
};
use toponym_resolver::{Gazetteer, InMemoryGazetteer, PgGazetteer, Resolver};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub resolver: Arc<Resolver>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.observability);

    info!("Starting Toponym gateway v{}", toponym_common::VERSION);

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    init_metrics(&config.observability)?;

    let gazetteer = open_gazetteer(&config).await?;
    let embedder = create_embedder(&config.embedding)?;
    info!(
        gazetteer = gazetteer.name(),
        embedder = embedder.model_name(),
        "Bootstrapping resolver"
    );

    let resolver = Resolver::bootstrap(
        gazetteer,
        embedder,
        &config.resolver,
        config.gazetteer_timeout(),
    )
    .await?;

    let state = AppState {
        config: config.clone(),
        resolver: Arc::new(resolver),
    };

    let app = create_router(state);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server.host '{}'", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    serve(listener, app, shutdown_signal(), config.shutdown_timeout()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Serve until `signal` fires, then drain in-flight requests for at most
/// `deadline` before dropping what is left
async fn serve(
    listener: TcpListener,
    app: Router,
    signal: impl Future<Output = ()> + Send + 'static,
    deadline: Duration,
) -> std::io::Result<()> {
    let draining = Arc::new(Notify::new());
    let trigger = draining.clone();

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            trigger.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => result,
        _ = async {
            draining.notified().await;
            tokio::time::sleep(deadline).await;
        } => {
            warn!(
                deadline_secs = deadline.as_secs_f64(),
                "Graceful shutdown deadline passed, dropping open connections"
            );
            Ok(())
        }
    }
}

/// Structured logging; RUST_LOG overrides the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Prometheus scrape endpoint on its own port; 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        warn!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_embedding_duration_seconds", METRICS_PREFIX)),
            EMBEDDING_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Open the configured gazetteer store
async fn open_gazetteer(config: &AppConfig) -> anyhow::Result<Arc<dyn Gazetteer>> {
    let floor = config.resolver.approx_match_floor;

    match config.gazetteer.source {
        GazetteerSource::Postgres => {
            info!("Connecting to gazetteer database...");
            let db = DbPool::new(&config.database).await?;
            if config.database.run_migrations {
                db.migrate().await?;
            }
            Ok(Arc::new(PgGazetteer::new(GazetteerRepository::new(db), floor)))
        }
        GazetteerSource::File => {
            let path = config
                .gazetteer
                .seed_path
                .as_deref()
                .context("gazetteer.seed_path is required for the file source")?;
            Ok(Arc::new(InMemoryGazetteer::from_seed_file(path, floor).await?))
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID: set outermost so the propagate layer sees it
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/resolve", post(handlers::resolve::resolve))
        .route(
            "/admin/embeddings/rebuild",
            post(handlers::admin::rebuild_embeddings),
        );

    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use toponym_common::embeddings::HashingEmbedder;

    pub const SEED: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/places.json");

    pub async fn state(config: AppConfig) -> AppState {
        let gazetteer = InMemoryGazetteer::from_seed_file(SEED, config.resolver.approx_match_floor)
            .await
            .unwrap();
        let resolver = Resolver::bootstrap(
            Arc::new(gazetteer),
            Arc::new(HashingEmbedder::new(128)),
            &config.resolver,
            Duration::from_millis(800),
        )
        .await
        .unwrap();

        AppState {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
        }
    }

    pub async fn app() -> Router {
        create_router(state(AppConfig::default()).await)
    }
}
