use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linkbox_server::config::Config;
use linkbox_server::handlers;
use linkbox_server::ogp::{OgpFetchService, OgpRequestCache};
use linkbox_server::state::AppState;

/// How often expired OGP cache entries are swept from memory.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize tracing — JSON in production, human-readable in dev.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("linkbox_server=info,tower_http=info"));

    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("🚀 Linkbox server starting...");

    // Load configuration — fatal if JWT_SECRET is missing in production.
    let config = Config::from_env().expect("Failed to load configuration");
    info!("📝 Configuration loaded");

    let fetcher =
        OgpFetchService::new(config.fetch_config()).expect("Failed to build HTTP client");
    if config.ogp_allow_private_hosts {
        tracing::warn!("⚠️  OGP fetches may target private and loopback addresses");
    }
    let ogp_cache = OgpRequestCache::new(Arc::new(fetcher), config.ogp_cache_ttl);
    info!(
        timeout_ms = config.ogp_fetch_timeout.as_millis() as u64,
        ttl_secs = config.ogp_cache_ttl.as_secs(),
        "🔗 OGP pipeline ready"
    );

    // Lookups already skip stale entries; the sweep only bounds memory.
    let sweeper = ogp_cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "Purged expired OGP cache entries");
            }
        }
    });

    // CORS: permissive in dev, restrictive in production.
    let cors = if config.is_dev {
        info!("🔓 CORS: permissive (dev mode)");
        CorsLayer::permissive()
    } else {
        tracing::warn!(
            "🔒 CORS: restrictive (production mode). \
             Cross-origin requests will be denied."
        );
        CorsLayer::new()
    };

    let addr = config.server_addr();

    let app_state = AppState {
        jwt_secret: Arc::from(config.jwt_secret.as_str()),
        ogp_cache,
    };

    // Prometheus metrics layer
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = Router::new()
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .merge(handlers::api_routes())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(prometheus_layer)
        .layer(cors)
        .with_state(app_state);

    // Start server
    info!("🎧 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
