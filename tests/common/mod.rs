// Each integration test file is a separate binary; helpers not used in every
// binary would otherwise trigger dead_code warnings from clippy.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    response::Html,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use linkbox_server::{
    auth::create_access_token,
    handlers,
    ogp::{FetchConfig, OgpFetchService, OgpRequestCache, CACHE_TTL},
    state::AppState,
};

pub const TEST_JWT_SECRET: &str = "test-secret-min-32-characters-long!!";

pub const ARTICLE_HTML: &str = r#"<!doctype html>
<html><head>
  <title>Plain Title</title>
  <meta property="og:title" content="Article Title">
  <meta property="og:description" content="Article description">
  <meta property="og:image" content="https://cdn.example.com/cover.png">
  <meta property="og:url" content="https://example.com/article">
  <meta property="og:site_name" content="Example Site">
</head><body><p>hello</p></body></html>"#;

pub const PLAIN_HTML: &str = r#"<html><head>
  <title>  Only A Title  </title>
  <meta name="description" content="Only a description">
</head></html>"#;

// ── Local upstream ───────────────────────────────────────────────────────────

/// A throwaway HTTP server standing in for the pages being previewed.
pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests served by `/counted` so far.
    pub fn counted_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn counted(State(hits): State<Arc<AtomicUsize>>) -> Html<&'static str> {
    hits.fetch_add(1, Ordering::SeqCst);
    // Stay in flight long enough for concurrent callers to pile up.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Html(ARTICLE_HTML)
}

pub async fn spawn_upstream() -> Upstream {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let private_target = format!("http://{addr}/counted");

    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/article", get(|| async { Html(ARTICLE_HTML) }))
        .route("/plain", get(|| async { Html(PLAIN_HTML) }))
        .route("/broken", get(|| async { Html("<html><head><title>Broken<meta") }))
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "nothing here") }),
        )
        .route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        )
        .route(
            "/hang",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Html(ARTICLE_HTML)
            }),
        )
        // Bounces to `/counted` by loopback IP literal.
        .route(
            "/hop",
            get(move || async move {
                (
                    StatusCode::TEMPORARY_REDIRECT,
                    [(header::LOCATION, private_target)],
                )
            }),
        )
        .route("/counted", get(counted))
        .with_state(hits.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream { addr, hits }
}

// ── App construction ─────────────────────────────────────────────────────────

/// Fetch settings that can reach the local upstream.
pub fn local_fetch_config(timeout: Duration) -> FetchConfig {
    FetchConfig {
        timeout,
        allow_private_hosts: true,
        ..FetchConfig::default()
    }
}

pub fn test_state(config: FetchConfig) -> AppState {
    let fetcher = OgpFetchService::new(config).expect("failed to build HTTP client");
    AppState {
        jwt_secret: Arc::from(TEST_JWT_SECRET),
        ogp_cache: OgpRequestCache::new(Arc::new(fetcher), CACHE_TTL),
    }
}

/// Build the full application router wired to the given state.
pub fn create_test_app(state: AppState) -> Router {
    handlers::api_routes().with_state(state)
}

pub fn test_token() -> String {
    create_access_token("user_test", TEST_JWT_SECRET).unwrap()
}

/// Percent-encode a target URL for use in `?url=`.
pub fn encode(url: &str) -> String {
    url::form_urlencoded::byte_serialize(url.as_bytes()).collect()
}

// ── Request helpers ──────────────────────────────────────────────────────────

pub async fn post_json_authed(
    app: Router,
    uri: &str,
    token: &str,
    body: Value,
) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn post_json_no_auth(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn get_no_auth(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
