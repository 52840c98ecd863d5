use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{FetchOgpRequest, OgpRecord};
use crate::ogp::fetch::parse_target_url;
use crate::state::AppState;

// ── Query params ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct OgpQuery {
    pub url: Option<String>,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /api/ogp?url=<encoded-url>
///
/// Proxy for clients that cannot fetch the target page themselves. Results
/// (including failures) are cached per URL for the cache TTL, and concurrent
/// requests for the same URL share one upstream fetch.
pub async fn get_ogp(
    State(state): State<AppState>,
    Query(params): Query<OgpQuery>,
) -> AppResult<Json<OgpRecord>> {
    let url = params
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing url query parameter".into()))?;

    resolve(&state, &url).await.map(Json)
}

/// POST /api/actions/fetch-ogp
///
/// Authenticated variant used from inside the app. Accepts the target URL
/// either plain or percent-encoded as a whole.
pub async fn fetch_ogp(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<FetchOgpRequest>,
) -> AppResult<Json<OgpRecord>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let url = normalize_action_url(&req.url)?;
    tracing::debug!(subject = %auth.subject, url = %url, "fetch-ogp action");

    resolve(&state, &url).await.map(Json)
}

/// Validate `url` and look it up under its normalized form, so spelling
/// variants of one URL share a cache entry and invalid input never reaches
/// the cache.
async fn resolve(state: &AppState, url: &str) -> AppResult<OgpRecord> {
    let parsed = parse_target_url(url)?;
    let outcome = state.ogp_cache.get(parsed.as_str()).await;
    match outcome.as_ref() {
        Ok(record) => Ok(record.clone()),
        Err(e) => Err(e.clone().into()),
    }
}

/// Return `raw` if it is already a usable URL, otherwise its percent-decoded
/// form. Fails with a validation error when neither parses.
fn normalize_action_url(raw: &str) -> AppResult<String> {
    let raw = raw.trim();
    if parse_target_url(raw).is_ok() {
        return Ok(raw.to_string());
    }

    let decoded = urlencoding::decode(raw)
        .map_err(|_| AppError::Validation("Invalid URL format".into()))?;
    parse_target_url(&decoded)?;
    Ok(decoded.into_owned())
}
