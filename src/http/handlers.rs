use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header::HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::clicks::ClickRecorder;
use crate::models::RawClick;
use crate::resolver::{RedirectResolver, ResolveError};

pub struct AppState {
    pub resolver: RedirectResolver,
    pub recorder: Arc<ClickRecorder>,
}

/// Resolve a short code and redirect.
///
/// Recording is fire-and-forget: the raw click is handed to the recorder on
/// a spawned task after the resolution is known, so a slow or failing
/// recorder never extends redirect latency.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query_params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match state.resolver.resolve(&code).await {
        Ok(resolution) => {
            let raw = raw_click_from_request(&headers, addr, &code, query_params);
            let recorder = Arc::clone(&state.recorder);
            tokio::spawn(async move {
                match recorder.record(&code, raw).await {
                    Ok(outcome) => {
                        tracing::debug!(code = %code, ?outcome, "click recorded");
                    }
                    Err(err) => {
                        tracing::warn!(code = %code, error = %err, "failed to record click");
                    }
                }
            });

            Redirect::permanent(&resolution.destination).into_response()
        }
        Err(ResolveError::NotFound) => {
            (StatusCode::NOT_FOUND, "Short link not found").into_response()
        }
        Err(ResolveError::Storage(err)) => {
            tracing::error!(code = %code, error = %err, "short code resolution failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Hydrate a raw click from request parts. Geo and timezone hints come from
/// headers populated by the edge/routing layer; this never does its own
/// lookups.
fn raw_click_from_request(
    headers: &HeaderMap,
    addr: SocketAddr,
    code: &str,
    query_params: HashMap<String, String>,
) -> RawClick {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    // Prefer common proxy headers over the socket address
    let address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| header("x-real-ip"))
        .unwrap_or_else(|| addr.ip().to_string());

    RawClick {
        address,
        user_agent: header("user-agent").unwrap_or_default(),
        referrer: header("referer"),
        language: header("accept-language"),
        timezone: header("x-timezone"),
        country: header("x-geo-country"),
        region: header("x-geo-region"),
        city: header("x-geo-city"),
        path: Some(format!("/{code}")),
        query_params,
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
