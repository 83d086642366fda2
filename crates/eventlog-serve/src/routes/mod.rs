//! API route definitions.

mod events;
mod health;
mod stats;

use axum::Router;
use axum::http::header::{self, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::state::AppState;

const CROSSDOMAIN_POLICY: &str = r#"<?xml version="1.0"?>
<!DOCTYPE cross-domain-policy SYSTEM "http://www.macromedia.com/xml/dtds/cross-domain-policy.dtd">
<cross-domain-policy>
   <site-control permitted-cross-domain-policies="all" />
   <allow-http-request-headers-from domain="*" headers="*"/>
   <allow-access-from domain="*" to-ports="*" />
</cross-domain-policy>"#;

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /` - Liveness banner
/// - `GET /health` - Writer health
/// - `GET /crossdomain.xml` - Flash cross-domain policy
/// - `GET /stats` - Per-type counts, optionally bounded by `since`/`until`
/// - `GET /v1/{event}` - Submit one event (never cached)
pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/v1", get(events::missing_event))
        .route("/v1/", get(events::missing_event))
        .route("/v1/{*path}", get(events::submit))
        .layer(middleware::map_response(add_no_cache_headers));

    Router::new()
        .route("/", get(|| async { "Hello?" }))
        .route("/health", get(health::health_check))
        .route("/crossdomain.xml", get(crossdomain))
        .route("/stats", get(stats::counts))
        .merge(v1)
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
}

/// [`router`] wrapped in the request tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    router(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::span!(
                    Level::INFO,
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    query = request.uri().query().unwrap_or("")
                )
            }),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn crossdomain() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/xml")], CROSSDOMAIN_POLICY)
}

/// Submissions must always reach the server, errors included.
async fn add_no_cache_headers(response: Response) -> Response {
    let (mut parts, body) = response.into_parts();
    parts.headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=0, no-cache"),
    );
    parts
        .headers
        .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    parts
        .headers
        .insert(header::EXPIRES, HeaderValue::from_static("-1"));
    Response::from_parts(parts, body)
}
