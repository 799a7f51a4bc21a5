//! Layers shared by every route.
use axum::body::Body;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::cors::CorsLayer;

pub fn cors() -> CorsLayer {
    CorsLayer::permissive()
}

/// Stamp every response with the engine version
pub async fn version_header(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("x-tako-version", HeaderValue::from_static(tako_core::TAKO_VERSION));
    response
}
