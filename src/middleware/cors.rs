//! CORS handling for the proxy.
//!
//! Browser preflights are answered by the `tower-http` layer. Proxy
//! responses additionally carry the allow headers unconditionally, and a
//! bare `OPTIONS` request is answered with an empty 200 without reaching
//! the upstream.

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};

const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

const ALLOW_METHODS_VALUE: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS_VALUE: &str = "Content-Type, Authorization";

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Stamp the allow headers on every proxy response and short-circuit `OPTIONS`.
pub async fn proxy_headers(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS_VALUE),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS_VALUE),
    );
    response
}
