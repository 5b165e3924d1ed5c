//! Proxy routes: forward `/proxy/{path}` to the upstream API.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    response::{IntoResponse, Response},
    Json,
};

use crate::errors::AppError;
use crate::services::upstream::UpstreamRequest;
use crate::AppState;

/// ANY /proxy/{*path}: forward to the upstream, stitching the bounty listing.
pub async fn forward(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let body = (method != Method::GET && method != Method::HEAD).then_some(body);
    let request = UpstreamRequest {
        method,
        path,
        query,
        body,
    };

    let reply = state.proxy.dispatch(request).await?;
    Ok((reply.status, Json(reply.body)).into_response())
}
