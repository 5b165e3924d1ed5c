//! Liveness probe.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: HealthServices,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthServices {
    pub upstream_api: String,
}

/// GET /health: OK while the process runs. Makes no upstream call.
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        services: HealthServices {
            upstream_api: state.config.upstream_base_url.to_string(),
        },
    })
}
