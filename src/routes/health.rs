//! Service health endpoint

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::registry::model::HealthSummary;
use crate::routes::{error_response, json_response};
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse {
    #[serde(flatten)]
    summary: HealthSummary,
    version: &'static str,
}

/// GET /api/quorum/health
///
/// Always answers while the process is up; the payload carries registry
/// totals and the currently-live count.
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    match state.store.health() {
        Ok(summary) => json_response(
            StatusCode::OK,
            &HealthResponse {
                summary,
                version: env!("CARGO_PKG_VERSION"),
            },
        ),
        Err(e) => error_response(&e),
    }
}
