//! Request routing and response shaping
//!
//! Thin layer over the registry operation contract: parse, validate the
//! DID format, call the store, map errors to status codes.

pub mod health;
pub mod quorum;

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::error::RegistryError;
use crate::server::AppState;

/// Basic success/failure envelope shared by mutation endpoints.
#[derive(Serialize)]
pub struct BasicResponse {
    pub status: bool,
    pub message: String,
}

/// Route requests to handlers
pub async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(method = %method, path = %path, "Incoming request");

    let response = match (method, path.as_str()) {
        (Method::GET, "/api/quorum/health") => health::health_check(&state),

        (Method::POST, "/api/quorum/register") => quorum::register(&state, req).await?,
        (Method::POST, "/api/quorum/confirm-availability") => {
            quorum::confirm_availability(&state, req).await?
        }
        (Method::POST, "/api/quorum/heartbeat") => quorum::heartbeat(&state, req).await?,
        (Method::POST, "/api/quorum/balance") => quorum::update_balance(&state, req).await?,

        (Method::GET, "/api/quorum/available") => quorum::available(&state, &req),
        (Method::GET, "/api/quorum/all") => quorum::list_all(&state),
        (Method::GET, "/api/quorum/transactions") => quorum::transactions(&state, &req),
        (Method::GET, p) if p.starts_with("/api/quorum/info/") => {
            let did = p.strip_prefix("/api/quorum/info/").unwrap_or("");
            quorum::info(&state, did)
        }

        (Method::DELETE, p) if p.starts_with("/api/quorum/unregister/") => {
            let did = p.strip_prefix("/api/quorum/unregister/").unwrap_or("");
            quorum::unregister(&state, did)
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            &BasicResponse {
                status: false,
                message: "Not found".to_string(),
            },
        ),
    };

    Ok(response)
}

/// Serialize a payload as a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(payload)
        .unwrap_or_else(|_| r#"{"status":false,"message":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

pub fn basic_response(status: StatusCode, ok: bool, message: impl Into<String>) -> Response<Full<Bytes>> {
    json_response(
        status,
        &BasicResponse {
            status: ok,
            message: message.into(),
        },
    )
}

/// Map a registry error to its HTTP status.
pub fn error_status(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::InsufficientCandidates { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &RegistryError) -> Response<Full<Bytes>> {
    basic_response(error_status(err), false, err.to_string())
}
