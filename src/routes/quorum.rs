//! Quorum registry endpoints

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::registry::model::{QuorumAssignment, RegisterRequest};
use crate::registry::selection::{SelectionRequest, DEFAULT_QUORUM_COUNT};
use crate::routes::{basic_response, error_response, json_response};
use crate::server::AppState;

/// DID format accepted by the registry: fixed length, fixed prefix,
/// alphanumeric remainder. Matches the ledger platform's DID encoding.
const DID_LENGTH: usize = 59;
const DID_PREFIX: &str = "bafybmi";

pub fn is_valid_did(did: &str) -> bool {
    did.len() == DID_LENGTH
        && did.starts_with(DID_PREFIX)
        && did.chars().all(|c| c.is_ascii_alphanumeric())
}

fn invalid_did_response() -> Response<Full<Bytes>> {
    basic_response(
        StatusCode::BAD_REQUEST,
        false,
        format!("Invalid DID format: expected {DID_LENGTH}-character identifier with '{DID_PREFIX}' prefix"),
    )
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<Result<T, Response<Full<Bytes>>>, hyper::Error> {
    let body = req.into_body().collect().await?.to_bytes();
    match serde_json::from_slice(&body) {
        Ok(parsed) => Ok(Ok(parsed)),
        Err(e) => Ok(Err(basic_response(
            StatusCode::BAD_REQUEST,
            false,
            format!("Invalid request format: {e}"),
        ))),
    }
}

/// POST /api/quorum/register
pub async fn register(
    state: &Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let body: RegisterRequest = match read_json(req).await? {
        Ok(b) => b,
        Err(resp) => return Ok(resp),
    };
    if !is_valid_did(&body.did) {
        return Ok(invalid_did_response());
    }
    Ok(match state.store.register(&body) {
        Ok(()) => basic_response(StatusCode::OK, true, "Quorum registered successfully"),
        Err(e) => error_response(&e),
    })
}

#[derive(Deserialize)]
struct DidBody {
    did: String,
}

/// POST /api/quorum/confirm-availability
pub async fn confirm_availability(
    state: &Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let body: DidBody = match read_json(req).await? {
        Ok(b) => b,
        Err(resp) => return Ok(resp),
    };
    if !is_valid_did(&body.did) {
        return Ok(invalid_did_response());
    }
    Ok(match state.store.confirm_availability(&body.did) {
        Ok(()) => basic_response(StatusCode::OK, true, "Availability confirmed"),
        Err(e) => error_response(&e),
    })
}

/// POST /api/quorum/heartbeat
pub async fn heartbeat(
    state: &Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let body: DidBody = match read_json(req).await? {
        Ok(b) => b,
        Err(resp) => return Ok(resp),
    };
    if !is_valid_did(&body.did) {
        return Ok(invalid_did_response());
    }
    Ok(match state.store.heartbeat(&body.did) {
        Ok(()) => basic_response(StatusCode::OK, true, "Heartbeat updated"),
        Err(e) => error_response(&e),
    })
}

#[derive(Deserialize)]
struct BalanceBody {
    did: String,
    balance: f64,
}

/// POST /api/quorum/balance
pub async fn update_balance(
    state: &Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let body: BalanceBody = match read_json(req).await? {
        Ok(b) => b,
        Err(resp) => return Ok(resp),
    };
    if !is_valid_did(&body.did) {
        return Ok(invalid_did_response());
    }
    Ok(match state.store.update_balance(&body.did, body.balance) {
        Ok(()) => basic_response(StatusCode::OK, true, "Balance updated"),
        Err(e) => error_response(&e),
    })
}

/// Selection response shaped for the consensus caller.
#[derive(Serialize)]
pub struct QuorumListResponse {
    pub status: bool,
    pub message: String,
    pub quorums: Vec<QuorumAssignment>,
}

fn query_params(req: &Request<Incoming>) -> Vec<(String, String)> {
    req.uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// GET /api/quorum/available
///
/// Query: count (default 7), transaction_amount, ft_name, last_char_tid.
pub fn available(state: &Arc<AppState>, req: &Request<Incoming>) -> Response<Full<Bytes>> {
    let params = query_params(req);
    let mut selection = SelectionRequest {
        count: DEFAULT_QUORUM_COUNT,
        transaction_amount: 0.0,
        token: None,
        last_char: None,
    };

    for (key, value) in &params {
        match key.as_str() {
            "count" => match value.parse() {
                Ok(c) => selection.count = c,
                Err(_) => {
                    return basic_response(
                        StatusCode::BAD_REQUEST,
                        false,
                        format!("Invalid count: {value}"),
                    )
                }
            },
            "transaction_amount" => match value.parse() {
                Ok(a) => selection.transaction_amount = a,
                Err(_) => {
                    return basic_response(
                        StatusCode::BAD_REQUEST,
                        false,
                        format!("Invalid transaction_amount: {value}"),
                    )
                }
            },
            "ft_name" if !value.is_empty() => selection.token = Some(value.clone()),
            "last_char_tid" => selection.last_char = value.chars().next(),
            _ => {}
        }
    }

    match state.store.select(&selection) {
        Ok(quorums) => json_response(
            StatusCode::OK,
            &QuorumListResponse {
                status: true,
                message: "Quorums selected successfully".to_string(),
                quorums,
            },
        ),
        Err(e) => json_response(
            crate::routes::error_status(&e),
            &QuorumListResponse {
                status: false,
                message: e.to_string(),
                quorums: vec![],
            },
        ),
    }
}

/// GET /api/quorum/info/{did}
pub fn info(state: &Arc<AppState>, did: &str) -> Response<Full<Bytes>> {
    if !is_valid_did(did) {
        return invalid_did_response();
    }
    match state.store.get(did) {
        Ok(record) => json_response(StatusCode::OK, &record),
        Err(e) => error_response(&e),
    }
}

/// GET /api/quorum/all
pub fn list_all(state: &Arc<AppState>) -> Response<Full<Bytes>> {
    match state.store.list() {
        Ok(records) => json_response(StatusCode::OK, &records),
        Err(e) => error_response(&e),
    }
}

/// GET /api/quorum/transactions?limit=N
pub fn transactions(state: &Arc<AppState>, req: &Request<Incoming>) -> Response<Full<Bytes>> {
    let limit = query_params(req)
        .iter()
        .find(|(k, _)| k == "limit")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(50);

    match state.store.transaction_history(limit) {
        Ok(history) => json_response(StatusCode::OK, &history),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/quorum/unregister/{did}
pub fn unregister(state: &Arc<AppState>, did: &str) -> Response<Full<Bytes>> {
    if !is_valid_did(did) {
        return invalid_did_response();
    }
    match state.store.unregister(did) {
        Ok(()) => basic_response(StatusCode::OK, true, "Quorum unregistered"),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_validation_enforces_length_prefix_and_charset() {
        let valid = format!("{}{}", DID_PREFIX, "a".repeat(DID_LENGTH - DID_PREFIX.len()));
        assert!(is_valid_did(&valid));

        // Wrong length
        assert!(!is_valid_did(&valid[..DID_LENGTH - 1]));
        // Wrong prefix
        let wrong_prefix = format!("bafyxmi{}", "a".repeat(DID_LENGTH - 7));
        assert!(!is_valid_did(&wrong_prefix));
        // Non-alphanumeric character
        let non_alnum = format!("{}{}!", DID_PREFIX, "a".repeat(DID_LENGTH - DID_PREFIX.len() - 1));
        assert!(!is_valid_did(&non_alnum));
    }
}
