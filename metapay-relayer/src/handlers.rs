//! Axum route handlers for the relay service.
//!
//! Endpoints:
//! - `GET /health` - service status and the deployment it relays for
//! - `POST /relay` - admit one envelope (alias `POST /api/relay`)

use std::sync::Arc;

use alloy_primitives::Address;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::header::{CONTENT_TYPE, InvalidHeaderValue};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use metapay::{FieldIssue, RELAY_AUTH_HEADER, RelayError, RelayReceipt, UnixTimestamp};
use serde::{Deserialize, Serialize};
use tower_http::cors::{self, CorsLayer};

use crate::error::RelayerError;
use crate::pipeline::AdmissionPipeline;

/// Shared application state for the relay service.
#[derive(Debug, Clone)]
pub struct RelayerState {
    pipeline: Arc<AdmissionPipeline>,
    recipient: Address,
}

impl RelayerState {
    /// Creates the state served by [`relayer_router`].
    #[must_use]
    pub const fn new(pipeline: Arc<AdmissionPipeline>, recipient: Address) -> Self {
        Self {
            pipeline,
            recipient,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"healthy"` when the service answers.
    pub status: String,
    /// Relayer version.
    pub version: String,
    /// Chain envelopes must be signed for.
    pub chain_id: u64,
    /// Forwarder envelopes must name.
    pub forwarder: Address,
    /// Payment recipient contract.
    pub recipient: Address,
    /// Server time.
    pub timestamp: UnixTimestamp,
}

/// `GET /health` - Reports status and the deployment relayed for.
pub async fn get_health(State(state): State<RelayerState>) -> Json<HealthResponse> {
    let domain = state.pipeline.domain();
    Json(HealthResponse {
        status: "healthy".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        chain_id: domain.chain_id,
        forwarder: domain.verifying_contract,
        recipient: state.recipient,
        timestamp: UnixTimestamp::now(),
    })
}

/// `POST /relay` - Admits one envelope and executes it.
///
/// The raw body is passed through untouched so the `x-relay-auth` MAC is
/// checked over exactly the bytes the client tagged.
///
/// # Errors
///
/// Returns the first failing admission step as a JSON error body, or
/// `413` when the body is over the configured limit.
pub async fn post_relay(
    State(state): State<RelayerState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<RelayReceipt>, RelayerError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge
        } else {
            RelayError::Validation(vec![FieldIssue::new("body", rejection.body_text())])
        }
    })?;
    let tag = headers
        .get(RELAY_AUTH_HEADER)
        .and_then(|value| value.to_str().ok());
    let receipt = state.pipeline.admit(&body, tag).await?;
    Ok(Json(receipt))
}

/// Creates an Axum [`Router`] with all relay endpoints.
pub fn relayer_router(state: RelayerState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/relay", post(post_relay))
        .route("/api/relay", post(post_relay))
        .with_state(state)
}

/// CORS for browser scanners: `GET`/`POST` with the relay auth header from
/// the configured origins. A `"*"` entry allows any origin without
/// credentials.
///
/// # Errors
///
/// Returns an error if an origin is not a valid header value.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, InvalidHeaderValue> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(RELAY_AUTH_HEADER)]);
    if origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(cors::Any));
    }
    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer
        .allow_origin(cors::AllowOrigin::list(origins))
        .allow_credentials(true))
}
