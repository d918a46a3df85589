//! HTTP mapping of relay errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use metapay::RelayError;

/// A [`RelayError`] on its way out of a handler.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct RelayerError(#[from] pub RelayError);

impl RelayerError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            RelayError::Authentication => StatusCode::UNAUTHORIZED,
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Validation(_)
            | RelayError::DomainMismatch { .. }
            | RelayError::Expired { .. }
            | RelayError::SignatureInvalid => StatusCode::BAD_REQUEST,
            RelayError::NonceMismatch { .. } => StatusCode::CONFLICT,
            RelayError::Execution { .. } => StatusCode::BAD_GATEWAY,
            RelayError::ExecutionTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            RelayError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal relay fault");
            }
            RelayError::Transient(detail) => {
                tracing::warn!(error = %detail, "Chain unavailable");
            }
            _ => {}
        }
        (status, Json(self.0.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RelayError::Authentication, StatusCode::UNAUTHORIZED),
            (RelayError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (RelayError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (RelayError::SignatureInvalid, StatusCode::BAD_REQUEST),
            (
                RelayError::NonceMismatch {
                    expected: U256::from(1),
                    received: U256::ZERO,
                },
                StatusCode::CONFLICT,
            ),
            (
                RelayError::Execution {
                    tx_hash: None,
                    message: "reverted".to_owned(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                RelayError::ExecutionTimeout {
                    tx_hash: None,
                    waited_secs: 60,
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                RelayError::Transient("refused".to_owned()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RelayError::Internal("boom".to_owned()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(RelayerError(error).status(), status);
        }
    }
}
