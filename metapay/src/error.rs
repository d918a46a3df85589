//! Error taxonomy of the relay admission protocol.
//!
//! [`RelayError`] is what the relay returns for a rejected or failed envelope.
//! Errors are split into four [`FailureClass`]es: pre-submission rejections
//! (no side effects, fixable by rebuilding the request), execution failures
//! (the call was submitted and chain state may have changed), transient chain
//! unavailability, and internal faults.
//!
//! [`ErrorBody`] is the JSON error object sent to relay callers, with a
//! machine-readable [`ErrorReason`].

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::timestamp::UnixTimestamp;

/// A single offending field found during schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Dotted path of the field, e.g. `request.nonce`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldIssue {
    /// Creates a new field issue.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Which part of the signing domain disagreed with the relay configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainField {
    /// The EIP-155 chain id.
    ChainId,
    /// The verifying forwarder contract.
    Forwarder,
}

impl core::fmt::Display for DomainField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ChainId => f.write_str("chain ID"),
            Self::Forwarder => f.write_str("forwarder address"),
        }
    }
}

/// Errors returned by the relay for a single envelope.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    /// The transport MAC is missing or does not match the body.
    #[error("Invalid or missing relay authentication")]
    Authentication,
    /// The client exceeded its request quota.
    #[error("Too many requests, please try again later")]
    RateLimited,
    /// The request body exceeds the relay's size limit.
    #[error("Request body too large")]
    PayloadTooLarge,
    /// One or more envelope fields are malformed.
    #[error("Invalid request format")]
    Validation(Vec<FieldIssue>),
    /// The envelope targets another deployment.
    #[error("Invalid {field}")]
    DomainMismatch {
        /// The mismatching domain component.
        field: DomainField,
        /// Value configured on the relay.
        expected: String,
        /// Value declared by the envelope.
        received: String,
    },
    /// The request deadline has passed.
    #[error("Request expired")]
    Expired {
        /// Deadline declared by the request.
        deadline: UnixTimestamp,
        /// Relay time at admission.
        now: UnixTimestamp,
    },
    /// The request counter is not the signer's current on-chain counter.
    #[error("Invalid nonce")]
    NonceMismatch {
        /// Current on-chain counter.
        expected: U256,
        /// Counter carried by the request.
        received: U256,
    },
    /// The signature does not authorize this request under the relay's domain.
    #[error("Invalid signature")]
    SignatureInvalid,
    /// The call was submitted but did not execute successfully.
    #[error("Execution failed: {message}")]
    Execution {
        /// Hash of the submitted transaction, if one was broadcast.
        tx_hash: Option<B256>,
        /// Diagnostic reported by the chain adapter.
        message: String,
    },
    /// The call was submitted but no receipt arrived within the bounded wait.
    #[error("Execution not confirmed within {waited_secs}s")]
    ExecutionTimeout {
        /// Hash of the submitted transaction, if known.
        tx_hash: Option<B256>,
        /// How long the relay waited.
        waited_secs: u64,
    },
    /// The chain could not be reached; safe to retry with the same envelope.
    #[error("Chain temporarily unavailable: {0}")]
    Transient(String),
    /// Unexpected relay fault.
    #[error("Internal server error")]
    Internal(String),
}

/// Coarse classification of a [`RelayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Rejected before submission; no side effects.
    Rejected,
    /// Failed at or after submission; chain state may have changed.
    Execution,
    /// The chain was unreachable before submission.
    Transient,
    /// Relay fault.
    Internal,
}

impl RelayError {
    /// Returns the machine-readable reason code.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Authentication => ErrorReason::AuthenticationFailed,
            Self::RateLimited => ErrorReason::RateLimited,
            Self::PayloadTooLarge => ErrorReason::PayloadTooLarge,
            Self::Validation(_) => ErrorReason::InvalidFormat,
            Self::DomainMismatch { .. } => ErrorReason::DomainMismatch,
            Self::Expired { .. } => ErrorReason::Expired,
            Self::NonceMismatch { .. } => ErrorReason::NonceMismatch,
            Self::SignatureInvalid => ErrorReason::InvalidSignature,
            Self::Execution { .. } => ErrorReason::ExecutionFailed,
            Self::ExecutionTimeout { .. } => ErrorReason::ExecutionTimeout,
            Self::Transient(_) => ErrorReason::ChainUnavailable,
            Self::Internal(_) => ErrorReason::UnexpectedError,
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Authentication
            | Self::RateLimited
            | Self::PayloadTooLarge
            | Self::Validation(_)
            | Self::DomainMismatch { .. }
            | Self::Expired { .. }
            | Self::NonceMismatch { .. }
            | Self::SignatureInvalid => FailureClass::Rejected,
            Self::Execution { .. } | Self::ExecutionTimeout { .. } => FailureClass::Execution,
            Self::Transient(_) => FailureClass::Transient,
            Self::Internal(_) => FailureClass::Internal,
        }
    }

    /// Returns `true` if the failure happened before anything was submitted.
    #[must_use]
    pub const fn is_pre_submission(&self) -> bool {
        !matches!(self.class(), FailureClass::Execution)
    }

    /// Builds the JSON error object returned to callers.
    ///
    /// Internal faults and transport diagnostics are not exposed.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let mut body = ErrorBody::new(self.reason(), self.to_string());
        match self {
            Self::Validation(issues) => body.details = Some(issues.clone()),
            Self::DomainMismatch {
                expected, received, ..
            } => {
                body.expected = Some(expected.clone());
                body.received = Some(received.clone());
            }
            Self::Expired { deadline, now } => {
                body.expected = Some(format!("deadline >= {now}"));
                body.received = Some(deadline.to_string());
            }
            Self::NonceMismatch { expected, received } => {
                body.expected = Some(expected.to_string());
                body.received = Some(received.to_string());
            }
            Self::Execution { tx_hash, .. } | Self::ExecutionTimeout { tx_hash, .. } => {
                body.tx_hash = *tx_hash;
            }
            Self::Transient(_) => body.error = "Chain temporarily unavailable".to_owned(),
            Self::Authentication
            | Self::RateLimited
            | Self::PayloadTooLarge
            | Self::SignatureInvalid
            | Self::Internal(_) => {}
        }
        body
    }
}

/// Machine-readable error reason codes for relay failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// Transport MAC missing or wrong.
    AuthenticationFailed,
    /// Too many requests from this client.
    RateLimited,
    /// Request body over the size limit.
    PayloadTooLarge,
    /// Envelope fields are malformed.
    InvalidFormat,
    /// Wrong chain id or forwarder.
    DomainMismatch,
    /// Deadline has passed.
    Expired,
    /// Counter is not current.
    NonceMismatch,
    /// Signature verification failed.
    InvalidSignature,
    /// Submitted call reverted or could not be mined.
    ExecutionFailed,
    /// Submitted call was not confirmed in time.
    ExecutionTimeout,
    /// Chain RPC unreachable.
    ChainUnavailable,
    /// An unexpected error occurred.
    UnexpectedError,
}

impl ErrorReason {
    /// Returns the `snake_case` string representation matching the wire format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::RateLimited => "rate_limited",
            Self::PayloadTooLarge => "payload_too_large",
            Self::InvalidFormat => "invalid_format",
            Self::DomainMismatch => "domain_mismatch",
            Self::Expired => "expired",
            Self::NonceMismatch => "nonce_mismatch",
            Self::InvalidSignature => "invalid_signature",
            Self::ExecutionFailed => "execution_failed",
            Self::ExecutionTimeout => "execution_timeout",
            Self::ChainUnavailable => "chain_unavailable",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl core::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON error object returned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Human-readable summary.
    pub error: String,
    /// Machine-readable reason.
    pub reason: ErrorReason,
    /// Offending fields, for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldIssue>>,
    /// Value the relay expected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Value the relay received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    /// Submitted transaction, for execution failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
}

impl ErrorBody {
    /// Creates an error body with only a reason and message.
    pub fn new(reason: ErrorReason, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason,
            details: None,
            expected: None,
            received: None,
            tx_hash: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_mismatch_body_carries_both_counters() {
        let err = RelayError::NonceMismatch {
            expected: U256::from(4),
            received: U256::from(3),
        };
        let body = err.to_body();
        assert_eq!(body.reason, ErrorReason::NonceMismatch);
        assert_eq!(body.expected.as_deref(), Some("4"));
        assert_eq!(body.received.as_deref(), Some("3"));
        assert!(err.is_pre_submission());
    }

    #[test]
    fn test_internal_error_does_not_leak_message() {
        let err = RelayError::Internal("db password is hunter2".into());
        let json = serde_json::to_string(&err.to_body()).unwrap();
        assert!(!json.contains("hunter2"));
        assert_eq!(err.class(), FailureClass::Internal);
    }

    #[test]
    fn test_transient_error_hides_transport_detail() {
        let err = RelayError::Transient("connection refused 10.0.0.3:8545".into());
        let body = err.to_body();
        assert!(!body.error.contains("10.0.0.3"));
        assert_eq!(body.reason, ErrorReason::ChainUnavailable);
    }

    #[test]
    fn test_execution_failures_are_not_rejections() {
        let err = RelayError::Execution {
            tx_hash: Some(B256::repeat_byte(0x11)),
            message: "reverted".into(),
        };
        assert_eq!(err.class(), FailureClass::Execution);
        assert!(!err.is_pre_submission());
        let body = err.to_body();
        assert_eq!(body.tx_hash, Some(B256::repeat_byte(0x11)));
        assert_eq!(body.reason.as_str(), "execution_failed");
    }

    #[test]
    fn test_validation_body_lists_fields() {
        let err = RelayError::Validation(vec![
            FieldIssue::new("request.from", "Invalid from address"),
            FieldIssue::new("signature", "Invalid signature"),
        ]);
        let value = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(value["reason"], "invalid_format");
        assert_eq!(value["details"][0]["field"], "request.from");
        assert_eq!(value["details"][1]["field"], "signature");
        assert!(value.get("txHash").is_none());
    }
}
