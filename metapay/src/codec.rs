//! Envelope serialization for out-of-band transport.
//!
//! The encoded form is compact JSON in struct field order. It is what gets
//! rendered into a QR code and what the relay receives as its request body.

use serde_json::Value;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::FieldIssue;
use crate::schema;
use crate::types::RelayPayload;

/// Errors from encoding or decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input is not JSON, or a value could not be (de)serialized.
    #[error("malformed envelope: {0}")]
    Syntax(#[from] serde_json::Error),
    /// The input is JSON but one or more fields are invalid.
    #[error("invalid envelope: {} offending field(s)", .0.len())]
    Invalid(Vec<FieldIssue>),
}

/// Encodes an envelope for transport.
///
/// # Errors
///
/// Returns [`CodecError::Syntax`] if serialization fails.
pub fn encode(payload: &RelayPayload) -> Result<String, CodecError> {
    Ok(serde_json::to_string(payload)?)
}

/// Decodes and validates an envelope from text.
///
/// # Errors
///
/// Returns [`CodecError::Syntax`] for malformed JSON and
/// [`CodecError::Invalid`] listing every offending field otherwise.
pub fn decode(input: &str) -> Result<RelayPayload, CodecError> {
    decode_slice(input.as_bytes())
}

/// Decodes and validates an envelope from raw bytes.
///
/// # Errors
///
/// See [`decode`].
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(len = input.len())))]
pub fn decode_slice(input: &[u8]) -> Result<RelayPayload, CodecError> {
    let value: Value = serde_json::from_slice(input)?;
    schema::validate(&value).map_err(CodecError::Invalid)?;
    Ok(serde_json::from_value(value)?)
}
