#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for offline-signed meta-transaction payments.
//!
//! A payer authors a [`ForwardRequest`](types::ForwardRequest) and signs it
//! without network access. The signed request travels out-of-band (usually as
//! the content of a QR code) inside a [`RelayPayload`](types::RelayPayload),
//! and a relay service later submits it on-chain on the payer's behalf.
//!
//! This crate is chain-agnostic apart from the 20-byte address and 256-bit
//! integer primitives. EIP-712 signing and the on-chain forwarder live in
//! `metapay-evm`; the relay HTTP service lives in `metapay-relayer`.
//!
//! # Modules
//!
//! - [`amount`] - Parsing of payment amounts into smallest currency units
//! - [`auth`] - HMAC transport authentication of relay requests
//! - [`codec`] - Envelope serialization for out-of-band transport
//! - [`error`] - Relay error taxonomy and wire error bodies
//! - [`schema`] - Field-level shape validation of untrusted envelopes
//! - [`timestamp`] - Unix timestamps serialized as decimal strings
//! - [`types`] - Wire format of requests, envelopes and receipts
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod auth;
pub mod codec;
pub mod error;
pub mod schema;
pub mod timestamp;
pub mod types;

pub use auth::{AuthError, RELAY_AUTH_HEADER, RelayAuth};
pub use error::{ErrorBody, ErrorReason, FailureClass, FieldIssue, RelayError};
pub use timestamp::UnixTimestamp;
pub use types::{DecimalU256, ForwardRequest, RelayPayload, RelayReceipt};
