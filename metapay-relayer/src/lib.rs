#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Relay service for offline-signed meta-transaction payments.
//!
//! Receives envelopes over an HMAC-authenticated HTTP channel, admits them
//! through a fixed sequence of checks and submits them to the forwarder
//! contract, paying gas on the signer's behalf.
//!
//! # Modules
//!
//! - [`pipeline`] - The admission pipeline: auth, schema, domain, expiry, counter, signature, execution
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - HTTP status mapping of relay errors
//! - [`rate_limit`] - Per-client request quota
//! - [`config`] - Server configuration with environment variable expansion
//! - [`client`] - HTTP client for submitting envelopes to a relay
//! - [`util`] - Graceful shutdown

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod rate_limit;
pub mod util;

pub use client::{RelayClient, RelayClientError};
pub use config::RelayerConfig;
pub use handlers::{RelayerState, relayer_router};
pub use pipeline::{AdmissionPipeline, SignatureCheck};
