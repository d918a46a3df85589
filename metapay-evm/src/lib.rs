#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) support for offline-signed meta-transaction payments.
//!
//! A payer signs a [`ForwardRequest`](metapay::ForwardRequest) as EIP-712
//! typed data bound to a trusted forwarder contract. A relayer later submits
//! the request through the forwarder's `execute`, paying gas on the payer's
//! behalf; the forwarder checks the signature and the per-signer counter and
//! calls the target with the payer appended as the original sender.
//!
//! # Modules
//!
//! - [`domain`] - The EIP-712 domain a signature is bound to
//! - [`types`] - The typed `ForwardRequest` struct and its signing hash
//! - [`contract`] - ABI bindings for the forwarder and the payment recipient
//! - [`signer`] - Typed-data signing through any key-holding capability
//! - [`verify`] - Local signer recovery
//! - [`builder`] - Assembling canonical payment requests
//! - [`chain`] - The chain adapter: counters, verification and execution
//!
//! # Feature Flags
//!
//! - `provider` - [`Eip155Forwarder`](chain::Eip155Forwarder), the JSON-RPC chain adapter
//! - `telemetry` - Tracing instrumentation

pub mod builder;
pub mod chain;
pub mod contract;
pub mod domain;
pub mod signer;
pub mod types;
pub mod verify;

pub use builder::{BuildError, PaymentIntent, RequestBuilder};
pub use chain::{ChainError, ExecutionReceipt, ForwarderChain, MemoryForwarder};
#[cfg(feature = "provider")]
pub use chain::{Eip155Forwarder, ForwarderProviderConfig};
pub use domain::ForwarderDomain;
pub use signer::{SignerLike, SigningError, sign_forward_request};
pub use verify::{VerifyError, recover_signer, verify_local};
