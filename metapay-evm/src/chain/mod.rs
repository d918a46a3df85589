//! The chain adapter: the single boundary between metapay and the chain.
//!
//! The rest of the protocol only consumes three capabilities of the forwarder
//! deployment, captured by [`ForwarderChain`]:
//!
//! - read the current counter of a signer,
//! - check a signature against a request under a domain,
//! - execute a signed request and wait for a terminal receipt.
//!
//! # Implementations
//!
//! - [`Eip155Forwarder`] - JSON-RPC adapter backed by alloy (feature `provider`)
//! - [`MemoryForwarder`] - In-memory forwarder for tests and local development

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use metapay::ForwardRequest;

use crate::domain::ForwarderDomain;

mod memory;
#[cfg(feature = "provider")]
mod provider;

pub use memory::{Fault, MemoryForwarder};
#[cfg(feature = "provider")]
pub use provider::{Eip155Forwarder, ForwarderProviderConfig, PendingNonceManager};

/// Where an executed meta-transaction was included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// Hash of the outer transaction sent by the relayer.
    pub tx_hash: B256,
    /// Block number of inclusion.
    pub block_number: u64,
    /// Gas used by the outer transaction.
    pub gas_used: u64,
}

/// Errors reported by a chain adapter.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The chain could not be reached.
    #[error("chain unavailable: {0}")]
    Unavailable(String),
    /// The chain answered with an error for the call.
    #[error("contract call failed: {0}")]
    Contract(String),
    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: B256,
    },
    /// The transaction was sent but its receipt could not be obtained.
    #[error("receipt for {tx_hash} unavailable: {message}")]
    Receipt {
        /// Hash of the sent transaction.
        tx_hash: B256,
        /// Transport diagnostic.
        message: String,
    },
    /// The transaction was sent but not confirmed within the bounded wait.
    #[error("transaction {tx_hash} not confirmed within {waited_secs}s")]
    Timeout {
        /// Hash of the sent transaction.
        tx_hash: B256,
        /// How long the adapter waited.
        waited_secs: u64,
    },
}

impl ChainError {
    /// Returns `true` if retrying the same call later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Returns the hash of the sent transaction, if one was sent.
    #[must_use]
    pub const fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Reverted { tx_hash }
            | Self::Receipt { tx_hash, .. }
            | Self::Timeout { tx_hash, .. } => Some(*tx_hash),
            Self::Unavailable(_) | Self::Contract(_) => None,
        }
    }
}

/// The capabilities of a forwarder deployment that metapay consumes.
#[async_trait]
pub trait ForwarderChain: Send + Sync {
    /// Returns the current counter of `signer`.
    async fn current_counter(&self, signer: Address) -> Result<U256, ChainError>;

    /// Returns `true` if `signature` authorizes `request` under `domain`.
    async fn verify_signature(
        &self,
        domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<bool, ChainError>;

    /// Executes `request`, attaching `value` and budgeting `gas`, and waits for
    /// a terminal receipt.
    async fn execute(
        &self,
        domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
        value: U256,
        gas: u64,
    ) -> Result<ExecutionReceipt, ChainError>;
}

#[async_trait]
impl<T: ForwarderChain + ?Sized> ForwarderChain for Arc<T> {
    async fn current_counter(&self, signer: Address) -> Result<U256, ChainError> {
        (**self).current_counter(signer).await
    }

    async fn verify_signature(
        &self,
        domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<bool, ChainError> {
        (**self).verify_signature(domain, request, signature).await
    }

    async fn execute(
        &self,
        domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
        value: U256,
        gas: u64,
    ) -> Result<ExecutionReceipt, ChainError> {
        (**self)
            .execute(domain, request, signature, value, gas)
            .await
    }
}
