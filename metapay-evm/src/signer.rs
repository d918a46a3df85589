//! Typed-data signing of forward requests.
//!
//! Signing is delegated to a [`SignerLike`] capability, so the key may live in
//! local memory, a hardware device or a remote wallet. A declined or failed
//! typed-data signature is an error; there is no fallback to plain-message
//! signing, which a typed-data verifier would reject anyway.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_signer_local::PrivateKeySigner;
use metapay::ForwardRequest;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::domain::ForwarderDomain;
use crate::types::signing_hash;

/// A trait that abstracts signing operations, allowing both owned signers and Arc-wrapped signers.
///
/// This is necessary because Alloy's `Signer` trait is not implemented for `Arc<T>`,
/// but callers may want to share one signer between a request builder and other tasks.
pub trait SignerLike: Send + Sync {
    /// Returns the address of the signer.
    fn address(&self) -> Address;

    /// Signs the given hash.
    fn sign_hash(
        &self,
        hash: &B256,
    ) -> impl Future<Output = Result<Signature, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

impl<T: SignerLike + Send + Sync> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Errors from signing a forward request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The request names a different signer than the one asked to sign it.
    #[error("request is from {request}, but the signer is {signer}")]
    SignerMismatch {
        /// `from` of the request.
        request: Address,
        /// Address of the signing capability.
        signer: Address,
    },
    /// The signing capability refused or failed.
    #[error("signer declined: {0}")]
    Declined(#[from] alloy_signer::Error),
}

/// Signs `request` as EIP-712 typed data under `domain`.
///
/// Returns the raw 65-byte `r || s || v` signature.
///
/// # Errors
///
/// Returns [`SigningError::SignerMismatch`] if `request.from` is not the
/// signer, or [`SigningError::Declined`] if the capability fails.
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
    from = %request.from,
    chain_id = domain.chain_id
)))]
pub async fn sign_forward_request<S: SignerLike>(
    signer: &S,
    domain: &ForwarderDomain,
    request: &ForwardRequest,
) -> Result<Bytes, SigningError> {
    let address = signer.address();
    if request.from != address {
        return Err(SigningError::SignerMismatch {
            request: request.from,
            signer: address,
        });
    }
    let hash = signing_hash(request, domain);
    let signature = signer.sign_hash(&hash).await?;
    Ok(signature.as_bytes().into())
}
