//! Local recovery of the signer of a forward request.
//!
//! Mirrors what the forwarder's `verify` does for the signature part, without
//! a chain call. Only raw 65-byte EOA signatures are accepted.

use alloy_primitives::{Address, Signature, SignatureError};
use metapay::ForwardRequest;
use metapay::types::SIGNATURE_LENGTH;

use crate::domain::ForwarderDomain;
use crate::types::signing_hash;

/// Errors from recovering a signer.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The signature is not 65 bytes long.
    #[error("expected a 65-byte signature, got {0} bytes")]
    Length(usize),
    /// The bytes do not form a recoverable ECDSA signature.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Recovers the address that signed `request` under `domain`.
///
/// # Errors
///
/// Returns [`VerifyError`] if the signature is malformed or unrecoverable.
pub fn recover_signer(
    domain: &ForwarderDomain,
    request: &ForwardRequest,
    signature: &[u8],
) -> Result<Address, VerifyError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(VerifyError::Length(signature.len()));
    }
    let signature = Signature::from_raw(signature)?;
    let hash = signing_hash(request, domain);
    Ok(signature.recover_address_from_prehash(&hash)?)
}

/// Returns `true` if `signature` was produced by `request.from` under `domain`.
#[must_use]
pub fn verify_local(domain: &ForwarderDomain, request: &ForwardRequest, signature: &[u8]) -> bool {
    recover_signer(domain, request, signature).is_ok_and(|signer| signer == request.from)
}
