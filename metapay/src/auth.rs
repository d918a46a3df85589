//! HMAC transport authentication of relay requests.
//!
//! The relay and its callers share a secret. Every request body is tagged with
//! `HMAC-SHA256(secret, body)` as lowercase hex in the [`RELAY_AUTH_HEADER`]
//! header. This authenticates the caller to the relay and is independent of the
//! EIP-712 signature, which authenticates the payer to the chain.

use alloy_primitives::hex;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the hex-encoded MAC of the raw request body.
pub const RELAY_AUTH_HEADER: &str = "x-relay-auth";

type HmacSha256 = Hmac<Sha256>;

/// Errors from relay authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The shared secret is empty.
    #[error("relay authentication secret must not be empty")]
    EmptySecret,
    /// The tag is missing, malformed or does not match.
    #[error("invalid or missing relay authentication")]
    Rejected,
}

/// Computes and checks relay authentication tags.
#[derive(Clone)]
pub struct RelayAuth {
    mac: HmacSha256,
}

impl std::fmt::Debug for RelayAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayAuth").finish_non_exhaustive()
    }
}

impl RelayAuth {
    /// Creates an authenticator keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmptySecret`] if `secret` is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::EmptySecret)?;
        Ok(Self { mac })
    }

    /// Returns the lowercase hex tag of `body`.
    #[must_use]
    pub fn tag(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `tag` against `body` in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] when the tag is absent, not hex or wrong.
    pub fn verify(&self, body: &[u8], tag: Option<&str>) -> Result<(), AuthError> {
        let tag = tag.ok_or(AuthError::Rejected)?;
        let expected = hex::decode(tag.trim()).map_err(|_| AuthError::Rejected)?;
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| AuthError::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_matches_known_vector() {
        // RFC 4231 test case 2
        let auth = RelayAuth::new("Jefe").unwrap();
        assert_eq!(
            auth.tag(b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_accepts_own_tag() {
        let auth = RelayAuth::new("shared-secret").unwrap();
        let body = br#"{"chainId":80002}"#;
        let tag = auth.tag(body);
        assert!(auth.verify(body, Some(&tag)).is_ok());
    }

    #[test]
    fn test_verify_rejects_uniformly() {
        let auth = RelayAuth::new("shared-secret").unwrap();
        let body = b"payload";
        let other = RelayAuth::new("other-secret").unwrap().tag(body);
        assert_eq!(auth.verify(body, None), Err(AuthError::Rejected));
        assert_eq!(auth.verify(body, Some("zz")), Err(AuthError::Rejected));
        assert_eq!(auth.verify(body, Some(&other)), Err(AuthError::Rejected));
        assert_eq!(
            auth.verify(b"payload2", Some(&auth.tag(body))),
            Err(AuthError::Rejected)
        );
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert_eq!(RelayAuth::new("").unwrap_err(), AuthError::EmptySecret);
    }
}
