//! The EIP-712 typed form of a forward request.
//!
//! The wire [`ForwardRequest`] is converted field-by-field into the Solidity
//! struct [`SolForwardRequest`]; its signing hash covers every field.

use alloy_primitives::{B256, U256};
use alloy_sol_types::SolStruct;
use metapay::ForwardRequest;

pub use crate::contract::IForwarder::ForwardRequest as SolForwardRequest;
use crate::domain::ForwarderDomain;

impl From<&ForwardRequest> for SolForwardRequest {
    fn from(request: &ForwardRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            value: request.value.into(),
            gas: request.gas.into(),
            nonce: request.nonce.into(),
            deadline: U256::from(request.deadline.as_secs()),
            data: request.data.clone(),
        }
    }
}

/// Returns the EIP-712 hash a signer signs for `request` under `domain`.
#[must_use]
pub fn signing_hash(request: &ForwardRequest, domain: &ForwarderDomain) -> B256 {
    SolForwardRequest::from(request).eip712_signing_hash(&domain.eip712_domain())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use metapay::{DecimalU256, UnixTimestamp};

    fn request() -> ForwardRequest {
        ForwardRequest {
            from: Address::repeat_byte(0xaa),
            to: Address::repeat_byte(0xbb),
            value: DecimalU256::from(1_000_000_000_000_000_000_u64),
            gas: DecimalU256::from(200_000_u64),
            nonce: DecimalU256::from(0_u64),
            deadline: UnixTimestamp::from_secs(1_735_689_600),
            data: Bytes::from_static(b"\x01\x02"),
        }
    }

    #[test]
    fn test_type_string_matches_forwarder() {
        assert_eq!(
            SolForwardRequest::eip712_encode_type(),
            "ForwardRequest(address from,address to,uint256 value,uint256 gas,uint256 nonce,uint256 deadline,bytes data)"
        );
    }

    #[test]
    fn test_every_field_changes_hash() {
        let domain = ForwarderDomain::new(80002, Address::repeat_byte(0x11));
        let base = request();
        let original = signing_hash(&base, &domain);

        let mut variants = Vec::new();
        let mut r = base.clone();
        r.from = Address::repeat_byte(0xab);
        variants.push(r);
        let mut r = base.clone();
        r.to = Address::repeat_byte(0xbc);
        variants.push(r);
        let mut r = base.clone();
        r.value = DecimalU256::from(2_000_000_000_000_000_000_u64);
        variants.push(r);
        let mut r = base.clone();
        r.gas = DecimalU256::from(200_001_u64);
        variants.push(r);
        let mut r = base.clone();
        r.nonce = DecimalU256::from(1_u64);
        variants.push(r);
        let mut r = base.clone();
        r.deadline = UnixTimestamp::from_secs(1_735_689_601);
        variants.push(r);
        let mut r = base;
        r.data = Bytes::from_static(b"\x01\x03");
        variants.push(r);

        for variant in &variants {
            assert_ne!(signing_hash(variant, &domain), original);
        }
    }
}
