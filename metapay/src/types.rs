//! Wire format of meta-transaction requests, relay envelopes and receipts.
//!
//! All integers that may exceed 53 bits travel as decimal-digit strings, byte
//! strings as `0x`-prefixed hex, and addresses as `0x`-prefixed 20-byte hex.
//!
//! ```json
//! {
//!   "request": {
//!     "from": "0x...", "to": "0x...", "value": "1000000000000000000",
//!     "gas": "200000", "nonce": "0", "deadline": "1735689600", "data": "0x..."
//!   },
//!   "chainId": 80002,
//!   "forwarder": "0x...",
//!   "signature": "0x<130 hex chars>"
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::timestamp::UnixTimestamp;

/// Length in bytes of a raw `r || s || v` ECDSA signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// A 256-bit unsigned integer serialized as a decimal-digit string.
///
/// Amounts, gas limits and counters are all `uint256` on-chain; decimal strings
/// keep them lossless across JSON implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalU256(pub U256);

/// Error returned when a string is not a decimal `uint256`.
#[derive(Debug, thiserror::Error)]
#[error("expected a decimal uint256, got {0:?}")]
pub struct DecimalU256Error(String);

impl FromStr for DecimalU256 {
    type Err = DecimalU256Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalU256Error(s.to_owned()));
        }
        U256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|_| DecimalU256Error(s.to_owned()))
    }
}

impl fmt::Display for DecimalU256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DecimalU256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DecimalU256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<U256> for DecimalU256 {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for DecimalU256 {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<DecimalU256> for U256 {
    fn from(value: DecimalU256) -> Self {
        value.0
    }
}

/// The unsigned payment instruction authorized by `from`.
///
/// Every field is covered by the EIP-712 signature; changing any of them after
/// signing makes verification fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    /// Signer authorizing the call.
    pub from: Address,
    /// Contract or account the call is directed at.
    pub to: Address,
    /// Native currency attached to the call, in smallest units.
    pub value: DecimalU256,
    /// Gas budget the signer authorizes for the inner call.
    pub gas: DecimalU256,
    /// Signer's forwarder counter; must equal the on-chain value at execution.
    pub nonce: DecimalU256,
    /// The request is void once this time has passed.
    pub deadline: UnixTimestamp,
    /// Encoded target call (selector + arguments), transported byte-exact.
    pub data: Bytes,
}

/// The transport envelope exchanged out-of-band between payer and relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    /// The signed instruction.
    pub request: ForwardRequest,
    /// EIP-155 chain id of the signing domain.
    pub chain_id: u64,
    /// Verifying contract of the signing domain.
    pub forwarder: Address,
    /// 65-byte EIP-712 signature over `request`.
    pub signature: Bytes,
}

impl RelayPayload {
    /// Returns the signer of the carried request.
    #[must_use]
    pub const fn signer(&self) -> Address {
        self.request.from
    }
}

/// Successful relay response: where the meta-transaction was included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    /// Hash of the relayer's outer transaction.
    pub tx_hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Gas consumed by the outer transaction.
    pub gas_used: DecimalU256,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_decimal_u256_roundtrip_large_value() {
        let v: DecimalU256 = serde_json::from_str("\"1000000000000000000000000\"").unwrap();
        assert_eq!(
            serde_json::to_string(&v).unwrap(),
            "\"1000000000000000000000000\""
        );
    }

    #[test]
    fn test_decimal_u256_rejects_hex_and_signs() {
        assert!("0x10".parse::<DecimalU256>().is_err());
        assert!("-1".parse::<DecimalU256>().is_err());
        assert!("+1".parse::<DecimalU256>().is_err());
        assert!("".parse::<DecimalU256>().is_err());
    }

    #[test]
    fn test_decimal_u256_rejects_overflow() {
        let too_big = format!("{}0", U256::MAX);
        assert!(too_big.parse::<DecimalU256>().is_err());
    }

    #[test]
    fn test_relay_payload_uses_camel_case_keys() {
        let payload = RelayPayload {
            request: ForwardRequest {
                from: address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                to: address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
                value: DecimalU256::from(1_u64),
                gas: DecimalU256::from(200_000_u64),
                nonce: DecimalU256::from(0_u64),
                deadline: UnixTimestamp::from_secs(1_700_000_000),
                data: Bytes::from_static(&[0xde, 0xad]),
            },
            chain_id: 80002,
            forwarder: address!("0x1111111111111111111111111111111111111111"),
            signature: Bytes::from(vec![0u8; SIGNATURE_LENGTH]),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["chainId"], 80002);
        assert_eq!(value["request"]["gas"], "200000");
        assert_eq!(value["request"]["deadline"], "1700000000");
        assert_eq!(value["request"]["data"], "0xdead");
        assert!(value.get("chain_id").is_none());
    }
}
