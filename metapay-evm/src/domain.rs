//! The EIP-712 domain a forward request signature is bound to.
//!
//! The four domain values scope a signature to one forwarder deployment on one
//! chain. A signature produced under one domain never verifies under another.

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{Eip712Domain, eip712_domain};
use metapay::{ForwardRequest, RelayPayload};
use serde::{Deserialize, Serialize};

/// Domain name of the forwarder contract.
pub const DEFAULT_DOMAIN_NAME: &str = "MinimalForwarder";

/// Domain version of the forwarder contract.
pub const DEFAULT_DOMAIN_VERSION: &str = "0.0.1";

/// EIP-712 domain parameters of a forwarder deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderDomain {
    /// Human-readable protocol name.
    pub name: String,
    /// Protocol version.
    pub version: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Address of the forwarder contract.
    pub verifying_contract: Address,
}

impl ForwarderDomain {
    /// Creates the domain of a forwarder deployed at `verifying_contract`.
    #[must_use]
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_owned(),
            version: DEFAULT_DOMAIN_VERSION.to_owned(),
            chain_id,
            verifying_contract,
        }
    }

    /// Overrides the domain name and version.
    #[must_use]
    pub fn with_name_and_version(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self.version = version.into();
        self
    }

    /// Builds the alloy [`Eip712Domain`].
    #[must_use]
    pub fn eip712_domain(&self) -> Eip712Domain {
        eip712_domain! {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
        }
    }

    /// Wraps a signed request in a transport envelope bound to this domain.
    #[must_use]
    pub fn envelope(&self, request: ForwardRequest, signature: Bytes) -> RelayPayload {
        RelayPayload {
            request,
            chain_id: self.chain_id,
            forwarder: self.verifying_contract,
            signature,
        }
    }

    /// Returns `true` if `payload` declares this domain's chain and forwarder.
    #[must_use]
    pub fn matches(&self, payload: &RelayPayload) -> bool {
        payload.chain_id == self.chain_id && payload.forwarder == self.verifying_contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_defaults_match_forwarder_contract() {
        let domain = ForwarderDomain::new(
            80002,
            address!("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
        );
        let eip712 = domain.eip712_domain();
        assert_eq!(eip712.name.as_deref(), Some("MinimalForwarder"));
        assert_eq!(eip712.version.as_deref(), Some("0.0.1"));
        assert_eq!(eip712.chain_id, Some(alloy_primitives::U256::from(80002)));
        assert_eq!(eip712.verifying_contract, Some(domain.verifying_contract));
    }

    #[test]
    fn test_separator_changes_with_every_field() {
        let base = ForwarderDomain::new(1, Address::repeat_byte(0x11));
        let variants = [
            ForwarderDomain::new(2, Address::repeat_byte(0x11)),
            ForwarderDomain::new(1, Address::repeat_byte(0x22)),
            base.clone().with_name_and_version("OtherForwarder", "0.0.1"),
            base.clone().with_name_and_version("MinimalForwarder", "0.0.2"),
        ];
        let separator = base.eip712_domain().separator();
        for other in variants {
            assert_ne!(other.eip712_domain().separator(), separator);
        }
    }
}
