//! JSON-RPC forwarder adapter backed by alloy.
//!
//! Provides [`Eip155Forwarder`] with:
//! - Full filler stack (gas, blob gas, nonce, chain ID, wallet)
//! - [`PendingNonceManager`] so concurrent relays from one key get distinct nonces
//! - Automatic nonce reset on failed submissions
//! - Explicit `value` and gas limit taken from the signed request
//! - Receipt wait bounded by a configurable timeout

use std::sync::Arc;
use std::time::Duration;

use alloy_network::{EthereumWallet, Network, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, NonceManager,
    WalletFiller,
};
use alloy_provider::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use alloy_transport::{TransportError, TransportResult};
use async_trait::async_trait;
use dashmap::DashMap;
use metapay::ForwardRequest;
use tokio::sync::Mutex;
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;

use super::{ChainError, ExecutionReceipt, ForwarderChain};
use crate::contract::IForwarder;
use crate::domain::ForwarderDomain;
use crate::types::SolForwardRequest;

/// Nonce manager that queries pending transactions for the initial nonce.
///
/// - **First call per address**: queries with `.pending()` from RPC
/// - **Subsequent calls**: increments cached nonce locally
/// - **On failure**: [`reset_nonce`](Self::reset_nonce) forces re-query
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

const NONCE_UNSET: u64 = u64::MAX;

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let slot = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONCE_UNSET)));
            Arc::clone(entry.value())
        };

        let mut nonce = slot.lock().await;
        let next = if *nonce == NONCE_UNSET {
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }
}

impl PendingNonceManager {
    /// Resets the cached nonce for an address, forcing a fresh RPC query
    /// on next use.
    pub async fn reset_nonce(&self, address: Address) {
        if let Some(slot) = self.nonces.get(&address).map(|s| Arc::clone(s.value())) {
            *slot.lock().await = NONCE_UNSET;
        }
    }
}

/// Combined filler type: Gas + `BlobGas` + Nonce([`PendingNonceManager`]) + `ChainId`.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// Fully composed Ethereum provider with all fillers and wallet signing.
pub type FullProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Configuration for [`Eip155Forwarder`].
#[derive(Debug, Clone, Copy)]
pub struct ForwarderProviderConfig {
    /// Seconds to wait for a transaction receipt (default: 30).
    pub receipt_timeout_secs: u64,
    /// Block confirmations required before a receipt counts (default: 1).
    pub confirmations: u64,
}

impl Default for ForwarderProviderConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 30,
            confirmations: 1,
        }
    }
}

/// [`ForwarderChain`] over JSON-RPC.
///
/// Reads go through `eth_call` on the forwarder; executions are sent from the
/// relayer key with the request's `value` attached and its `gas` as the gas
/// limit, so no estimation happens.
#[derive(Debug)]
pub struct Eip155Forwarder {
    inner: FullProvider,
    forwarder: Address,
    relayer: Address,
    receipt_timeout: Duration,
    confirmations: u64,
    nonce_manager: PendingNonceManager,
}

impl Eip155Forwarder {
    /// Connects to `rpc_url`, sending transactions from `relayer`.
    #[must_use]
    pub fn new(
        rpc_url: Url,
        relayer: PrivateKeySigner,
        forwarder: Address,
        config: ForwarderProviderConfig,
    ) -> Self {
        let relayer_address = relayer.address();
        let nonce_manager = PendingNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );

        #[cfg(feature = "telemetry")]
        tracing::info!(rpc_url = %rpc_url, relayer = %relayer_address, forwarder = %forwarder, "Using forwarder provider");

        let inner: FullProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(EthereumWallet::from(relayer))
            .connect_http(rpc_url);

        Self {
            inner,
            forwarder,
            relayer: relayer_address,
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            confirmations: config.confirmations,
            nonce_manager,
        }
    }

    /// Address paying gas for executions.
    #[must_use]
    pub const fn relayer(&self) -> Address {
        self.relayer
    }

    /// Address of the forwarder contract counters are read from.
    #[must_use]
    pub const fn forwarder(&self) -> Address {
        self.forwarder
    }

    /// Returns the underlying provider.
    #[must_use]
    pub const fn provider(&self) -> &FullProvider {
        &self.inner
    }
}

#[async_trait]
impl ForwarderChain for Eip155Forwarder {
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(signer = %signer)))]
    async fn current_counter(&self, signer: Address) -> Result<U256, ChainError> {
        let forwarder = IForwarder::new(self.forwarder, &self.inner);
        Ok(forwarder.getNonce(signer).call().await?)
    }

    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(from = %request.from)))]
    async fn verify_signature(
        &self,
        domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<bool, ChainError> {
        let forwarder = IForwarder::new(domain.verifying_contract, &self.inner);
        Ok(forwarder
            .verify(SolForwardRequest::from(request), signature.clone())
            .call()
            .await?)
    }

    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        from = %request.from,
        nonce = %request.nonce,
        value = %value,
        gas = gas
    )))]
    async fn execute(
        &self,
        domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
        value: U256,
        gas: u64,
    ) -> Result<ExecutionReceipt, ChainError> {
        let call = IForwarder::executeCall {
            req: SolForwardRequest::from(request),
            signature: signature.clone(),
        };
        let tx = TransactionRequest::default()
            .with_from(self.relayer)
            .with_to(domain.verifying_contract)
            .with_input(call.abi_encode())
            .with_value(value)
            .with_gas_limit(gas);

        let pending = match self.inner.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce_manager.reset_nonce(self.relayer).await;
                return Err(e.into());
            }
        };
        let tx_hash = *pending.tx_hash();

        let watcher = pending
            .with_required_confirmations(self.confirmations)
            .get_receipt();
        let receipt = match tokio::time::timeout(self.receipt_timeout, watcher).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                self.nonce_manager.reset_nonce(self.relayer).await;
                return Err(ChainError::Receipt {
                    tx_hash,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                self.nonce_manager.reset_nonce(self.relayer).await;
                return Err(ChainError::Timeout {
                    tx_hash,
                    waited_secs: self.receipt_timeout.as_secs(),
                });
            }
        };

        if !receipt.status() {
            return Err(ChainError::Reverted { tx_hash });
        }
        Ok(ExecutionReceipt {
            tx_hash,
            block_number: receipt.block_number().unwrap_or_default(),
            gas_used: receipt.gas_used(),
        })
    }
}

impl From<TransportError> for ChainError {
    fn from(e: TransportError) -> Self {
        if e.is_error_resp() {
            Self::Contract(e.to_string())
        } else {
            Self::Unavailable(e.to_string())
        }
    }
}

impl From<alloy_contract::Error> for ChainError {
    fn from(e: alloy_contract::Error) -> Self {
        match e {
            alloy_contract::Error::TransportError(e) => e.into(),
            other => Self::Contract(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_new_does_not_touch_network() {
        let relayer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let expected = relayer.address();
        let forwarder = Eip155Forwarder::new(
            "http://127.0.0.1:1".parse().unwrap(),
            relayer,
            Address::repeat_byte(0x11),
            ForwarderProviderConfig::default(),
        );
        assert_eq!(forwarder.relayer(), expected);
        assert_eq!(forwarder.forwarder(), Address::repeat_byte(0x11));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transient() {
        let relayer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let forwarder = Eip155Forwarder::new(
            "http://127.0.0.1:1".parse().unwrap(),
            relayer,
            Address::repeat_byte(0x11),
            ForwarderProviderConfig::default(),
        );
        let err = forwarder
            .current_counter(Address::repeat_byte(0xaa))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
    }
}
