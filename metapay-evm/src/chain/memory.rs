//! In-memory forwarder.
//!
//! Holds authoritative counters, verifies signatures locally under its own
//! domain, and "mines" one block per execution. Faults can be injected to
//! exercise the relay's failure paths without a node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use async_trait::async_trait;
use metapay::ForwardRequest;

use super::{ChainError, ExecutionReceipt, ForwarderChain};
use crate::domain::ForwarderDomain;
use crate::verify::verify_local;

/// Gas reported for every execution.
const EXECUTION_GAS_USED: u64 = 61_000;

/// A failure to inject into [`MemoryForwarder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Executions are mined but revert.
    Revert,
    /// Every call fails as if the node were down.
    Unreachable,
    /// Executions never complete.
    Stall,
}

#[derive(Debug, Default)]
struct State {
    counters: HashMap<Address, U256>,
    block_number: u64,
    fault: Option<Fault>,
}

/// In-memory [`ForwarderChain`].
#[derive(Debug)]
pub struct MemoryForwarder {
    domain: ForwarderDomain,
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MemoryForwarder {
    /// Creates a forwarder with all counters at zero.
    #[must_use]
    pub fn new(domain: ForwarderDomain) -> Self {
        Self {
            domain,
            state: Mutex::new(State::default()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the domain signatures are verified under.
    #[must_use]
    pub const fn domain(&self) -> &ForwarderDomain {
        &self.domain
    }

    /// Number of adapter calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the counter of `signer`.
    #[must_use]
    pub fn counter(&self, signer: Address) -> U256 {
        self.lock().counters.get(&signer).copied().unwrap_or_default()
    }

    /// Sets the counter of `signer`.
    pub fn set_counter(&self, signer: Address, counter: U256) {
        self.lock().counters.insert(signer, counter);
    }

    /// Injects a fault, or clears it with `None`.
    pub fn inject(&self, fault: Option<Fault>) {
        self.lock().fault = fault;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and fails it if the node is "down".
    fn enter(&self) -> Result<Option<Fault>, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.lock().fault {
            Some(Fault::Unreachable) => Err(ChainError::Unavailable(
                "connection refused".to_owned(),
            )),
            fault => Ok(fault),
        }
    }

    /// Mirrors the forwarder's `verify`: signer recovery plus counter equality.
    fn verifies(&self, request: &ForwardRequest, signature: &[u8]) -> bool {
        verify_local(&self.domain, request, signature)
            && self.counter(request.from) == request.nonce.0
    }
}

#[async_trait]
impl ForwarderChain for MemoryForwarder {
    async fn current_counter(&self, signer: Address) -> Result<U256, ChainError> {
        self.enter()?;
        Ok(self.counter(signer))
    }

    async fn verify_signature(
        &self,
        _domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
    ) -> Result<bool, ChainError> {
        self.enter()?;
        Ok(self.verifies(request, signature))
    }

    async fn execute(
        &self,
        _domain: &ForwarderDomain,
        request: &ForwardRequest,
        signature: &Bytes,
        _value: U256,
        _gas: u64,
    ) -> Result<ExecutionReceipt, ChainError> {
        let fault = self.enter()?;
        if fault == Some(Fault::Stall) {
            std::future::pending::<()>().await;
        }

        let signed = verify_local(&self.domain, request, signature);

        // counter check and increment are one critical section
        let mut state = self.lock();
        state.block_number += 1;
        let tx_hash = transaction_hash(state.block_number, signature);
        let counter = state.counters.entry(request.from).or_default();
        if fault == Some(Fault::Revert) || !signed || *counter != request.nonce.0 {
            return Err(ChainError::Reverted { tx_hash });
        }
        *counter += U256::from(1);
        Ok(ExecutionReceipt {
            tx_hash,
            block_number: state.block_number,
            gas_used: EXECUTION_GAS_USED,
        })
    }
}

fn transaction_hash(block_number: u64, signature: &[u8]) -> B256 {
    let mut preimage = block_number.to_be_bytes().to_vec();
    preimage.extend_from_slice(signature);
    keccak256(preimage)
}
