//! Assembling canonical payment requests.
//!
//! [`RequestBuilder`] turns a [`PaymentIntent`] (who to pay, how much, why and
//! for how long) into an unsigned [`ForwardRequest`] that calls the
//! recipient's `pay(amount, reference)` with the amount attached as value.
//! The counter is always read from the chain adapter, never guessed locally.

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use metapay::amount::{AmountError, parse_amount, parse_units};
use metapay::{ForwardRequest, RelayPayload, UnixTimestamp};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::{ChainError, ForwarderChain};
use crate::contract::IRecipient;
use crate::domain::ForwarderDomain;
use crate::signer::{SignerLike, SigningError, sign_forward_request};

/// Gas budget for the forwarded call when the intent does not set one.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Validity window offered by payment screens, in minutes.
pub const DEFAULT_VALIDITY_MINUTES: u64 = 10;

/// Default cap on the reference length, in bytes.
pub const DEFAULT_MAX_REFERENCE_LEN: usize = 256;

/// What the payer wants to pay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Recipient contract.
    pub target: Address,
    /// Amount in smallest units, as typed by the payer.
    pub amount: String,
    /// Free-text payment reference, e.g. an invoice number.
    pub reference: String,
    /// How long the signed request stays valid.
    pub validity_minutes: u64,
    /// Gas budget override.
    pub gas_limit: Option<u64>,
}

impl PaymentIntent {
    /// Creates an intent with the default validity window and gas budget.
    pub fn new(target: Address, amount: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            target,
            amount: amount.into(),
            reference: reference.into(),
            validity_minutes: DEFAULT_VALIDITY_MINUTES,
            gas_limit: None,
        }
    }

    /// Sets the amount from a human decimal value such as `"1.5"`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidAmount`] if `amount` does not parse with
    /// `decimals` fractional digits.
    pub fn with_decimal_amount(mut self, amount: &str, decimals: u8) -> Result<Self, BuildError> {
        self.amount = parse_units(amount, decimals)?.to_string();
        Ok(self)
    }

    /// Sets the validity window.
    #[must_use]
    pub const fn with_validity_minutes(mut self, minutes: u64) -> Self {
        self.validity_minutes = minutes;
        self
    }

    /// Overrides the gas budget.
    #[must_use]
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Errors from building a request.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The amount is not a non-negative integer.
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),
    /// The amount is zero and zero-value requests are not allowed.
    #[error("amount must be greater than zero")]
    ZeroAmount,
    /// The reference is empty.
    #[error("reference must not be empty")]
    EmptyReference,
    /// The reference exceeds the configured cap.
    #[error("reference is {len} bytes, at most {max} allowed")]
    ReferenceTooLong {
        /// Length of the reference.
        len: usize,
        /// Configured cap.
        max: usize,
    },
    /// The validity window is zero or overflows the clock.
    #[error("validity window must be a positive number of minutes")]
    InvalidValidity,
    /// The signer's counter could not be read.
    #[error("failed to read counter: {0}")]
    Counter(#[source] ChainError),
    /// The signer did not produce a signature.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Builds unsigned and signed payment requests for one signer.
#[derive(Debug, Clone)]
pub struct RequestBuilder<C, S> {
    chain: C,
    signer: S,
    default_gas_limit: u64,
    allow_zero_amount: bool,
    max_reference_len: usize,
}

impl<C: ForwarderChain, S: SignerLike> RequestBuilder<C, S> {
    /// Creates a builder reading counters from `chain` for `signer`.
    pub const fn new(chain: C, signer: S) -> Self {
        Self {
            chain,
            signer,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            allow_zero_amount: false,
            max_reference_len: DEFAULT_MAX_REFERENCE_LEN,
        }
    }

    /// Sets the gas budget used when an intent does not override it.
    #[must_use]
    pub const fn with_default_gas_limit(mut self, gas_limit: u64) -> Self {
        self.default_gas_limit = gas_limit;
        self
    }

    /// Allows zero-amount requests, e.g. for test payments.
    #[must_use]
    pub const fn allow_zero_amount(mut self, allow: bool) -> Self {
        self.allow_zero_amount = allow;
        self
    }

    /// Caps the reference length in bytes.
    #[must_use]
    pub const fn with_max_reference_len(mut self, max: usize) -> Self {
        self.max_reference_len = max;
        self
    }

    /// Returns the signer.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// Builds an unsigned request valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the intent is invalid or the counter cannot be read.
    pub async fn build(&self, intent: &PaymentIntent) -> Result<ForwardRequest, BuildError> {
        self.build_at(intent, UnixTimestamp::now()).await
    }

    /// Builds an unsigned request with the validity window starting at `now`.
    ///
    /// # Errors
    ///
    /// See [`build`](Self::build).
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        target = %intent.target,
        amount = %intent.amount
    )))]
    pub async fn build_at(
        &self,
        intent: &PaymentIntent,
        now: UnixTimestamp,
    ) -> Result<ForwardRequest, BuildError> {
        let amount = parse_amount(&intent.amount)?;
        if amount.is_zero() && !self.allow_zero_amount {
            return Err(BuildError::ZeroAmount);
        }
        if intent.reference.trim().is_empty() {
            return Err(BuildError::EmptyReference);
        }
        if intent.reference.len() > self.max_reference_len {
            return Err(BuildError::ReferenceTooLong {
                len: intent.reference.len(),
                max: self.max_reference_len,
            });
        }
        let deadline = deadline_after(now, intent.validity_minutes)?;

        let data = IRecipient::payCall {
            amount,
            reference: intent.reference.clone(),
        }
        .abi_encode();

        let from = self.signer.address();
        let nonce = self
            .chain
            .current_counter(from)
            .await
            .map_err(BuildError::Counter)?;

        Ok(ForwardRequest {
            from,
            to: intent.target,
            value: amount.into(),
            gas: U256::from(intent.gas_limit.unwrap_or(self.default_gas_limit)).into(),
            nonce: nonce.into(),
            deadline,
            data: data.into(),
        })
    }

    /// Builds and signs a request, returning the transport envelope.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if building or signing fails.
    pub async fn build_signed(
        &self,
        domain: &ForwarderDomain,
        intent: &PaymentIntent,
    ) -> Result<RelayPayload, BuildError> {
        let request = self.build(intent).await?;
        let signature = sign_forward_request(&self.signer, domain, &request).await?;
        Ok(domain.envelope(request, signature))
    }
}

fn deadline_after(now: UnixTimestamp, minutes: u64) -> Result<UnixTimestamp, BuildError> {
    if minutes == 0 {
        return Err(BuildError::InvalidValidity);
    }
    minutes
        .checked_mul(60)
        .and_then(|secs| now.checked_add_secs(secs))
        .ok_or(BuildError::InvalidValidity)
}
