//! The relay admission pipeline.
//!
//! [`AdmissionPipeline::admit`] turns a raw request body into either a
//! confirmed execution or a rejection. Checks run in a fixed order and stop at
//! the first failure:
//!
//! 1. transport MAC over the raw body, before any parsing,
//! 2. envelope schema,
//! 3. domain pinning (chain id and forwarder),
//! 4. expiry,
//! 5. counter freshness against chain state,
//! 6. signature,
//! 7. execution with a bounded wait,
//! 8. receipt.
//!
//! Everything before step 7 is side-effect free. Failures from step 7 onward
//! are execution-class errors because the transaction may already be on-chain.
//!
//! Steps 5 to 8 run on a task owned by the pipeline, so a caller that goes
//! away mid-request does not abort an execution. [`AdmissionPipeline::drain`]
//! waits for those tasks on shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use dashmap::DashMap;
use metapay::codec::{self, CodecError};
use metapay::error::DomainField;
use metapay::{
    DecimalU256, FieldIssue, RelayAuth, RelayError, RelayPayload, RelayReceipt, UnixTimestamp,
};
use metapay_evm::{ChainError, ForwarderChain, ForwarderDomain, verify_local};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Default upper bound on the execution step.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(60);

type SignerLocks = DashMap<Address, Arc<Mutex<()>>>;

/// Where step 6 checks the signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureCheck {
    /// Ask the forwarder contract (`verify`).
    #[default]
    Chain,
    /// Recover the signer locally from the EIP-712 digest.
    Local,
}

/// The states an envelope passes through during admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    /// Body received, nothing checked yet.
    Received,
    /// Transport MAC matched.
    Authenticated,
    /// Envelope is well-formed.
    SchemaValid,
    /// Chain id and forwarder match the relay's deployment.
    DomainValid,
    /// Deadline has not passed.
    NotExpired,
    /// Counter equals the signer's on-chain counter.
    NonceCurrent,
    /// Signature authorizes the request.
    SignatureValid,
    /// Execution sent to the chain.
    Submitted,
    /// Execution confirmed.
    Confirmed,
    /// Execution reverted, failed or timed out.
    ExecutionFailed,
}

impl fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Authenticated => "authenticated",
            Self::SchemaValid => "schema_valid",
            Self::DomainValid => "domain_valid",
            Self::NotExpired => "not_expired",
            Self::NonceCurrent => "nonce_current",
            Self::SignatureValid => "signature_valid",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::ExecutionFailed => "execution_failed",
        };
        f.write_str(s)
    }
}

/// Server-side gatekeeper between received envelopes and the chain.
///
/// Holds only immutable configuration, the per-signer submission locks and
/// the tracker of running submissions, so one instance is shared by every
/// request handler.
pub struct AdmissionPipeline {
    auth: RelayAuth,
    domain: Arc<ForwarderDomain>,
    chain: Arc<dyn ForwarderChain>,
    signature_check: SignatureCheck,
    execution_timeout: Duration,
    signer_locks: Arc<SignerLocks>,
    submissions: TaskTracker,
}

impl fmt::Debug for AdmissionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPipeline")
            .field("domain", &self.domain)
            .field("signature_check", &self.signature_check)
            .field("execution_timeout", &self.execution_timeout)
            .field("in_flight", &self.submissions.len())
            .finish_non_exhaustive()
    }
}

impl AdmissionPipeline {
    /// Creates a pipeline pinned to `domain` and executing through `chain`.
    #[must_use]
    pub fn new(auth: RelayAuth, domain: ForwarderDomain, chain: Arc<dyn ForwarderChain>) -> Self {
        Self {
            auth,
            domain: Arc::new(domain),
            chain,
            signature_check: SignatureCheck::default(),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            signer_locks: Arc::new(DashMap::new()),
            submissions: TaskTracker::new(),
        }
    }

    /// Bounds the execution step.
    #[must_use]
    pub const fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Selects where signatures are checked.
    #[must_use]
    pub const fn with_signature_check(mut self, check: SignatureCheck) -> Self {
        self.signature_check = check;
        self
    }

    /// The domain envelopes are pinned to.
    #[must_use]
    pub fn domain(&self) -> &ForwarderDomain {
        &self.domain
    }

    /// Waits until every submission handed to the chain has finished.
    ///
    /// Envelopes admitted afterwards are still processed.
    pub async fn drain(&self) {
        self.submissions.close();
        self.submissions.wait().await;
        self.submissions.reopen();
    }

    /// Admits `body` authenticated by `tag`, at the current time.
    ///
    /// # Errors
    ///
    /// Returns the [`RelayError`] of the first failing step.
    pub async fn admit(&self, body: &[u8], tag: Option<&str>) -> Result<RelayReceipt, RelayError> {
        self.admit_at(body, tag, UnixTimestamp::now()).await
    }

    /// Admits `body` authenticated by `tag`, treating `now` as the current time.
    ///
    /// # Errors
    ///
    /// Returns the [`RelayError`] of the first failing step.
    pub async fn admit_at(
        &self,
        body: &[u8],
        tag: Option<&str>,
        now: UnixTimestamp,
    ) -> Result<RelayReceipt, RelayError> {
        stage(AdmissionStage::Received);

        self.auth
            .verify(body, tag)
            .map_err(|_| RelayError::Authentication)?;
        stage(AdmissionStage::Authenticated);

        let payload = codec::decode_slice(body).map_err(|e| match e {
            CodecError::Invalid(issues) => RelayError::Validation(issues),
            CodecError::Syntax(e) => {
                RelayError::Validation(vec![FieldIssue::new("body", e.to_string())])
            }
        })?;
        let gas = u64::try_from(payload.request.gas.0).map_err(|_| {
            RelayError::Validation(vec![FieldIssue::new(
                "request.gas",
                "gas exceeds the block gas range",
            )])
        })?;
        stage(AdmissionStage::SchemaValid);

        self.check_domain(&payload)?;
        stage(AdmissionStage::DomainValid);

        let deadline = payload.request.deadline;
        if deadline.is_expired_at(now) {
            return Err(RelayError::Expired { deadline, now });
        }
        stage(AdmissionStage::NotExpired);

        let submission = Submission {
            domain: Arc::clone(&self.domain),
            chain: Arc::clone(&self.chain),
            signature_check: self.signature_check,
            execution_timeout: self.execution_timeout,
            signer_locks: Arc::clone(&self.signer_locks),
            payload,
            gas,
        };
        self.submissions
            .spawn(submission.run().in_current_span())
            .await
            .unwrap_or_else(|e| Err(RelayError::Internal(format!("submission task failed: {e}"))))
    }

    fn check_domain(&self, payload: &RelayPayload) -> Result<(), RelayError> {
        if payload.chain_id != self.domain.chain_id {
            return Err(RelayError::DomainMismatch {
                field: DomainField::ChainId,
                expected: self.domain.chain_id.to_string(),
                received: payload.chain_id.to_string(),
            });
        }
        if payload.forwarder != self.domain.verifying_contract {
            return Err(RelayError::DomainMismatch {
                field: DomainField::Forwarder,
                expected: self.domain.verifying_contract.to_string(),
                received: payload.forwarder.to_string(),
            });
        }
        Ok(())
    }
}

/// Holds a signer's submission lock and drops the map entry once unused.
struct SignerLease {
    locks: Arc<SignerLocks>,
    signer: Address,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SignerLease {
    async fn acquire(locks: Arc<SignerLocks>, signer: Address) -> Self {
        let slot = Arc::clone(locks.entry(signer).or_default().value());
        let mut lease = Self {
            locks,
            signer,
            guard: None,
        };
        lease.guard = Some(slot.lock_owned().await);
        lease
    }
}

impl Drop for SignerLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.signer, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Steps 5 to 8 for one admitted envelope.
struct Submission {
    domain: Arc<ForwarderDomain>,
    chain: Arc<dyn ForwarderChain>,
    signature_check: SignatureCheck,
    execution_timeout: Duration,
    signer_locks: Arc<SignerLocks>,
    payload: RelayPayload,
    gas: u64,
}

impl Submission {
    async fn run(self) -> Result<RelayReceipt, RelayError> {
        let signer = self.payload.signer();
        let lease = SignerLease::acquire(Arc::clone(&self.signer_locks), signer).await;
        let result = self.submit().await;
        drop(lease);

        match &result {
            Ok(receipt) => tracing::info!(
                signer = %signer,
                nonce = %self.payload.request.nonce,
                tx_hash = %receipt.tx_hash,
                block_number = receipt.block_number,
                "Relayed meta-transaction"
            ),
            Err(e) if e.is_pre_submission() => {
                tracing::info!(signer = %signer, reason = e.reason().as_str(), "Rejected envelope");
            }
            Err(e) => tracing::warn!(signer = %signer, error = %e, "Relayed execution failed"),
        }
        result
    }

    async fn submit(&self) -> Result<RelayReceipt, RelayError> {
        let request = &self.payload.request;
        let signature = &self.payload.signature;

        let counter = self
            .chain
            .current_counter(request.from)
            .await
            .map_err(before_submission)?;
        if counter != request.nonce.0 {
            return Err(RelayError::NonceMismatch {
                expected: counter,
                received: request.nonce.0,
            });
        }
        stage(AdmissionStage::NonceCurrent);

        let valid = match self.signature_check {
            SignatureCheck::Chain => self
                .chain
                .verify_signature(&self.domain, request, signature)
                .await
                .map_err(before_submission)?,
            SignatureCheck::Local => verify_local(&self.domain, request, signature),
        };
        if !valid {
            return Err(RelayError::SignatureInvalid);
        }
        stage(AdmissionStage::SignatureValid);

        stage(AdmissionStage::Submitted);
        let execution =
            self.chain
                .execute(&self.domain, request, signature, request.value.0, self.gas);
        let receipt = match tokio::time::timeout(self.execution_timeout, execution).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                stage(AdmissionStage::ExecutionFailed);
                return Err(after_submission(e));
            }
            Err(_) => {
                stage(AdmissionStage::ExecutionFailed);
                return Err(RelayError::ExecutionTimeout {
                    tx_hash: None,
                    waited_secs: self.execution_timeout.as_secs(),
                });
            }
        };
        stage(AdmissionStage::Confirmed);

        Ok(RelayReceipt {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            gas_used: DecimalU256::from(receipt.gas_used),
        })
    }
}

fn stage(stage: AdmissionStage) {
    tracing::debug!(%stage, "Admission stage");
}

/// Maps a chain failure from a read-only step.
fn before_submission(e: ChainError) -> RelayError {
    if e.is_transient() {
        RelayError::Transient(e.to_string())
    } else {
        RelayError::Internal(e.to_string())
    }
}

/// Maps a chain failure from the execution step.
fn after_submission(e: ChainError) -> RelayError {
    match e {
        ChainError::Timeout {
            tx_hash,
            waited_secs,
        } => RelayError::ExecutionTimeout {
            tx_hash: Some(tx_hash),
            waited_secs,
        },
        other => RelayError::Execution {
            tx_hash: other.tx_hash(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{B256, Bytes, U256, address};
    use alloy_signer_local::PrivateKeySigner;
    use async_trait::async_trait;
    use metapay::{FailureClass, ForwardRequest};
    use metapay_evm::chain::{ExecutionReceipt, Fault};
    use metapay_evm::{MemoryForwarder, PaymentIntent, RequestBuilder, sign_forward_request};

    pub(crate) const PAYER_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    pub(crate) const SECRET: &str = "relay-test-secret";
    const NOW: u64 = 1_735_689_000;

    pub(crate) fn domain() -> ForwarderDomain {
        ForwarderDomain::new(
            80002,
            address!("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
        )
    }

    /// A payment of 1 native unit to the recipient, signed at the forwarder's
    /// current counter with a 10 minute window from `NOW`.
    async fn signed_payload(forwarder: &MemoryForwarder) -> RelayPayload {
        signed_payload_until(forwarder, UnixTimestamp::from_secs(NOW + 600)).await
    }

    pub(crate) async fn signed_payload_until(
        forwarder: &MemoryForwarder,
        deadline: UnixTimestamp,
    ) -> RelayPayload {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let request = ForwardRequest {
            from: payer.address(),
            to: address!("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512"),
            value: DecimalU256::from(1_000_000_000_000_000_000_u64),
            gas: DecimalU256::from(200_000_u64),
            nonce: forwarder.counter(payer.address()).into(),
            deadline,
            data: Bytes::from_static(&[0x12, 0x34]),
        };
        let signature = sign_forward_request(&payer, forwarder.domain(), &request)
            .await
            .unwrap();
        forwarder.domain().envelope(request, signature)
    }

    fn pipeline() -> (AdmissionPipeline, Arc<MemoryForwarder>) {
        let forwarder = Arc::new(MemoryForwarder::new(domain()));
        let pipeline = AdmissionPipeline::new(
            RelayAuth::new(SECRET).unwrap(),
            domain(),
            Arc::clone(&forwarder) as Arc<dyn ForwarderChain>,
        );
        (pipeline, forwarder)
    }

    async fn admit(
        pipeline: &AdmissionPipeline,
        payload: &RelayPayload,
    ) -> Result<RelayReceipt, RelayError> {
        admit_at(pipeline, payload, NOW).await
    }

    async fn admit_at(
        pipeline: &AdmissionPipeline,
        payload: &RelayPayload,
        now: u64,
    ) -> Result<RelayReceipt, RelayError> {
        let body = codec::encode(payload).unwrap();
        let tag = RelayAuth::new(SECRET).unwrap().tag(body.as_bytes());
        pipeline
            .admit_at(body.as_bytes(), Some(&tag), UnixTimestamp::from_secs(now))
            .await
    }

    #[tokio::test]
    async fn test_valid_envelope_executes() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;

        let receipt = admit(&pipeline, &payload).await.unwrap();
        assert_ne!(receipt.tx_hash, B256::ZERO);
        assert_eq!(receipt.block_number, 1);
        assert_eq!(forwarder.counter(payload.signer()), U256::from(1));
    }

    #[tokio::test]
    async fn test_replay_is_rejected_with_current_counter() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;
        admit(&pipeline, &payload).await.unwrap();

        let err = admit(&pipeline, &payload).await.unwrap_err();
        match err {
            RelayError::NonceMismatch { expected, received } => {
                assert_eq!(expected, U256::from(1));
                assert_eq!(received, U256::ZERO);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(forwarder.counter(payload.signer()), U256::from(1));
    }

    #[tokio::test]
    async fn test_tampered_value_is_rejected() {
        let (pipeline, forwarder) = pipeline();
        let mut payload = signed_payload(&forwarder).await;
        payload.request.value = DecimalU256::from(2_000_000_000_000_000_000_u64);

        let err = admit(&pipeline, &payload).await.unwrap_err();
        assert!(matches!(err, RelayError::SignatureInvalid));
        assert_eq!(forwarder.counter(payload.signer()), U256::ZERO);
    }

    #[tokio::test]
    async fn test_tampered_value_is_rejected_locally() {
        let (pipeline, forwarder) = pipeline();
        let pipeline = pipeline.with_signature_check(SignatureCheck::Local);
        let mut payload = signed_payload(&forwarder).await;
        payload.request.value = DecimalU256::from(2_000_000_000_000_000_000_u64);

        let err = admit(&pipeline, &payload).await.unwrap_err();
        assert!(matches!(err, RelayError::SignatureInvalid));
        // the counter read is the only chain call
        assert_eq!(forwarder.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_or_wrong_tag_never_reaches_chain() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;
        let body = codec::encode(&payload).unwrap();

        let err = pipeline
            .admit_at(body.as_bytes(), None, UnixTimestamp::from_secs(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Authentication));

        let other = RelayAuth::new("another-secret").unwrap().tag(body.as_bytes());
        let err = pipeline
            .admit_at(body.as_bytes(), Some(&other), UnixTimestamp::from_secs(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Authentication));
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn test_authentication_runs_before_parsing() {
        let (pipeline, forwarder) = pipeline();
        let err = pipeline
            .admit_at(b"not json", None, UnixTimestamp::from_secs(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Authentication));
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_lists_fields() {
        let (pipeline, _) = pipeline();
        let body = br#"{"request":{},"chainId":80002,"forwarder":"0x12","signature":"0x"}"#;
        let tag = RelayAuth::new(SECRET).unwrap().tag(body);
        let err = pipeline
            .admit_at(body, Some(&tag), UnixTimestamp::from_secs(NOW))
            .await
            .unwrap_err();
        let RelayError::Validation(issues) = err else {
            panic!("expected a validation error");
        };
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"request.from"));
        assert!(fields.contains(&"forwarder"));
        assert!(fields.contains(&"signature"));
    }

    #[tokio::test]
    async fn test_gas_beyond_u64_is_a_validation_error() {
        let (pipeline, forwarder) = pipeline();
        let mut payload = signed_payload(&forwarder).await;
        payload.request.gas = DecimalU256(U256::from(u64::MAX) + U256::from(1));

        let err = admit(&pipeline, &payload).await.unwrap_err();
        let RelayError::Validation(issues) = err else {
            panic!("expected a validation error");
        };
        assert_eq!(issues[0].field, "request.gas");
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_chain_id_is_a_domain_mismatch() {
        let (pipeline, forwarder) = pipeline();
        let mut payload = signed_payload(&forwarder).await;
        payload.chain_id = 1;

        let err = admit(&pipeline, &payload).await.unwrap_err();
        match err {
            RelayError::DomainMismatch {
                field,
                expected,
                received,
            } => {
                assert_eq!(field, DomainField::ChainId);
                assert_eq!(expected, "80002");
                assert_eq!(received, "1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_forwarder_is_a_domain_mismatch() {
        let (pipeline, forwarder) = pipeline();
        let mut payload = signed_payload(&forwarder).await;
        payload.forwarder = Address::repeat_byte(0x22);

        let err = admit(&pipeline, &payload).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::DomainMismatch {
                field: DomainField::Forwarder,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;
        let deadline = NOW + 600;

        let err = admit_at(&pipeline, &payload, deadline + 1).await.unwrap_err();
        assert!(matches!(err, RelayError::Expired { .. }));
        assert_eq!(forwarder.calls(), 0);

        admit_at(&pipeline, &payload, deadline).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_chain_is_transient() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;
        forwarder.inject(Some(Fault::Unreachable));

        let err = admit(&pipeline, &payload).await.unwrap_err();
        assert!(matches!(err, RelayError::Transient(_)));
        assert_eq!(err.class(), FailureClass::Transient);
    }

    #[tokio::test]
    async fn test_revert_is_an_execution_failure() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;
        forwarder.inject(Some(Fault::Revert));

        let err = admit(&pipeline, &payload).await.unwrap_err();
        assert!(matches!(err, RelayError::Execution { tx_hash: Some(_), .. }));
        assert!(!err.is_pre_submission());
    }

    #[tokio::test]
    async fn test_stalled_execution_times_out() {
        let (pipeline, forwarder) = pipeline();
        let pipeline = pipeline.with_execution_timeout(Duration::from_millis(50));
        let payload = signed_payload(&forwarder).await;
        forwarder.inject(Some(Fault::Stall));

        let err = admit(&pipeline, &payload).await.unwrap_err();
        assert!(matches!(err, RelayError::ExecutionTimeout { .. }));
        assert_eq!(err.class(), FailureClass::Execution);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_execute_once() {
        let (pipeline, forwarder) = pipeline();
        let payload = signed_payload(&forwarder).await;

        let (a, b) = tokio::join!(admit(&pipeline, &payload), admit(&pipeline, &payload));
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert_eq!(forwarder.counter(payload.signer()), U256::from(1));
        assert!(pipeline.signer_locks.is_empty());
    }

    /// Takes `delay` to mine every execution.
    struct SlowForwarder {
        inner: Arc<MemoryForwarder>,
        delay: Duration,
    }

    #[async_trait]
    impl ForwarderChain for SlowForwarder {
        async fn current_counter(&self, signer: Address) -> Result<U256, ChainError> {
            self.inner.current_counter(signer).await
        }

        async fn verify_signature(
            &self,
            domain: &ForwarderDomain,
            request: &ForwardRequest,
            signature: &Bytes,
        ) -> Result<bool, ChainError> {
            self.inner.verify_signature(domain, request, signature).await
        }

        async fn execute(
            &self,
            domain: &ForwarderDomain,
            request: &ForwardRequest,
            signature: &Bytes,
            value: U256,
            gas: u64,
        ) -> Result<ExecutionReceipt, ChainError> {
            tokio::time::sleep(self.delay).await;
            self.inner
                .execute(domain, request, signature, value, gas)
                .await
        }
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_execution() {
        let forwarder = Arc::new(MemoryForwarder::new(domain()));
        let slow = SlowForwarder {
            inner: Arc::clone(&forwarder),
            delay: Duration::from_millis(200),
        };
        let pipeline = Arc::new(AdmissionPipeline::new(
            RelayAuth::new(SECRET).unwrap(),
            domain(),
            Arc::new(slow),
        ));
        let payload = signed_payload(&forwarder).await;
        let signer = payload.signer();

        let caller = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { admit(&pipeline, &payload).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        pipeline.drain().await;
        assert_eq!(forwarder.counter(signer), U256::from(1));
        assert!(pipeline.signer_locks.is_empty());
    }

    #[tokio::test]
    async fn test_built_payment_is_relayed() {
        let (pipeline, forwarder) = pipeline();
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let recipient = address!("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512");
        let intent = PaymentIntent::new(recipient, "1000000000000000000", "rent-april")
            .with_validity_minutes(10);

        let builder = RequestBuilder::new(Arc::clone(&forwarder), payer);
        let payload = builder.build_signed(&domain(), &intent).await.unwrap();
        assert_eq!(payload.request.to, recipient);
        assert_eq!(payload.request.nonce, DecimalU256::from(0_u64));

        let body = codec::encode(&payload).unwrap();
        let tag = RelayAuth::new(SECRET).unwrap().tag(body.as_bytes());
        let receipt = pipeline.admit(body.as_bytes(), Some(&tag)).await.unwrap();
        assert_ne!(receipt.tx_hash, B256::ZERO);
        assert_eq!(forwarder.counter(payload.signer()), U256::from(1));

        // the builder now reads the advanced counter
        let next = builder.build(&intent).await.unwrap();
        assert_eq!(next.nonce, DecimalU256::from(1_u64));
    }
}
