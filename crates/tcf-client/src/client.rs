//! The requester-facing client
//!
//! Ties the registry, the attestation verifier, the request builder and the
//! per-work-order state machine together behind three operations:
//! `verify_worker_attestation`, `build_and_submit_work_order` and
//! `poll_work_order_result`.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{
    builder::WorkOrderRequestBuilder,
    config::ClientConfig,
    data::{DataItem, WorkOrderStatus, WorkerDetails},
    error::WorkOrderError,
    jrpc::{EncryptionKeyGetParams, EncryptionKeyResult, JrpcOutcome, Method},
    registry::{JrpcWorkerRegistry, WorkerRegistryView},
    state_machine::{DecryptedResult, SubmitOutcome, WorkOrderStateMachine},
    transport::{call, RequestIds, TransportChannel},
};
use anyhow::{anyhow, Result};
use attestation_verifier::{AttestationError, AttestationResult, AttestationVerifier};
use log::{error, info};
use std::sync::Arc;
use tcf_utils::{verify, Signature, SignatureStatus, SigningKey};
use tokio::sync::watch;

/// A submitted work order and the worker it was addressed to.
pub struct PendingWorkOrder {
    machine: WorkOrderStateMachine,
    worker: WorkerDetails,
}

impl PendingWorkOrder {
    #[inline]
    pub fn work_order_id(&self) -> &str {
        self.machine.work_order_id()
    }

    #[inline]
    pub fn status(&self) -> WorkOrderStatus {
        self.machine.status()
    }

    #[inline]
    pub fn machine(&self) -> &WorkOrderStateMachine {
        &self.machine
    }

    #[inline]
    pub fn worker(&self) -> &WorkerDetails {
        &self.worker
    }
}

pub struct TcfClient {
    config: ClientConfig,
    channel: Arc<dyn TransportChannel>,
    registry: WorkerRegistryView,
    verifier: AttestationVerifier,
    builder: WorkOrderRequestBuilder,
    ids: RequestIds,
}

impl TcfClient {
    pub fn new(
        config: ClientConfig,
        channel: Arc<dyn TransportChannel>,
        registry: WorkerRegistryView,
        requester_key: Arc<SigningKey>,
    ) -> Self {
        let verifier = AttestationVerifier::new(config.attestation.clone());
        let builder = WorkOrderRequestBuilder::new(requester_key)
            .with_response_timeout(config.response_timeout_msecs);
        TcfClient {
            config,
            channel,
            registry,
            verifier,
            builder,
            ids: RequestIds::default(),
        }
    }

    /// A client whose registry is served by the same listener as its work
    /// orders.
    pub fn with_jrpc_registry(
        config: ClientConfig,
        channel: Arc<dyn TransportChannel>,
        requester_key: Arc<SigningKey>,
    ) -> Self {
        let registry = WorkerRegistryView::new(Arc::new(JrpcWorkerRegistry::new(channel.clone())));
        Self::new(config, channel, registry, requester_key)
    }

    /// A client talking JSON-RPC over HTTP to `config.json_rpc_uri`.
    #[cfg(feature = "http")]
    pub fn connect(
        config: ClientConfig,
        requester_key: Arc<SigningKey>,
    ) -> Result<Self, crate::error::TransportError> {
        use crate::http::{HttpJrpcChannel, RetryConfig};

        let retry = RetryConfig::default().with_max_retries(config.transport_retries);
        let channel: Arc<dyn TransportChannel> = Arc::new(HttpJrpcChannel::new(
            config.json_rpc_uri.clone(),
            retry,
            config.transport_timeout(),
        )?);
        Ok(Self::with_jrpc_registry(config, channel, requester_key))
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &WorkerRegistryView {
        &self.registry
    }

    /// Look up `worker_id` and decide whether its attestation evidence can be
    /// trusted under the configured policy.
    pub async fn verify_worker_attestation(
        &self,
        worker_id: &str,
    ) -> Result<(WorkerDetails, AttestationResult)> {
        let worker = self.registry.lookup(worker_id).await?;
        let result = self.check_worker_attestation(&worker)?;
        Ok((worker, result))
    }

    /// Verify the evidence `worker` carries, including the binding of its
    /// keys and the pinned enclave measurement, when configured.
    pub fn check_worker_attestation(&self, worker: &WorkerDetails) -> Result<AttestationResult> {
        let evidence = worker.attestation_evidence().ok_or_else(|| {
            anyhow!(AttestationError::MalformedEvidence(
                "proofData",
                format!("worker {} carries no attestation evidence", worker.worker_id)
            ))
        })??;
        let result = self.verifier.verify_or_reject(&evidence)?;
        let policy = self.verifier.policy();

        if policy.require_key_binding {
            let expected = worker.key_binding();
            if result.report_data != expected {
                error!("worker {} quote does not commit to its registered keys", worker.worker_id);
                return Err(anyhow!(AttestationError::MismatchError {
                    variable: "reportData",
                    expected: hex::encode(expected),
                    received: hex::encode(&result.report_data),
                }));
            }
        }
        if let Some(mr_enclave) = &policy.expected_mr_enclave {
            let received = result.enclave_measurement.to_hex();
            if !received.eq_ignore_ascii_case(mr_enclave) {
                error!("worker {} runs enclave {}", worker.worker_id, received);
                return Err(anyhow!(AttestationError::MismatchError {
                    variable: "mrEnclave",
                    expected: mr_enclave.clone(),
                    received,
                }));
            }
        }

        info!("worker {} is trusted", worker.worker_id);
        Ok(result)
    }

    /// Fetch a worker's current encryption key, checking the worker's
    /// signature over it.
    pub async fn fetch_encryption_key(&self, worker: &WorkerDetails) -> Result<WorkerDetails> {
        let params = EncryptionKeyGetParams {
            worker_id: worker.worker_id.clone(),
            last_used_key_nonce: worker.encryption_key_nonce.clone(),
            tag: String::new(),
            requester_id: self.config.requester_id.clone(),
            signature_nonce: String::new(),
            signature: String::new(),
        };
        let key: EncryptionKeyResult =
            match call(&*self.channel, Method::EncryptionKeyGet, self.ids.next(), &params).await? {
                JrpcOutcome::Result(key) => key,
                JrpcOutcome::Error(error) => {
                    return Err(anyhow!(WorkOrderError::Rejected {
                        code: error.code,
                        message: error.message,
                    }))
                }
            };
        if key.worker_id != worker.worker_id {
            return Err(anyhow!(WorkOrderError::ResponseMismatch {
                variable: "workerId",
                expected: worker.worker_id.clone(),
                received: key.worker_id,
            }));
        }

        let encryption_key = hex::decode(&key.encryption_key)
            .map_err(|err| WorkOrderError::MalformedResponse(format!("encryptionKey: {:?}", err)))?;
        let hash = worker.hashing_algorithm.digest(&encryption_key);
        let signature = Signature::from_base64(&key.signature);
        let status = match &signature {
            Ok(signature) => verify(&hash, signature, &worker.verification_key),
            Err(_) => SignatureStatus::InvalidSignatureFormat,
        };
        if !status.is_passed() {
            error!("encryption key signature of worker {}: {}", worker.worker_id, status);
            return Err(anyhow!(WorkOrderError::InvalidSignature(status)));
        }

        let mut updated = worker.clone();
        updated.encryption_key = encryption_key;
        updated.encryption_key_nonce = key.encryption_key_nonce;
        updated.encryption_key_signature = signature.ok();
        Ok(updated)
    }

    /// Build a work order for `worker_id` and submit it.
    pub async fn build_and_submit_work_order(
        &self,
        worker_id: &str,
        workload_id: &str,
        in_data: Vec<DataItem>,
    ) -> Result<PendingWorkOrder> {
        let worker = self.registry.lookup(worker_id).await?;
        if self.config.require_attestation {
            self.check_worker_attestation(&worker)?;
        }
        let request = self
            .builder
            .build(&worker, workload_id, in_data, &self.config.requester_id)?;
        let mut machine = WorkOrderStateMachine::new(request);
        match machine.submit(&*self.channel).await? {
            SubmitOutcome::Failed { code, message } => {
                Err(anyhow!(WorkOrderError::Rejected { code, message }))
            }
            SubmitOutcome::Accepted(_) | SubmitOutcome::Completed(_) => {
                Ok(PendingWorkOrder { machine, worker })
            }
        }
    }

    /// Wait for the work order's result and release it once verified and
    /// decrypted.  A `WorkOrderError::Timeout` may be retried.
    pub async fn poll_work_order_result(&self, pending: &mut PendingWorkOrder) -> Result<DecryptedResult> {
        let response = pending
            .machine
            .poll_until_terminal(&*self.channel, &self.config.poll_policy())
            .await?;
        Ok(pending.machine.accept_response(&response, &pending.worker)?)
    }

    pub async fn poll_work_order_result_or_cancelled(
        &self,
        pending: &mut PendingWorkOrder,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<DecryptedResult> {
        let response = pending
            .machine
            .poll_until_terminal_or_cancelled(&*self.channel, &self.config.poll_policy(), cancel)
            .await?;
        Ok(pending.machine.accept_response(&response, &pending.worker)?)
    }
}
