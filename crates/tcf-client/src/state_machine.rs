//! Work-order lifecycle
//!
//! A `WorkOrderStateMachine` owns one submitted work order: its wire
//! parameters, its session key material and the statuses observed for it.
//! Statuses only move forward.  Once `COMPLETED` or `FAILED` is observed,
//! any later report of a different status is an error.
//!
//! Polling is bounded by `PollPolicy::max_wait` and may be cancelled through
//! a `watch` channel.  Session key material is dropped as soon as the work
//! order fails, is cancelled, or its response has been accepted or
//! rejected.
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
    builder::{SessionSecrets, WorkOrderRequest},
    data::{payload_digest, DataItem, ItemEncryption, WorkOrderStatus, WorkerDetails},
    error::WorkOrderError,
    jrpc::{
        JrpcErrorCode, JrpcOutcome, Method, SignedResponse, WorkOrderGetResultParams,
        WorkOrderSubmitParams,
    },
    transport::{call, RequestIds, TransportChannel},
};
use log::{debug, error, info, trace, warn};
use std::time::Duration;
use tcf_utils::{verify, SessionIv, SessionKey, Signature, SignatureStatus};
use tokio::{sync::watch, time::Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The worker queued the work order; poll for the result.
    Accepted(WorkOrderStatus),
    /// The worker answered synchronously.
    Completed(SignedResponse),
    /// Terminal rejection.
    Failed { code: JrpcErrorCode, message: String },
}

/// One decrypted `outData` item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedItem {
    pub index: u32,
    /// Plaintext, or the original ciphertext when `item_key` is set.
    pub data: Vec<u8>,
    /// Present for items the worker encrypted under a caller-supplied key.
    pub item_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptedResult {
    pub work_order_id: String,
    pub worker_id: String,
    pub items: Vec<DecryptedItem>,
}

impl DecryptedResult {
    pub fn item(&self, index: u32) -> Option<&DecryptedItem> {
        self.items.iter().find(|item| item.index == index)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Status tracking.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug)]
struct StatusTracker {
    status: WorkOrderStatus,
    history: Vec<WorkOrderStatus>,
}

impl StatusTracker {
    fn new() -> Self {
        StatusTracker {
            status: WorkOrderStatus::Submitted,
            history: vec![WorkOrderStatus::Submitted],
        }
    }

    /// Record a reported status.  Reports behind the current status are
    /// ignored.  Leaving a terminal status is refused.
    fn observe(&mut self, reported: WorkOrderStatus) -> Result<WorkOrderStatus, WorkOrderError> {
        if self.status.is_terminal() {
            if reported == self.status {
                return Ok(self.status);
            }
            error!(
                "work order status reported as {} after reaching terminal status {}",
                reported, self.status
            );
            return Err(WorkOrderError::InvalidTransition {
                from: self.status,
                to: reported,
            });
        }
        if reported.rank() < self.status.rank() {
            debug!(
                "ignoring stale status {} (current status {})",
                reported, self.status
            );
            return Ok(self.status);
        }
        if reported != self.status {
            trace!("work order status {} -> {}", self.status, reported);
            self.status = reported;
            self.history.push(reported);
        }
        Ok(self.status)
    }
}

enum PollReply {
    InProgress(WorkOrderStatus),
    Completed(SignedResponse),
    Failed { code: JrpcErrorCode, message: String },
}

fn classify(outcome: JrpcOutcome<SignedResponse>) -> PollReply {
    match outcome {
        JrpcOutcome::Result(response) => PollReply::Completed(response),
        JrpcOutcome::Error(error) => match error.code {
            JrpcErrorCode::Pending => PollReply::InProgress(WorkOrderStatus::Pending),
            JrpcErrorCode::Scheduled => PollReply::InProgress(WorkOrderStatus::Scheduled),
            JrpcErrorCode::Processing => PollReply::InProgress(WorkOrderStatus::Processing),
            code => PollReply::Failed {
                code,
                message: error.message,
            },
        },
    }
}

async fn poll_attempts(
    params: &WorkOrderGetResultParams,
    channel: &dyn TransportChannel,
    ids: &RequestIds,
    tracker: &mut StatusTracker,
    poll_interval: Duration,
) -> Result<SignedResponse, WorkOrderError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let outcome = call(channel, Method::WorkOrderGetResult, ids.next(), params)
            .await
            .map_err(WorkOrderError::TransportError)?;
        match classify(outcome) {
            PollReply::InProgress(status) => {
                let status = tracker.observe(status)?;
                debug!(
                    "work order {} is {} after {} poll(s)",
                    params.work_order_id, status, attempt
                );
            }
            PollReply::Completed(response) => {
                tracker.observe(WorkOrderStatus::Completed)?;
                info!(
                    "work order {} completed after {} poll(s)",
                    params.work_order_id, attempt
                );
                return Ok(response);
            }
            PollReply::Failed { code, message } => {
                tracker.observe(WorkOrderStatus::Failed)?;
                warn!(
                    "work order {} failed with code {}: {}",
                    params.work_order_id, code, message
                );
                return Err(WorkOrderError::Rejected { code, message });
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn poll_loop(
    work_order_id: &str,
    channel: &dyn TransportChannel,
    ids: &RequestIds,
    tracker: &mut StatusTracker,
    policy: &PollPolicy,
) -> Result<SignedResponse, WorkOrderError> {
    let params = WorkOrderGetResultParams {
        work_order_id: work_order_id.to_string(),
    };
    let started = Instant::now();
    let attempts = poll_attempts(&params, channel, ids, tracker, policy.poll_interval);
    match tokio::time::timeout(policy.max_wait, attempts).await {
        Ok(result) => result,
        Err(_) => {
            let waited_ms = started.elapsed().as_millis();
            warn!(
                "work order {} still not terminal after {} ms",
                work_order_id, waited_ms
            );
            Err(WorkOrderError::Timeout {
                work_order_id: work_order_id.to_string(),
                waited_ms,
            })
        }
    }
}

/// Fetch the result of `work_order_id` every `poll_interval` until it is
/// terminal or `max_wait` has elapsed.
pub async fn poll_until_terminal(
    work_order_id: &str,
    channel: &dyn TransportChannel,
    poll_interval: Duration,
    max_wait: Duration,
) -> Result<SignedResponse, WorkOrderError> {
    let mut tracker = StatusTracker::new();
    let policy = PollPolicy {
        poll_interval,
        max_wait,
    };
    poll_loop(work_order_id, channel, &RequestIds::default(), &mut tracker, &policy).await
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone: cancellation can no longer be requested.
            std::future::pending::<()>().await;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Response acceptance.
////////////////////////////////////////////////////////////////////////////////

/// Verify `response` against `worker` and only then decrypt its payload.
pub fn accept_response(
    response: &SignedResponse,
    worker: &WorkerDetails,
    session_key: &SessionKey,
    session_iv: &SessionIv,
) -> Result<DecryptedResult, WorkOrderError> {
    let hashing = worker.hashing_algorithm;
    let payload = payload_digest(&response.out_data, hashing);
    let response_hash = response.signature_fields(&payload).digest(hashing);

    let status = match Signature::from_base64(&response.worker_signature) {
        Ok(signature) => verify(&response_hash, &signature, &worker.verification_key),
        Err(_) => SignatureStatus::InvalidSignatureFormat,
    };
    if !status.is_passed() {
        error!(
            "workerSignature of work order {} from worker {}: {}",
            response.work_order_id, worker.worker_id, status
        );
        return Err(WorkOrderError::InvalidSignature(status));
    }

    let codec = worker.codec();
    let mut out_data: Vec<&DataItem> = response.out_data.iter().collect();
    out_data.sort_by_key(|item| item.index);

    let mut items = Vec::with_capacity(out_data.len());
    for item in out_data {
        let decrypted = match item.encryption() {
            ItemEncryption::ItemKey(key) => DecryptedItem {
                index: item.index,
                data: item.data.clone(),
                item_key: Some(key),
            },
            ItemEncryption::Plain => DecryptedItem {
                index: item.index,
                data: item.data.clone(),
                item_key: None,
            },
            ItemEncryption::SessionKey => {
                let iv = if item.iv.is_empty() {
                    session_iv.clone()
                } else {
                    SessionIv::from_hex(&item.iv)
                        .map_err(|err| WorkOrderError::DecryptionFailed(item.index, err))?
                };
                let data = codec.open(&item.data, session_key, &iv).map_err(|err| {
                    error!(
                        "outData item {} of work order {} failed to decrypt",
                        item.index, response.work_order_id
                    );
                    WorkOrderError::DecryptionFailed(item.index, err)
                })?;
                DecryptedItem {
                    index: item.index,
                    data,
                    item_key: None,
                }
            }
        };
        if decrypted.item_key.is_none() && !item.data_hash.is_empty() {
            let expected = codec.hash(&decrypted.data).to_hex();
            if !expected.eq_ignore_ascii_case(&item.data_hash) {
                error!(
                    "outData item {} of work order {} does not match its dataHash",
                    item.index, response.work_order_id
                );
                return Err(WorkOrderError::DataHashMismatch(item.index));
            }
        }
        items.push(decrypted);
    }

    Ok(DecryptedResult {
        work_order_id: response.work_order_id.clone(),
        worker_id: response.worker_id.clone(),
        items,
    })
}

////////////////////////////////////////////////////////////////////////////////
// The state machine.
////////////////////////////////////////////////////////////////////////////////

pub struct WorkOrderStateMachine {
    params: WorkOrderSubmitParams,
    session: Option<SessionSecrets>,
    tracker: StatusTracker,
    ids: RequestIds,
    submitted: bool,
    response: Option<SignedResponse>,
    failure: Option<(JrpcErrorCode, String)>,
}

impl WorkOrderStateMachine {
    pub fn new(request: WorkOrderRequest) -> Self {
        let (params, secrets) = request.into_parts();
        WorkOrderStateMachine {
            params,
            session: Some(secrets),
            tracker: StatusTracker::new(),
            ids: RequestIds::default(),
            submitted: false,
            response: None,
            failure: None,
        }
    }

    #[inline]
    pub fn work_order_id(&self) -> &str {
        &self.params.work_order_id
    }

    #[inline]
    pub fn params(&self) -> &WorkOrderSubmitParams {
        &self.params
    }

    #[inline]
    pub fn status(&self) -> WorkOrderStatus {
        self.tracker.status
    }

    /// Every distinct status observed, in order, starting with `SUBMITTED`.
    #[inline]
    pub fn history(&self) -> &[WorkOrderStatus] {
        &self.tracker.history
    }

    /// Whether session key material is still held.
    #[inline]
    pub fn holds_session_key(&self) -> bool {
        self.session.is_some()
    }

    /// Drop the session key material.  Responses can no longer be accepted.
    pub fn release(&mut self) {
        if self.session.take().is_some() {
            debug!("released session key material of work order {}", self.params.work_order_id);
        }
    }

    pub async fn submit(
        &mut self,
        channel: &dyn TransportChannel,
    ) -> Result<SubmitOutcome, WorkOrderError> {
        if self.submitted {
            return Err(WorkOrderError::InvalidTransition {
                from: self.tracker.status,
                to: WorkOrderStatus::Submitted,
            });
        }
        self.submitted = true;
        info!(
            "submitting work order {} to worker {}",
            self.params.work_order_id, self.params.worker_id
        );
        let outcome = call(channel, Method::WorkOrderSubmit, self.ids.next(), &self.params)
            .await
            .map_err(WorkOrderError::TransportError)?;
        match classify(outcome) {
            PollReply::InProgress(status) => {
                let status = self.tracker.observe(status)?;
                Ok(SubmitOutcome::Accepted(status))
            }
            PollReply::Completed(response) => {
                self.tracker.observe(WorkOrderStatus::Completed)?;
                self.response = Some(response.clone());
                Ok(SubmitOutcome::Completed(response))
            }
            PollReply::Failed { code, message } => {
                self.tracker.observe(WorkOrderStatus::Failed)?;
                warn!(
                    "work order {} rejected on submission with code {}: {}",
                    self.params.work_order_id, code, message
                );
                self.failure = Some((code, message.clone()));
                self.release();
                Ok(SubmitOutcome::Failed { code, message })
            }
        }
    }

    /// Poll until the work order is terminal.  A timeout leaves the state
    /// machine as it was, so polling may be resumed with a fresh window.
    pub async fn poll_until_terminal(
        &mut self,
        channel: &dyn TransportChannel,
        policy: &PollPolicy,
    ) -> Result<SignedResponse, WorkOrderError> {
        if let Some(response) = &self.response {
            return Ok(response.clone());
        }
        if let Some((code, message)) = &self.failure {
            return Err(WorkOrderError::Rejected {
                code: *code,
                message: message.clone(),
            });
        }
        let result = poll_loop(
            &self.params.work_order_id,
            channel,
            &self.ids,
            &mut self.tracker,
            policy,
        )
        .await;
        match &result {
            Ok(response) => self.response = Some(response.clone()),
            Err(WorkOrderError::Rejected { code, message }) => {
                self.failure = Some((*code, message.clone()));
                self.release();
            }
            Err(WorkOrderError::InvalidSignature(_))
            | Err(WorkOrderError::InvalidTransition { .. }) => self.release(),
            Err(_) => (),
        }
        result
    }

    /// As `poll_until_terminal`, abandoning the wait as soon as `cancel`
    /// reads `true`.  Cancellation releases the session key material.
    pub async fn poll_until_terminal_or_cancelled(
        &mut self,
        channel: &dyn TransportChannel,
        policy: &PollPolicy,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<SignedResponse, WorkOrderError> {
        let outcome = tokio::select! {
            result = self.poll_until_terminal(channel, policy) => Some(result),
            _ = cancelled(cancel) => None,
        };
        match outcome {
            Some(result) => result,
            None => {
                warn!("polling of work order {} cancelled", self.params.work_order_id);
                self.release();
                Err(WorkOrderError::Cancelled(self.params.work_order_id.clone()))
            }
        }
    }

    /// Check that `response` answers this work order, then verify and
    /// decrypt it.  Only a `COMPLETED` work order has a response to accept;
    /// otherwise nothing changes.  Once past that check, session key
    /// material is released whatever the outcome.
    pub fn accept_response(
        &mut self,
        response: &SignedResponse,
        worker: &WorkerDetails,
    ) -> Result<DecryptedResult, WorkOrderError> {
        if self.tracker.status != WorkOrderStatus::Completed {
            warn!(
                "response offered for work order {} while it is {}",
                self.params.work_order_id, self.tracker.status
            );
            return Err(WorkOrderError::InvalidTransition {
                from: self.tracker.status,
                to: WorkOrderStatus::Completed,
            });
        }
        let secrets = self
            .session
            .take()
            .ok_or_else(|| WorkOrderError::SessionReleased(self.params.work_order_id.clone()))?;

        for (variable, expected, received) in [
            ("workOrderId", &self.params.work_order_id, &response.work_order_id),
            ("workloadId", &self.params.workload_id, &response.workload_id),
            ("requesterId", &self.params.requester_id, &response.requester_id),
            ("workerId", &worker.worker_id, &response.worker_id),
        ] {
            if expected != received {
                error!(
                    "response to work order {} carries {} {:?}",
                    self.params.work_order_id, variable, received
                );
                return Err(WorkOrderError::ResponseMismatch {
                    variable,
                    expected: expected.clone(),
                    received: received.clone(),
                });
            }
        }

        let result = accept_response(response, worker, secrets.key(), secrets.iv());
        if result.is_ok() {
            debug!("accepted response to work order {}", self.params.work_order_id);
        }
        result
    }
}
