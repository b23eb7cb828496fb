//! Work-order request construction
//!
//! A request is assembled in one pass from the target worker's advertised
//! algorithms and keys: fresh session key material, per-item encryption of
//! `inData`, the session key wrapped for the worker, and the requester's
//! signature over the request hash.  The builder keeps nothing between
//! calls.
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
    data::{payload_digest, DataItem, ItemEncryption, WorkerDetails, WorkerStatus},
    error::BuilderError,
    jrpc::{WorkOrderSubmitParams, PAYLOAD_FORMAT},
};
use log::{debug, info};
use std::{fmt, sync::Arc};
use tcf_utils::{
    sign, wrap_session_key, CryptoError, CryptoSessionCodec, Digest, HashAlgorithm, SessionIv,
    SessionKey, SigningKey,
};

/// Length in bytes of a generated `workOrderId`.
pub const WORK_ORDER_ID_LEN: usize = 32;
/// Length in bytes of a generated `requesterNonce`.
pub const REQUESTER_NONCE_LEN: usize = 16;
pub const DEFAULT_RESPONSE_TIMEOUT_MSECS: u64 = 6000;

/// The session key and iv of one work order.  Both are wiped on drop.
pub struct SessionSecrets {
    key: SessionKey,
    iv: SessionIv,
}

impl SessionSecrets {
    pub fn new(key: SessionKey, iv: SessionIv) -> Self {
        SessionSecrets { key, iv }
    }

    #[inline]
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    #[inline]
    pub fn iv(&self) -> &SessionIv {
        &self.iv
    }
}

impl fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionSecrets(..)")
    }
}

/// Caller-supplied parts of a work order.
#[derive(Clone, Debug, Default)]
pub struct WorkOrderParams {
    /// Generated when `None`.
    pub work_order_id: Option<String>,
    pub workload_id: String,
    pub requester_id: String,
    pub in_data: Vec<DataItem>,
    pub out_data: Vec<DataItem>,
}

/// A sealed, signed, ready-to-submit work order.
#[derive(Debug)]
pub struct WorkOrderRequest {
    params: WorkOrderSubmitParams,
    secrets: SessionSecrets,
    request_hash: Digest,
}

impl WorkOrderRequest {
    #[inline]
    pub fn params(&self) -> &WorkOrderSubmitParams {
        &self.params
    }

    #[inline]
    pub fn work_order_id(&self) -> &str {
        &self.params.work_order_id
    }

    #[inline]
    pub fn secrets(&self) -> &SessionSecrets {
        &self.secrets
    }

    #[inline]
    pub fn request_hash(&self) -> &Digest {
        &self.request_hash
    }

    pub fn into_parts(self) -> (WorkOrderSubmitParams, SessionSecrets) {
        (self.params, self.secrets)
    }
}

/// The hash a requester signs:
/// `H(b64(H(nonce ‖ workOrderId ‖ workerId ‖ workloadId ‖ requesterId)) ‖ dataHash(inData) ‖ dataHash(outData))`.
pub fn request_hash(params: &WorkOrderSubmitParams, algorithm: HashAlgorithm) -> Digest {
    let mut header = Vec::new();
    for field in &[
        &params.requester_nonce,
        &params.work_order_id,
        &params.worker_id,
        &params.workload_id,
        &params.requester_id,
    ] {
        header.extend_from_slice(field.as_bytes());
    }
    let mut message = algorithm.digest(&header).to_base64().into_bytes();
    message.extend_from_slice(payload_digest(&params.in_data, algorithm).to_base64().as_bytes());
    if !params.out_data.is_empty() {
        message.extend_from_slice(payload_digest(&params.out_data, algorithm).to_base64().as_bytes());
    }
    algorithm.digest(&message)
}

pub struct WorkOrderRequestBuilder {
    requester_key: Arc<SigningKey>,
    response_timeout_msecs: u64,
}

impl WorkOrderRequestBuilder {
    pub fn new(requester_key: Arc<SigningKey>) -> Self {
        WorkOrderRequestBuilder {
            requester_key,
            response_timeout_msecs: DEFAULT_RESPONSE_TIMEOUT_MSECS,
        }
    }

    pub fn with_response_timeout(mut self, response_timeout_msecs: u64) -> Self {
        self.response_timeout_msecs = response_timeout_msecs;
        self
    }

    #[inline]
    pub fn requester_key(&self) -> &SigningKey {
        &self.requester_key
    }

    pub fn build(
        &self,
        worker: &WorkerDetails,
        workload_id: &str,
        in_data: Vec<DataItem>,
        requester_id: &str,
    ) -> Result<WorkOrderRequest, BuilderError> {
        self.build_params(
            worker,
            WorkOrderParams {
                work_order_id: None,
                workload_id: workload_id.to_string(),
                requester_id: requester_id.to_string(),
                in_data,
                out_data: Vec::new(),
            },
        )
    }

    pub fn build_params(
        &self,
        worker: &WorkerDetails,
        params: WorkOrderParams,
    ) -> Result<WorkOrderRequest, BuilderError> {
        if worker.encryption_key.is_empty() {
            return Err(BuilderError::MissingWorkerKey(worker.worker_id.clone()));
        }
        if params.in_data.is_empty() {
            return Err(BuilderError::EmptyInData);
        }
        if worker.status != WorkerStatus::Active {
            return Err(BuilderError::WorkerNotActive(worker.worker_id.clone(), worker.status));
        }
        let in_data = sorted_unique(params.in_data)?;
        let out_data = sorted_unique(params.out_data)?;

        let codec = worker.codec();
        let key = codec.generate_session_key().map_err(BuilderError::CryptoError)?;
        let iv = codec.generate_iv().map_err(BuilderError::CryptoError)?;

        let in_data = in_data
            .into_iter()
            .map(|item| protect_item(&codec, &key, item))
            .collect::<Result<Vec<_>, _>>()
            .map_err(BuilderError::CryptoError)?;

        let encrypted_session_key =
            wrap_session_key(&key, &worker.encryption_key).map_err(BuilderError::CryptoError)?;
        let work_order_id = match params.work_order_id {
            Some(id) if !id.is_empty() => id,
            _ => random_hex(&codec, WORK_ORDER_ID_LEN).map_err(BuilderError::CryptoError)?,
        };
        let requester_nonce =
            random_hex(&codec, REQUESTER_NONCE_LEN).map_err(BuilderError::CryptoError)?;

        let mut submit = WorkOrderSubmitParams {
            response_timeout_msecs: self.response_timeout_msecs,
            payload_format: PAYLOAD_FORMAT.to_string(),
            result_uri: String::new(),
            notify_uri: String::new(),
            work_order_id,
            worker_id: worker.worker_id.clone(),
            workload_id: params.workload_id,
            requester_id: params.requester_id,
            worker_encryption_key: hex::encode(&worker.encryption_key),
            data_encryption_algorithm: worker.data_encryption_algorithm,
            encrypted_session_key: hex::encode(encrypted_session_key),
            session_key_iv: iv.to_hex(),
            requester_nonce,
            encrypted_request_hash: String::new(),
            requester_signature: String::new(),
            verifying_key: self.requester_key.verifying_key().to_hex(),
            in_data,
            out_data,
        };

        let hash = request_hash(&submit, worker.hashing_algorithm);
        let sealed_hash = codec
            .seal(hash.as_bytes(), &key, &iv)
            .map_err(BuilderError::CryptoError)?;
        submit.encrypted_request_hash = hex::encode(sealed_hash);
        submit.requester_signature = sign(&hash, &self.requester_key)
            .map_err(BuilderError::CryptoError)?
            .to_base64();

        info!(
            "WorkOrderRequestBuilder: built work order {} for worker {} ({} inData items)",
            submit.work_order_id,
            submit.worker_id,
            submit.in_data.len()
        );

        Ok(WorkOrderRequest {
            params: submit,
            secrets: SessionSecrets::new(key, iv),
            request_hash: hash,
        })
    }
}

fn sorted_unique(mut items: Vec<DataItem>) -> Result<Vec<DataItem>, BuilderError> {
    items.sort_by_key(|item| item.index);
    for pair in items.windows(2) {
        if pair[0].index == pair[1].index {
            return Err(BuilderError::DuplicateIndex(pair[0].index));
        }
    }
    Ok(items)
}

/// Fill in `dataHash` and encrypt session-key items under a fresh per-item
/// nonce.  Items carrying their own key are passed through as given.
fn protect_item(
    codec: &CryptoSessionCodec,
    key: &SessionKey,
    mut item: DataItem,
) -> Result<DataItem, CryptoError> {
    match item.encryption() {
        ItemEncryption::ItemKey(_) => {
            debug!("inData item {} carries its own key, left untouched", item.index);
        }
        ItemEncryption::Plain => {
            if item.data_hash.is_empty() {
                item.data_hash = codec.hash(&item.data).to_hex();
            }
        }
        ItemEncryption::SessionKey => {
            if item.data_hash.is_empty() {
                item.data_hash = codec.hash(&item.data).to_hex();
            }
            let iv = codec.generate_iv()?;
            item.data = codec.seal(&item.data, key, &iv)?;
            item.iv = iv.to_hex();
        }
    }
    Ok(item)
}

fn random_hex(codec: &CryptoSessionCodec, len: usize) -> Result<String, CryptoError> {
    let mut bytes = vec![0u8; len];
    codec.fill_random(&mut bytes)?;
    Ok(hex::encode(bytes))
}
