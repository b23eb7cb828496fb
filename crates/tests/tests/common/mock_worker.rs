//! A simulated worker and the JSON-RPC listener in front of it
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};
use tcf_client::{
    jrpc::{
        EncryptionKeyGetParams, EncryptionKeyResult, JrpcRequest, JrpcResponse, Method,
        WorkOrderGetResultParams, WorkOrderSubmitParams, WorkerLookUpResult, WorkerRecord,
        WorkerRetrieveParams,
    },
    payload_digest, request_hash, DataItem, ItemEncryption, JrpcErrorCode, SignedResponse,
    TransportChannel, TransportError, WorkerDetails, WorkerStatus, WorkerType,
};
use tcf_utils::{
    sign, verify, DataEncryptionAlgorithm, EncryptionKeyPair, HashAlgorithm,
    KeyEncryptionAlgorithm, SessionIv, Signature, SigningAlgorithm, SigningKey,
};
use tests::{ReportAuthority, TEST_MR_ENCLAVE};

/// A worker that echoes its input back, optionally transformed.
pub struct SimulatedWorker {
    signing_key: SigningKey,
    encryption_keys: EncryptionKeyPair,
    details: WorkerDetails,
}

impl SimulatedWorker {
    pub fn new() -> Self {
        let signing_key = SigningKey::generate().unwrap();
        let encryption_keys = EncryptionKeyPair::generate();
        let verification_key = signing_key.verifying_key();
        let encryption_key = encryption_keys.public_key().to_vec();
        let encryption_key_signature =
            sign(&HashAlgorithm::Sha256.digest(&encryption_key), &signing_key).unwrap();
        let details = WorkerDetails {
            worker_id: WorkerDetails::derive_worker_id(&verification_key),
            worker_type: WorkerType::TeeSgx,
            organization_id: "simulated-org".to_string(),
            application_type_ids: vec!["echo".to_string()],
            verification_key,
            encryption_key,
            encryption_key_nonce: "01".to_string(),
            encryption_key_signature: Some(encryption_key_signature),
            hashing_algorithm: HashAlgorithm::Sha256,
            signing_algorithm: SigningAlgorithm::EcdsaP256Sha256,
            key_encryption_algorithm: KeyEncryptionAlgorithm::HpkeX25519,
            data_encryption_algorithm: DataEncryptionAlgorithm::Aes256Gcm,
            status: WorkerStatus::Active,
            proof_data: None,
        };
        SimulatedWorker {
            signing_key,
            encryption_keys,
            details,
        }
    }

    /// A worker whose proof data binds its keys, reported with `status`.
    pub fn attested(authority: &ReportAuthority, status: &str) -> Self {
        let mut worker = Self::new();
        let evidence = authority
            .issue(status, TEST_MR_ENCLAVE, &worker.details.key_binding())
            .unwrap();
        worker.details.proof_data = Some(evidence.to_proof_data().unwrap());
        worker
    }

    #[inline]
    pub fn details(&self) -> &WorkerDetails {
        &self.details
    }

    #[inline]
    pub fn details_mut(&mut self) -> &mut WorkerDetails {
        &mut self.details
    }

    #[inline]
    pub fn worker_id(&self) -> &str {
        &self.details.worker_id
    }

    /// Check the request the way a worker enclave would, run the workload
    /// and return the signed response.
    pub fn process<F>(&self, params: &WorkOrderSubmitParams, transform: F) -> Result<SignedResponse>
    where
        F: Fn(&[u8]) -> Vec<u8>,
    {
        let codec = self.details.codec();
        let wrapped = hex::decode(&params.encrypted_session_key)?;
        let key = self.encryption_keys.unwrap_session_key(&wrapped)?;
        let session_iv = SessionIv::from_hex(&params.session_key_iv)?;

        let hash = request_hash(params, self.details.hashing_algorithm);
        let sealed_hash = hex::decode(&params.encrypted_request_hash)?;
        if codec.open(&sealed_hash, &key, &session_iv)? != hash.as_bytes() {
            return Err(anyhow!("encryptedRequestHash does not match the request"));
        }
        let requester_key = tcf_utils::VerifyingKey::from_hex(&params.verifying_key)?;
        let signature = Signature::from_base64(&params.requester_signature)?;
        let status = verify(&hash, &signature, &requester_key);
        if !status.is_passed() {
            return Err(anyhow!("requesterSignature: {}", status));
        }

        let mut out_data = Vec::with_capacity(params.in_data.len());
        for item in params.in_data.iter() {
            let plaintext = match item.encryption() {
                ItemEncryption::SessionKey => {
                    let iv = if item.iv.is_empty() {
                        session_iv.clone()
                    } else {
                        SessionIv::from_hex(&item.iv)?
                    };
                    codec.open(&item.data, &key, &iv)?
                }
                ItemEncryption::Plain => item.data.clone(),
                ItemEncryption::ItemKey(_) => return Err(anyhow!("item keys are not supported")),
            };
            let output = transform(&plaintext);
            let iv = codec.generate_iv()?;
            let mut out = DataItem::new(item.index, codec.seal(&output, &key, &iv)?);
            out.iv = iv.to_hex();
            out.data_hash = codec.hash(&output).to_hex();
            out_data.push(out);
        }

        let mut nonce = [0u8; 16];
        codec.fill_random(&mut nonce)?;
        let mut response = SignedResponse {
            work_order_id: params.work_order_id.clone(),
            workload_id: params.workload_id.clone(),
            worker_id: self.details.worker_id.clone(),
            requester_id: params.requester_id.clone(),
            worker_nonce: hex::encode(nonce),
            worker_signature: String::new(),
            out_data,
        };
        self.sign_response(&mut response, &self.signing_key)?;
        Ok(response)
    }

    pub fn sign_response(&self, response: &mut SignedResponse, key: &SigningKey) -> Result<()> {
        let hashing = self.details.hashing_algorithm;
        let payload = payload_digest(&response.out_data, hashing);
        let hash = response.signature_fields(&payload).digest(hashing);
        response.worker_signature = sign(&hash, key)?.to_base64();
        Ok(())
    }

    pub fn encryption_key_result(&self) -> EncryptionKeyResult {
        EncryptionKeyResult {
            worker_id: self.details.worker_id.clone(),
            encryption_key: self.encryption_keys.public_key_hex(),
            encryption_key_nonce: self.details.encryption_key_nonce.clone(),
            tag: String::new(),
            signature: self
                .details
                .encryption_key_signature
                .as_ref()
                .map(Signature::to_base64)
                .unwrap_or_default(),
        }
    }
}

/// How the listener answers `WorkOrderSubmit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    /// Accept with `PENDING` and answer later polls.
    Queued,
    /// Return the result immediately.
    Synchronous,
    /// Refuse with the given code.
    Reject(JrpcErrorCode),
}

/// A JSON-RPC listener serving one simulated worker.
pub struct MockListener {
    worker: SimulatedWorker,
    submit_mode: SubmitMode,
    /// Codes returned to `WorkOrderGetResult` before the result.
    progress: Mutex<VecDeque<JrpcErrorCode>>,
    /// Signs responses in place of the worker.
    impostor: Option<SigningKey>,
    results: Mutex<HashMap<String, SignedResponse>>,
    calls: Mutex<Vec<Method>>,
}

impl MockListener {
    pub fn new(worker: SimulatedWorker) -> Self {
        MockListener {
            worker,
            submit_mode: SubmitMode::Queued,
            progress: Mutex::new(VecDeque::new()),
            impostor: None,
            results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_submit_mode(mut self, submit_mode: SubmitMode) -> Self {
        self.submit_mode = submit_mode;
        self
    }

    pub fn with_progress<I: IntoIterator<Item = JrpcErrorCode>>(self, progress: I) -> Self {
        self.progress.lock().unwrap().extend(progress);
        self
    }

    /// Sign results with `key` and garble their payload, so that a client
    /// decrypting before checking the signature would fail on decryption.
    pub fn with_impostor(mut self, key: SigningKey) -> Self {
        self.impostor = Some(key);
        self
    }

    #[inline]
    pub fn worker(&self) -> &SimulatedWorker {
        &self.worker
    }

    pub fn calls(&self, method: Method) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| **called == method)
            .count()
    }

    fn submit(&self, request: &JrpcRequest) -> Result<JrpcResponse, TransportError> {
        if let SubmitMode::Reject(code) = self.submit_mode {
            return Ok(JrpcResponse::with_error(request.id.clone(), code, "work order refused"));
        }
        let params: WorkOrderSubmitParams = request.params()?;
        let mut response = match self.worker.process(&params, |input| input.to_vec()) {
            Ok(response) => response,
            Err(err) => {
                return Ok(JrpcResponse::with_error(
                    request.id.clone(),
                    JrpcErrorCode::InvalidParameter,
                    err.to_string(),
                ))
            }
        };
        if let Some(impostor) = &self.impostor {
            for item in response.out_data.iter_mut() {
                item.data = vec![0xee; 4];
            }
            self.worker
                .sign_response(&mut response, impostor)
                .map_err(|err| TransportError::MalformedResponse(err.to_string()))?;
        }
        debug!("MockListener: accepted work order {}", params.work_order_id);
        if self.submit_mode == SubmitMode::Synchronous {
            return JrpcResponse::with_result(request.id.clone(), &response);
        }
        self.results
            .lock()
            .unwrap()
            .insert(params.work_order_id.clone(), response);
        Ok(JrpcResponse::with_error(
            request.id.clone(),
            JrpcErrorCode::Pending,
            "Work order is computing",
        ))
    }

    fn get_result(&self, request: &JrpcRequest) -> Result<JrpcResponse, TransportError> {
        let params: WorkOrderGetResultParams = request.params()?;
        if let Some(code) = self.progress.lock().unwrap().pop_front() {
            return Ok(JrpcResponse::with_error(request.id.clone(), code, ""));
        }
        match self.results.lock().unwrap().get(&params.work_order_id) {
            Some(response) => JrpcResponse::with_result(request.id.clone(), response),
            None => Ok(JrpcResponse::with_error(
                request.id.clone(),
                JrpcErrorCode::InvalidParameter,
                "Work order Id not found",
            )),
        }
    }
}

#[async_trait]
impl TransportChannel for MockListener {
    async fn send(&self, request: &JrpcRequest) -> Result<JrpcResponse, TransportError> {
        self.calls.lock().unwrap().push(request.method);
        let id = request.id.clone();
        match request.method {
            Method::WorkOrderSubmit => self.submit(request),
            Method::WorkOrderGetResult => self.get_result(request),
            Method::EncryptionKeyGet => {
                let params: EncryptionKeyGetParams = request.params()?;
                if params.worker_id != self.worker.worker_id() {
                    return Ok(JrpcResponse::with_error(id, JrpcErrorCode::InvalidParameter, "unknown worker"));
                }
                JrpcResponse::with_result(id, &self.worker.encryption_key_result())
            }
            Method::WorkerRetrieve => {
                let params: WorkerRetrieveParams = request.params()?;
                if params.worker_id != self.worker.worker_id() {
                    return Ok(JrpcResponse::with_error(
                        id,
                        JrpcErrorCode::InvalidParameter,
                        "Worker Id not found",
                    ));
                }
                JrpcResponse::with_result(id, &WorkerRecord::from_details(self.worker.details()))
            }
            Method::WorkerLookUp | Method::WorkerLookUpNext => JrpcResponse::with_result(
                id,
                &WorkerLookUpResult {
                    total_count: 1,
                    lookup_tag: None,
                    ids: vec![self.worker.worker_id().to_string()],
                },
            ),
        }
    }
}
