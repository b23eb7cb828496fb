//! Typed JSON-RPC records
//!
//! Every method the client speaks has its own parameter and result record.
//! Envelopes carry `params` and `result` as JSON values; they are converted
//! to and from the typed records at this boundary and nowhere else.
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
    data::{DataItem, WorkerDetails, WorkerStatus, WorkerType},
    error::{RegistryError, TransportError},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tcf_utils::{
    DataEncryptionAlgorithm, Digest, HashAlgorithm, KeyEncryptionAlgorithm,
    ResponseSignatureFields, Signature, SigningAlgorithm, VerifyingKey,
};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PAYLOAD_FORMAT: &str = "JSON-RPC";

////////////////////////////////////////////////////////////////////////////////
// Envelopes.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Text(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    WorkOrderSubmit,
    WorkOrderGetResult,
    EncryptionKeyGet,
    WorkerRetrieve,
    WorkerLookUp,
    WorkerLookUpNext,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JrpcRequest {
    pub jsonrpc: String,
    pub method: Method,
    pub id: RequestId,
    pub params: Value,
}

impl JrpcRequest {
    pub fn new<P: Serialize>(method: Method, id: RequestId, params: &P) -> Result<Self, TransportError> {
        Ok(JrpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            id,
            params: serde_json::to_value(params)?,
        })
    }

    /// Decode `params` as the record for this request's method.
    pub fn params<P: DeserializeOwned>(&self) -> Result<P, TransportError> {
        Ok(serde_json::from_value(self.params.clone())?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JrpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JrpcError>,
}

/// A response envelope after validation: exactly one of a typed result or
/// an error.
#[derive(Clone, Debug, PartialEq)]
pub enum JrpcOutcome<R> {
    Result(R),
    Error(JrpcError),
}

impl JrpcResponse {
    pub fn with_result<R: Serialize>(id: RequestId, result: &R) -> Result<Self, TransportError> {
        Ok(JrpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    pub fn with_error<M: Into<String>>(id: RequestId, code: JrpcErrorCode, message: M) -> Self {
        JrpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: None,
            error: Some(JrpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn into_outcome<R: DeserializeOwned>(self) -> Result<JrpcOutcome<R>, TransportError> {
        match (self.result, self.error) {
            (Some(_), Some(_)) => Err(TransportError::MalformedResponse(
                "response carries both `result` and `error`".to_string(),
            )),
            (None, Some(error)) => Ok(JrpcOutcome::Error(error)),
            (Some(result), None) => Ok(JrpcOutcome::Result(serde_json::from_value(result)?)),
            (None, None) => Err(TransportError::MalformedResponse(
                "response carries neither `result` nor `error`".to_string(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JrpcError {
    pub code: JrpcErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Status codes carried in `error.code`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum JrpcErrorCode {
    Success,
    Unknown,
    InvalidParameter,
    AccessDenied,
    InvalidSignature,
    Pending,
    Scheduled,
    Processing,
    Busy,
    Other(i64),
}

impl From<i64> for JrpcErrorCode {
    fn from(code: i64) -> Self {
        match code {
            0 => JrpcErrorCode::Success,
            1 => JrpcErrorCode::Unknown,
            2 => JrpcErrorCode::InvalidParameter,
            3 => JrpcErrorCode::AccessDenied,
            4 => JrpcErrorCode::InvalidSignature,
            5 => JrpcErrorCode::Pending,
            6 => JrpcErrorCode::Scheduled,
            7 => JrpcErrorCode::Processing,
            8 => JrpcErrorCode::Busy,
            other => JrpcErrorCode::Other(other),
        }
    }
}

impl From<JrpcErrorCode> for i64 {
    fn from(code: JrpcErrorCode) -> Self {
        match code {
            JrpcErrorCode::Success => 0,
            JrpcErrorCode::Unknown => 1,
            JrpcErrorCode::InvalidParameter => 2,
            JrpcErrorCode::AccessDenied => 3,
            JrpcErrorCode::InvalidSignature => 4,
            JrpcErrorCode::Pending => 5,
            JrpcErrorCode::Scheduled => 6,
            JrpcErrorCode::Processing => 7,
            JrpcErrorCode::Busy => 8,
            JrpcErrorCode::Other(other) => other,
        }
    }
}

impl fmt::Display for JrpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            JrpcErrorCode::Success => "SUCCESS",
            JrpcErrorCode::Unknown => "UNKNOWN_ERROR",
            JrpcErrorCode::InvalidParameter => "INVALID_PARAMETER",
            JrpcErrorCode::AccessDenied => "ACCESS_DENIED",
            JrpcErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            JrpcErrorCode::Pending => "PENDING",
            JrpcErrorCode::Scheduled => "SCHEDULED",
            JrpcErrorCode::Processing => "PROCESSING",
            JrpcErrorCode::Busy => "BUSY",
            JrpcErrorCode::Other(_) => "OTHER",
        };
        write!(f, "{} ({})", i64::from(*self), name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Work orders.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderSubmitParams {
    #[serde(rename = "responseTimeoutMSecs")]
    pub response_timeout_msecs: u64,
    pub payload_format: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result_uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notify_uri: String,
    pub work_order_id: String,
    pub worker_id: String,
    pub workload_id: String,
    pub requester_id: String,
    /// Hex X25519 key the session key was wrapped under.
    pub worker_encryption_key: String,
    pub data_encryption_algorithm: DataEncryptionAlgorithm,
    /// Hex of the wrapped session key.
    pub encrypted_session_key: String,
    /// Hex session iv.
    pub session_key_iv: String,
    pub requester_nonce: String,
    /// Hex of the request hash sealed under the session key and iv.
    pub encrypted_request_hash: String,
    /// Base64 DER signature over the request hash.
    pub requester_signature: String,
    /// Hex requester verification key.
    pub verifying_key: String,
    pub in_data: Vec<DataItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub out_data: Vec<DataItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderGetResultParams {
    pub work_order_id: String,
}

/// The result of a completed work order, signed by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedResponse {
    pub work_order_id: String,
    pub workload_id: String,
    pub worker_id: String,
    pub requester_id: String,
    pub worker_nonce: String,
    /// Base64 DER signature over the canonical response hash.
    pub worker_signature: String,
    /// The result payload.
    pub out_data: Vec<DataItem>,
}

impl SignedResponse {
    pub fn signature_fields<'a>(&'a self, result_payload_digest: &'a Digest) -> ResponseSignatureFields<'a> {
        ResponseSignatureFields {
            work_order_id: &self.work_order_id,
            workload_id: &self.workload_id,
            requester_id: &self.requester_id,
            worker_nonce: &self.worker_nonce,
            result_payload_digest,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Encryption keys.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKeyGetParams {
    pub worker_id: String,
    #[serde(default)]
    pub last_used_key_nonce: String,
    #[serde(default)]
    pub tag: String,
    pub requester_id: String,
    #[serde(default)]
    pub signature_nonce: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionKeyResult {
    pub worker_id: String,
    /// Hex X25519 public key.
    pub encryption_key: String,
    pub encryption_key_nonce: String,
    #[serde(default)]
    pub tag: String,
    /// Base64 worker signature over the hash of the key bytes.
    pub signature: String,
}

////////////////////////////////////////////////////////////////////////////////
// Registry.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRetrieveParams {
    pub worker_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTypeData {
    pub verification_key: String,
    pub encryption_key: String,
    #[serde(default)]
    pub encryption_key_nonce: String,
    #[serde(default)]
    pub encryption_key_signature: String,
    #[serde(default)]
    pub proof_data_type: String,
    #[serde(default)]
    pub proof_data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecordDetails {
    pub hashing_algorithm: HashAlgorithm,
    pub signing_algorithm: SigningAlgorithm,
    pub key_encryption_algorithm: KeyEncryptionAlgorithm,
    pub data_encryption_algorithm: DataEncryptionAlgorithm,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub work_order_sync_uri: String,
    pub worker_type_data: WorkerTypeData,
}

/// `WorkerRetrieve` result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub worker_id: String,
    pub worker_type: WorkerType,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub application_type_id: Vec<String>,
    pub details: WorkerRecordDetails,
    pub status: WorkerStatus,
}

impl WorkerRecord {
    /// Decode the record, checking that `workerId` is derived from the
    /// verification key.
    pub fn into_details(self) -> Result<WorkerDetails, RegistryError> {
        let data = self.details.worker_type_data;
        let verification_key = VerifyingKey::from_hex(&data.verification_key).map_err(|err| {
            RegistryError::MalformedRecord("verificationKey", err.to_string())
        })?;
        let encryption_key = hex::decode(&data.encryption_key)
            .map_err(|err| RegistryError::MalformedRecord("encryptionKey", format!("{:?}", err)))?;
        let encryption_key_signature = if data.encryption_key_signature.is_empty() {
            None
        } else {
            Some(Signature::from_base64(&data.encryption_key_signature).map_err(|err| {
                RegistryError::MalformedRecord("encryptionKeySignature", err.to_string())
            })?)
        };

        let derived = WorkerDetails::derive_worker_id(&verification_key);
        if derived != self.worker_id {
            return Err(RegistryError::IdentityMismatch {
                expected: derived,
                received: self.worker_id,
            });
        }

        Ok(WorkerDetails {
            worker_id: self.worker_id,
            worker_type: self.worker_type,
            organization_id: self.organization_id,
            application_type_ids: self.application_type_id,
            verification_key,
            encryption_key,
            encryption_key_nonce: data.encryption_key_nonce,
            encryption_key_signature,
            hashing_algorithm: self.details.hashing_algorithm,
            signing_algorithm: self.details.signing_algorithm,
            key_encryption_algorithm: self.details.key_encryption_algorithm,
            data_encryption_algorithm: self.details.data_encryption_algorithm,
            status: self.status,
            proof_data: if data.proof_data.is_empty() {
                None
            } else {
                Some(data.proof_data)
            },
        })
    }

    pub fn from_details(worker: &WorkerDetails) -> Self {
        WorkerRecord {
            worker_id: worker.worker_id.clone(),
            worker_type: worker.worker_type,
            organization_id: worker.organization_id.clone(),
            application_type_id: worker.application_type_ids.clone(),
            details: WorkerRecordDetails {
                hashing_algorithm: worker.hashing_algorithm,
                signing_algorithm: worker.signing_algorithm,
                key_encryption_algorithm: worker.key_encryption_algorithm,
                data_encryption_algorithm: worker.data_encryption_algorithm,
                work_order_sync_uri: String::new(),
                worker_type_data: WorkerTypeData {
                    verification_key: worker.verification_key.to_hex(),
                    encryption_key: hex::encode(&worker.encryption_key),
                    encryption_key_nonce: worker.encryption_key_nonce.clone(),
                    encryption_key_signature: worker
                        .encryption_key_signature
                        .as_ref()
                        .map(Signature::to_base64)
                        .unwrap_or_default(),
                    proof_data_type: if worker.proof_data.is_some() {
                        "TEE-SGX-IAS".to_string()
                    } else {
                        String::new()
                    },
                    proof_data: worker.proof_data.clone().unwrap_or_default(),
                },
            },
            status: worker.status,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLookUpParams {
    pub worker_type: WorkerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_type_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLookUpNextParams {
    #[serde(flatten)]
    pub query: WorkerLookUpParams,
    pub lookup_tag: String,
}

/// One page of worker ids.  `lookupTag` continues the listing; it is absent
/// on the last page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLookUpResult {
    pub total_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_tag: Option<String>,
    pub ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_shape() {
        let request = JrpcRequest::new(
            Method::WorkOrderGetResult,
            RequestId::Number(7),
            &WorkOrderGetResultParams {
                work_order_id: "abcd".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "method": "WorkOrderGetResult",
                "id": 7,
                "params": { "workOrderId": "abcd" }
            })
        );
    }

    #[test]
    fn pending_error_is_decoded() {
        let response: JrpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": 5}})).unwrap();
        match response.into_outcome::<SignedResponse>().unwrap() {
            JrpcOutcome::Error(error) => {
                assert_eq!(error.code, JrpcErrorCode::Pending);
                assert!(error.message.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn envelopes_must_carry_exactly_one_of_result_or_error() {
        let both: JrpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": 2, "message": "x"}
        }))
        .unwrap();
        assert!(both.into_outcome::<Value>().is_err());
        let neither: JrpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(neither.into_outcome::<Value>().is_err());
    }

    #[test]
    fn mistyped_result_is_rejected_at_the_boundary() {
        let response: JrpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": "x", "result": {"workOrderId": 3}
        }))
        .unwrap();
        assert!(response.into_outcome::<SignedResponse>().is_err());
    }

    #[test]
    fn unknown_error_codes_are_preserved() {
        assert_eq!(JrpcErrorCode::from(42), JrpcErrorCode::Other(42));
        assert_eq!(i64::from(JrpcErrorCode::Other(42)), 42);
        assert_eq!(JrpcErrorCode::Busy.to_string(), "8 (BUSY)");
    }

    #[test]
    fn lookup_next_flattens_query() {
        let params = WorkerLookUpNextParams {
            query: WorkerLookUpParams {
                worker_type: WorkerType::TeeSgx,
                organization_id: None,
                application_type_id: Some("app".to_string()),
            },
            lookup_tag: "tag".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"workerType": 1, "applicationTypeId": "app", "lookupTag": "tag"})
        );
    }
}
