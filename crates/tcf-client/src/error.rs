//! Work-order client errors
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
    data::{WorkOrderStatus, WorkerStatus},
    jrpc::JrpcErrorCode,
};
use err_derive::Error;
use tcf_utils::{CryptoError, SignatureStatus};

/// Failures while assembling a work-order request.
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error(display = "BuilderError: worker {} has no encryption key.", _0)]
    MissingWorkerKey(String),
    #[error(display = "BuilderError: a work order must carry at least one inData item.")]
    EmptyInData,
    #[error(display = "BuilderError: worker {} has status {} and cannot accept work orders.", _0, _1)]
    WorkerNotActive(String, WorkerStatus),
    #[error(display = "BuilderError: duplicate inData index {}.", _0)]
    DuplicateIndex(u32),
    #[error(display = "BuilderError: CryptoError: {}", _0)]
    CryptoError(#[error(source)] CryptoError),
}

/// Protocol-level failures of a submitted work order.
#[derive(Debug, Error)]
pub enum WorkOrderError {
    #[error(
        display = "WorkOrderError: work order {} did not reach a terminal status within {} ms.",
        work_order_id,
        waited_ms
    )]
    Timeout {
        work_order_id: String,
        waited_ms: u128,
    },
    #[error(display = "WorkOrderError: polling of work order {} was cancelled.", _0)]
    Cancelled(String),
    #[error(display = "WorkOrderError: workerSignature verification returned {}.", _0)]
    InvalidSignature(SignatureStatus),
    #[error(display = "WorkOrderError: decryption of outData item {} failed: {}", _0, _1)]
    DecryptionFailed(u32, CryptoError),
    #[error(
        display = "WorkOrderError: outData item {} does not match its dataHash.",
        _0
    )]
    DataHashMismatch(u32),
    #[error(display = "WorkOrderError: rejected by worker with code {}: {}.", code, message)]
    Rejected {
        code: JrpcErrorCode,
        message: String,
    },
    #[error(display = "WorkOrderError: invalid status transition from {} to {}.", from, to)]
    InvalidTransition {
        from: WorkOrderStatus,
        to: WorkOrderStatus,
    },
    #[error(
        display = "WorkOrderError: MismatchError: response field `{}` mismatch, expected {:?} but received {:?}.",
        variable,
        expected,
        received
    )]
    ResponseMismatch {
        variable: &'static str,
        expected: String,
        received: String,
    },
    #[error(display = "WorkOrderError: malformed response: {}.", _0)]
    MalformedResponse(String),
    #[error(display = "WorkOrderError: session key material for {} has already been released.", _0)]
    SessionReleased(String),
    #[error(display = "WorkOrderError: TransportError: {}", _0)]
    TransportError(#[error(source)] TransportError),
}

/// Failures surfaced by a worker registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(display = "RegistryError: worker {} not found.", _0)]
    NotFound(String),
    #[error(display = "RegistryError: registry unavailable: {}.", _0)]
    Unavailable(String),
    #[error(
        display = "RegistryError: workerId {} is not derived from its verificationKey (expected {}).",
        received,
        expected
    )]
    IdentityMismatch { expected: String, received: String },
    #[error(display = "RegistryError: malformed worker record field `{}`: {}.", _0, _1)]
    MalformedRecord(&'static str, String),
}

/// Failures of a transport channel, after any retries it performs itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(display = "TransportError: endpoint unavailable: {}.", _0)]
    Unavailable(String),
    #[error(display = "TransportError: endpoint returned HTTP status {}.", _0)]
    HttpStatus(u16),
    #[error(display = "TransportError: malformed JSON-RPC response: {}.", _0)]
    MalformedResponse(String),
    #[error(display = "TransportError: SerdeJsonError: {}.", _0)]
    SerdeJsonError(#[error(source)] serde_json::Error),
}

/// Failures loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(display = "ConfigError: IOError: {}.", _0)]
    IOError(#[error(source)] std::io::Error),
    #[error(display = "ConfigError: SerdeJsonError: {}.", _0)]
    SerdeJsonError(#[error(source)] serde_json::Error),
    #[error(display = "ConfigError: invalid value for `{}`: {}.", _0, _1)]
    InvalidValue(&'static str, String),
}

impl From<TransportError> for RegistryError {
    fn from(error: TransportError) -> Self {
        RegistryError::Unavailable(error.to_string())
    }
}
