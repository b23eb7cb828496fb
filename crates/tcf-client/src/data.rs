//! Work-order and worker data model
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use attestation_verifier::{AttestationError, AttestationEvidence};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};
use tcf_utils::{
    sha256, CryptoSessionCodec, DataEncryptionAlgorithm, Digest, HashAlgorithm,
    KeyEncryptionAlgorithm, Signature, SigningAlgorithm, VerifyingKey,
};

/// `encryptedDataEncryptionKey` value marking an item that is only base64
/// encoded, never encrypted.
pub const NO_ENCRYPTION: &str = "-";
/// `encryptedDataEncryptionKey` value marking an item encrypted under the
/// session key.  An absent or empty field means the same.
pub const SESSION_KEY_MARKER: &str = "null";

////////////////////////////////////////////////////////////////////////////////
// Data items.
////////////////////////////////////////////////////////////////////////////////

/// How the `data` of one item is protected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemEncryption {
    /// Encrypted under the work order's session key.
    SessionKey,
    /// Base64 only.
    Plain,
    /// Encrypted by the caller under its own key, itself wrapped and carried
    /// in `encryptedDataEncryptionKey`.
    ItemKey(String),
}

/// One entry of `inData` or `outData`.  `data` holds raw bytes: plaintext
/// before a request is built, ciphertext once it has been.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItem {
    pub index: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_hash: String,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data_encryption_key: Option<String>,
    /// Hex nonce used for this item.  Empty means the session iv.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iv: String,
}

impl DataItem {
    /// An item to be encrypted under the session key.
    pub fn new<D: Into<Vec<u8>>>(index: u32, data: D) -> Self {
        DataItem {
            index,
            data_hash: String::new(),
            data: data.into(),
            encrypted_data_encryption_key: None,
            iv: String::new(),
        }
    }

    /// An item sent without encryption.
    pub fn plain<D: Into<Vec<u8>>>(index: u32, data: D) -> Self {
        DataItem {
            encrypted_data_encryption_key: Some(NO_ENCRYPTION.to_string()),
            ..DataItem::new(index, data)
        }
    }

    /// An item the caller has already encrypted under its own key.
    pub fn pre_encrypted<D: Into<Vec<u8>>>(
        index: u32,
        ciphertext: D,
        encrypted_data_encryption_key: String,
        iv: String,
    ) -> Self {
        DataItem {
            encrypted_data_encryption_key: Some(encrypted_data_encryption_key),
            iv,
            ..DataItem::new(index, ciphertext)
        }
    }

    pub fn encryption(&self) -> ItemEncryption {
        match self.encrypted_data_encryption_key.as_deref() {
            None | Some("") | Some(SESSION_KEY_MARKER) => ItemEncryption::SessionKey,
            Some(NO_ENCRYPTION) => ItemEncryption::Plain,
            Some(key) => ItemEncryption::ItemKey(key.to_string()),
        }
    }

    /// Concatenation of the item's wire fields, as hashed into request and
    /// response digests.
    fn hash_input(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.data_hash.as_bytes());
        out.extend_from_slice(base64::encode(&self.data).as_bytes());
        if let Some(key) = &self.encrypted_data_encryption_key {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.iv.as_bytes());
    }
}

/// Digest over a sequence of items, taken in `index` order.
pub fn payload_digest(items: &[DataItem], algorithm: HashAlgorithm) -> Digest {
    let mut sorted: Vec<&DataItem> = items.iter().collect();
    sorted.sort_by_key(|item| item.index);
    let mut input = Vec::new();
    for item in sorted {
        item.hash_input(&mut input);
    }
    algorithm.digest(&input)
}

/// Serde adapter carrying raw bytes as base64 text.
mod base64_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::decode(&text).map_err(|err| D::Error::custom(format!("invalid base64: {:?}", err)))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Work-order status.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkOrderStatus {
    Submitted,
    Pending,
    Scheduled,
    Processing,
    Completed,
    Failed,
}

impl WorkOrderStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Failed)
    }

    /// Position in the lifecycle.  Observed statuses never decrease.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            WorkOrderStatus::Submitted => 0,
            WorkOrderStatus::Pending => 1,
            WorkOrderStatus::Scheduled => 2,
            WorkOrderStatus::Processing => 3,
            WorkOrderStatus::Completed | WorkOrderStatus::Failed => 4,
        }
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WorkOrderStatus::Submitted => "SUBMITTED",
            WorkOrderStatus::Pending => "PENDING",
            WorkOrderStatus::Scheduled => "SCHEDULED",
            WorkOrderStatus::Processing => "PROCESSING",
            WorkOrderStatus::Completed => "COMPLETED",
            WorkOrderStatus::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Workers.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WorkerStatus {
    Active = 1,
    OffLine = 2,
    Decommissioned = 3,
    Compromised = 4,
}

impl TryFrom<u8> for WorkerStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WorkerStatus::Active),
            2 => Ok(WorkerStatus::OffLine),
            3 => Ok(WorkerStatus::Decommissioned),
            4 => Ok(WorkerStatus::Compromised),
            other => Err(format!("unknown worker status {}", other)),
        }
    }
}

impl From<WorkerStatus> for u8 {
    fn from(status: WorkerStatus) -> Self {
        status as u8
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WorkerStatus::Active => "ACTIVE",
            WorkerStatus::OffLine => "OFF_LINE",
            WorkerStatus::Decommissioned => "DECOMMISSIONED",
            WorkerStatus::Compromised => "COMPROMISED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WorkerType {
    TeeSgx = 1,
    Mpc = 2,
    Zk = 3,
}

impl TryFrom<u8> for WorkerType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WorkerType::TeeSgx),
            2 => Ok(WorkerType::Mpc),
            3 => Ok(WorkerType::Zk),
            other => Err(format!("unknown worker type {}", other)),
        }
    }
}

impl From<WorkerType> for u8 {
    fn from(worker_type: WorkerType) -> Self {
        worker_type as u8
    }
}

impl std::str::FromStr for WorkerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEE-SGX" | "tee-sgx" | "1" => Ok(WorkerType::TeeSgx),
            "MPC" | "mpc" | "2" => Ok(WorkerType::Mpc),
            "ZK" | "zk" | "3" => Ok(WorkerType::Zk),
            other => Err(format!("unknown worker type {}", other)),
        }
    }
}

/// A registered worker, as needed to address and verify work orders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerDetails {
    pub worker_id: String,
    pub worker_type: WorkerType,
    pub organization_id: String,
    pub application_type_ids: Vec<String>,
    pub verification_key: VerifyingKey,
    /// Raw X25519 public key used to wrap session keys.
    pub encryption_key: Vec<u8>,
    pub encryption_key_nonce: String,
    pub encryption_key_signature: Option<Signature>,
    pub hashing_algorithm: HashAlgorithm,
    pub signing_algorithm: SigningAlgorithm,
    pub key_encryption_algorithm: KeyEncryptionAlgorithm,
    pub data_encryption_algorithm: DataEncryptionAlgorithm,
    pub status: WorkerStatus,
    /// Attestation evidence, present only for attested workers.
    pub proof_data: Option<String>,
}

impl WorkerDetails {
    /// `workerId` is the hex SHA-256 of the verification key bytes.
    pub fn derive_worker_id(verification_key: &VerifyingKey) -> String {
        sha256(verification_key.as_bytes()).to_hex()
    }

    #[inline]
    pub fn has_consistent_id(&self) -> bool {
        self.worker_id == Self::derive_worker_id(&self.verification_key)
    }

    /// The 64 bytes an attested worker's quote must carry as report data:
    /// `SHA-256(encryption_key) ‖ SHA-256(verification_key)`.
    pub fn key_binding(&self) -> Vec<u8> {
        let mut binding = sha256(&self.encryption_key).into_bytes();
        binding.extend_from_slice(sha256(self.verification_key.as_bytes()).as_bytes());
        binding
    }

    /// A codec for the algorithms this worker advertises.
    pub fn codec(&self) -> CryptoSessionCodec {
        CryptoSessionCodec::new(self.data_encryption_algorithm, self.hashing_algorithm)
    }

    pub fn attestation_evidence(&self) -> Option<Result<AttestationEvidence, AttestationError>> {
        self.proof_data
            .as_deref()
            .filter(|proof| !proof.is_empty())
            .map(AttestationEvidence::from_proof_data)
    }
}
