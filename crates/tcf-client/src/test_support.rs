//! Fixtures shared by unit tests.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::data::{WorkerDetails, WorkerStatus, WorkerType};
use std::sync::Arc;
use tcf_utils::{
    DataEncryptionAlgorithm, EncryptionKeyPair, HashAlgorithm, KeyEncryptionAlgorithm,
    SigningAlgorithm, SigningKey,
};

pub(crate) fn requester_key() -> Arc<SigningKey> {
    Arc::new(SigningKey::generate().unwrap())
}

pub(crate) fn test_worker() -> (WorkerDetails, EncryptionKeyPair) {
    let (worker, keys, _) = test_worker_with_signer();
    (worker, keys)
}

pub(crate) fn test_worker_with_signer() -> (WorkerDetails, EncryptionKeyPair, SigningKey) {
    let signing_key = SigningKey::generate().unwrap();
    let keys = EncryptionKeyPair::generate();
    let verification_key = signing_key.verifying_key();
    let worker = WorkerDetails {
        worker_id: WorkerDetails::derive_worker_id(&verification_key),
        worker_type: WorkerType::TeeSgx,
        organization_id: "org".to_string(),
        application_type_ids: vec!["echo".to_string()],
        verification_key,
        encryption_key: keys.public_key().to_vec(),
        encryption_key_nonce: "00".to_string(),
        encryption_key_signature: None,
        hashing_algorithm: HashAlgorithm::Sha256,
        signing_algorithm: SigningAlgorithm::EcdsaP256Sha256,
        key_encryption_algorithm: KeyEncryptionAlgorithm::HpkeX25519,
        data_encryption_algorithm: DataEncryptionAlgorithm::Aes256Gcm,
        status: WorkerStatus::Active,
        proof_data: None,
    };
    (worker, keys, signing_key)
}
