//! Signing and verification of work-order digests.
//!
//! Requesters sign the request hash and workers sign the response hash with
//! ECDSA over P-256 and SHA-256.  Signatures are ASN.1 DER encoded on the
//! wire; verifying keys are uncompressed SEC1 points.
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
    der::{parse_ecdsa_signature, sig_to_der, RAW_SIGNATURE_LEN},
    error::CryptoError,
    hash::{Digest, HashAlgorithm},
};
use log::{debug, warn};
use ring::{
    rand::SystemRandom,
    signature::{self, EcdsaKeyPair, KeyPair, UnparsedPublicKey},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use zeroize::Zeroizing;

/// Length of an uncompressed SEC1 P-256 point.
pub const VERIFYING_KEY_LEN: usize = 65;
const SEC1_UNCOMPRESSED_TAG: u8 = 4;

////////////////////////////////////////////////////////////////////////////////
// Algorithms and keys.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[serde(rename = "ECDSA-P256-SHA256")]
    EcdsaP256Sha256,
}

impl Default for SigningAlgorithm {
    fn default() -> Self {
        SigningAlgorithm::EcdsaP256Sha256
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ECDSA-P256-SHA256")
    }
}

impl FromStr for SigningAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECDSA-P256-SHA256" => Ok(SigningAlgorithm::EcdsaP256Sha256),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A private signing key, stored as its PKCS#8 document.
pub struct SigningKey {
    key_pair: EcdsaKeyPair,
    pkcs8: Zeroizing<Vec<u8>>,
    rng: SystemRandom,
}

impl SigningKey {
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| CryptoError::RandomnessFailure)?;
        Self::from_pkcs8_der(pkcs8.as_ref())
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, der, &rng)
                .map_err(|err| CryptoError::InvalidSigningKey(format!("{}", err)))?;
        Ok(SigningKey {
            key_pair,
            pkcs8: Zeroizing::new(der.to_vec()),
            rng,
        })
    }

    #[inline]
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.key_pair.public_key().as_ref().to_vec())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SigningKey({})", self.verifying_key().to_hex())
    }
}

/// A public verification key.  May hold arbitrary bytes when decoded from
/// untrusted input; `verify` reports a malformed key rather than failing.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyingKey(Vec<u8>);

impl VerifyingKey {
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        VerifyingKey(bytes)
    }

    pub fn from_hex(key: &str) -> Result<Self, CryptoError> {
        Ok(VerifyingKey(hex::decode(key)?))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    fn is_well_formed(&self) -> bool {
        self.0.len() == VERIFYING_KEY_LEN && self.0[0] == SEC1_UNCOMPRESSED_TAG
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Signature(bytes)
    }

    pub fn from_base64(sig: &str) -> Result<Self, CryptoError> {
        Ok(Signature(base64::decode(sig)?))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0))
    }
}

/// Outcome of a signature check.  Malformed input is a status, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    Passed,
    Failed,
    InvalidSignatureFormat,
    InvalidVerificationKey,
}

impl SignatureStatus {
    #[inline]
    pub fn is_passed(&self) -> bool {
        *self == SignatureStatus::Passed
    }
}

impl fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SignatureStatus::Passed => "PASSED",
            SignatureStatus::Failed => "FAILED",
            SignatureStatus::InvalidSignatureFormat => "INVALID_SIGNATURE_FORMAT",
            SignatureStatus::InvalidVerificationKey => "INVALID_VERIFICATION_KEY",
        };
        write!(f, "{}", name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Sign and verify.
////////////////////////////////////////////////////////////////////////////////

pub fn sign(message_hash: &Digest, private_key: &SigningKey) -> Result<Signature, CryptoError> {
    let signature = private_key
        .key_pair
        .sign(&private_key.rng, message_hash.as_bytes())
        .map_err(|_| CryptoError::SigningFailed)?;
    Ok(Signature(signature.as_ref().to_vec()))
}

/// Check `signature` over `message_hash`.  Raw 64-byte `r || s` signatures
/// are accepted alongside DER.  Never fails.
pub fn verify(
    message_hash: &Digest,
    signature: &Signature,
    public_key: &VerifyingKey,
) -> SignatureStatus {
    if !public_key.is_well_formed() {
        warn!(
            "signature::verify: verification key of {} bytes is not an uncompressed P-256 point",
            public_key.as_bytes().len()
        );
        return SignatureStatus::InvalidVerificationKey;
    }
    let der = if parse_ecdsa_signature(signature.as_bytes()).is_ok() {
        signature.as_bytes().to_vec()
    } else if signature.as_bytes().len() == RAW_SIGNATURE_LEN {
        match sig_to_der(signature.as_bytes()) {
            Ok(der) => der,
            Err(()) => return SignatureStatus::InvalidSignatureFormat,
        }
    } else {
        warn!(
            "signature::verify: signature of {} bytes is neither DER nor raw",
            signature.as_bytes().len()
        );
        return SignatureStatus::InvalidSignatureFormat;
    };

    let key = UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, public_key.as_bytes());
    match key.verify(message_hash.as_bytes(), &der) {
        Ok(()) => SignatureStatus::Passed,
        Err(_) => {
            debug!("signature::verify: signature did not verify");
            SignatureStatus::Failed
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Canonical response message.
////////////////////////////////////////////////////////////////////////////////

/// The fields a worker signs when it returns a work-order result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponseField {
    WorkOrderId,
    WorkloadId,
    RequesterId,
    WorkerNonce,
    ResultPayloadDigest,
}

/// The one order in which response fields are concatenated before hashing.
/// Shared by the signing worker and the verifying requester.
pub const RESPONSE_SIGNATURE_FIELDS: [ResponseField; 5] = [
    ResponseField::WorkOrderId,
    ResponseField::WorkloadId,
    ResponseField::RequesterId,
    ResponseField::WorkerNonce,
    ResponseField::ResultPayloadDigest,
];

/// Borrowed view of the signed fields of one response.
#[derive(Clone, Copy, Debug)]
pub struct ResponseSignatureFields<'a> {
    pub work_order_id: &'a str,
    pub workload_id: &'a str,
    pub requester_id: &'a str,
    pub worker_nonce: &'a str,
    pub result_payload_digest: &'a Digest,
}

impl<'a> ResponseSignatureFields<'a> {
    /// Message bytes in the pinned field order.
    pub fn canonical_message(&self) -> Vec<u8> {
        self.message_in_order(&RESPONSE_SIGNATURE_FIELDS)
    }

    /// Message bytes in an arbitrary field order.
    pub fn message_in_order(&self, order: &[ResponseField]) -> Vec<u8> {
        let mut message = Vec::new();
        for field in order {
            message.extend_from_slice(self.field(*field).as_bytes());
        }
        message
    }

    /// Hash of the canonical message, the value the worker signs.
    pub fn digest(&self, algorithm: HashAlgorithm) -> Digest {
        algorithm.digest(&self.canonical_message())
    }

    fn field(&self, field: ResponseField) -> String {
        match field {
            ResponseField::WorkOrderId => self.work_order_id.to_string(),
            ResponseField::WorkloadId => self.workload_id.to_string(),
            ResponseField::RequesterId => self.requester_id.to_string(),
            ResponseField::WorkerNonce => self.worker_nonce.to_string(),
            ResponseField::ResultPayloadDigest => self.result_payload_digest.to_base64(),
        }
    }
}
