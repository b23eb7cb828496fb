//! Wrapping of session keys under a worker's public encryption key.
//!
//! Session keys travel to the worker sealed with HPKE in base mode:
//! DHKEM(X25519, HKDF-SHA256), HKDF-SHA256 and AES-256-GCM.  The wire form
//! of a wrapped key is the encapsulated key followed by the sealed session
//! key.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{codec::SessionKey, error::CryptoError};
use hpke::{
    aead::AesGcm256, kdf::HkdfSha256, kem::X25519HkdfSha256, Deserializable, Kem, OpModeR,
    OpModeS, Serializable,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use zeroize::Zeroizing;

type WrapKem = X25519HkdfSha256;
type WrapKdf = HkdfSha256;
type WrapAead = AesGcm256;

/// Length of an X25519 public or private key.
pub const ENCRYPTION_KEY_LEN: usize = 32;
/// Length of the HPKE encapsulated key that prefixes a wrapped session key.
pub const ENCAPPED_KEY_LEN: usize = 32;

const WRAP_INFO: &[u8] = b"tcf work order session key";

/// Key encryption algorithms a worker may advertise in its
/// `keyEncryptionAlgorithm` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyEncryptionAlgorithm {
    #[serde(rename = "HPKE-X25519-SHA256-AES256GCM")]
    HpkeX25519,
}

impl Default for KeyEncryptionAlgorithm {
    fn default() -> Self {
        KeyEncryptionAlgorithm::HpkeX25519
    }
}

impl fmt::Display for KeyEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HPKE-X25519-SHA256-AES256GCM")
    }
}

impl FromStr for KeyEncryptionAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HPKE-X25519-SHA256-AES256GCM" => Ok(KeyEncryptionAlgorithm::HpkeX25519),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Seal `key` for the holder of `worker_encryption_key` (a raw X25519 public
/// key).
pub fn wrap_session_key(
    key: &SessionKey,
    worker_encryption_key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let pk = <WrapKem as Kem>::PublicKey::from_bytes(worker_encryption_key).map_err(|err| {
        CryptoError::KeyWrapFailed(format!("invalid worker encryption key: {:?}", err))
    })?;
    let (enc, mut sender) =
        hpke::setup_sender::<WrapAead, WrapKdf, WrapKem, _>(&OpModeS::Base, &pk, WRAP_INFO, &mut OsRng)
            .map_err(|err| CryptoError::KeyWrapFailed(format!("setup failed: {:?}", err)))?;
    let sealed = sender
        .seal(key.as_bytes(), b"")
        .map_err(|err| CryptoError::KeyWrapFailed(format!("seal failed: {:?}", err)))?;

    let mut wrapped = enc.to_bytes().to_vec();
    wrapped.extend_from_slice(&sealed);
    Ok(wrapped)
}

/// Recover a session key sealed by `wrap_session_key`.
pub fn unwrap_session_key(
    wrapped: &[u8],
    worker_private_key: &[u8],
) -> Result<SessionKey, CryptoError> {
    if wrapped.len() <= ENCAPPED_KEY_LEN {
        return Err(CryptoError::KeyUnwrapFailed(format!(
            "wrapped key of {} bytes is too short",
            wrapped.len()
        )));
    }
    let (enc, sealed) = wrapped.split_at(ENCAPPED_KEY_LEN);
    let enc = <WrapKem as Kem>::EncappedKey::from_bytes(enc)
        .map_err(|err| CryptoError::KeyUnwrapFailed(format!("invalid encapped key: {:?}", err)))?;
    let sk = <WrapKem as Kem>::PrivateKey::from_bytes(worker_private_key)
        .map_err(|err| CryptoError::KeyUnwrapFailed(format!("invalid private key: {:?}", err)))?;
    let mut receiver =
        hpke::setup_receiver::<WrapAead, WrapKdf, WrapKem>(&OpModeR::Base, &sk, &enc, WRAP_INFO)
            .map_err(|err| CryptoError::KeyUnwrapFailed(format!("setup failed: {:?}", err)))?;
    let key = receiver
        .open(sealed, b"")
        .map_err(|err| CryptoError::KeyUnwrapFailed(format!("open failed: {:?}", err)))?;
    Ok(SessionKey::from_bytes(key))
}

/// An X25519 key pair held by a worker.  Requesters only ever see the public
/// half.
pub struct EncryptionKeyPair {
    private_key: Zeroizing<Vec<u8>>,
    public_key: Vec<u8>,
}

impl EncryptionKeyPair {
    pub fn generate() -> Self {
        let (sk, pk) = WrapKem::gen_keypair(&mut OsRng);
        EncryptionKeyPair {
            private_key: Zeroizing::new(sk.to_bytes().to_vec()),
            public_key: pk.to_bytes().to_vec(),
        }
    }

    pub fn from_private_bytes(private_key: &[u8]) -> Result<Self, CryptoError> {
        let sk = <WrapKem as Kem>::PrivateKey::from_bytes(private_key)
            .map_err(|err| CryptoError::InvalidEncryptionKey(format!("{:?}", err)))?;
        let pk = <WrapKem as Kem>::sk_to_pk(&sk);
        Ok(EncryptionKeyPair {
            private_key: Zeroizing::new(private_key.to_vec()),
            public_key: pk.to_bytes().to_vec(),
        })
    }

    #[inline]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    #[inline]
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }

    pub fn unwrap_session_key(&self, wrapped: &[u8]) -> Result<SessionKey, CryptoError> {
        unwrap_session_key(wrapped, &self.private_key)
    }
}

impl fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EncryptionKeyPair({})", self.public_key_hex())
    }
}
