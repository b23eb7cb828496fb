//! Symmetric session codec.
//!
//! Each work order is encrypted under its own freshly generated session key.
//! This module generates that key material, performs the authenticated
//! encryption of payload fields and provides the hashing and text encodings
//! used on the wire.
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
    error::CryptoError,
    hash::{Digest, HashAlgorithm},
};
use log::error;
use ring::{
    aead::{self, Aad, LessSafeKey, Nonce, UnboundKey},
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use zeroize::{Zeroize, Zeroizing};

////////////////////////////////////////////////////////////////////////////////
// Algorithms.
////////////////////////////////////////////////////////////////////////////////

/// Authenticated encryption algorithms a worker may advertise in its
/// `dataEncryptionAlgorithm` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataEncryptionAlgorithm {
    #[serde(rename = "AES-GCM-256")]
    Aes256Gcm,
    #[serde(rename = "CHACHA20-POLY1305")]
    ChaCha20Poly1305,
}

impl DataEncryptionAlgorithm {
    #[inline]
    pub fn key_len(&self) -> usize {
        self.ring_algorithm().key_len()
    }

    #[inline]
    pub fn nonce_len(&self) -> usize {
        self.ring_algorithm().nonce_len()
    }

    #[inline]
    pub fn tag_len(&self) -> usize {
        self.ring_algorithm().tag_len()
    }

    fn ring_algorithm(&self) -> &'static aead::Algorithm {
        match self {
            DataEncryptionAlgorithm::Aes256Gcm => &aead::AES_256_GCM,
            DataEncryptionAlgorithm::ChaCha20Poly1305 => &aead::CHACHA20_POLY1305,
        }
    }
}

impl Default for DataEncryptionAlgorithm {
    fn default() -> Self {
        DataEncryptionAlgorithm::Aes256Gcm
    }
}

impl fmt::Display for DataEncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataEncryptionAlgorithm::Aes256Gcm => write!(f, "AES-GCM-256"),
            DataEncryptionAlgorithm::ChaCha20Poly1305 => write!(f, "CHACHA20-POLY1305"),
        }
    }
}

impl FromStr for DataEncryptionAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES-GCM-256" => Ok(DataEncryptionAlgorithm::Aes256Gcm),
            "CHACHA20-POLY1305" => Ok(DataEncryptionAlgorithm::ChaCha20Poly1305),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Key material.
////////////////////////////////////////////////////////////////////////////////

/// A symmetric session key.  The buffer is wiped when the key is dropped.
#[derive(Clone)]
pub struct SessionKey(Zeroizing<Vec<u8>>);

impl SessionKey {
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        SessionKey(Zeroizing::new(bytes))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionKey(<{} bytes redacted>)", self.0.len())
    }
}

/// The nonce paired with a session key.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionIv(Vec<u8>);

impl SessionIv {
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        SessionIv(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(iv: &str) -> Result<Self, CryptoError> {
        Ok(SessionIv(hex::decode(iv)?))
    }
}

impl Drop for SessionIv {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SessionIv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SessionIv({})", self.to_hex())
    }
}

////////////////////////////////////////////////////////////////////////////////
// The codec.
////////////////////////////////////////////////////////////////////////////////

/// Session-key generation, authenticated encryption and hashing for one
/// configured pair of algorithms.  Holds no key material itself, so a single
/// codec may be shared between concurrent work orders.
#[derive(Clone)]
pub struct CryptoSessionCodec {
    encryption: DataEncryptionAlgorithm,
    hashing: HashAlgorithm,
    rng: SystemRandom,
}

impl CryptoSessionCodec {
    pub fn new(encryption: DataEncryptionAlgorithm, hashing: HashAlgorithm) -> Self {
        CryptoSessionCodec {
            encryption,
            hashing,
            rng: SystemRandom::new(),
        }
    }

    #[inline]
    pub fn encryption_algorithm(&self) -> DataEncryptionAlgorithm {
        self.encryption
    }

    #[inline]
    pub fn hashing_algorithm(&self) -> HashAlgorithm {
        self.hashing
    }

    /// Generate a fresh random key of the configured algorithm's key length.
    pub fn generate_session_key(&self) -> Result<SessionKey, CryptoError> {
        let mut key = Zeroizing::new(vec![0u8; self.encryption.key_len()]);
        self.fill_random(&mut key)?;
        Ok(SessionKey(key))
    }

    /// Generate a fresh random nonce of the configured algorithm's nonce
    /// length.
    pub fn generate_iv(&self) -> Result<SessionIv, CryptoError> {
        let mut iv = vec![0u8; self.encryption.nonce_len()];
        self.fill_random(&mut iv)?;
        Ok(SessionIv(iv))
    }

    /// Fill `buffer` from the system's secure random source.
    pub fn fill_random(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        self.rng
            .fill(buffer)
            .map_err(|_| CryptoError::RandomnessFailure)
    }

    /// Encrypt `plaintext`, returning the ciphertext and the detached
    /// authentication tag.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SessionKey,
        iv: &SessionIv,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let (key, nonce) = self.prepare(key, iv)?;
        let mut in_out = plaintext.to_vec();
        let tag = key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok((in_out, tag.as_ref().to_vec()))
    }

    /// Decrypt `ciphertext` and check it against `tag`.  Any tag mismatch,
    /// including a truncated tag, is reported as
    /// `CryptoError::AuthenticationFailed`.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        tag: &[u8],
        key: &SessionKey,
        iv: &SessionIv,
    ) -> Result<Vec<u8>, CryptoError> {
        let (key, nonce) = self.prepare(key, iv)?;
        if tag.len() != self.encryption.tag_len() {
            error!(
                "CryptoSessionCodec::decrypt received a tag of {} bytes",
                tag.len()
            );
            return Err(CryptoError::AuthenticationFailed);
        }
        let mut in_out = Vec::with_capacity(ciphertext.len() + tag.len());
        in_out.extend_from_slice(ciphertext);
        in_out.extend_from_slice(tag);
        let plaintext_len = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::AuthenticationFailed)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }

    /// Encrypt `plaintext` into the single `ciphertext || tag` buffer used
    /// for wire fields.
    pub fn seal(
        &self,
        plaintext: &[u8],
        key: &SessionKey,
        iv: &SessionIv,
    ) -> Result<Vec<u8>, CryptoError> {
        let (mut ciphertext, tag) = self.encrypt(plaintext, key, iv)?;
        ciphertext.extend_from_slice(&tag);
        Ok(ciphertext)
    }

    /// Inverse of `seal`.
    pub fn open(
        &self,
        sealed: &[u8],
        key: &SessionKey,
        iv: &SessionIv,
    ) -> Result<Vec<u8>, CryptoError> {
        let tag_len = self.encryption.tag_len();
        if sealed.len() < tag_len {
            return Err(CryptoError::AuthenticationFailed);
        }
        let (ciphertext, tag) = sealed.split_at(sealed.len() - tag_len);
        self.decrypt(ciphertext, tag, key, iv)
    }

    #[inline]
    pub fn hash(&self, data: &[u8]) -> Digest {
        self.hashing.digest(data)
    }

    fn prepare(&self, key: &SessionKey, iv: &SessionIv) -> Result<(LessSafeKey, Nonce), CryptoError> {
        let algorithm = self.encryption.ring_algorithm();
        if key.as_bytes().len() != algorithm.key_len() {
            return Err(CryptoError::InvalidLength {
                variable: "session_key",
                expected: algorithm.key_len(),
                received: key.as_bytes().len(),
            });
        }
        if iv.as_bytes().len() != algorithm.nonce_len() {
            return Err(CryptoError::InvalidLength {
                variable: "session_iv",
                expected: algorithm.nonce_len(),
                received: iv.as_bytes().len(),
            });
        }
        let unbound = UnboundKey::new(algorithm, key.as_bytes()).map_err(|_| {
            CryptoError::InvalidLength {
                variable: "session_key",
                expected: algorithm.key_len(),
                received: key.as_bytes().len(),
            }
        })?;
        let nonce = Nonce::try_assume_unique_for_key(iv.as_bytes()).map_err(|_| {
            CryptoError::InvalidLength {
                variable: "session_iv",
                expected: algorithm.nonce_len(),
                received: iv.as_bytes().len(),
            }
        })?;
        Ok((LessSafeKey::new(unbound), nonce))
    }
}

impl Default for CryptoSessionCodec {
    fn default() -> Self {
        CryptoSessionCodec::new(DataEncryptionAlgorithm::default(), HashAlgorithm::default())
    }
}

impl fmt::Debug for CryptoSessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CryptoSessionCodec")
            .field("encryption", &self.encryption)
            .field("hashing", &self.hashing)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Text encodings.
////////////////////////////////////////////////////////////////////////////////

#[inline]
pub fn encode_base64(data: &[u8]) -> String {
    base64::encode(data)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(base64::decode(data)?)
}

#[inline]
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn decode_hex(data: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(hex::decode(data)?)
}
