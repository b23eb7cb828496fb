//! Hash functions.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory
//! for information on licensing and copyright.

use crate::error::CryptoError;
use ring::digest;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Hashing algorithms a worker may advertise in its `hashingAlgorithm`
/// field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
}

impl HashAlgorithm {
    /// Length in bytes of a digest produced by this algorithm.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Digest {
        let algorithm = match self {
            HashAlgorithm::Sha256 => &digest::SHA256,
            HashAlgorithm::Sha384 => &digest::SHA384,
        };
        Digest(digest::digest(algorithm, data).as_ref().to_vec())
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "SHA-256"),
            HashAlgorithm::Sha384 => write!(f, "SHA-384"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHA-256" => Ok(HashAlgorithm::Sha256),
            "SHA-384" => Ok(HashAlgorithm::Sha384),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// The output of a hash function.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(Vec<u8>);

impl Digest {
    #[inline]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Digest(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    #[inline]
    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// Compute SHA-256 hash/digest.
pub fn sha256(x: &[u8]) -> Digest {
    HashAlgorithm::Sha256.digest(x)
}
