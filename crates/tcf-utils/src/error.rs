//! Error type for the cryptographic utilities
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use err_derive::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(
        display = "CryptoError: Invalid length of variable `{}`, expected {} but received {}.",
        variable,
        expected,
        received
    )]
    InvalidLength {
        variable: &'static str,
        expected: usize,
        received: usize,
    },
    #[error(display = "CryptoError: encryption failed.")]
    EncryptionFailed,
    /// The authentication tag did not verify.  Never returned for a
    /// successful decryption of an empty plaintext.
    #[error(display = "CryptoError: authentication tag did not verify.")]
    AuthenticationFailed,
    #[error(display = "CryptoError: invalid encoding of `{}`: {}.", _0, _1)]
    InvalidEncoding(&'static str, String),
    #[error(display = "CryptoError: failed to obtain randomness from the system source.")]
    RandomnessFailure,
    #[error(display = "CryptoError: unsupported algorithm {}.", _0)]
    UnsupportedAlgorithm(String),
    #[error(display = "CryptoError: session key wrapping failed: {}.", _0)]
    KeyWrapFailed(String),
    #[error(display = "CryptoError: session key unwrapping failed: {}.", _0)]
    KeyUnwrapFailed(String),
    #[error(display = "CryptoError: invalid encryption key: {}.", _0)]
    InvalidEncryptionKey(String),
    #[error(display = "CryptoError: invalid signing key: {}.", _0)]
    InvalidSigningKey(String),
    #[error(display = "CryptoError: signing failed.")]
    SigningFailed,
}

impl From<base64::DecodeError> for CryptoError {
    fn from(error: base64::DecodeError) -> Self {
        CryptoError::InvalidEncoding("base64", format!("{:?}", error))
    }
}

impl From<hex::FromHexError> for CryptoError {
    fn from(error: hex::FromHexError) -> Self {
        CryptoError::InvalidEncoding("hex", format!("{:?}", error))
    }
}
