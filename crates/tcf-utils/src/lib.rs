//! Cryptographic utilities shared by work-order requesters and workers.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

pub mod codec;
pub mod der;
pub mod error;
pub mod hash;
pub mod key_wrap;
pub mod signature;

pub use codec::{
    decode_base64, decode_hex, encode_base64, encode_hex, CryptoSessionCodec,
    DataEncryptionAlgorithm, SessionIv, SessionKey,
};
pub use error::CryptoError;
pub use hash::{sha256, Digest, HashAlgorithm};
pub use key_wrap::{unwrap_session_key, wrap_session_key, EncryptionKeyPair, KeyEncryptionAlgorithm};
pub use signature::{
    sign, verify, ResponseField, ResponseSignatureFields, Signature, SignatureStatus,
    SigningAlgorithm, SigningKey, VerifyingKey, RESPONSE_SIGNATURE_FIELDS,
};
