//! Verification of worker enclave attestation evidence.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

pub mod error;
pub mod evidence;
pub mod quote;
pub mod verifier;

pub use error::AttestationError;
pub use evidence::{AttestationEvidence, ProofData, QuoteStatus, QuoteStatusSet, VerificationReport};
pub use quote::QuoteBody;
pub use verifier::{AttestationPolicy, AttestationResult, AttestationVerifier, EvidenceState};
