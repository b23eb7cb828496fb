//! Attestation verification errors
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::evidence::{QuoteStatus, QuoteStatusSet};
use err_derive::Error;

#[derive(Clone, Debug, Error)]
pub enum AttestationError {
    #[error(
        display = "AttestationError: quote status {} not in acceptable set {}.",
        status,
        acceptable
    )]
    QuoteRejected {
        status: QuoteStatus,
        acceptable: QuoteStatusSet,
    },
    #[error(display = "AttestationError: report signature rejected: {}.", _0)]
    SignatureRejected(String),
    #[error(display = "AttestationError: malformed evidence field `{}`: {}.", _0, _1)]
    MalformedEvidence(&'static str, String),
    #[error(
        display = "AttestationError: MismatchError: variable `{}` mismatch, expected {} but received {}.",
        variable,
        expected,
        received
    )]
    MismatchError {
        variable: &'static str,
        expected: String,
        received: String,
    },
}
