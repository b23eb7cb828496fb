//! Attestation verification
//!
//! Evidence moves through a small state machine:
//!
//! ```text
//! UNVERIFIED -> (quote check) -> QUOTE_VALID | QUOTE_REJECTED
//! QUOTE_VALID -> (signature check) -> TRUSTED | SIGNATURE_REJECTED
//! ```
//!
//! The quote check runs first, and a rejected quote never reaches the
//! signature check.  The verifier performs no I/O: it is handed evidence
//! already fetched from the registry.
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
    error::AttestationError,
    evidence::{AttestationEvidence, QuoteStatusSet, VerificationReport},
    quote::QuoteBody,
};
use log::{error, info, warn};
use ring::signature::{self, UnparsedPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use tcf_utils::Digest;
use x509_parser::{
    certificate::X509Certificate,
    oid_registry::{OID_KEY_TYPE_EC_PUBLIC_KEY, OID_PKCS1_RSAENCRYPTION},
    pem::parse_x509_pem,
    prelude::FromDer,
};

////////////////////////////////////////////////////////////////////////////////
// Policy.
////////////////////////////////////////////////////////////////////////////////

/// What a requester is prepared to trust.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationPolicy {
    /// Quote statuses accepted as genuine.  `GROUP_OUT_OF_DATE` and the
    /// other degraded tiers are accepted only when listed here.
    pub acceptable_quote_statuses: QuoteStatusSet,
    /// Hex `MRENCLAVE` the worker must report, if pinned.
    pub expected_mr_enclave: Option<String>,
    /// PEM certificate that must have issued the report signing certificate.
    pub report_signing_ca_pem: Option<String>,
    /// Require the quote's report data to commit to the worker's keys.
    pub require_key_binding: bool,
}

impl Default for AttestationPolicy {
    fn default() -> Self {
        AttestationPolicy {
            acceptable_quote_statuses: QuoteStatusSet::strict(),
            expected_mr_enclave: None,
            report_signing_ca_pem: None,
            require_key_binding: true,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Results.
////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvidenceState {
    Unverified,
    QuoteValid,
    QuoteRejected,
    Trusted,
    SignatureRejected,
}

impl EvidenceState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvidenceState::Trusted | EvidenceState::QuoteRejected | EvidenceState::SignatureRejected
        )
    }
}

impl fmt::Display for EvidenceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EvidenceState::Unverified => "UNVERIFIED",
            EvidenceState::QuoteValid => "QUOTE_VALID",
            EvidenceState::QuoteRejected => "QUOTE_REJECTED",
            EvidenceState::Trusted => "TRUSTED",
            EvidenceState::SignatureRejected => "SIGNATURE_REJECTED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationResult {
    pub trusted: bool,
    pub state: EvidenceState,
    /// `MRENCLAVE`.  Empty unless the report was verified.
    pub enclave_measurement: Digest,
    /// Quote basename.  Empty unless the report was verified.
    pub enclave_basename: Vec<u8>,
    /// Quote report data.  Empty unless the report was verified.
    pub report_data: Vec<u8>,
}

impl AttestationResult {
    fn rejected(state: EvidenceState) -> Self {
        AttestationResult {
            trusted: false,
            state,
            enclave_measurement: Digest::from_bytes(Vec::new()),
            enclave_basename: Vec::new(),
            report_data: Vec::new(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// The verifier.
////////////////////////////////////////////////////////////////////////////////

/// Stateless with respect to evidence; safe to share between threads.
#[derive(Clone, Debug)]
pub struct AttestationVerifier {
    policy: AttestationPolicy,
}

impl AttestationVerifier {
    pub fn new(policy: AttestationPolicy) -> Self {
        AttestationVerifier { policy }
    }

    #[inline]
    pub fn policy(&self) -> &AttestationPolicy {
        &self.policy
    }

    /// True iff the evidence's quote status is in `acceptable_statuses`.
    pub fn verify_quote(
        evidence: &AttestationEvidence,
        acceptable_statuses: &QuoteStatusSet,
    ) -> bool {
        acceptable_statuses.contains(evidence.quote_status())
    }

    /// Verify `signature` over the raw `report` bytes with the public key of
    /// `certificate` (PEM or DER).  RSA PKCS#1 v1.5 and ECDSA P-256 keys are
    /// supported, both over SHA-256.  Returns false on any parse failure.
    pub fn verify_report_signature(certificate: &[u8], report: &[u8], signature: &[u8]) -> bool {
        match with_certificate(certificate, |cert| {
            Ok(check_signature(cert, report, signature))
        }) {
            Ok(verified) => verified,
            Err(err) => {
                warn!("AttestationVerifier::verify_report_signature: {}", err);
                false
            }
        }
    }

    /// Run both checks and report the trust decision.
    pub fn verify(&self, evidence: &AttestationEvidence) -> AttestationResult {
        match self.verify_or_reject(evidence) {
            Ok(result) => result,
            Err(err) => {
                let state = match err {
                    AttestationError::QuoteRejected { .. } => EvidenceState::QuoteRejected,
                    _ => EvidenceState::SignatureRejected,
                };
                AttestationResult::rejected(state)
            }
        }
    }

    /// As `verify`, but a rejection is returned as the error that caused it.
    pub fn verify_or_reject(
        &self,
        evidence: &AttestationEvidence,
    ) -> Result<AttestationResult, AttestationError> {
        let mut state = EvidenceState::Unverified;

        if !Self::verify_quote(evidence, &self.policy.acceptable_quote_statuses) {
            let err = AttestationError::QuoteRejected {
                status: evidence.quote_status().clone(),
                acceptable: self.policy.acceptable_quote_statuses.clone(),
            };
            error!("AttestationVerifier: {} -> {}: {}", state, EvidenceState::QuoteRejected, err);
            return Err(err);
        }
        state = EvidenceState::QuoteValid;

        if let Err(err) = self.check_report_authenticity(evidence) {
            error!(
                "AttestationVerifier: {} -> {}: {}",
                state,
                EvidenceState::SignatureRejected,
                err
            );
            return Err(err);
        }

        let report = VerificationReport::from_json(evidence.verification_report())?;
        if &report.isv_enclave_quote_status != evidence.quote_status() {
            return Err(AttestationError::MismatchError {
                variable: "isvEnclaveQuoteStatus",
                expected: evidence.quote_status().to_string(),
                received: report.isv_enclave_quote_status.to_string(),
            });
        }
        let quote = QuoteBody::parse(&report.quote_body()?)?;

        info!(
            "AttestationVerifier: {} -> {} (quote status {}, report {})",
            state,
            EvidenceState::Trusted,
            report.isv_enclave_quote_status,
            report.id
        );
        Ok(AttestationResult {
            trusted: true,
            state: EvidenceState::Trusted,
            enclave_measurement: Digest::from_bytes(quote.mr_enclave.to_vec()),
            enclave_basename: quote.basename.to_vec(),
            report_data: quote.report_data.to_vec(),
        })
    }

    fn check_report_authenticity(&self, evidence: &AttestationEvidence) -> Result<(), AttestationError> {
        if let Some(ca_pem) = &self.policy.report_signing_ca_pem {
            with_certificate(evidence.report_signing_certificate(), |cert| {
                with_certificate(ca_pem.as_bytes(), |ca| {
                    if !cert.validity().is_valid() {
                        return Err(AttestationError::SignatureRejected(
                            "report signing certificate is outside its validity period".to_string(),
                        ));
                    }
                    cert.verify_signature(Some(ca.public_key())).map_err(|err| {
                        AttestationError::SignatureRejected(format!(
                            "report signing certificate not issued by the trust root: {}",
                            err
                        ))
                    })
                })
            })?;
        }
        if Self::verify_report_signature(
            evidence.report_signing_certificate(),
            evidence.verification_report(),
            evidence.report_signature(),
        ) {
            Ok(())
        } else {
            Err(AttestationError::SignatureRejected(
                "signature over verification report does not verify".to_string(),
            ))
        }
    }
}

/// Parse `certificate` as PEM, falling back to DER, and hand it to `f`.
fn with_certificate<T, F>(certificate: &[u8], f: F) -> Result<T, AttestationError>
where
    F: FnOnce(&X509Certificate) -> Result<T, AttestationError>,
{
    if certificate.starts_with(b"-----BEGIN") {
        let (_, pem) = parse_x509_pem(certificate).map_err(|err| {
            AttestationError::SignatureRejected(format!("unparseable PEM certificate: {}", err))
        })?;
        let cert = pem.parse_x509().map_err(|err| {
            AttestationError::SignatureRejected(format!("unparseable certificate: {}", err))
        })?;
        f(&cert)
    } else {
        let (_, cert) = X509Certificate::from_der(certificate).map_err(|err| {
            AttestationError::SignatureRejected(format!("unparseable certificate: {}", err))
        })?;
        f(&cert)
    }
}

fn check_signature(cert: &X509Certificate, report: &[u8], signature: &[u8]) -> bool {
    let spki = cert.public_key();
    let key = spki.subject_public_key.data.as_ref();
    let algorithm: &'static dyn signature::VerificationAlgorithm =
        if spki.algorithm.algorithm == OID_PKCS1_RSAENCRYPTION {
            &signature::RSA_PKCS1_2048_8192_SHA256
        } else if spki.algorithm.algorithm == OID_KEY_TYPE_EC_PUBLIC_KEY {
            &signature::ECDSA_P256_SHA256_ASN1
        } else {
            warn!(
                "AttestationVerifier: unsupported report signing key algorithm {}",
                spki.algorithm.algorithm
            );
            return false;
        };
    UnparsedPublicKey::new(algorithm, key)
        .verify(report, signature)
        .is_ok()
}
