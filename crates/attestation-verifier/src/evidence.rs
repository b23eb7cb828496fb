//! Attestation evidence records
//!
//! A worker publishes its evidence as the `proofData` field of its registry
//! entry: a JSON document carrying an IAS-style verification report, the
//! signature over that report and the certificate of the report signer.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::error::AttestationError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, iter::FromIterator};

////////////////////////////////////////////////////////////////////////////////
// Quote status.
////////////////////////////////////////////////////////////////////////////////

/// Trust tier reported by the quoting authority for an enclave quote.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuoteStatus {
    Ok,
    GroupOutOfDate,
    ConfigurationNeeded,
    SwHardeningNeeded,
    ConfigurationAndSwHardeningNeeded,
    SignatureInvalid,
    GroupRevoked,
    SignatureRevoked,
    KeyRevoked,
    SigrlVersionMismatch,
    /// A status string this verifier does not know.  Only ever accepted if
    /// allow-listed verbatim.
    Other(String),
}

impl QuoteStatus {
    pub fn as_str(&self) -> &str {
        match self {
            QuoteStatus::Ok => "OK",
            QuoteStatus::GroupOutOfDate => "GROUP_OUT_OF_DATE",
            QuoteStatus::ConfigurationNeeded => "CONFIGURATION_NEEDED",
            QuoteStatus::SwHardeningNeeded => "SW_HARDENING_NEEDED",
            QuoteStatus::ConfigurationAndSwHardeningNeeded => {
                "CONFIGURATION_AND_SW_HARDENING_NEEDED"
            }
            QuoteStatus::SignatureInvalid => "SIGNATURE_INVALID",
            QuoteStatus::GroupRevoked => "GROUP_REVOKED",
            QuoteStatus::SignatureRevoked => "SIGNATURE_REVOKED",
            QuoteStatus::KeyRevoked => "KEY_REVOKED",
            QuoteStatus::SigrlVersionMismatch => "SIGRL_VERSION_MISMATCH",
            QuoteStatus::Other(status) => status,
        }
    }
}

impl From<String> for QuoteStatus {
    fn from(status: String) -> Self {
        QuoteStatus::from(status.as_str())
    }
}

impl From<&str> for QuoteStatus {
    fn from(status: &str) -> Self {
        match status {
            "OK" => QuoteStatus::Ok,
            "GROUP_OUT_OF_DATE" => QuoteStatus::GroupOutOfDate,
            "CONFIGURATION_NEEDED" => QuoteStatus::ConfigurationNeeded,
            "SW_HARDENING_NEEDED" => QuoteStatus::SwHardeningNeeded,
            "CONFIGURATION_AND_SW_HARDENING_NEEDED" => {
                QuoteStatus::ConfigurationAndSwHardeningNeeded
            }
            "SIGNATURE_INVALID" => QuoteStatus::SignatureInvalid,
            "GROUP_REVOKED" => QuoteStatus::GroupRevoked,
            "SIGNATURE_REVOKED" => QuoteStatus::SignatureRevoked,
            "KEY_REVOKED" => QuoteStatus::KeyRevoked,
            "SIGRL_VERSION_MISMATCH" => QuoteStatus::SigrlVersionMismatch,
            other => QuoteStatus::Other(other.to_string()),
        }
    }
}

impl From<QuoteStatus> for String {
    fn from(status: QuoteStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An allow-list of quote statuses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteStatusSet(BTreeSet<QuoteStatus>);

impl QuoteStatusSet {
    /// Only `OK`.
    pub fn strict() -> Self {
        QuoteStatusSet::from_iter(vec![QuoteStatus::Ok])
    }

    #[inline]
    pub fn contains(&self, status: &QuoteStatus) -> bool {
        self.0.contains(status)
    }

    #[inline]
    pub fn insert(&mut self, status: QuoteStatus) -> bool {
        self.0.insert(status)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<QuoteStatus> for QuoteStatusSet {
    fn from_iter<I: IntoIterator<Item = QuoteStatus>>(iter: I) -> Self {
        QuoteStatusSet(iter.into_iter().collect())
    }
}

impl fmt::Display for QuoteStatusSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(QuoteStatus::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Verification report.
////////////////////////////////////////////////////////////////////////////////

/// The JSON body of a verification report, as signed by the quoting
/// authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub isv_enclave_quote_status: QuoteStatus,
    /// Base64 encoding of the quote, without its signature.
    pub isv_enclave_quote_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epid_pseudonym: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_info_blob: Option<String>,
}

impl VerificationReport {
    pub fn from_json(report: &[u8]) -> Result<Self, AttestationError> {
        serde_json::from_slice(report).map_err(|err| {
            AttestationError::MalformedEvidence("verification_report", format!("{}", err))
        })
    }

    pub fn quote_body(&self) -> Result<Vec<u8>, AttestationError> {
        base64::decode(&self.isv_enclave_quote_body).map_err(|err| {
            AttestationError::MalformedEvidence("isvEnclaveQuoteBody", format!("{:?}", err))
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Evidence.
////////////////////////////////////////////////////////////////////////////////

/// Wire form of the `proofData` registry field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofData {
    /// The report JSON, exactly as signed.
    pub verification_report: String,
    /// Base64 signature over `verification_report`.
    pub ias_report_signature: String,
    /// PEM certificate of the report signer.
    pub ias_report_signing_certificate: String,
}

/// A worker's proof of genuine enclave execution.  Never mutated: a
/// re-attestation produces a new record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationEvidence {
    verification_report: Vec<u8>,
    report_signature: Vec<u8>,
    report_signing_certificate: Vec<u8>,
    quote_status: QuoteStatus,
}

impl AttestationEvidence {
    pub fn new(
        verification_report: Vec<u8>,
        report_signature: Vec<u8>,
        report_signing_certificate: Vec<u8>,
        quote_status: QuoteStatus,
    ) -> Self {
        AttestationEvidence {
            verification_report,
            report_signature,
            report_signing_certificate,
            quote_status,
        }
    }

    /// Decode the `proofData` JSON published by a worker.  The quote status
    /// is read from the embedded report.
    pub fn from_proof_data(proof_data: &str) -> Result<Self, AttestationError> {
        let proof: ProofData = serde_json::from_str(proof_data).map_err(|err| {
            AttestationError::MalformedEvidence("proofData", format!("{}", err))
        })?;
        let report = VerificationReport::from_json(proof.verification_report.as_bytes())?;
        let report_signature = base64::decode(&proof.ias_report_signature).map_err(|err| {
            AttestationError::MalformedEvidence("ias_report_signature", format!("{:?}", err))
        })?;
        Ok(AttestationEvidence {
            verification_report: proof.verification_report.into_bytes(),
            report_signature,
            report_signing_certificate: proof.ias_report_signing_certificate.into_bytes(),
            quote_status: report.isv_enclave_quote_status,
        })
    }

    pub fn to_proof_data(&self) -> Result<String, AttestationError> {
        let verification_report = String::from_utf8(self.verification_report.clone())
            .map_err(|err| {
                AttestationError::MalformedEvidence("verification_report", format!("{}", err))
            })?;
        let signing_certificate = String::from_utf8(self.report_signing_certificate.clone())
            .map_err(|err| {
                AttestationError::MalformedEvidence(
                    "ias_report_signing_certificate",
                    format!("{}", err),
                )
            })?;
        let proof = ProofData {
            verification_report,
            ias_report_signature: base64::encode(&self.report_signature),
            ias_report_signing_certificate: signing_certificate,
        };
        serde_json::to_string(&proof)
            .map_err(|err| AttestationError::MalformedEvidence("proofData", format!("{}", err)))
    }

    #[inline]
    pub fn verification_report(&self) -> &[u8] {
        &self.verification_report
    }

    #[inline]
    pub fn report_signature(&self) -> &[u8] {
        &self.report_signature
    }

    #[inline]
    pub fn report_signing_certificate(&self) -> &[u8] {
        &self.report_signing_certificate
    }

    #[inline]
    pub fn quote_status(&self) -> &QuoteStatus {
        &self.quote_status
    }
}
