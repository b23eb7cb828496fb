//! Shared fixtures for the work-order integration suite
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use anyhow::{anyhow, Result};
use attestation_verifier::{quote::REPORT_DATA_LEN, AttestationEvidence, QuoteBody, QuoteStatus};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use ring::{
    rand::SystemRandom,
    signature::{EcdsaKeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING, RSA_PKCS1_SHA256},
};

const RSA_CA_PEM: &str = include_str!("../../../test-collateral/rsa_report_ca.pem");
const RSA_SIGNER_PEM: &str = include_str!("../../../test-collateral/rsa_report_signing.pem");
const RSA_SIGNER_KEY: &[u8] = include_bytes!("../../../test-collateral/rsa_report_signing_key.pk8");

/// `MRENCLAVE` reported by every simulated enclave.
pub const TEST_MR_ENCLAVE: [u8; 32] = [0x5a; 32];
pub const TEST_BASENAME: [u8; 32] = [0x42; 32];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A stand-in for a quoting authority: a root certificate and a report
/// signing certificate issued by it.
pub struct ReportAuthority {
    ca_pem: String,
    signer_pem: String,
    signer_key: ReportSigner,
    rng: SystemRandom,
}

enum ReportSigner {
    Ecdsa(EcdsaKeyPair),
    Rsa(RsaKeyPair),
}

impl ReportAuthority {
    pub fn new() -> Result<Self> {
        let mut ca_params = CertificateParams::default();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Simulated Attestation Root");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate()?;
        let ca_cert = ca_params.self_signed(&ca_key)?;

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, "Simulated Report Signing");
        let signer_key = KeyPair::generate()?;
        let signer_cert = params.signed_by(&signer_key, &ca_cert, &ca_key)?;

        let rng = SystemRandom::new();
        let signer_key =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &signer_key.serialize_der(), &rng)
                .map_err(|err| anyhow!("report signing key: {}", err))?;
        Ok(ReportAuthority {
            ca_pem: ca_cert.pem(),
            signer_pem: signer_cert.pem(),
            signer_key: ReportSigner::Ecdsa(signer_key),
            rng,
        })
    }

    /// An authority signing with RSA PKCS#1 v1.5 over SHA-256, as IAS does.
    /// The key and certificates are fixed, under `test-collateral/`.
    pub fn rsa() -> Result<Self> {
        let signer_key = RsaKeyPair::from_pkcs8(RSA_SIGNER_KEY)
            .map_err(|err| anyhow!("report signing key: {}", err))?;
        Ok(ReportAuthority {
            ca_pem: RSA_CA_PEM.to_string(),
            signer_pem: RSA_SIGNER_PEM.to_string(),
            signer_key: ReportSigner::Rsa(signer_key),
            rng: SystemRandom::new(),
        })
    }

    #[inline]
    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    /// Signed evidence for an enclave whose quote carries `report_data`.
    pub fn issue(
        &self,
        status: &str,
        mr_enclave: [u8; 32],
        report_data: &[u8],
    ) -> Result<AttestationEvidence> {
        if report_data.len() != REPORT_DATA_LEN {
            return Err(anyhow!("report data of {} bytes", report_data.len()));
        }
        let mut data = [0u8; REPORT_DATA_LEN];
        data.copy_from_slice(report_data);
        let quote = QuoteBody {
            version: 2,
            sign_type: 1,
            basename: TEST_BASENAME,
            mr_enclave,
            mr_signer: [0x11; 32],
            isv_prod_id: 0,
            isv_svn: 1,
            report_data: data,
        };
        let report = serde_json::json!({
            "id": "165171271757108173876306223827987629752",
            "timestamp": "2019-09-01T12:00:00.000000",
            "version": 4,
            "isvEnclaveQuoteStatus": status,
            "isvEnclaveQuoteBody": base64_quote(&quote),
        })
        .to_string()
        .into_bytes();
        let signature = self.sign(&report)?;
        Ok(AttestationEvidence::new(
            report,
            signature,
            self.signer_pem.clone().into_bytes(),
            QuoteStatus::from(status),
        ))
    }

    fn sign(&self, report: &[u8]) -> Result<Vec<u8>> {
        match &self.signer_key {
            ReportSigner::Ecdsa(key) => key
                .sign(&self.rng, report)
                .map(|signature| signature.as_ref().to_vec())
                .map_err(|err| anyhow!("signing report: {}", err)),
            ReportSigner::Rsa(key) => {
                let mut signature = vec![0u8; key.public().modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &self.rng, report, &mut signature)
                    .map_err(|err| anyhow!("signing report: {}", err))?;
                Ok(signature)
            }
        }
    }
}

fn base64_quote(quote: &QuoteBody) -> String {
    tcf_utils::encode_base64(&quote.to_bytes())
}
