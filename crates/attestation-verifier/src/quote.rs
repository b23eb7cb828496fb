//! Intel SGX quote body layout
//!
//! Offsets follow `sgx_quote_t` with the trailing signature stripped, which is
//! the form quoting authorities echo back in `isvEnclaveQuoteBody`.
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
use std::convert::TryInto;

pub const QUOTE_BODY_LEN: usize = 432;

const VERSION_OFFSET: usize = 0;
const SIGN_TYPE_OFFSET: usize = 2;
const BASENAME_OFFSET: usize = 16;
const REPORT_BODY_OFFSET: usize = 48;
const MR_ENCLAVE_OFFSET: usize = REPORT_BODY_OFFSET + 64;
const MR_SIGNER_OFFSET: usize = REPORT_BODY_OFFSET + 128;
const ISV_PROD_ID_OFFSET: usize = REPORT_BODY_OFFSET + 256;
const ISV_SVN_OFFSET: usize = REPORT_BODY_OFFSET + 258;
const REPORT_DATA_OFFSET: usize = REPORT_BODY_OFFSET + 320;

pub const MEASUREMENT_LEN: usize = 32;
pub const BASENAME_LEN: usize = 32;
pub const REPORT_DATA_LEN: usize = 64;

/// The fields of a quote body needed to identify an enclave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteBody {
    pub version: u16,
    pub sign_type: u16,
    pub basename: [u8; BASENAME_LEN],
    pub mr_enclave: [u8; MEASUREMENT_LEN],
    pub mr_signer: [u8; MEASUREMENT_LEN],
    pub isv_prod_id: u16,
    pub isv_svn: u16,
    pub report_data: [u8; REPORT_DATA_LEN],
}

impl QuoteBody {
    pub fn parse(body: &[u8]) -> Result<Self, AttestationError> {
        if body.len() < QUOTE_BODY_LEN {
            return Err(AttestationError::MalformedEvidence(
                "isvEnclaveQuoteBody",
                format!("expected at least {} bytes, received {}", QUOTE_BODY_LEN, body.len()),
            ));
        }
        Ok(QuoteBody {
            version: read_u16(body, VERSION_OFFSET),
            sign_type: read_u16(body, SIGN_TYPE_OFFSET),
            basename: read_array(body, BASENAME_OFFSET)?,
            mr_enclave: read_array(body, MR_ENCLAVE_OFFSET)?,
            mr_signer: read_array(body, MR_SIGNER_OFFSET)?,
            isv_prod_id: read_u16(body, ISV_PROD_ID_OFFSET),
            isv_svn: read_u16(body, ISV_SVN_OFFSET),
            report_data: read_array(body, REPORT_DATA_OFFSET)?,
        })
    }

    /// Serialise back into a zero-padded quote body.  Used to build evidence
    /// for simulated workers.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = vec![0u8; QUOTE_BODY_LEN];
        body[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&self.version.to_le_bytes());
        body[SIGN_TYPE_OFFSET..SIGN_TYPE_OFFSET + 2].copy_from_slice(&self.sign_type.to_le_bytes());
        body[BASENAME_OFFSET..BASENAME_OFFSET + BASENAME_LEN].copy_from_slice(&self.basename);
        body[MR_ENCLAVE_OFFSET..MR_ENCLAVE_OFFSET + MEASUREMENT_LEN]
            .copy_from_slice(&self.mr_enclave);
        body[MR_SIGNER_OFFSET..MR_SIGNER_OFFSET + MEASUREMENT_LEN].copy_from_slice(&self.mr_signer);
        body[ISV_PROD_ID_OFFSET..ISV_PROD_ID_OFFSET + 2]
            .copy_from_slice(&self.isv_prod_id.to_le_bytes());
        body[ISV_SVN_OFFSET..ISV_SVN_OFFSET + 2].copy_from_slice(&self.isv_svn.to_le_bytes());
        body[REPORT_DATA_OFFSET..REPORT_DATA_OFFSET + REPORT_DATA_LEN]
            .copy_from_slice(&self.report_data);
        body
    }
}

fn read_u16(body: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([body[offset], body[offset + 1]])
}

fn read_array<const N: usize>(body: &[u8], offset: usize) -> Result<[u8; N], AttestationError> {
    body[offset..offset + N].try_into().map_err(|_| {
        AttestationError::MalformedEvidence("isvEnclaveQuoteBody", format!("short field at {}", offset))
    })
}
