//! Some simple manipulations of Distinguished Encoding Rules (DER), enough
//! to move ECDSA signatures between their raw and ASN.1 forms.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory
//! for information on licensing and copyright.

const TAG_INTEGER: u8 = 2;
const TAG_SEQUENCE: u8 = 48;

/// Length of a raw P-256 signature, `r || s`.
pub const RAW_SIGNATURE_LEN: usize = 64;

/// Convert a raw signature (64 bytes) into DER encoding:
/// two INTEGERs in a SEQUENCE.
pub fn sig_to_der(sig: &[u8]) -> Result<Vec<u8>, ()> {
    if sig.len() != RAW_SIGNATURE_LEN {
        return Err(());
    }
    let r = encode_der_integer(&sig[0..32]);
    let s = encode_der_integer(&sig[32..64]);
    let mut der = vec![TAG_SEQUENCE];
    der.extend_from_slice(&encode_der_length(r.len() + s.len()));
    der.extend_from_slice(&r);
    der.extend_from_slice(&s);
    Ok(der)
}

/// Split a DER signature into its `r` and `s` INTEGER contents.  Fails if
/// the input is not exactly one SEQUENCE of two INTEGERs.
pub fn parse_ecdsa_signature(sig: &[u8]) -> Result<(&[u8], &[u8]), ()> {
    let mut der = sig;
    let mut seq = parse_der_contents(TAG_SEQUENCE, &mut der)?;
    if !der.is_empty() {
        return Err(());
    }
    let r = parse_der_contents(TAG_INTEGER, &mut seq)?;
    let s = parse_der_contents(TAG_INTEGER, &mut seq)?;
    if !seq.is_empty() || r.is_empty() || s.is_empty() {
        return Err(());
    }
    Ok((r, s))
}

/// Minimal positive INTEGER encoding of a big-endian unsigned value.
fn encode_der_integer(value: &[u8]) -> Vec<u8> {
    let first = value.iter().position(|b| *b != 0).unwrap_or(value.len() - 1);
    let value = &value[first..];
    let mut der = vec![TAG_INTEGER];
    if value[0] >= 128 {
        der.extend_from_slice(&encode_der_length(value.len() + 1));
        der.push(0);
    } else {
        der.extend_from_slice(&encode_der_length(value.len()));
    }
    der.extend_from_slice(value);
    der
}

fn encode_der_length(n: usize) -> Vec<u8> {
    if n < 128 {
        vec![n as u8]
    } else {
        let mut der = vec![];
        let mut n = n;
        while n > 0 {
            der.push(n as u8);
            n /= 256
        }
        der.push(128 + der.len() as u8);
        der.reverse();
        der
    }
}

/// Extract DER length. Argument is updated to remaining input.
fn parse_der_length(der: &mut &[u8]) -> Result<usize, ()> {
    if der.is_empty() || der[0] == 128 || der[0] == 255 {
        return Err(());
    }
    if der[0] < 128 {
        let len = der[0] as usize;
        *der = &der[1..];
        Ok(len)
    } else {
        let len_len = der[0] as usize - 128;
        if len_len > std::mem::size_of::<usize>() || der.len() < 1 + len_len {
            return Err(());
        }
        let mut len = 0;
        for byte in &der[1..(1 + len_len)] {
            len = len * 256 + *byte as usize;
        }
        *der = &der[(1 + len_len)..];
        Ok(len)
    }
}

/// Extract the contents of the DER item with the given tag.  Second argument
/// is updated to the remaining input.
fn parse_der_contents<'a>(id: u8, der: &mut &'a [u8]) -> Result<&'a [u8], ()> {
    if der.is_empty() || der[0] != id {
        return Err(());
    }
    let mut rest = &der[1..];
    let length = parse_der_length(&mut rest)?;
    if rest.len() < length {
        return Err(());
    }
    let contents = &rest[0..length];
    *der = &rest[length..];
    Ok(contents)
}
