//! Minimal BER/DER encoding for LDAP control values
//!
//! Control values travel as the control's opaque payload and are encoded as a
//! DER SEQUENCE wrapping a single primitive: an OCTET STRING for string
//! values or an INTEGER for 32-bit signed integers. Binary payloads are
//! recognized by the data model but have no encoding yet and are rejected.

use crate::error::BerError;
use crate::requests::ControlValue;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_SEQUENCE: u8 = 0x30;

/// Encode a control value into its DER envelope.
pub fn encode_value(value: &ControlValue) -> Result<Vec<u8>, BerError> {
    match value {
        ControlValue::Str(s) => Ok(sequence(&octet_string(s.as_bytes()))),
        ControlValue::Int(i) => Ok(sequence(&integer(*i))),
        ControlValue::Bin(_) => Err(BerError::BinaryUnsupported),
    }
}

/// DER SEQUENCE wrapping already-encoded content.
fn sequence(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(TAG_SEQUENCE);
    push_length(&mut out, content.len());
    out.extend_from_slice(content);
    out
}

/// DER OCTET STRING.
fn octet_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 4);
    out.push(TAG_OCTET_STRING);
    push_length(&mut out, bytes.len());
    out.extend_from_slice(bytes);
    out
}

/// DER INTEGER in minimal two's-complement form.
fn integer(value: i32) -> Vec<u8> {
    let bytes = value.to_be_bytes();

    // Strip redundant leading bytes: 0x00 before a clear sign bit, 0xFF
    // before a set one. The last byte always stays.
    let mut start = 0;
    while start < bytes.len() - 1 {
        let sign_extended = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !sign_extended {
            break;
        }
        start += 1;
    }

    let mut out = Vec::with_capacity(6);
    out.push(TAG_INTEGER);
    push_length(&mut out, bytes.len() - start);
    out.extend_from_slice(&bytes[start..]);
    out
}

/// Append a DER length: short form below 128, long form above.
fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}
