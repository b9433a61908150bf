//! Canonical byte encoding for signed records.
//!
//! Records are serialized as an RLP list of byte strings. Only the subset
//! needed by the record codec is implemented: flat lists, byte strings, and
//! minimal big-endian integers. Decoding is strict — non-minimal length
//! forms and nested lists are rejected, so a given payload has exactly one
//! valid encoding.

use crate::error::{Error, Result};

/// Encode an unsigned integer as its minimal big-endian byte string.
/// Zero encodes as the empty string.
pub fn encode_uint(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

/// Decode a minimal big-endian byte string into an unsigned integer.
pub fn decode_uint(bytes: &[u8]) -> Result<u64> {
    if bytes.len() > 8 {
        return Err(Error::Parse("integer larger than 64 bits".into()));
    }
    if bytes.first() == Some(&0) {
        return Err(Error::Parse("integer has leading zero byte".into()));
    }
    let mut value = 0u64;
    for b in bytes {
        value = value << 8 | u64::from(*b);
    }
    Ok(value)
}

/// Encode a list of byte strings as an RLP list.
pub fn encode_list<T: AsRef<[u8]>>(items: &[T]) -> Vec<u8> {
    let mut payload = Vec::new();
    for item in items {
        encode_bytes(item.as_ref(), &mut payload);
    }
    let mut out = Vec::with_capacity(payload.len() + 9);
    encode_length(&mut out, payload.len(), 0xc0);
    out.extend_from_slice(&payload);
    out
}

/// Decode an RLP list of byte strings, consuming the whole input.
///
/// Fails if the input is not a single top-level list, contains nested
/// lists, or uses a non-canonical length form anywhere.
pub fn decode_list(buf: &[u8]) -> Result<Vec<Vec<u8>>> {
    let (payload, rest) = take_payload(buf, true)?;
    if !rest.is_empty() {
        return Err(Error::Parse("trailing bytes after list".into()));
    }
    let mut items = Vec::new();
    let mut cursor = payload;
    while !cursor.is_empty() {
        let (item, rest) = take_payload(cursor, false)?;
        items.push(item.to_vec());
        cursor = rest;
    }
    Ok(items)
}

fn encode_bytes(data: &[u8], out: &mut Vec<u8>) {
    if data.len() == 1 && data[0] < 0x80 {
        out.push(data[0]);
        return;
    }
    encode_length(out, data.len(), 0x80);
    out.extend_from_slice(data);
}

fn encode_length(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len <= 55 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = encode_uint(len as u64);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
}

/// Split one item off the front of `buf`, returning its payload and the
/// remainder. `want_list` selects whether a list or a byte string is
/// expected at this position.
fn take_payload(buf: &[u8], want_list: bool) -> Result<(&[u8], &[u8])> {
    let first = *buf
        .first()
        .ok_or_else(|| Error::Parse("unexpected end of input".into()))?;

    let (offset, short_max) = if want_list {
        (0xc0u16, 0xf7u16)
    } else {
        (0x80u16, 0xb7u16)
    };

    if !want_list && first < 0x80 {
        // single byte encodes itself
        return Ok((&buf[..1], &buf[1..]));
    }
    let first = u16::from(first);
    if first < offset || (want_list && first < 0xc0) {
        return Err(Error::Parse("expected a list, found a byte string".into()));
    }
    if !want_list && first >= 0xc0 {
        return Err(Error::Parse("nested list not allowed".into()));
    }

    let (len, header) = if first <= short_max {
        ((first - offset) as usize, 1)
    } else {
        let len_of_len = (first - short_max) as usize;
        let len_bytes = buf
            .get(1..1 + len_of_len)
            .ok_or_else(|| Error::Parse("truncated length".into()))?;
        if len_bytes.first() == Some(&0) {
            return Err(Error::Parse("length has leading zero".into()));
        }
        let len = decode_uint(len_bytes)? as usize;
        if len <= 55 {
            return Err(Error::Parse("non-minimal length form".into()));
        }
        (len, 1 + len_of_len)
    };

    let payload = buf
        .get(header..header + len)
        .ok_or_else(|| Error::Parse("truncated payload".into()))?;

    // a 1-byte string below 0x80 must have been encoded as itself
    if !want_list && payload.len() == 1 && payload[0] < 0x80 {
        return Err(Error::Parse("non-minimal single byte encoding".into()));
    }

    Ok((payload, &buf[header + len..]))
}
