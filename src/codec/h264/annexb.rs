//! Reframing between Annex-B byte streams and length-prefixed NAL records.
//!
//! Codec sessions exchange samples as a run of NAL units, each preceded by a
//! 4-byte big-endian length. On the wire the same units are delimited by the
//! start code `00 00 00 01`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{AvError, Result};

/// Four-byte Annex-B start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
/// Size of the big-endian length ahead of each length-prefixed NAL unit.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Splits an Annex-B buffer into NAL units (start codes removed).
///
/// Both 3- and 4-byte start codes are accepted. The buffer must begin with a
/// start code (optionally preceded by zero bytes), and every unit must be
/// non-empty.
pub fn split_annexb(data: &[u8]) -> Result<Vec<&[u8]>> {
    let first = find_start_code(data, 0)
        .ok_or_else(|| AvError::MalformedBitstream("no start code found".into()))?;
    if data[..first].iter().any(|&b| b != 0) {
        return Err(AvError::MalformedBitstream(format!(
            "{} bytes of garbage before the first start code",
            first
        )));
    }

    let mut units = Vec::new();
    let mut start = first + 3;
    loop {
        let next = find_start_code(data, start);
        let end = next.unwrap_or(data.len());
        let unit = trim_trailing_zeros(&data[start..end]);
        if unit.is_empty() {
            return Err(AvError::MalformedBitstream(format!(
                "empty NAL unit at offset {}",
                start
            )));
        }
        units.push(unit);

        match next {
            Some(pos) => start = pos + 3,
            None => break,
        }
    }
    Ok(units)
}

/// Splits a run of length-prefixed NAL records.
pub fn split_length_prefixed(data: &[u8]) -> Result<Vec<&[u8]>> {
    let mut units = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let header = data.get(pos..pos + LENGTH_PREFIX_SIZE).ok_or_else(|| {
            AvError::MalformedBitstream(format!("truncated length prefix at offset {}", pos))
        })?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        pos += LENGTH_PREFIX_SIZE;
        if len == 0 {
            return Err(AvError::MalformedBitstream(format!(
                "zero-length NAL record at offset {}",
                pos - LENGTH_PREFIX_SIZE
            )));
        }
        let unit = data.get(pos..pos + len).ok_or_else(|| {
            AvError::MalformedBitstream(format!(
                "NAL record of {} bytes overruns buffer of {} at offset {}",
                len,
                data.len(),
                pos
            ))
        })?;
        units.push(unit);
        pos += len;
    }
    Ok(units)
}

/// Replaces each 4-byte length prefix with a start code.
pub fn length_prefixed_to_annexb(data: &[u8]) -> Result<Bytes> {
    let units = split_length_prefixed(data)?;
    Ok(join_annexb(&units))
}

/// Replaces each start code with a 4-byte big-endian length.
pub fn annexb_to_length_prefixed(data: &[u8]) -> Result<Bytes> {
    let units = split_annexb(data)?;
    Ok(join_length_prefixed(&units))
}

/// Writes `units` each behind a four-byte start code.
pub fn join_annexb(units: &[&[u8]]) -> Bytes {
    let total: usize = units.iter().map(|u| u.len() + START_CODE.len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for unit in units {
        out.put_slice(&START_CODE);
        out.put_slice(unit);
    }
    out.freeze()
}

/// Writes `units` each behind a four-byte big-endian length.
pub fn join_length_prefixed(units: &[&[u8]]) -> Bytes {
    let total: usize = units.iter().map(|u| u.len() + LENGTH_PREFIX_SIZE).sum();
    let mut out = BytesMut::with_capacity(total);
    for unit in units {
        out.put_u32(unit.len() as u32);
        out.put_slice(unit);
    }
    out.freeze()
}

/// Position of the next `00 00 01` at or after `from`.
fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 3 {
        return None;
    }
    (from..data.len() - 2).find(|&i| data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1)
}

/// Zeros before a start code belong to it (4-byte form or `trailing_zero_8bits`).
fn trim_trailing_zeros(unit: &[u8]) -> &[u8] {
    let end = unit.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &unit[..end]
}
