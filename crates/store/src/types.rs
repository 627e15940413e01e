//! Encoding utilities for variable-length record fields.
//!
//! Values stored in the engine are opaque bytes. Layers that pack several
//! fields into one value use these helpers for length-prefixed sections.

/// Encode a length-prefixed byte slice (used for variable-length fields).
pub fn encode_length_prefixed(data: &[u8], buf: &mut Vec<u8>) {
    // Varint length (1-5 bytes for lengths up to 4GB)
    encode_varint(data.len() as u32, buf);
    buf.extend_from_slice(data);
}

/// Decode a length-prefixed byte slice. Returns (data, bytes_consumed).
pub fn decode_length_prefixed(buf: &[u8]) -> Option<(&[u8], usize)> {
    let (len, varint_size) = decode_varint(buf)?;
    let total_size = varint_size.checked_add(len as usize)?;
    if buf.len() >= total_size { Some((&buf[varint_size..total_size], total_size)) } else { None }
}

/// Encode a u32 as a varint (1-5 bytes).
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            return;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a varint from a byte slice. Returns (value, bytes_consumed).
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= 5 {
            return None; // Varint too long
        }

        value |= ((byte & 0x7F) as u32).checked_shl(shift)?;

        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }

        shift += 7;
    }

    None // Incomplete varint
}
