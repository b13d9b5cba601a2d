//! 7-bit-per-byte varint encoding for catalog string length prefixes.
//!
//! Compatible with .NET's `BinaryWriter.Write7BitEncodedInt`: each byte holds
//! 7 bits of the value in its low bits, with the high bit set on every byte
//! except the last.

use crate::common::{Error, Result};

pub fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a varint from the front of `bytes`, returning the value and the
/// number of bytes consumed.
pub fn read_varint(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
        if shift >= 35 {
            return Err(Error::Constraint("varint too long".into()));
        }
    }
    Err(Error::Constraint("truncated varint".into()))
}

pub fn write_string(out: &mut Vec<u8>, s: &str) {
    write_varint(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

pub fn read_string(bytes: &[u8]) -> Result<(String, usize)> {
    let (len, prefix_len) = read_varint(bytes)?;
    let len = len as usize;
    let data = bytes
        .get(prefix_len..prefix_len + len)
        .ok_or_else(|| Error::Constraint("truncated string".into()))?;
    let s = String::from_utf8(data.to_vec())
        .map_err(|e| Error::Constraint(format!("invalid utf-8: {e}")))?;
    Ok((s, prefix_len + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_value_is_one_byte() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 100);
        assert_eq!(buf.len(), 1);
        assert_eq!(read_varint(&buf).unwrap(), (100, 1));
    }

    #[test]
    fn test_large_value_multiple_bytes() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 300);
        assert_eq!(buf.len(), 2);
        assert_eq!(read_varint(&buf).unwrap(), (300, 2));
    }

    #[test]
    fn test_string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "hello, catalog");
        let (s, consumed) = read_string(&buf).unwrap();
        assert_eq!(s, "hello, catalog");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_empty_string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "");
        let (s, consumed) = read_string(&buf).unwrap();
        assert_eq!(s, "");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_truncated_varint_errors() {
        let buf = [0x80u8];
        assert!(read_varint(&buf).is_err());
    }

    #[test]
    fn test_large_number_roundtrip() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 1_000_000);
        let (value, _) = read_varint(&buf).unwrap();
        assert_eq!(value, 1_000_000);
    }
}
