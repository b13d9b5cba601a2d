//! Row identifier type.

use std::fmt;

/// Identifies a row as a `(page_id, slot_number)` pair.
///
/// `page_id` is signed so that `(-1, -1)` can serve as the sentinel for "no
/// row", mirroring the on-disk encoding described for record pointers:
/// 4 bytes of page id followed by 2 bytes of slot number, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: i32,
    pub slot_number: i16,
}

impl RowId {
    /// Sentinel value representing "no row".
    pub const INVALID: RowId = RowId { page_id: -1, slot_number: -1 };

    #[inline]
    pub fn new(page_id: i32, slot_number: i16) -> Self {
        RowId { page_id, slot_number }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Encode as 6 bytes: page id (4, LE) then slot number (2, LE).
    pub fn to_bytes(&self) -> [u8; 6] {
        let mut buf = [0u8; 6];
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_number.to_le_bytes());
        buf
    }

    /// Decode from 6 bytes produced by [`RowId::to_bytes`].
    pub fn from_bytes(bytes: &[u8; 6]) -> Self {
        let page_id = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let slot_number = i16::from_le_bytes([bytes[4], bytes[5]]);
        RowId { page_id, slot_number }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "RowId(INVALID)")
        } else {
            write!(f, "RowId({}, {})", self.page_id, self.slot_number)
        }
    }
}
