// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire encodings for every value a parcel can hold.
//!
//! All multi-byte quantities are little-endian and every footprint is padded
//! to a whole number of words:
//!
//! | Value | Footprint |
//! |---|---|
//! | int, float, byte, bool | 4 |
//! | long, double | 8 |
//! | string | 4-byte UTF-16 unit count, units, 2-byte terminator, padded; null is a lone `-1` |
//! | byte array | 4-byte length record, then raw bytes padded; null is a lone `-1` |
//! | strong reference | 20 |

use serde::{Deserialize, Serialize};

use crate::error::ParcelError;
use crate::store::{align4, WORD};

/// Length prefix written for a null string, array or byte array.
pub const NULL_LENGTH: i32 = -1;

/// Kind of value a ledger record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Signed byte widened to a full word.
    Byte,
    /// UTF-16 string with length prefix and terminator.
    String,
    /// Content of a byte array (the length prefix is a separate [`RecordKind::Int`]).
    ByteArray,
    /// Strong object reference.
    Binder,
    /// Opaque span ingested without type metadata.
    Object,
    /// The `-1` sentinel written for a null string.
    NullMarker,
}

impl RecordKind {
    /// Label used in diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Byte => "byte",
            Self::String => "String",
            Self::ByteArray => "byte[]",
            Self::Binder => "StrongRef",
            Self::Object => "untyped data",
            Self::NullMarker => "null",
        }
    }

    /// Whether a record of this kind may be read back as `wanted`.
    ///
    /// Ints and bytes share one 32-bit slot on the wire; a null marker is a
    /// valid string.
    pub fn reads_as(self, wanted: Self) -> bool {
        match (self, wanted) {
            (Self::Int | Self::Byte, Self::Int | Self::Byte) | (Self::NullMarker, Self::String) => {
                true
            }
            _ => self == wanted,
        }
    }
}

/// Fixed-width value stored in a single record.
pub(crate) trait Scalar: Copy {
    const KIND: RecordKind;
    const WIDTH: usize;
    const DEFAULT: Self;

    fn encode(self) -> Vec<u8>;
    /// `bytes` holds at least `WIDTH` bytes.
    fn decode(bytes: &[u8]) -> Self;
    fn display(self) -> String;
}

macro_rules! le_scalar {
    ($ty:ty, $kind:ident, $width:literal, $default:expr) => {
        impl Scalar for $ty {
            const KIND: RecordKind = RecordKind::$kind;
            const WIDTH: usize = $width;
            const DEFAULT: Self = $default;

            fn encode(self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }

            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&bytes[..$width]);
                <$ty>::from_le_bytes(raw)
            }

            fn display(self) -> String {
                self.to_string()
            }
        }
    };
}

le_scalar!(i32, Int, 4, 0);
le_scalar!(i64, Long, 8, 0);
le_scalar!(f32, Float, 4, 0.0);
le_scalar!(f64, Double, 8, 0.0);

impl Scalar for i8 {
    const KIND: RecordKind = RecordKind::Byte;
    const WIDTH: usize = WORD;
    const DEFAULT: Self = 0;

    fn encode(self) -> Vec<u8> {
        i32::from(self).to_le_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Self {
        // Low byte of the widened word.
        i8::from_le_bytes([bytes[0]])
    }

    fn display(self) -> String {
        self.to_string()
    }
}

/// Largest length a prefix can carry.
const MAX_WIRE_LENGTH: usize = 0x7fff_ffff;

/// Convert a host length into a wire length prefix.
pub(crate) fn length_prefix(len: usize) -> Result<i32, ParcelError> {
    i32::try_from(len).map_err(|_| ParcelError::RangeOutOfBounds {
        offset: 0,
        length: len,
        available: MAX_WIRE_LENGTH,
    })
}

/// Footprint of a non-null string of `units` UTF-16 code units.
pub(crate) const fn string_footprint(units: usize) -> usize {
    align4(WORD + 2 * (units + 1))
}

/// Encode a string (or the null sentinel) into its unpadded payload.
pub(crate) fn encode_string(value: Option<&str>) -> Result<Vec<u8>, ParcelError> {
    let Some(value) = value else {
        return Ok(NULL_LENGTH.to_le_bytes().to_vec());
    };
    let units: Vec<u16> = value.encode_utf16().collect();
    let mut out = Vec::with_capacity(string_footprint(units.len()));
    out.extend_from_slice(&length_prefix(units.len())?.to_le_bytes());
    for unit in &units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    Ok(out)
}

/// Decode the UTF-16 body of a string whose length word says `units`.
///
/// `bytes` starts at the length word and spans the full footprint. Returns
/// `None` when the terminator is missing or the units are not valid UTF-16.
pub(crate) fn decode_string_body(bytes: &[u8], units: usize) -> Option<String> {
    let body_end = WORD + 2 * units;
    let terminator = bytes.get(body_end..body_end + 2)?;
    if terminator != [0, 0] {
        return None;
    }
    let code_units: Vec<u16> = bytes[WORD..body_end]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&code_units).ok()
}

/// Diagnostic rendering of a string record.
pub(crate) fn display_string(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_owned(), str::to_owned)
}

/// Diagnostic rendering of byte-array content: hex, truncated.
pub(crate) fn display_bytes(bytes: &[u8]) -> String {
    const SHOWN: usize = 32;
    if bytes.len() > SHOWN {
        format!("{}...", hex::encode(&bytes[..SHOWN]))
    } else {
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_layout_matches_wire() {
        let bytes = encode_string(Some("test")).unwrap_or_default();
        assert_eq!(bytes.len(), 14);
        assert_eq!(string_footprint(4), 16);
        assert_eq!(&bytes[..4], &4i32.to_le_bytes());
        assert_eq!(&bytes[4..6], &u16::from(b't').to_le_bytes());
        assert_eq!(decode_string_body(&bytes, 4).as_deref(), Some("test"));
    }

    #[test]
    fn null_and_empty_strings() {
        assert_eq!(encode_string(None).ok(), Some(vec![0xff; 4]));
        let empty = encode_string(Some("")).unwrap_or_default();
        assert_eq!(empty, vec![0; 6]);
        assert_eq!(string_footprint(0), 8);
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut bytes = encode_string(Some("ab")).unwrap_or_default();
        let last = bytes.len() - 1;
        bytes[last] = 1;
        assert_eq!(decode_string_body(&bytes, 2), None);
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let bytes = encode_string(Some("\u{1F980}")).unwrap_or_default();
        assert_eq!(&bytes[..4], &2i32.to_le_bytes());
        assert_eq!(
            decode_string_body(&bytes, 2).as_deref(),
            Some("\u{1F980}")
        );
    }

    #[test]
    fn byte_widens_to_a_word() {
        assert_eq!((-1i8).encode(), vec![0xff; 4]);
        assert_eq!(i8::decode(&(-2i32).to_le_bytes()), -2);
        assert!(RecordKind::Int.reads_as(RecordKind::Byte));
        assert!(RecordKind::NullMarker.reads_as(RecordKind::String));
        assert!(!RecordKind::Long.reads_as(RecordKind::Double));
    }
}
