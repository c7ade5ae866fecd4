// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Legacy tag-length-value stream.
//!
//! Older tooling flattened a parcel as a list of values instead of raw
//! words. Those blobs can still be unmarshalled; [`crate::Parcel::marshal`]
//! never produces them.
//!
//! Layout:
//!
//! ```text
//! magic    [AC ED 00 05]
//! count    u32 big-endian
//! entry*   i32 big-endian byte count, then one CBOR data item (a LegacyValue)
//! ```
//!
//! The byte count is the footprint the producer assigned to the value. It
//! only matters for the narrow empty string, which old producers stored in
//! a single word.

use serde::{Deserialize, Serialize};

use crate::codec::{display_bytes, RecordKind};
use crate::config::WireFormat;
use crate::error::ParcelError;
use crate::ledger::Record;
use crate::parcel::Parcel;
use crate::store::{align4, WORD};

/// Leading bytes of every legacy stream.
pub const LEGACY_MAGIC: [u8; 4] = [0xAC, 0xED, 0x00, 0x05];

/// Byte count of the legacy narrow empty string.
const NARROW_EMPTY_STRING: i32 = 4;

/// One value of a legacy stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LegacyValue {
    /// Null string or object.
    Null,
    /// 32-bit integer (CBOR stores small values narrowly).
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Single byte. An `Int(n)` followed by `n` of these also reads back as
    /// a byte array.
    Byte(i8),
    /// Non-null string.
    Str(String),
    /// Raw byte-array content.
    Bytes(Vec<u8>),
}

impl LegacyValue {
    /// Footprint old producers recorded for this value.
    fn default_byte_count(&self) -> i32 {
        match self {
            Self::Byte(_) => 1,
            Self::Null | Self::Int(_) | Self::Float(_) => 4,
            Self::Long(_) | Self::Double(_) => 8,
            Self::Str(s) => i32::try_from(align4(WORD + 2 * (s.encode_utf16().count() + 1)))
                .unwrap_or(i32::MAX),
            Self::Bytes(b) => i32::try_from(align4(b.len())).unwrap_or(i32::MAX),
        }
    }
}

/// A value together with its recorded byte count.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEntry {
    /// Footprint recorded by the producer.
    pub byte_count: i32,
    /// The value.
    pub value: LegacyValue,
}

impl LegacyEntry {
    /// Entry with the byte count old producers used for `value`.
    pub fn new(value: LegacyValue) -> Self {
        Self {
            byte_count: value.default_byte_count(),
            value,
        }
    }

    /// Entry with an explicit byte count.
    pub fn with_byte_count(value: LegacyValue, byte_count: i32) -> Self {
        Self { byte_count, value }
    }
}

/// Whether `bytes` begin with the legacy magic.
pub fn is_legacy_stream(bytes: &[u8]) -> bool {
    bytes.starts_with(&LEGACY_MAGIC)
}

/// Entries of `bytes` when they form a legacy stream with at least one entry.
pub(crate) fn detect(bytes: &[u8], max_entries: u32) -> Option<Vec<LegacyEntry>> {
    if !is_legacy_stream(bytes) {
        return None;
    }
    decode_stream(bytes, max_entries)
        .ok()
        .filter(|entries| !entries.is_empty())
}

/// Resolve [`WireFormat::Detect`] for `bytes`; other formats pass through.
pub fn resolve_format(format: WireFormat, bytes: &[u8], max_entries: u32) -> WireFormat {
    match format {
        WireFormat::Detect if detect(bytes, max_entries).is_some() => WireFormat::Legacy,
        WireFormat::Detect => WireFormat::Native,
        other => other,
    }
}

/// Produce a legacy stream, for fixtures and conversion tooling.
pub fn encode_stream(entries: &[LegacyEntry]) -> Result<Vec<u8>, ParcelError> {
    let count = u32::try_from(entries.len())
        .map_err(|_| ParcelError::legacy(format!("{} entries do not fit a u32 count", entries.len())))?;
    let mut out = LEGACY_MAGIC.to_vec();
    out.extend_from_slice(&count.to_be_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.byte_count.to_be_bytes());
        ciborium::into_writer(&entry.value, &mut out)
            .map_err(|e| ParcelError::legacy(e.to_string()))?;
    }
    Ok(out)
}

struct StreamReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> StreamReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ParcelError> {
        let end = self.offset + len;
        let slice = self.bytes.get(self.offset..end).ok_or_else(|| {
            ParcelError::legacy(format!(
                "truncated at offset {}: needed {len} bytes",
                self.offset
            ))
        })?;
        self.offset = end;
        Ok(slice)
    }

    fn word(&mut self) -> Result<[u8; 4], ParcelError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(raw)
    }

    fn value(&mut self, index: u32) -> Result<LegacyValue, ParcelError> {
        let mut rest = &self.bytes[self.offset..];
        let before = rest.len();
        let value = ciborium::from_reader(&mut rest)
            .map_err(|e| ParcelError::legacy(format!("entry {index}: {e}")))?;
        self.offset += before - rest.len();
        Ok(value)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

/// Parse a legacy stream into its entries.
pub fn decode_stream(bytes: &[u8], max_entries: u32) -> Result<Vec<LegacyEntry>, ParcelError> {
    let mut reader = StreamReader { bytes, offset: 0 };
    if reader.word()? != LEGACY_MAGIC {
        return Err(ParcelError::legacy("missing stream magic"));
    }
    let count = u32::from_be_bytes(reader.word()?);
    if count > max_entries {
        return Err(ParcelError::legacy(format!(
            "stream declares {count} entries, limit is {max_entries}"
        )));
    }

    let mut entries = Vec::new();
    for index in 0..count {
        let byte_count = i32::from_be_bytes(reader.word()?);
        if byte_count < 0 {
            return Err(ParcelError::legacy(format!(
                "entry {index} has negative byte count {byte_count}"
            )));
        }
        let value = reader.value(index)?;
        entries.push(LegacyEntry { byte_count, value });
    }
    if reader.remaining() != 0 {
        return Err(ParcelError::legacy(format!(
            "{} trailing bytes after {count} entries",
            reader.remaining()
        )));
    }
    Ok(entries)
}

/// Write `entries` into `parcel` in the native layout.
pub(crate) fn transcode(entries: &[LegacyEntry], parcel: &mut Parcel) -> Result<(), ParcelError> {
    for entry in entries {
        match &entry.value {
            LegacyValue::Int(v) => parcel.write_int(*v)?,
            LegacyValue::Long(v) => parcel.write_long(*v)?,
            LegacyValue::Float(v) => parcel.write_float(*v)?,
            LegacyValue::Double(v) => parcel.write_double(*v)?,
            LegacyValue::Byte(v) => parcel.write_byte(*v)?,
            LegacyValue::Str(s) if s.is_empty() && entry.byte_count == NARROW_EMPTY_STRING => {
                let word = [0u8; WORD];
                let record =
                    Record::new(RecordKind::String, &word, WORD, String::new()).strict_footprint();
                parcel.put(&word, record)?;
            }
            LegacyValue::Str(s) => parcel.write_string(Some(s))?,
            LegacyValue::Null => parcel.write_string(None)?,
            LegacyValue::Bytes(bytes) if bytes.is_empty() => {}
            LegacyValue::Bytes(bytes) => {
                let record = Record::new(
                    RecordKind::ByteArray,
                    bytes,
                    align4(bytes.len()),
                    display_bytes(bytes),
                );
                parcel.put(bytes, record)?;
            }
        }
    }
    Ok(())
}
