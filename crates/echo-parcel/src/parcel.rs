// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The parcel buffer: cursor, typed writes and typed reads.

use tracing::trace;

use crate::codec::{
    decode_string_body, display_bytes, display_string, encode_string, length_prefix,
    string_footprint, RecordKind, Scalar, NULL_LENGTH,
};
use crate::config::ParcelConfig;
use crate::error::{FoundValue, ParcelError};
use crate::ledger::{Ledger, Record, RecordId, Slot, Span};
use crate::reference::{self, StrongRef, REFERENCE_FOOTPRINT};
use crate::store::{align4, ByteStore, MAX_DATA_SIZE, WORD};

/// Growable, position-addressed binary buffer with strict read validation.
///
/// Every write appends a record to an internal ledger. Reads consult the
/// ledger and fail when the value under the cursor was partially
/// overwritten, was written as another type, or was never written. Values
/// whose bytes are all zero are the exception: they read back as any type
/// whose footprint fits.
///
/// A parcel is never implicitly copied; [`Parcel::append_from`],
/// [`Parcel::marshal`] and [`Parcel::unmarshal`] are the only transfers.
#[derive(Debug, Default)]
pub struct Parcel {
    pub(crate) store: ByteStore,
    pub(crate) ledger: Ledger,
    pub(crate) position: usize,
    pub(crate) ever_repositioned: bool,
    pub(crate) config: ParcelConfig,
}

enum Located {
    Record(RecordId),
    Untyped,
}

impl Parcel {
    /// Empty parcel with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty parcel using `config`.
    pub fn with_config(config: ParcelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ParcelConfig {
        &self.config
    }

    /// Bytes of meaningful data.
    pub fn data_size(&self) -> usize {
        self.store.size()
    }

    /// Cursor position.
    pub fn data_position(&self) -> usize {
        self.position
    }

    /// Allocated bytes; always at least [`Parcel::data_size`].
    pub fn data_capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Bytes between the cursor and the end of the data.
    pub fn data_avail(&self) -> usize {
        self.store.size().saturating_sub(self.position)
    }

    /// Move the cursor. Positions past the end are allowed and read as
    /// defaults. Any call permanently disables the rewind guard.
    pub fn set_data_position(&mut self, position: usize) {
        self.position = position;
        self.ever_repositioned = true;
    }

    /// Truncate or extend the data. Truncation discards every record word
    /// at or above `size`; extension adds uninitialized words. The cursor is
    /// clamped to the new size.
    pub fn set_data_size(&mut self, size: usize) -> Result<(), ParcelError> {
        require_aligned("data size", size)?;
        require_storable(0, size)?;
        self.store.set_size(size);
        self.ledger.resize(size);
        self.position = self.position.min(size);
        Ok(())
    }

    /// Grow capacity to at least `capacity`. Never shrinks and never changes
    /// the data size.
    pub fn set_data_capacity(&mut self, capacity: usize) -> Result<(), ParcelError> {
        require_storable(0, capacity)?;
        self.store.set_capacity(capacity);
        Ok(())
    }

    /// Reset to a fresh, empty parcel. The rewind guard is re-armed.
    pub fn clear(&mut self) {
        self.store.clear();
        self.ledger = Ledger::default();
        self.position = 0;
        self.ever_repositioned = false;
    }

    /// Ownership map of the data, word run by word run.
    pub fn layout(&self) -> Vec<Span> {
        self.ledger.layout()
    }

    // ── writes ──────────────────────────────────────────────────────────

    /// Write `payload` at the cursor as `record` and advance past its footprint.
    pub(crate) fn put(&mut self, payload: &[u8], record: Record) -> Result<(), ParcelError> {
        require_aligned("write position", self.position)?;
        let offset = self.position;
        let footprint = record.len;
        let end = require_storable(offset, footprint)?;
        self.store.write(offset, payload, footprint);
        self.ledger.resize(self.store.size());
        self.ledger.install(offset, record);
        self.position = end;
        Ok(())
    }

    fn write_scalar<T: Scalar>(&mut self, value: T) -> Result<(), ParcelError> {
        let payload = value.encode();
        let record = Record::new(T::KIND, &payload, T::WIDTH, value.display());
        self.put(&payload, record)
    }

    /// Write a 32-bit integer.
    pub fn write_int(&mut self, value: i32) -> Result<(), ParcelError> {
        self.write_scalar(value)
    }

    /// Write a 64-bit integer.
    pub fn write_long(&mut self, value: i64) -> Result<(), ParcelError> {
        self.write_scalar(value)
    }

    /// Write a 32-bit float.
    pub fn write_float(&mut self, value: f32) -> Result<(), ParcelError> {
        self.write_scalar(value)
    }

    /// Write a 64-bit float.
    pub fn write_double(&mut self, value: f64) -> Result<(), ParcelError> {
        self.write_scalar(value)
    }

    /// Write a byte, widened to a full word.
    pub fn write_byte(&mut self, value: i8) -> Result<(), ParcelError> {
        self.write_scalar(value)
    }

    /// Write a boolean as the int 0 or 1.
    pub fn write_bool(&mut self, value: bool) -> Result<(), ParcelError> {
        self.write_int(i32::from(value))
    }

    /// Write a raw file descriptor number.
    pub fn write_file_descriptor(&mut self, fd: i32) -> Result<(), ParcelError> {
        self.write_int(fd)
    }

    /// Write a string, or the null sentinel for `None`.
    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), ParcelError> {
        let payload = encode_string(value)?;
        let display = display_string(value);
        let record = match value {
            None => Record::new(RecordKind::NullMarker, &payload, WORD, display),
            Some(_) => Record::new(RecordKind::String, &payload, align4(payload.len()), display),
        };
        self.put(&payload, record)
    }

    /// Write a byte array as an int length followed by its padded content.
    pub fn write_byte_array(&mut self, value: Option<&[u8]>) -> Result<(), ParcelError> {
        let Some(bytes) = value else {
            return self.write_int(NULL_LENGTH);
        };
        self.write_int(length_prefix(bytes.len())?)?;
        if bytes.is_empty() {
            return Ok(());
        }
        let record = Record::new(
            RecordKind::ByteArray,
            bytes,
            align4(bytes.len()),
            display_bytes(bytes),
        );
        self.put(bytes, record)
    }

    /// Write `bytes[offset, offset + len)` as a byte array.
    pub fn write_byte_array_range(
        &mut self,
        bytes: &[u8],
        offset: usize,
        len: usize,
    ) -> Result<(), ParcelError> {
        let range = offset
            .checked_add(len)
            .and_then(|end| bytes.get(offset..end))
            .ok_or(ParcelError::RangeOutOfBounds {
                offset,
                length: len,
                available: bytes.len(),
            })?;
        self.write_byte_array(Some(range))
    }

    /// Write a strong reference. Buffers holding a non-null one cannot be
    /// marshalled; null is written as 20 zero bytes.
    pub fn write_strong_reference(
        &mut self,
        value: Option<&StrongRef>,
    ) -> Result<(), ParcelError> {
        let payload = reference::flatten(value);
        let record = Record::new(
            RecordKind::Binder,
            &payload,
            REFERENCE_FOOTPRINT,
            reference::display(value),
        )
        .with_reference(value.cloned());
        self.put(&payload, record)
    }

    fn write_array<T: Scalar>(&mut self, values: Option<&[T]>) -> Result<(), ParcelError> {
        let Some(values) = values else {
            return self.write_int(NULL_LENGTH);
        };
        self.write_int(length_prefix(values.len())?)?;
        values.iter().try_for_each(|value| self.write_scalar(*value))
    }

    /// Write an int array (length prefix, then elements).
    pub fn write_int_array(&mut self, values: Option<&[i32]>) -> Result<(), ParcelError> {
        self.write_array(values)
    }

    /// Write a long array.
    pub fn write_long_array(&mut self, values: Option<&[i64]>) -> Result<(), ParcelError> {
        self.write_array(values)
    }

    /// Write a float array.
    pub fn write_float_array(&mut self, values: Option<&[f32]>) -> Result<(), ParcelError> {
        self.write_array(values)
    }

    /// Write a double array.
    pub fn write_double_array(&mut self, values: Option<&[f64]>) -> Result<(), ParcelError> {
        self.write_array(values)
    }

    /// Write a string array whose elements may be null.
    pub fn write_string_array(
        &mut self,
        values: Option<&[Option<&str>]>,
    ) -> Result<(), ParcelError> {
        let Some(values) = values else {
            return self.write_int(NULL_LENGTH);
        };
        self.write_int(length_prefix(values.len())?)?;
        values.iter().try_for_each(|value| self.write_string(*value))
    }

    // ── reads ───────────────────────────────────────────────────────────

    /// Check the cursor before a read. `Ok(true)` means the read is past the
    /// end and yields its default.
    fn past_end(&mut self) -> Result<bool, ParcelError> {
        let size = self.store.size();
        if self.position < size {
            return Ok(false);
        }
        if !self.ever_repositioned && size > 0 {
            return Err(ParcelError::RewindGuard);
        }
        self.position = size;
        Ok(true)
    }

    fn take_zeroes(&mut self, width: usize) -> bool {
        if self.ledger.zero_castable(self.position, width) {
            self.position += width;
            true
        } else {
            false
        }
    }

    fn advance(&mut self, len: usize) {
        self.position = (self.position + len).min(self.store.size());
    }

    /// Find the record under the cursor and check it may be read as `wanted`.
    fn locate(&self, wanted: RecordKind) -> Result<Located, ParcelError> {
        let position = self.position;
        match self.ledger.slot_at(position) {
            Slot::Uninit => Err(ParcelError::UninitializedRead { position }),
            Slot::Zero | Slot::Opaque => Ok(Located::Untyped),
            Slot::Head(id) | Slot::Body(id) => {
                self.ledger.check_intact(id, position, wanted.label())?;
                let record = self.ledger.record(id);
                if record.kind.reads_as(wanted) {
                    Ok(Located::Record(id))
                } else {
                    Err(ParcelError::NonPortableReinterpretation {
                        looking_for: wanted.label(),
                        position,
                        found: record.found(),
                    })
                }
            }
        }
    }

    fn untyped_found(&self, len: usize) -> FoundValue {
        let shown = len.min(self.data_avail());
        FoundValue {
            kind: RecordKind::Object.label(),
            value: display_bytes(self.store.read(self.position, shown)),
            len,
        }
    }

    fn untyped_mismatch(&self, wanted: RecordKind, len: usize) -> ParcelError {
        ParcelError::NonPortableReinterpretation {
            looking_for: wanted.label(),
            position: self.position,
            found: self.untyped_found(len),
        }
    }

    /// Fail unless `len` bytes of untyped data sit under the cursor.
    fn check_claimable(&self, len: usize, wanted: RecordKind) -> Result<(), ParcelError> {
        self.ledger
            .check_untyped(self.position, &self.untyped_found(len), wanted.label())
    }

    /// Turn untyped words under the cursor into a typed record.
    fn claim(&mut self, record: Record) {
        trace!(
            position = self.position,
            kind = record.kind.label(),
            len = record.len,
            "reconstructed record from untyped data"
        );
        self.ledger.install(self.position, record);
    }

    fn read_scalar<T: Scalar>(&mut self) -> Result<T, ParcelError> {
        if self.past_end()? {
            return Ok(T::DEFAULT);
        }
        require_aligned("read position", self.position)?;
        if self.take_zeroes(T::WIDTH) {
            return Ok(T::DEFAULT);
        }
        let position = self.position;
        let len = match self.locate(T::KIND)? {
            Located::Record(id) => self.ledger.record(id).len,
            Located::Untyped => {
                self.check_claimable(T::WIDTH, T::KIND)?;
                let bytes = self.store.read(position, T::WIDTH);
                let record = Record::new(T::KIND, bytes, T::WIDTH, T::decode(bytes).display());
                self.claim(record);
                T::WIDTH
            }
        };
        let value = T::decode(self.store.read(position, T::WIDTH));
        self.advance(len);
        Ok(value)
    }

    /// Read a 32-bit integer.
    pub fn read_int(&mut self) -> Result<i32, ParcelError> {
        self.read_scalar()
    }

    /// Read a 64-bit integer.
    pub fn read_long(&mut self) -> Result<i64, ParcelError> {
        self.read_scalar()
    }

    /// Read a 32-bit float.
    pub fn read_float(&mut self) -> Result<f32, ParcelError> {
        self.read_scalar()
    }

    /// Read a 64-bit float.
    pub fn read_double(&mut self) -> Result<f64, ParcelError> {
        self.read_scalar()
    }

    /// Read a byte (the low byte of its word).
    pub fn read_byte(&mut self) -> Result<i8, ParcelError> {
        self.read_scalar()
    }

    /// Read a boolean; any non-zero int is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ParcelError> {
        Ok(self.read_int()? != 0)
    }

    /// Read a raw file descriptor number.
    pub fn read_file_descriptor(&mut self) -> Result<i32, ParcelError> {
        self.read_int()
    }

    /// Read a string; `None` for the null sentinel.
    pub fn read_string(&mut self) -> Result<Option<String>, ParcelError> {
        if self.past_end()? {
            return Ok(None);
        }
        require_aligned("read position", self.position)?;
        if self.take_zeroes(string_footprint(0)) {
            return Ok(Some(String::new()));
        }
        match self.locate(RecordKind::String)? {
            Located::Record(id) => {
                let record = self.ledger.record(id);
                let len = record.len;
                let value = if record.kind == RecordKind::NullMarker {
                    None
                } else {
                    Some(self.decode_string_record(record)?)
                };
                self.advance(len);
                Ok(value)
            }
            Located::Untyped => self.claim_string(),
        }
    }

    fn decode_string_record(&self, record: &Record) -> Result<String, ParcelError> {
        let bytes = self.store.read(self.position, record.len);
        let units = i32::decode(bytes);
        // Legacy streams carry a narrow empty string that has no terminator word.
        if units == 0 && record.len == WORD {
            return Ok(String::new());
        }
        usize::try_from(units)
            .ok()
            .and_then(|units| decode_string_body(bytes, units))
            .ok_or_else(|| ParcelError::NonPortableReinterpretation {
                looking_for: RecordKind::String.label(),
                position: self.position,
                found: record.found(),
            })
    }

    fn claim_string(&mut self) -> Result<Option<String>, ParcelError> {
        let position = self.position;
        let units = i32::decode(self.store.read(position, WORD));
        if units == NULL_LENGTH {
            let record = Record::new(
                RecordKind::NullMarker,
                self.store.read(position, WORD),
                WORD,
                display_string(None),
            );
            self.claim(record);
            self.advance(WORD);
            return Ok(None);
        }
        let Ok(units) = usize::try_from(units) else {
            return Err(self.untyped_mismatch(RecordKind::String, WORD));
        };
        let footprint = string_footprint(units);
        self.check_claimable(footprint, RecordKind::String)?;
        let bytes = self.store.read(position, footprint);
        let Some(value) = decode_string_body(bytes, units) else {
            return Err(self.untyped_mismatch(RecordKind::String, footprint));
        };
        let record = Record::new(RecordKind::String, bytes, footprint, value.clone());
        self.claim(record);
        self.advance(footprint);
        Ok(Some(value))
    }

    /// Read a byte array; `None` for the null sentinel.
    pub fn create_byte_array(&mut self) -> Result<Option<Vec<u8>>, ParcelError> {
        let prefix = self.read_int()?;
        let Some(len) = array_len(prefix)? else {
            return Ok(None);
        };
        if len == 0 {
            return Ok(Some(Vec::new()));
        }
        self.read_byte_content(prefix, len).map(Some)
    }

    /// Read a byte array into `dest`, whose length must match the prefix.
    pub fn read_byte_array(&mut self, dest: &mut [u8]) -> Result<(), ParcelError> {
        let prefix = self.read_int()?;
        match array_len(prefix)? {
            Some(len) if len == dest.len() => {}
            _ => {
                return Err(ParcelError::MalformedArrayLength {
                    prefix,
                    actual: dest.len(),
                })
            }
        }
        if dest.is_empty() {
            return Ok(());
        }
        let content = self.read_byte_content(prefix, dest.len())?;
        dest.copy_from_slice(&content);
        Ok(())
    }

    fn read_byte_content(&mut self, prefix: i32, len: usize) -> Result<Vec<u8>, ParcelError> {
        if self.past_end()? {
            return Err(ParcelError::MalformedArrayLength { prefix, actual: 0 });
        }
        require_aligned("read position", self.position)?;
        if let Some(content) = self.read_byte_run(prefix, len)? {
            return Ok(content);
        }
        let footprint = align4(len);
        if self.take_zeroes(footprint) {
            return Ok(vec![0; len]);
        }
        let position = self.position;
        match self.locate(RecordKind::ByteArray)? {
            Located::Record(id) => {
                let record = self.ledger.record(id);
                if record.payload_len != len {
                    return Err(ParcelError::MalformedArrayLength {
                        prefix,
                        actual: record.payload_len,
                    });
                }
                let record_len = record.len;
                let content = self.store.read(position, len).to_vec();
                self.advance(record_len);
                Ok(content)
            }
            Located::Untyped => {
                self.check_claimable(footprint, RecordKind::ByteArray)?;
                let content = self.store.read(position, len).to_vec();
                let record = Record::new(
                    RecordKind::ByteArray,
                    &content,
                    footprint,
                    display_bytes(&content),
                );
                self.claim(record);
                self.advance(footprint);
                Ok(content)
            }
        }
    }

    /// Content written as `len` separate bytes, one word each, the way legacy
    /// streams carry byte arrays. `None` unless a byte record sits under the
    /// cursor.
    fn read_byte_run(&mut self, prefix: i32, len: usize) -> Result<Option<Vec<u8>>, ParcelError> {
        let is_byte = |ledger: &Ledger, offset: usize| {
            ledger
                .lookup(offset)
                .is_some_and(|(_, record)| record.kind == RecordKind::Byte)
        };
        let mut offset = self.position;
        if !is_byte(&self.ledger, offset) {
            return Ok(None);
        }
        let mut content = Vec::with_capacity(len.min(self.data_avail() / WORD));
        while content.len() < len && is_byte(&self.ledger, offset) {
            content.extend_from_slice(self.store.read(offset, 1));
            offset += WORD;
        }
        if content.len() != len {
            return Err(ParcelError::MalformedArrayLength {
                prefix,
                actual: content.len(),
            });
        }
        self.position = offset;
        Ok(Some(content))
    }

    /// Read a strong reference; `None` for a null reference or zero data.
    pub fn read_strong_reference(&mut self) -> Result<Option<StrongRef>, ParcelError> {
        if self.past_end()? {
            return Ok(None);
        }
        require_aligned("read position", self.position)?;
        if self.take_zeroes(REFERENCE_FOOTPRINT) {
            return Ok(None);
        }
        match self.locate(RecordKind::Binder)? {
            Located::Record(id) => {
                let record = self.ledger.record(id);
                let (len, value) = (record.len, record.reference.clone());
                self.advance(len);
                Ok(value)
            }
            Located::Untyped => Err(self.untyped_mismatch(RecordKind::Binder, REFERENCE_FOOTPRINT)),
        }
    }

    fn create_array<T: Scalar>(&mut self) -> Result<Option<Vec<T>>, ParcelError> {
        let prefix = self.read_int()?;
        let Some(len) = array_len(prefix)? else {
            return Ok(None);
        };
        let room = self.data_avail() / T::WIDTH;
        if len > room {
            return Err(ParcelError::MalformedArrayLength {
                prefix,
                actual: room,
            });
        }
        (0..len).map(|_| self.read_scalar()).collect::<Result<_, _>>().map(Some)
    }

    fn read_array_into<T: Scalar>(&mut self, dest: &mut [T]) -> Result<(), ParcelError> {
        let prefix = self.read_int()?;
        match array_len(prefix)? {
            Some(len) if len == dest.len() => {}
            _ => {
                return Err(ParcelError::MalformedArrayLength {
                    prefix,
                    actual: dest.len(),
                })
            }
        }
        for slot in dest.iter_mut() {
            *slot = self.read_scalar()?;
        }
        Ok(())
    }

    /// Read an int array; `None` for the null sentinel.
    pub fn create_int_array(&mut self) -> Result<Option<Vec<i32>>, ParcelError> {
        self.create_array()
    }

    /// Read a long array.
    pub fn create_long_array(&mut self) -> Result<Option<Vec<i64>>, ParcelError> {
        self.create_array()
    }

    /// Read a float array.
    pub fn create_float_array(&mut self) -> Result<Option<Vec<f32>>, ParcelError> {
        self.create_array()
    }

    /// Read a double array.
    pub fn create_double_array(&mut self) -> Result<Option<Vec<f64>>, ParcelError> {
        self.create_array()
    }

    /// Read an int array into `dest`, whose length must match the prefix.
    pub fn read_int_array(&mut self, dest: &mut [i32]) -> Result<(), ParcelError> {
        self.read_array_into(dest)
    }

    /// Read a long array into `dest`.
    pub fn read_long_array(&mut self, dest: &mut [i64]) -> Result<(), ParcelError> {
        self.read_array_into(dest)
    }

    /// Read a float array into `dest`.
    pub fn read_float_array(&mut self, dest: &mut [f32]) -> Result<(), ParcelError> {
        self.read_array_into(dest)
    }

    /// Read a double array into `dest`.
    pub fn read_double_array(&mut self, dest: &mut [f64]) -> Result<(), ParcelError> {
        self.read_array_into(dest)
    }

    /// Read a string array; `None` for the null sentinel.
    pub fn create_string_array(&mut self) -> Result<Option<Vec<Option<String>>>, ParcelError> {
        let prefix = self.read_int()?;
        let Some(len) = array_len(prefix)? else {
            return Ok(None);
        };
        let room = self.data_avail() / WORD;
        if len > room {
            return Err(ParcelError::MalformedArrayLength {
                prefix,
                actual: room,
            });
        }
        (0..len).map(|_| self.read_string()).collect::<Result<_, _>>().map(Some)
    }
}

pub(crate) fn require_aligned(what: &'static str, offset: usize) -> Result<(), ParcelError> {
    if offset % WORD == 0 {
        Ok(())
    } else {
        Err(ParcelError::Misaligned { what, offset })
    }
}

/// End of `[offset, offset + length)`, if it fits within [`MAX_DATA_SIZE`].
pub(crate) fn require_storable(offset: usize, length: usize) -> Result<usize, ParcelError> {
    offset
        .checked_add(length)
        .filter(|end| *end <= MAX_DATA_SIZE)
        .ok_or(ParcelError::RangeOutOfBounds {
            offset,
            length,
            available: MAX_DATA_SIZE,
        })
}

/// Interpret an array length prefix: `None` for null, an error for other negatives.
fn array_len(prefix: i32) -> Result<Option<usize>, ParcelError> {
    if prefix == NULL_LENGTH {
        return Ok(None);
    }
    usize::try_from(prefix)
        .map(Some)
        .map_err(|_| ParcelError::MalformedArrayLength { prefix, actual: 0 })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn write_extends_size_and_position() {
        let mut parcel = Parcel::new();
        parcel.write_int(7).unwrap();
        parcel.write_string(Some("hi")).unwrap();
        assert_eq!(parcel.data_size(), 16);
        assert_eq!(parcel.data_position(), 16);
        assert!(parcel.data_capacity() >= parcel.data_size());
    }

    #[test]
    fn write_past_end_leaves_uninitialized_gap() {
        let mut parcel = Parcel::new();
        parcel.set_data_position(8);
        parcel.write_int(1).unwrap();
        assert_eq!(parcel.data_size(), 12);
        parcel.set_data_position(0);
        assert_eq!(
            parcel.read_int(),
            Err(ParcelError::UninitializedRead { position: 0 })
        );
    }

    #[test]
    fn unaligned_cursor_is_rejected() {
        let mut parcel = Parcel::new();
        parcel.write_long(1).unwrap();
        parcel.set_data_position(2);
        assert_eq!(
            parcel.read_int(),
            Err(ParcelError::Misaligned {
                what: "read position",
                offset: 2
            })
        );
        assert!(parcel.write_int(1).is_err());
        assert!(parcel.set_data_size(6).is_err());
    }

    #[test]
    fn array_len_interprets_sentinels() {
        assert_eq!(array_len(-1), Ok(None));
        assert_eq!(array_len(3), Ok(Some(3)));
        assert!(array_len(-2).is_err());
    }
}
