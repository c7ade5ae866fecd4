// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Whole-buffer transfers: marshal, unmarshal, append, interface tokens.

use tracing::{debug, instrument, warn};

use crate::config::WireFormat;
use crate::error::ParcelError;
use crate::ledger::Ledger;
use crate::legacy;
use crate::parcel::{require_aligned, require_storable, Parcel};
use crate::store::ByteStore;

impl Parcel {
    /// Flatten the data into bytes.
    ///
    /// The whole buffer is validated first, exactly as a receiver reading it
    /// back value by value would: interrupted records, uninitialized words
    /// and non-null strong references all fail. A null reference is plain
    /// zero words and marshals like any other zero value. The cursor is not
    /// moved.
    #[instrument(level = "debug", skip_all, fields(size = self.data_size()))]
    pub fn marshal(&self) -> Result<Vec<u8>, ParcelError> {
        self.ledger.validate_range(0, self.store.size())?;
        debug!("marshalled parcel");
        Ok(self.store.data().to_vec())
    }

    /// Replace the contents with `data[offset, offset + length)`, using the
    /// configured [`WireFormat`] (native unless configured otherwise).
    pub fn unmarshal(
        &mut self,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<(), ParcelError> {
        self.unmarshal_as(self.config.wire_format, data, offset, length)
    }

    /// Replace the contents with `data[offset, offset + length)` decoded as
    /// `format`.
    ///
    /// Native data gets exactly `length` bytes of capacity; its words start
    /// untyped and become typed records on first read. [`WireFormat::Detect`]
    /// decodes a legacy stream only when one with at least one entry parses
    /// cleanly, and reads everything else as native. Afterwards the cursor
    /// sits at the end and the rewind guard is disabled. On error the parcel
    /// is left unchanged.
    #[instrument(
        level = "debug",
        skip_all,
        fields(format = ?format, offset = offset, length = length)
    )]
    pub fn unmarshal_as(
        &mut self,
        format: WireFormat,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<(), ParcelError> {
        let bytes = offset
            .checked_add(length)
            .and_then(|end| data.get(offset..end))
            .ok_or(ParcelError::RangeOutOfBounds {
                offset,
                length,
                available: data.len(),
            })?;

        if bytes.is_empty() {
            self.store.clear();
            self.ledger = Ledger::default();
            self.position = 0;
            debug!("unmarshalled empty parcel");
            return Ok(());
        }

        let max_entries = self.config.max_legacy_entries;
        let entries = match format {
            WireFormat::Detect => legacy::detect(bytes, max_entries),
            WireFormat::Native => None,
            WireFormat::Legacy => Some(legacy::decode_stream(bytes, max_entries)?),
        };
        if let Some(entries) = entries {
            let mut fresh = Parcel::with_config(self.config.clone());
            legacy::transcode(&entries, &mut fresh)?;
            self.store = fresh.store;
            self.ledger = fresh.ledger;
            warn!(
                entries = entries.len(),
                size = self.store.size(),
                "transcoded legacy stream into native layout"
            );
        } else {
            require_aligned("unmarshal length", bytes.len())?;
            self.store = ByteStore::from_exact(bytes);
            self.ledger = Ledger::untyped(bytes);
            debug!(size = bytes.len(), "unmarshalled native parcel");
        }
        self.position = self.store.size();
        self.ever_repositioned = true;
        Ok(())
    }

    /// Append `other[offset, offset + length)` at the cursor, which must sit
    /// at the end of the data.
    ///
    /// Bytes and record ownership are copied; records cut by the range stay
    /// detectably incomplete. Strong references keep their identity. `other`
    /// is not modified.
    #[instrument(level = "debug", skip_all, fields(offset = offset, length = length))]
    pub fn append_from(
        &mut self,
        other: &Parcel,
        offset: usize,
        length: usize,
    ) -> Result<(), ParcelError> {
        let available = other.data_size();
        if offset.checked_add(length).map_or(true, |end| end > available) {
            return Err(ParcelError::RangeOutOfBounds {
                offset,
                length,
                available,
            });
        }
        require_aligned("append offset", offset)?;
        require_aligned("append length", length)?;
        let size = self.store.size();
        if self.position != size {
            return Err(ParcelError::AppendNotAtEnd {
                position: self.position,
                size,
            });
        }
        if length == 0 {
            return Ok(());
        }

        let dest = self.position;
        let end = require_storable(dest, length)?;
        self.store
            .write(dest, other.store.read(offset, length), length);
        self.ledger.resize(self.store.size());
        self.ledger.copy_from(&other.ledger, offset, length, dest);
        self.position = end;
        debug!(dest, size = self.store.size(), "appended parcel data");
        Ok(())
    }

    /// Write the interface descriptor a receiver will enforce.
    pub fn write_interface_token(&mut self, descriptor: &str) -> Result<(), ParcelError> {
        self.write_string(Some(descriptor))
    }

    /// Read an interface token and fail unless it equals `descriptor`.
    pub fn enforce_interface(&mut self, descriptor: &str) -> Result<(), ParcelError> {
        let actual = self.read_string()?;
        if actual.as_deref() == Some(descriptor) {
            Ok(())
        } else {
            Err(ParcelError::TokenMismatch {
                expected: descriptor.to_owned(),
                actual,
            })
        }
    }
}
