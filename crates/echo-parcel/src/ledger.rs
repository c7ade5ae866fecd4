// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record ledger: which record owns each word of the buffer.
//!
//! Every word in `[0, size)` carries one [`Slot`]. A record owns its head
//! word and the body words that follow it; overwriting any of those words
//! hands them to the new record and leaves the old one *interrupted*. Reads
//! and marshal validation walk the slots to detect that.
//!
//! Record storage is a slab: a record whose last word is overwritten or
//! truncated is recycled for the next write.

use std::collections::HashMap;

use serde::Serialize;

use crate::codec::RecordKind;
use crate::error::{FoundValue, ParcelError, UNINITIALIZED_OR_END};
use crate::reference::StrongRef;
use crate::store::WORD;

/// Label used when a whole-buffer pass (marshal) is looking for any value.
pub(crate) const ANY_VALUE: &str = "any value";

pub(crate) type RecordId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Never written, or grown into by `set_data_size`.
    Uninit,
    /// Untyped all-zero word from an unmarshal.
    Zero,
    /// Untyped non-zero word from an unmarshal.
    Opaque,
    Head(RecordId),
    Body(RecordId),
}

impl Slot {
    const fn owner(self) -> Option<RecordId> {
        match self {
            Self::Head(id) | Self::Body(id) => Some(id),
            Self::Uninit | Self::Zero | Self::Opaque => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub(crate) kind: RecordKind,
    /// Footprint in bytes, padding included.
    pub(crate) len: usize,
    /// Unpadded payload length.
    pub(crate) payload_len: usize,
    pub(crate) display: String,
    /// Encoded bytes are all zero; the record may be zero-cast.
    pub(crate) all_zero: bool,
    pub(crate) reference: Option<StrongRef>,
    live: usize,
}

impl Record {
    pub(crate) fn new(kind: RecordKind, payload: &[u8], len: usize, display: String) -> Self {
        Self {
            kind,
            len,
            payload_len: payload.len(),
            display,
            all_zero: payload.iter().all(|b| *b == 0),
            reference: None,
            live: 0,
        }
    }

    pub(crate) fn with_reference(mut self, reference: Option<StrongRef>) -> Self {
        self.reference = reference;
        self
    }

    /// Exclude the record from zero-casting even though its bytes are zero.
    pub(crate) fn strict_footprint(mut self) -> Self {
        self.all_zero = false;
        self
    }

    pub(crate) fn found(&self) -> FoundValue {
        FoundValue {
            kind: self.kind.label(),
            value: self.display.clone(),
            len: self.len,
        }
    }

    fn detached(&self) -> Self {
        Self {
            live: 0,
            ..self.clone()
        }
    }
}

/// What occupies a run of words, as reported by [`crate::Parcel::layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// A complete record.
    Record(RecordKind),
    /// The surviving words of an interrupted or truncated record.
    Fragment(RecordKind),
    /// Untyped zero words.
    Zero,
    /// Untyped non-zero words.
    Opaque,
    /// Words that were never written.
    Uninitialized,
}

/// A contiguous run of words with uniform ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    /// Byte offset of the run.
    pub offset: usize,
    /// Length of the run in bytes.
    pub len: usize,
    /// What occupies the run.
    pub kind: SpanKind,
    /// Display value for records and fragments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    slots: Vec<Slot>,
    records: Vec<Record>,
    free: Vec<RecordId>,
}

impl Ledger {
    /// Ledger for freshly ingested bytes: every word untyped.
    pub(crate) fn untyped(bytes: &[u8]) -> Self {
        let slots = bytes
            .chunks_exact(WORD)
            .map(|word| {
                if word.iter().all(|b| *b == 0) {
                    Slot::Zero
                } else {
                    Slot::Opaque
                }
            })
            .collect();
        Self {
            slots,
            ..Self::default()
        }
    }

    fn size(&self) -> usize {
        self.slots.len() * WORD
    }

    pub(crate) fn slot_at(&self, offset: usize) -> Slot {
        self.slots
            .get(offset / WORD)
            .copied()
            .unwrap_or(Slot::Uninit)
    }

    pub(crate) fn record(&self, id: RecordId) -> &Record {
        &self.records[id]
    }

    /// The record whose head word is exactly `offset`.
    pub(crate) fn lookup(&self, offset: usize) -> Option<(RecordId, &Record)> {
        match self.slot_at(offset) {
            Slot::Head(id) => Some((id, &self.records[id])),
            _ => None,
        }
    }

    /// Follow `size`: truncated words release their owners, new words are uninitialized.
    pub(crate) fn resize(&mut self, size: usize) {
        let words = size / WORD;
        while self.slots.len() > words {
            if let Some(slot) = self.slots.pop() {
                self.release(slot);
            }
        }
        self.slots.resize(words, Slot::Uninit);
    }

    /// Claim `[offset, offset + record.len)` for `record`.
    pub(crate) fn install(&mut self, offset: usize, record: Record) -> RecordId {
        let words = record.len / WORD;
        let first = offset / WORD;
        if self.slots.len() < first + words {
            self.slots.resize(first + words, Slot::Uninit);
        }
        let id = self.allocate(record);
        for i in 0..words {
            let slot = if i == 0 { Slot::Head(id) } else { Slot::Body(id) };
            self.set(first + i, slot);
        }
        id
    }

    /// Copy the slots of `other[offset, offset + len)` to `dest`, giving every
    /// record that appears in the range a fresh entry here. Records cut by the
    /// range boundaries keep their full length and so stay detectably
    /// incomplete.
    pub(crate) fn copy_from(&mut self, other: &Self, offset: usize, len: usize, dest: usize) {
        let words = len / WORD;
        let first = dest / WORD;
        if self.slots.len() < first + words {
            self.slots.resize(first + words, Slot::Uninit);
        }
        let mut rehomed: HashMap<RecordId, RecordId> = HashMap::new();
        for i in 0..words {
            let slot = match other.slot_at(offset + i * WORD) {
                Slot::Head(id) => Slot::Head(self.rehome(&mut rehomed, other, id)),
                Slot::Body(id) => Slot::Body(self.rehome(&mut rehomed, other, id)),
                untyped => untyped,
            };
            self.set(first + i, slot);
        }
    }

    fn rehome(
        &mut self,
        rehomed: &mut HashMap<RecordId, RecordId>,
        other: &Self,
        id: RecordId,
    ) -> RecordId {
        if let Some(local) = rehomed.get(&id) {
            return *local;
        }
        let local = self.allocate(other.records[id].detached());
        rehomed.insert(id, local);
        local
    }

    fn allocate(&mut self, record: Record) -> RecordId {
        let record = record.detached();
        if let Some(id) = self.free.pop() {
            self.records[id] = record;
            id
        } else {
            self.records.push(record);
            self.records.len() - 1
        }
    }

    fn set(&mut self, word: usize, slot: Slot) {
        if let Some(id) = slot.owner() {
            self.records[id].live += 1;
        }
        let old = std::mem::replace(&mut self.slots[word], slot);
        self.release(old);
    }

    fn release(&mut self, slot: Slot) {
        let Some(id) = slot.owner() else {
            return;
        };
        let record = &mut self.records[id];
        record.live = record.live.saturating_sub(1);
        if record.live == 0 {
            record.reference = None;
            record.display.clear();
            self.free.push(id);
        }
    }

    /// First word in `[position, position + len)` that `id` does not own.
    fn first_foreign_word(&self, id: RecordId, position: usize) -> Option<usize> {
        let end = position + self.records[id].len;
        (position..end)
            .step_by(WORD)
            .find(|offset| self.slot_at(*offset).owner() != Some(id))
    }

    fn describe(&self, slot: Slot) -> String {
        match slot {
            Slot::Uninit => UNINITIALIZED_OR_END.to_owned(),
            Slot::Zero => "0".to_owned(),
            Slot::Opaque => RecordKind::Object.label().to_owned(),
            Slot::Head(id) | Slot::Body(id) => self.records[id].display.clone(),
        }
    }

    /// Fail unless record `id`, read starting at `position`, owns every word
    /// of its footprint from there.
    pub(crate) fn check_intact(
        &self,
        id: RecordId,
        position: usize,
        looking_for: &'static str,
    ) -> Result<(), ParcelError> {
        match self.first_foreign_word(id, position) {
            None => Ok(()),
            Some(at) => Err(ParcelError::InterruptedRecord {
                looking_for,
                position,
                found: self.records[id].found(),
                interrupted_by: self.describe(self.slot_at(at)),
                at,
            }),
        }
    }

    /// Fail unless every word `found` would occupy from `position` is untyped.
    pub(crate) fn check_untyped(
        &self,
        position: usize,
        found: &FoundValue,
        looking_for: &'static str,
    ) -> Result<(), ParcelError> {
        let end = position + found.len;
        let foreign = (position..end)
            .step_by(WORD)
            .find(|offset| !matches!(self.slot_at(*offset), Slot::Zero | Slot::Opaque));
        match foreign {
            None => Ok(()),
            Some(at) => Err(ParcelError::InterruptedRecord {
                looking_for,
                position,
                found: found.clone(),
                interrupted_by: self.describe(self.slot_at(at)),
                at,
            }),
        }
    }

    /// Every word of `[start, start + width)` exists and holds zero bytes
    /// belonging to an untyped zero span or an all-zero record.
    pub(crate) fn zero_castable(&self, start: usize, width: usize) -> bool {
        let end = start + width;
        end <= self.size()
            && (start..end)
                .step_by(WORD)
                .all(|offset| match self.slot_at(offset) {
                    Slot::Zero => true,
                    Slot::Head(id) | Slot::Body(id) => self.records[id].all_zero,
                    Slot::Uninit | Slot::Opaque => false,
                })
    }

    /// Walk `[start, end)` the way a receiver would and report the first
    /// word that could not be read back faithfully.
    pub(crate) fn validate_range(&self, start: usize, end: usize) -> Result<(), ParcelError> {
        let mut offset = start;
        while offset < end {
            match self.slot_at(offset) {
                Slot::Uninit => return Err(ParcelError::UninitializedRead { position: offset }),
                Slot::Zero | Slot::Opaque => offset += WORD,
                Slot::Head(id) | Slot::Body(id) => {
                    self.check_intact(id, offset, ANY_VALUE)?;
                    let record = &self.records[id];
                    if record.kind == RecordKind::Binder && record.reference.is_some() {
                        return Err(ParcelError::UnmarshallableReference { position: offset });
                    }
                    offset += record.len;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn layout(&self) -> Vec<Span> {
        let size = self.size();
        let mut spans = Vec::new();
        let mut offset = 0;
        while offset < size {
            let start = offset;
            let intact = self
                .lookup(offset)
                .filter(|(id, _)| self.first_foreign_word(*id, offset).is_none());
            if let Some((_, record)) = intact {
                offset += record.len;
                spans.push(Span {
                    offset: start,
                    len: record.len,
                    kind: SpanKind::Record(record.kind),
                    value: Some(record.display.clone()),
                });
                continue;
            }
            let span = match self.slot_at(offset) {
                Slot::Head(id) | Slot::Body(id) => {
                    let record = &self.records[id];
                    offset += WORD;
                    while offset < size && self.slot_at(offset) == Slot::Body(id) {
                        offset += WORD;
                    }
                    Span {
                        offset: start,
                        len: offset - start,
                        kind: SpanKind::Fragment(record.kind),
                        value: Some(record.display.clone()),
                    }
                }
                untyped => {
                    while offset < size && self.slot_at(offset) == untyped {
                        offset += WORD;
                    }
                    let kind = match untyped {
                        Slot::Zero => SpanKind::Zero,
                        Slot::Opaque => SpanKind::Opaque,
                        _ => SpanKind::Uninitialized,
                    };
                    Span {
                        offset: start,
                        len: offset - start,
                        kind,
                        value: None,
                    }
                }
            };
            spans.push(span);
        }
        spans
    }

    #[cfg(test)]
    fn live_records(&self) -> usize {
        self.records.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;

    fn int(value: i32) -> Record {
        Record::new(RecordKind::Int, &value.to_le_bytes(), 4, value.to_string())
    }

    fn long(value: i64) -> Record {
        Record::new(RecordKind::Long, &value.to_le_bytes(), 8, value.to_string())
    }

    #[test]
    fn overwrite_interrupts_and_reports_first_foreign_word() {
        let mut ledger = Ledger::default();
        let first = ledger.install(0, long(111));
        ledger.install(8, long(222));
        assert!(ledger.check_intact(first, 0, "long").is_ok());

        let Err(err) = ledger.check_intact(first, 4, "int") else {
            panic!("mid-record read must fail");
        };
        assert_eq!(
            err.to_string(),
            "looking for int at position 4, found long [111] taking 8 bytes, but [222] interrupts it at position 8"
        );
    }

    #[test]
    fn fully_overwritten_records_are_recycled() {
        let mut ledger = Ledger::default();
        ledger.install(0, long(1));
        ledger.install(0, int(2));
        assert_eq!(ledger.live_records(), 2);
        ledger.install(4, int(3));
        assert_eq!(ledger.live_records(), 2);
        ledger.resize(0);
        assert_eq!(ledger.live_records(), 0);
    }

    #[test]
    fn truncation_leaves_a_fragment_that_fails_validation() {
        let mut ledger = Ledger::default();
        ledger.install(0, long(5));
        ledger.resize(4);
        assert_eq!(
            ledger.validate_range(0, 4),
            Err(ParcelError::InterruptedRecord {
                looking_for: ANY_VALUE,
                position: 0,
                found: long(5).found(),
                interrupted_by: UNINITIALIZED_OR_END.to_owned(),
                at: 4,
            })
        );
        assert_eq!(ledger.layout()[0].kind, SpanKind::Fragment(RecordKind::Long));
    }

    #[test]
    fn untyped_words_split_into_zero_and_opaque() {
        let ledger = Ledger::untyped(&[0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let kinds: Vec<_> = ledger.layout().iter().map(|s| (s.kind, s.len)).collect();
        assert_eq!(
            kinds,
            vec![(SpanKind::Zero, 4), (SpanKind::Opaque, 4), (SpanKind::Zero, 8)]
        );
        assert!(ledger.zero_castable(8, 8));
        assert!(!ledger.zero_castable(0, 8));
        assert!(!ledger.zero_castable(8, 12));
    }

    #[test]
    fn copied_records_get_fresh_entries() {
        let mut source = Ledger::default();
        source.install(0, int(7));
        source.install(4, long(9));

        let mut dest = Ledger::default();
        dest.install(0, int(1));
        dest.copy_from(&source, 4, 4, 4);
        let layout = dest.layout();
        assert_eq!(layout[0].kind, SpanKind::Record(RecordKind::Int));
        assert_eq!(layout[1].kind, SpanKind::Fragment(RecordKind::Long));
        assert_eq!(source.layout()[1].kind, SpanKind::Record(RecordKind::Long));
    }
}
