// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Raw byte storage with separate size and capacity accounting.
//!
//! The backing vector is always exactly `capacity` bytes long and every byte
//! at or above `size` is zero.

/// Width of one platform word. Sizes, offsets and footprints are multiples of it.
pub const WORD: usize = 4;

/// Largest data size or capacity a store accepts: `i32::MAX` rounded down to a word.
pub const MAX_DATA_SIZE: usize = 0x7fff_fffc;

/// Round `n` up to the next multiple of [`WORD`].
pub const fn align4(n: usize) -> usize {
    n.saturating_add(WORD - 1) & !(WORD - 1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ByteStore {
    bytes: Vec<u8>,
    size: usize,
}

impl ByteStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store holding exactly `data`, with capacity equal to its length.
    pub(crate) fn from_exact(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec(),
            size: data.len(),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    pub(crate) fn read(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }

    /// Grow geometrically so that `end` bytes fit.
    pub(crate) fn ensure_capacity(&mut self, end: usize) {
        if end > self.capacity() {
            let grown = align4(end.saturating_mul(3) / 2).max(align4(end));
            self.bytes.resize(grown, 0);
        }
    }

    /// Grow to exactly `align4(capacity)`; never shrinks.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        let target = align4(capacity);
        if target > self.capacity() {
            self.bytes.resize(target, 0);
        }
    }

    /// Set the logical size. `size` must be word aligned.
    pub(crate) fn set_size(&mut self, size: usize) {
        if size < self.size {
            self.bytes[size..self.size].fill(0);
        } else {
            self.set_capacity(size);
        }
        self.size = size;
    }

    /// Write `payload` at `offset`, zero-padding up to `footprint` bytes.
    /// Extends `size` when the write runs past it. Callers check that
    /// `offset + footprint` stays within [`MAX_DATA_SIZE`].
    pub(crate) fn write(&mut self, offset: usize, payload: &[u8], footprint: usize) {
        let end = offset + footprint;
        self.ensure_capacity(end);
        self.bytes[offset..offset + payload.len()].copy_from_slice(payload);
        self.bytes[offset + payload.len()..end].fill(0);
        if end > self.size {
            self.size = end;
        }
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }
}
