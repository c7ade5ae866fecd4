// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Parcel error types.

use std::fmt;

use thiserror::Error;

use crate::store::WORD;

/// Label used in diagnostics when a record runs into words it does not own
/// because they were never written or lie past the end of the buffer.
pub const UNINITIALIZED_OR_END: &str = "uninitialized data or the end of the buffer";

/// Coarse classification of a [`ParcelError`], mirroring how the real
/// transport would surface the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Local programming error whose behavior on a real transport is
    /// unreliable (wrong type, missing rewind, partial overwrite).
    Misuse,
    /// Caller-identity check failed.
    Security,
    /// Foreign or corrupted structured data.
    BadStructuredData,
    /// Operation the buffer cannot perform faithfully.
    Unsupported,
}

/// Description of the record found where a read or validation pass looked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundValue {
    /// Kind label of the record (`"int"`, `"String"`, `"untyped data"`, ...).
    pub kind: &'static str,
    /// Diagnostic rendering of the value.
    pub value: String,
    /// Footprint of the record in bytes.
    pub len: usize,
}

impl fmt::Display for FoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] taking {} bytes", self.kind, self.value, self.len)
    }
}

/// Errors produced by parcel reads, writes and transfers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParcelError {
    /// Read at the end of a buffer that has only ever been written.
    #[error("did you forget to set_data_position(0) before reading the parcel?")]
    RewindGuard,

    /// The record under the cursor no longer owns all of its words.
    #[error(
        "looking for {looking_for} at position {position}, found {found}, but [{interrupted_by}] interrupts it at position {at}"
    )]
    InterruptedRecord {
        /// Type the reader asked for.
        looking_for: &'static str,
        /// Cursor position of the read.
        position: usize,
        /// The record that was found.
        found: FoundValue,
        /// Display value of whatever owns the offending word.
        interrupted_by: String,
        /// Offset of the first word the record no longer owns.
        at: usize,
    },

    /// The record under the cursor was written as an incompatible type.
    #[error(
        "looking for {looking_for} at position {position}, found {found}, and it is non-portable to reinterpret it"
    )]
    NonPortableReinterpretation {
        /// Type the reader asked for.
        looking_for: &'static str,
        /// Cursor position of the read.
        position: usize,
        /// The record that was found.
        found: FoundValue,
    },

    /// Read of a word that was never written.
    #[error("reading uninitialized data at position {position}")]
    UninitializedRead {
        /// Offset of the uninitialized word.
        position: usize,
    },

    /// An array length prefix disagrees with the data that follows it.
    #[error("array length prefix is {prefix} but real length is {actual}")]
    MalformedArrayLength {
        /// Length read from the prefix.
        prefix: i32,
        /// Length actually available.
        actual: usize,
    },

    /// Interface token did not match the expected descriptor.
    #[error("binder invocation to an incorrect interface: expected {expected:?}, found {actual:?}")]
    TokenMismatch {
        /// Descriptor the receiver enforces.
        expected: String,
        /// Descriptor found in the buffer.
        actual: Option<String>,
    },

    /// Legacy tag-length-value stream could not be parsed.
    #[error("malformed legacy stream: {reason}")]
    MalformedLegacyStream {
        /// What went wrong.
        reason: String,
    },

    /// Parcelable descriptor is unknown, empty, or names another type.
    #[error("bad parcelable: {reason}")]
    BadParcelable {
        /// What went wrong.
        reason: String,
    },

    /// Offset or size is not a whole number of words.
    #[error("{what} {offset} is not {word}-byte aligned", word = WORD)]
    Misaligned {
        /// Which quantity was misaligned.
        what: &'static str,
        /// The misaligned value.
        offset: usize,
    },

    /// A requested byte range exceeds its source.
    #[error("range offset {offset}, length {length} exceeds {available} available bytes")]
    RangeOutOfBounds {
        /// Range start.
        offset: usize,
        /// Range length.
        length: usize,
        /// Bytes available in the source.
        available: usize,
    },

    /// `append_from` was called while the cursor is not at the end.
    #[error("append_from at position {position} but data size is {size}; appending is only reliable at the end")]
    AppendNotAtEnd {
        /// Cursor position.
        position: usize,
        /// Data size.
        size: usize,
    },

    /// A strong reference cannot survive a byte round trip.
    #[error("cannot marshal strong reference at position {position}")]
    UnmarshallableReference {
        /// Offset of the reference record.
        position: usize,
    },
}

impl ParcelError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RewindGuard
            | Self::InterruptedRecord { .. }
            | Self::NonPortableReinterpretation { .. }
            | Self::UninitializedRead { .. }
            | Self::Misaligned { .. }
            | Self::RangeOutOfBounds { .. }
            | Self::AppendNotAtEnd { .. } => ErrorClass::Misuse,
            Self::TokenMismatch { .. } => ErrorClass::Security,
            Self::MalformedArrayLength { .. }
            | Self::MalformedLegacyStream { .. }
            | Self::BadParcelable { .. } => ErrorClass::BadStructuredData,
            Self::UnmarshallableReference { .. } => ErrorClass::Unsupported,
        }
    }

    pub(crate) fn legacy(reason: impl Into<String>) -> Self {
        Self::MalformedLegacyStream {
            reason: reason.into(),
        }
    }
}
