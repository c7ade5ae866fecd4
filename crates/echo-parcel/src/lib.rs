// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Type-checked binary parcel buffer.
//!
//! [`Parcel`] is a growable, position-addressed byte container that
//! reproduces the platform parcel wire format bit-for-bit. Callers write a
//! heterogeneous sequence of primitives, strings, arrays and references,
//! rewind, read them back, resize the buffer, and flatten it with
//! [`Parcel::marshal`] / [`Parcel::unmarshal`].
//!
//! # Strictness
//!
//! A real transport silently garbles data when a reader disagrees with the
//! writer. This buffer fails fast instead:
//!
//! - reading a value whose words were partially overwritten is a
//!   [`ParcelError::InterruptedRecord`],
//! - reading a value as an incompatible type is a
//!   [`ParcelError::NonPortableReinterpretation`],
//! - reading words that were never written is a
//!   [`ParcelError::UninitializedRead`],
//! - reading at the end of a write-only buffer is a
//!   [`ParcelError::RewindGuard`] (the classic missing
//!   `set_data_position(0)`).
//!
//! # Zero-cast rule
//!
//! Data whose bytes are all zero may be read as any type whose footprint
//! fits, yielding that type's default. Real code relies on this when it
//! parses a zero-filled buffer.
//!
//! ```
//! use echo_parcel::Parcel;
//!
//! let mut parcel = Parcel::new();
//! parcel.write_long(0)?;
//! parcel.set_data_position(0);
//! assert_eq!(parcel.read_int()?, 0);
//! assert_eq!(parcel.read_float()?, 0.0);
//! assert_eq!(parcel.data_position(), 8);
//! # Ok::<(), echo_parcel::ParcelError>(())
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

mod codec;
mod config;
mod error;
mod ledger;
pub mod legacy;
mod marshal;
mod parcel;
mod parcelable;
mod reference;
mod store;

pub use codec::{RecordKind, NULL_LENGTH};
pub use config::{ParcelConfig, WireFormat, DEFAULT_MAX_LEGACY_ENTRIES};
pub use error::{ErrorClass, FoundValue, ParcelError, UNINITIALIZED_OR_END};
pub use ledger::{Span, SpanKind};
pub use parcel::Parcel;
pub use parcelable::{Creator, CreatorRegistry, Parcelable};
pub use reference::{StrongRef, REFERENCE_FOOTPRINT};
pub use store::{align4, MAX_DATA_SIZE, WORD};
