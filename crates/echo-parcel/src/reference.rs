// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Strong object references carried by identity.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Footprint of a flattened reference.
pub const REFERENCE_FOOTPRINT: usize = 20;

/// Type tag of a flattened local object reference.
const LOCAL_OBJECT_TAG: u32 = 0x7362_2a85;

/// Cloneable handle to an in-process object.
///
/// Equality is identity: two handles are equal only when they point at the
/// same allocation. The flattened form carries an in-process handle that has
/// no meaning in another address space, so buffers holding non-null
/// references refuse to marshal.
#[derive(Clone)]
pub struct StrongRef {
    inner: Arc<dyn Any + Send + Sync>,
}

impl StrongRef {
    /// Wrap `value` in a new reference.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Wrap an existing shared allocation.
    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self { inner }
    }

    /// Borrow the referenced object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// In-process handle derived from the allocation address.
    pub fn handle(&self) -> u64 {
        Arc::as_ptr(&self.inner).cast::<()>() as usize as u64
    }
}

impl PartialEq for StrongRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for StrongRef {}

impl fmt::Debug for StrongRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrongRef@{:x}", self.handle())
    }
}

/// Flatten a reference into its fixed 20-byte record. Null is all zeros,
/// so it marshals and reads back as null from zero data.
pub(crate) fn flatten(reference: Option<&StrongRef>) -> Vec<u8> {
    let Some(reference) = reference else {
        return vec![0; REFERENCE_FOOTPRINT];
    };
    let handle = reference.handle();
    let mut out = Vec::with_capacity(REFERENCE_FOOTPRINT);
    out.extend_from_slice(&LOCAL_OBJECT_TAG.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&handle.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

pub(crate) fn display(reference: Option<&StrongRef>) -> String {
    reference.map_or_else(|| "null".to_owned(), |r| format!("{r:?}"))
}
