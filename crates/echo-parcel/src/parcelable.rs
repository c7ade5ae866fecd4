// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Application values that flatten themselves into a parcel.
//!
//! A parcelable is written as its descriptor string followed by whatever
//! the type writes for itself. Reading resolves the descriptor through a
//! [`CreatorRegistry`] the caller builds and passes in.

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::ParcelError;
use crate::parcel::Parcel;

/// Write side of a parcelable value.
pub trait Parcelable {
    /// Descriptor written ahead of the body and used to find the creator.
    fn descriptor(&self) -> &str;

    /// Write the body.
    fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<(), ParcelError>;
}

/// Read side of a parcelable value.
pub trait Creator: Sized + 'static {
    /// Descriptor this creator answers to.
    const DESCRIPTOR: &'static str;

    /// Read the body written by [`Parcelable::write_to_parcel`].
    fn create_from_parcel(parcel: &mut Parcel) -> Result<Self, ParcelError>;
}

type CreateFn = fn(&mut Parcel) -> Result<Box<dyn Any>, ParcelError>;

fn create_boxed<T: Creator>(parcel: &mut Parcel) -> Result<Box<dyn Any>, ParcelError> {
    T::create_from_parcel(parcel).map(|value| Box::new(value) as Box<dyn Any>)
}

/// Descriptor-to-creator table.
#[derive(Debug, Clone, Default)]
pub struct CreatorRegistry {
    creators: BTreeMap<String, CreateFn>,
}

impl CreatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under [`Creator::DESCRIPTOR`], replacing any previous entry.
    pub fn register<T: Creator>(&mut self) -> &mut Self {
        self.creators
            .insert(T::DESCRIPTOR.to_owned(), create_boxed::<T>);
        self
    }

    /// Whether a creator is registered for `descriptor`.
    pub fn contains(&self, descriptor: &str) -> bool {
        self.creators.contains_key(descriptor)
    }
}

impl Parcel {
    /// Write a parcelable, or a null descriptor for `None`.
    pub fn write_parcelable(&mut self, value: Option<&dyn Parcelable>) -> Result<(), ParcelError> {
        match value {
            None => self.write_string(None),
            Some(value) => {
                self.write_string(Some(value.descriptor()))?;
                value.write_to_parcel(self)
            }
        }
    }

    /// Read a parcelable of type `T`; `None` for a null descriptor.
    pub fn read_parcelable<T: 'static>(
        &mut self,
        registry: &CreatorRegistry,
    ) -> Result<Option<T>, ParcelError> {
        let Some(descriptor) = self.read_string()? else {
            return Ok(None);
        };
        let create = registry
            .creators
            .get(&descriptor)
            .ok_or_else(|| ParcelError::BadParcelable {
                reason: format!("no creator registered for {descriptor:?}"),
            })?;
        create(self)?
            .downcast::<T>()
            .map(|value| Some(*value))
            .map_err(|_| ParcelError::BadParcelable {
                reason: format!("{descriptor:?} does not create the requested type"),
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl Parcelable for Point {
        fn descriptor(&self) -> &str {
            Self::DESCRIPTOR
        }

        fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<(), ParcelError> {
            parcel.write_int(self.x)?;
            parcel.write_int(self.y)
        }
    }

    impl Creator for Point {
        const DESCRIPTOR: &'static str = "echo.Point";

        fn create_from_parcel(parcel: &mut Parcel) -> Result<Self, ParcelError> {
            Ok(Self {
                x: parcel.read_int()?,
                y: parcel.read_int()?,
            })
        }
    }

    #[test]
    fn registered_creator_round_trips() {
        let mut registry = CreatorRegistry::new();
        registry.register::<Point>();
        assert!(registry.contains("echo.Point"));

        let mut parcel = Parcel::new();
        parcel.write_parcelable(Some(&Point { x: 3, y: -4 })).unwrap();
        parcel.write_parcelable(None).unwrap();
        parcel.set_data_position(0);
        assert_eq!(
            parcel.read_parcelable::<Point>(&registry).unwrap(),
            Some(Point { x: 3, y: -4 })
        );
        assert_eq!(parcel.read_parcelable::<Point>(&registry).unwrap(), None);
    }

    #[test]
    fn unknown_descriptor_and_wrong_type_fail() {
        let mut parcel = Parcel::new();
        parcel.write_parcelable(Some(&Point { x: 1, y: 2 })).unwrap();

        parcel.set_data_position(0);
        let err = parcel
            .read_parcelable::<Point>(&CreatorRegistry::new())
            .unwrap_err();
        assert!(matches!(err, ParcelError::BadParcelable { .. }));

        let mut registry = CreatorRegistry::new();
        registry.register::<Point>();
        parcel.set_data_position(0);
        assert!(parcel.read_parcelable::<String>(&registry).is_err());
    }
}
