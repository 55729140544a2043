use std::fmt::Display;

use crate::catalog::ObjectCatalog;
use crate::error::DeviceError;
use crate::object::{ActualObject, Fields, ObjectKey};

/// Addresses one entry of a sub-object collection.
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'a> {
    pub key: &'a ObjectKey,
    pub collection: &'a str,
    pub index: &'a str,
}

impl Display for EntryRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}[{}]", self.key, self.collection, self.index)
    }
}

/// Translates one object kind to device calls.
///
/// Field values passed in and out are normalized as described by the
/// catalog; encoding them for the device is the implementation's business.
/// Mutations go to the session's pending-changes buffer.
pub trait ObjectConfigurator {
    fn catalog(&self) -> &'static ObjectCatalog;

    /// Read the object, or `None` when it does not exist.
    fn read(&mut self, key: &ObjectKey) -> Result<Option<ActualObject>, DeviceError>;

    fn create(&mut self, key: &ObjectKey, fields: &Fields) -> Result<(), DeviceError>;

    /// Apply `fields`, leaving fields not mentioned unchanged.
    fn update(&mut self, key: &ObjectKey, fields: &Fields) -> Result<(), DeviceError>;

    /// Delete the object together with all its collection entries.
    fn delete(&mut self, key: &ObjectKey) -> Result<(), DeviceError>;

    fn create_entry(&mut self, entry: &EntryRef, fields: &Fields) -> Result<(), DeviceError> {
        let _ = fields;
        Err(no_collections(entry))
    }

    fn update_entry(&mut self, entry: &EntryRef, fields: &Fields) -> Result<(), DeviceError> {
        let _ = fields;
        Err(no_collections(entry))
    }

    fn delete_entry(&mut self, entry: &EntryRef) -> Result<(), DeviceError> {
        Err(no_collections(entry))
    }
}

fn no_collections(entry: &EntryRef) -> DeviceError {
    DeviceError::rejected(anyhow::anyhow!(
        "collection {} is not supported by this configurator",
        entry.collection
    ))
}
