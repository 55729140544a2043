//! Declarative reconciliation of configuration objects on an Alteon device.
//!
//! An invocation names one object, a [`Mode`] and the object's desired state.
//! The engine reads the actual object through an [`ObjectConfigurator`],
//! [`resolve`]s the [`Action`] the mode requires, applies it and decides
//! through the [`DeviceSession`] whether to commit or roll back.

pub mod action;
pub mod applier;
pub mod catalog;
pub mod configurator;
pub mod controller;
pub mod error;
pub mod mode;
pub mod object;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod testing;

pub use action::Action;
pub use catalog::{Access, CollectionSpec, FieldSpec, FieldType, ObjectCatalog};
pub use configurator::{EntryRef, ObjectConfigurator};
pub use controller::{execute, Invocation, Outcome};
pub use error::{DeviceError, Failure, Operation, ReconcileError, ValidationError};
pub use mode::Mode;
pub use object::{ActualEntry, ActualObject, DesiredObject, Fields, ObjectKey};
pub use resolver::resolve;
pub use session::{CommitPolicy, DeviceSession, Transaction};
