//! Executes a resolved [`Action`] through a configurator.
//!
//! Every call that reaches the device is counted on the transaction, so the
//! commit decision can tell whether this invocation changed anything.

use tracing::{debug, info};

use crate::action::{Action, EntryChange, EntryOp, ObjectPatch};
use crate::configurator::{EntryRef, ObjectConfigurator};
use crate::error::{DeviceError, Operation, ReconcileError, DELETED_NOT_RECREATED};
use crate::object::{ActualObject, DesiredObject, ObjectKey};
use crate::session::{DeviceSession, Transaction};

#[derive(Debug)]
pub struct Applied {
    pub changed: bool,
    /// The object after the action, `None` if it no longer exists.
    pub object: Option<ActualObject>,
}

/// A device call that failed, before it is classified.
struct CallFailed {
    error: DeviceError,
    operation: Operation,
    target: String,
}

impl CallFailed {
    fn classify(self) -> ReconcileError {
        ReconcileError::device(self.error, self.operation, self.target)
    }

    fn partial(self, context: &'static str) -> ReconcileError {
        ReconcileError::partial(self.error, self.operation, self.target, context)
    }
}

/// Run `action`. `actual` is the state read before resolving and is handed
/// back unchanged when there is nothing to do.
pub fn apply<C, S>(
    action: &Action,
    actual: Option<ActualObject>,
    configurator: &mut C,
    tx: &mut Transaction<'_, S>,
) -> Result<Applied, ReconcileError>
where
    C: ObjectConfigurator + ?Sized,
    S: DeviceSession + ?Sized,
{
    let key = match action {
        Action::None => {
            return Ok(Applied {
                changed: false,
                object: actual,
            })
        }
        Action::Delete(key) => {
            call(tx, Operation::Delete, key, || configurator.delete(key))
                .map_err(CallFailed::classify)?;
            return Ok(Applied {
                changed: true,
                object: None,
            });
        }
        Action::Create(desired) => {
            create(desired, configurator, tx).map_err(CallFailed::classify)?;
            desired.key()
        }
        Action::Recreate(desired) => {
            let key = desired.key();
            call(tx, Operation::Delete, key, || configurator.delete(key))
                .map_err(CallFailed::classify)?;
            create(desired, configurator, tx).map_err(|f| f.partial(DELETED_NOT_RECREATED))?;
            key
        }
        Action::Update(patch) => {
            update(patch, configurator, tx).map_err(CallFailed::classify)?;
            &patch.key
        }
        Action::Append(patch) => {
            debug_assert!(patch.entries.iter().all(|e| e.op != EntryOp::Delete));
            update(patch, configurator, tx).map_err(CallFailed::classify)?;
            &patch.key
        }
    };

    let object = configurator
        .read(key)
        .map_err(|e| ReconcileError::device(e, Operation::Read, key))?;
    Ok(Applied {
        changed: true,
        object,
    })
}

fn call<S, F>(
    tx: &mut Transaction<'_, S>,
    operation: Operation,
    target: impl std::fmt::Display,
    f: F,
) -> Result<(), CallFailed>
where
    S: DeviceSession + ?Sized,
    F: FnOnce() -> Result<(), DeviceError>,
{
    let target = target.to_string();
    info!(%operation, target = target.as_str(), "calling device");
    tx.record_mutation();
    f().map_err(|error| CallFailed {
        error,
        operation,
        target,
    })
}

fn create<C, S>(
    desired: &DesiredObject,
    configurator: &mut C,
    tx: &mut Transaction<'_, S>,
) -> Result<(), CallFailed>
where
    C: ObjectConfigurator + ?Sized,
    S: DeviceSession + ?Sized,
{
    let key = desired.key();
    debug!(fields = ?desired.fields(), "create payload");
    call(tx, Operation::Create, key, || {
        configurator.create(key, desired.fields())
    })?;
    for (collection, entries) in desired.collections() {
        for entry in entries {
            let change = EntryChange {
                collection: collection.clone(),
                index: entry.index.clone(),
                op: EntryOp::Create(entry.fields.clone()),
            };
            apply_entry(key, &change, configurator, tx)?;
        }
    }
    Ok(())
}

fn update<C, S>(
    patch: &ObjectPatch,
    configurator: &mut C,
    tx: &mut Transaction<'_, S>,
) -> Result<(), CallFailed>
where
    C: ObjectConfigurator + ?Sized,
    S: DeviceSession + ?Sized,
{
    let key = &patch.key;
    if !patch.fields.is_empty() {
        debug!(fields = ?patch.fields, "update payload");
        call(tx, Operation::Update, key, || {
            configurator.update(key, &patch.fields)
        })?;
    }
    for change in &patch.entries {
        apply_entry(key, change, configurator, tx)?;
    }
    Ok(())
}

fn apply_entry<C, S>(
    key: &ObjectKey,
    change: &EntryChange,
    configurator: &mut C,
    tx: &mut Transaction<'_, S>,
) -> Result<(), CallFailed>
where
    C: ObjectConfigurator + ?Sized,
    S: DeviceSession + ?Sized,
{
    let entry = EntryRef {
        key,
        collection: &change.collection,
        index: &change.index,
    };
    match &change.op {
        EntryOp::Create(fields) => {
            debug!(?fields, "entry create payload");
            call(tx, Operation::CreateEntry, entry, || {
                configurator.create_entry(&entry, fields)
            })
        }
        EntryOp::Update(fields) => {
            debug!(?fields, "entry update payload");
            call(tx, Operation::UpdateEntry, entry, || {
                configurator.update_entry(&entry, fields)
            })
        }
        EntryOp::Delete => call(tx, Operation::DeleteEntry, entry, || {
            configurator.delete_entry(&entry)
        }),
    }
}
