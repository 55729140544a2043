//! Classifies what a reconciliation mode requires, given desired and actual
//! state. Pure: no remote calls happen here.

use crate::action::{Action, EntryChange, EntryOp, ObjectPatch};
use crate::catalog::FieldSpec;
use crate::error::ReconcileError;
use crate::mode::Mode;
use crate::object::{ActualObject, DesiredObject, Fields};

pub fn resolve(
    mode: Mode,
    desired: &DesiredObject,
    actual: Option<&ActualObject>,
) -> Result<Action, ReconcileError> {
    let action = match (mode, actual) {
        (Mode::Read, _) => Action::None,
        (Mode::Absent, Some(_)) => Action::Delete(desired.key().clone()),
        (Mode::Absent, None) => Action::None,
        (Mode::Present | Mode::Overwrite, None) => Action::Create(desired.clone()),
        (Mode::Overwrite, Some(_)) => Action::Recreate(desired.clone()),
        (Mode::Present, Some(actual)) => {
            let patch = diff(desired, actual, false)?;
            if patch.is_empty() {
                Action::None
            } else {
                Action::Update(patch)
            }
        }
        (Mode::Append, None) => {
            return Err(ReconcileError::AppendOnAbsentParent {
                object: desired.key().to_string(),
            })
        }
        (Mode::Append, Some(actual)) => {
            let patch = diff(desired, actual, true)?;
            if patch.is_empty() {
                Action::None
            } else {
                Action::Append(patch)
            }
        }
    };
    tracing::debug!(%mode, %action, object = %desired.key(), "resolved");
    Ok(action)
}

/// Desired fields whose value differs from the actual one.
fn changed_fields(desired: &Fields, actual: &Fields) -> Fields {
    desired
        .iter()
        .filter(|(name, value)| actual.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn check_create_only(
    desired: &DesiredObject,
    specs: &[FieldSpec],
    changed: &Fields,
) -> Result<(), ReconcileError> {
    match specs
        .iter()
        .find(|spec| spec.create_only && changed.contains_key(spec.name))
    {
        Some(spec) => Err(ReconcileError::ImmutableField {
            object: desired.key().to_string(),
            field: spec.name.to_string(),
        }),
        None => Ok(()),
    }
}

/// Compute the patch that brings `actual` to `desired`.
///
/// Only collections named in `desired` are looked at. When `additive` is
/// false, their entries missing from `desired` are deleted.
fn diff(
    desired: &DesiredObject,
    actual: &ActualObject,
    additive: bool,
) -> Result<ObjectPatch, ReconcileError> {
    let catalog = desired.catalog();
    let fields = changed_fields(desired.fields(), &actual.fields);
    check_create_only(desired, catalog.fields, &fields)?;

    let mut entries = Vec::new();
    for (collection, desired_entries) in desired.collections() {
        let spec_fields = catalog
            .collection(collection)
            .map(|c| c.fields)
            .unwrap_or_default();
        let actual_entries = actual.entries(collection);

        for entry in desired_entries {
            let op = match actual_entries.iter().find(|a| a.index == entry.index) {
                None => EntryOp::Create(entry.fields.clone()),
                Some(existing) => {
                    let changed = changed_fields(&entry.fields, &existing.fields);
                    if changed.is_empty() {
                        continue;
                    }
                    check_create_only(desired, spec_fields, &changed)?;
                    EntryOp::Update(changed)
                }
            };
            entries.push(EntryChange {
                collection: collection.clone(),
                index: entry.index.clone(),
                op,
            });
        }

        if !additive {
            for existing in actual_entries {
                if !desired_entries.iter().any(|d| d.index == existing.index) {
                    entries.push(EntryChange {
                        collection: collection.clone(),
                        index: existing.index.clone(),
                        op: EntryOp::Delete,
                    });
                }
            }
        }
    }

    Ok(ObjectPatch {
        key: desired.key().clone(),
        fields,
        entries,
    })
}
