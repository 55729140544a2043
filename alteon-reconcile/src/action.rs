use std::fmt::Display;

use crate::object::{DesiredObject, Fields, ObjectKey};

/// What has to happen to one collection entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOp {
    Create(Fields),
    /// Only the fields that differ.
    Update(Fields),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryChange {
    pub collection: String,
    pub index: String,
    pub op: EntryOp,
}

/// The difference between an existing object and its desired state.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatch {
    pub key: ObjectKey,
    /// Parent fields that differ, desired values.
    pub fields: Fields,
    /// Entry changes, grouped by collection, in desired order; deletes last.
    pub entries: Vec<EntryChange>,
}

impl ObjectPatch {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.entries.is_empty()
    }
}

/// The outcome of resolving a mode against desired and actual state.
#[derive(Debug, Clone)]
pub enum Action {
    None,
    Create(DesiredObject),
    Update(ObjectPatch),
    Delete(ObjectKey),
    /// Delete the existing object, then create it from the full desired state.
    Recreate(DesiredObject),
    /// Additive update: never contains a delete.
    Append(ObjectPatch),
}

impl Action {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::None)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::None => "none",
            Action::Create(_) => "create",
            Action::Update(_) => "update",
            Action::Delete(_) => "delete",
            Action::Recreate(_) => "recreate",
            Action::Append(_) => "append",
        };
        f.write_str(s)
    }
}
