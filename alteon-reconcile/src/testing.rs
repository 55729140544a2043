//! Fixtures shared by the unit tests: a content class catalog and an
//! in-memory device that records every call.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::json;

use crate::catalog::{CollectionSpec, FieldSpec, FieldType, ObjectCatalog};
use crate::configurator::{EntryRef, ObjectConfigurator};
use crate::error::{DeviceError, Operation};
use crate::object::{ActualEntry, ActualObject, Fields, ObjectKey};
use crate::session::DeviceSession;

pub static CONTENT_CLASS: ObjectCatalog = ObjectCatalog {
    object_type: "l7_content_class",
    keys: &["content_class_id"],
    fields: &[
        FieldSpec::mutable("name", FieldType::Text),
        FieldSpec::mutable(
            "content_class_type",
            FieldType::Choice {
                values: &["http", "http2", "ssl"],
                read_only_values: &[],
            },
        )
        .create_only(),
        FieldSpec::mutable("logical_expression", FieldType::Text),
        FieldSpec::mutable("enabled", FieldType::Flag),
        FieldSpec::read_only("host_name", FieldType::Flag),
    ],
    collections: &[CollectionSpec {
        name: "host_names",
        index: "host_name_id",
        fields: &[
            FieldSpec::mutable("host_name", FieldType::Text),
            FieldSpec::mutable(
                "match_type",
                FieldType::Choice {
                    values: &["sufx", "prefx", "equal", "include", "regex"],
                    read_only_values: &["unsupported"],
                },
            ),
            FieldSpec::mutable("data_class_id", FieldType::Text),
        ],
    }],
};

pub fn cc3_key() -> ObjectKey {
    ObjectKey::new([("content_class_id", "3")])
}

/// Content class 3 as the device reports it: http2, named, no host names.
pub fn actual_cc3() -> ActualObject {
    let mut actual = ActualObject::new(cc3_key());
    actual.fields.insert("name".to_string(), json!("cc3"));
    actual
        .fields
        .insert("content_class_type".to_string(), json!("http2"));
    actual.derived.insert("host_name".to_string(), json!(false));
    actual
        .collections
        .insert("host_names".to_string(), Vec::new());
    actual
}

#[derive(Debug, Clone, Copy)]
pub enum Fail {
    Reject,
    Unreachable,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub objects: BTreeMap<ObjectKey, ActualObject>,
    /// Objects as of the last commit.
    pub committed: BTreeMap<ObjectKey, ActualObject>,
    pub pending: bool,
    pub commits: usize,
    pub rollbacks: usize,
    /// Every call, as `operation key`.
    pub calls: Vec<String>,
    /// Payloads of create and update calls, parent and entries alike.
    pub payloads: Vec<Fields>,
    pub failures: BTreeMap<String, Fail>,
}

impl MockState {
    fn call(&mut self, operation: Operation, target: impl std::fmt::Display) -> Result<(), DeviceError> {
        self.calls.push(format!("{} {}", operation, target));
        match self.failures.get(&operation.to_string()) {
            None => Ok(()),
            Some(Fail::Reject) => Err(DeviceError::rejected(anyhow::anyhow!("{} refused", operation))),
            Some(Fail::Unreachable) => Err(DeviceError::unreachable(anyhow::anyhow!("connection reset"))),
        }
    }

    fn object_mut(&mut self, key: &ObjectKey) -> Result<&mut ActualObject, DeviceError> {
        self.objects
            .get_mut(key)
            .ok_or_else(|| DeviceError::rejected(anyhow::anyhow!("no such object {}", key)))
    }

    fn mutated(&mut self) {
        self.pending = true;
    }

    /// Calls that change the device.
    pub fn mutations(&self) -> Vec<&str> {
        self.calls
            .iter()
            .map(String::as_str)
            .filter(|c| !c.starts_with("read ") && !c.starts_with("pending") && !c.starts_with("commit") && !c.starts_with("rollback"))
            .collect()
    }
}

/// A device shared between a configurator and a session.
#[derive(Clone, Default)]
pub struct MockDevice(Rc<RefCell<MockState>>);

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device where `actual` exists and is committed.
    pub fn with(actual: ActualObject) -> Self {
        let device = Self::new();
        {
            let mut state = device.state_mut();
            state.objects.insert(actual.key.clone(), actual.clone());
            state.committed.insert(actual.key.clone(), actual);
        }
        device
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.0.borrow_mut()
    }

    pub fn fail(&self, operation: Operation, fail: Fail) {
        self.state_mut().failures.insert(operation.to_string(), fail);
    }

    pub fn configurator(&self) -> MockConfigurator {
        MockConfigurator(self.clone())
    }

    pub fn session(&self) -> MockSession {
        MockSession(self.clone())
    }
}

pub struct MockConfigurator(MockDevice);

impl ObjectConfigurator for MockConfigurator {
    fn catalog(&self) -> &'static ObjectCatalog {
        &CONTENT_CLASS
    }

    fn read(&mut self, key: &ObjectKey) -> Result<Option<ActualObject>, DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::Read, key)?;
        Ok(state.objects.get(key).cloned().map(|mut object| {
            let has_hosts = !object.entries("host_names").is_empty();
            object.derived.insert("host_name".to_string(), json!(has_hosts));
            object.collections.entry("host_names".to_string()).or_default();
            object
        }))
    }

    fn create(&mut self, key: &ObjectKey, fields: &Fields) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::Create, key)?;
        if state.objects.contains_key(key) {
            return Err(DeviceError::rejected(anyhow::anyhow!("{} exists", key)));
        }
        let mut object = ActualObject::new(key.clone());
        object.fields = fields.clone();
        state.objects.insert(key.clone(), object);
        state.payloads.push(fields.clone());
        state.mutated();
        Ok(())
    }

    fn update(&mut self, key: &ObjectKey, fields: &Fields) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::Update, key)?;
        state.object_mut(key)?.fields.extend(fields.clone());
        state.payloads.push(fields.clone());
        state.mutated();
        Ok(())
    }

    fn delete(&mut self, key: &ObjectKey) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::Delete, key)?;
        state.object_mut(key)?;
        state.objects.remove(key);
        state.mutated();
        Ok(())
    }

    fn create_entry(&mut self, entry: &EntryRef, fields: &Fields) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::CreateEntry, entry)?;
        state
            .object_mut(entry.key)?
            .collections
            .entry(entry.collection.to_string())
            .or_default()
            .push(ActualEntry {
                index: entry.index.to_string(),
                fields: fields.clone(),
                derived: Fields::new(),
            });
        state.payloads.push(fields.clone());
        state.mutated();
        Ok(())
    }

    fn update_entry(&mut self, entry: &EntryRef, fields: &Fields) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::UpdateEntry, entry)?;
        let existing = state
            .object_mut(entry.key)?
            .collections
            .get_mut(entry.collection)
            .and_then(|entries| entries.iter_mut().find(|e| e.index == entry.index))
            .ok_or_else(|| DeviceError::rejected(anyhow::anyhow!("no such entry {}", entry)))?;
        existing.fields.extend(fields.clone());
        state.payloads.push(fields.clone());
        state.mutated();
        Ok(())
    }

    fn delete_entry(&mut self, entry: &EntryRef) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::DeleteEntry, entry)?;
        if let Some(entries) = state.object_mut(entry.key)?.collections.get_mut(entry.collection) {
            entries.retain(|e| e.index != entry.index);
        }
        state.mutated();
        Ok(())
    }
}

pub struct MockSession(MockDevice);

impl DeviceSession for MockSession {
    fn has_pending_changes(&mut self) -> Result<bool, DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::PendingCheck, "session")?;
        Ok(state.pending)
    }

    fn commit(&mut self) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::Commit, "session")?;
        state.committed = state.objects.clone();
        state.pending = false;
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DeviceError> {
        let mut state = self.0.state_mut();
        state.call(Operation::Rollback, "session")?;
        state.objects = state.committed.clone();
        state.pending = false;
        state.rollbacks += 1;
        Ok(())
    }
}
