//! A configurator that maps one object type onto rows of device tables.
//!
//! Objects are rows addressed by their key values. Collection entries are
//! rows of a child table, addressed by the parent key followed by the entry
//! index. Read-only indicators report whether a table has rows under the
//! object's key.

use std::collections::BTreeSet;

use alteon_reconcile::{
    ActualEntry, ActualObject, DeviceError, EntryRef, FieldSpec, FieldType, Fields, ObjectCatalog,
    ObjectConfigurator, ObjectKey,
};
use anyhow::anyhow;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Column values of one row, by column name.
pub type Row = Map<String, Value>;

/// Whether a put creates a row or changes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Put {
    /// Fails if the row exists.
    Insert,
    /// Fails if the row does not exist. Columns not given are kept.
    Merge,
}

/// Row access to the device's configuration tables.
pub trait TableStore {
    fn fetch(&mut self, table: &str, index: &[String]) -> Result<Option<Row>, DeviceError>;

    /// Rows whose index starts with `prefix`, in table order.
    fn list(&mut self, table: &str, prefix: &[String])
        -> Result<Vec<(Vec<String>, Row)>, DeviceError>;

    fn put(&mut self, table: &str, index: &[String], row: Row, mode: Put)
        -> Result<(), DeviceError>;

    /// Fails if the row does not exist.
    fn remove(&mut self, table: &str, index: &[String]) -> Result<(), DeviceError>;
}

/// Maps a field to a table column.
#[derive(Debug)]
pub struct Column {
    pub field: &'static str,
    pub column: &'static str,
}

/// The table holding the entries of a collection.
#[derive(Debug)]
pub struct ChildTable {
    pub collection: &'static str,
    pub table: &'static str,
    pub columns: &'static [Column],
}

/// A read-only flag that is set when `table` has rows under the object's key.
#[derive(Debug)]
pub struct Indicator {
    pub field: &'static str,
    pub table: &'static str,
}

#[derive(Debug)]
pub struct TableLayout {
    pub catalog: &'static ObjectCatalog,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub children: &'static [ChildTable],
    pub indicators: &'static [Indicator],
    /// Table that must hold a row for the key without its last part before
    /// an object can be created.
    pub parent: Option<&'static str>,
}

impl TableLayout {
    fn child(&self, collection: &str) -> Result<&ChildTable, DeviceError> {
        self.children
            .iter()
            .find(|c| c.collection == collection)
            .ok_or_else(|| {
                DeviceError::rejected(anyhow!(
                    "{} has no collection {}",
                    self.catalog.object_type,
                    collection
                ))
            })
    }

    /// Tables whose rows under an object's key go away with the object.
    fn dependent_tables(&self) -> BTreeSet<&'static str> {
        self.children
            .iter()
            .map(|c| c.table)
            .chain(self.indicators.iter().map(|i| i.table))
            .collect()
    }
}

/// Encode a normalized value as a table cell.
pub fn encode(spec: &FieldSpec, value: &Value) -> Result<Value, DeviceError> {
    let invalid = || {
        DeviceError::rejected(anyhow!(
            "cannot encode {} for column of {}",
            value,
            spec.name
        ))
    };
    match (&spec.type_, value) {
        (FieldType::Flag, Value::Bool(b)) => Ok(Value::from(if *b { 1 } else { 2 })),
        (
            FieldType::Choice {
                values,
                read_only_values,
            },
            Value::String(s),
        ) => values
            .iter()
            .chain(read_only_values.iter())
            .position(|v| *v == s.as_str())
            .map(|i| Value::from(i + 1))
            .ok_or_else(invalid),
        (FieldType::Text, Value::String(_)) | (FieldType::Integer, Value::Number(_)) => {
            Ok(value.clone())
        }
        _ => Err(invalid()),
    }
}

/// Decode a table cell into a normalized value.
pub fn decode(spec: &FieldSpec, cell: &Value) -> Result<Value, DeviceError> {
    let invalid = || {
        DeviceError::rejected(anyhow!(
            "unexpected value {} in column of {}",
            cell,
            spec.name
        ))
    };
    match &spec.type_ {
        FieldType::Flag => match cell.as_u64() {
            Some(1) => Ok(Value::Bool(true)),
            Some(2) => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        FieldType::Choice {
            values,
            read_only_values,
        } => cell
            .as_u64()
            .and_then(|code| usize::try_from(code).ok())
            .and_then(|code| code.checked_sub(1))
            .and_then(|i| values.iter().chain(read_only_values.iter()).nth(i))
            .map(|v| Value::String(v.to_string()))
            .ok_or_else(invalid),
        FieldType::Text | FieldType::Integer => spec.type_.normalize(cell).map_err(|_| invalid()),
    }
}

fn encode_row(
    specs: &[FieldSpec],
    columns: &[Column],
    fields: &Fields,
) -> Result<Row, DeviceError> {
    let mut row = Row::new();
    for (name, value) in fields {
        let spec = specs.iter().find(|s| s.name == name.as_str());
        let column = columns.iter().find(|c| c.field == name.as_str());
        match (spec, column) {
            (Some(spec), Some(column)) if spec.is_mutable() => {
                row.insert(column.column.to_string(), encode(spec, value)?);
            }
            _ => {
                return Err(DeviceError::rejected(anyhow!(
                    "field {} cannot be written",
                    name
                )))
            }
        }
    }
    Ok(row)
}

/// Split a row into mutable and read-only fields.
fn decode_row(
    specs: &[FieldSpec],
    columns: &[Column],
    row: &Row,
) -> Result<(Fields, Fields), DeviceError> {
    let mut fields = Fields::new();
    let mut derived = Fields::new();
    for column in columns {
        let Some(cell) = row.get(column.column) else {
            continue;
        };
        let Some(spec) = specs.iter().find(|s| s.name == column.field) else {
            warn!(column = column.column, "column maps to an unknown field");
            continue;
        };
        let value = decode(spec, cell)?;
        if spec.is_mutable() {
            fields.insert(spec.name.to_string(), value);
        } else {
            derived.insert(spec.name.to_string(), value);
        }
    }
    Ok((fields, derived))
}

pub struct TableConfigurator<S> {
    layout: &'static TableLayout,
    store: S,
}

impl<S: TableStore> TableConfigurator<S> {
    pub fn new(layout: &'static TableLayout, store: S) -> Self {
        TableConfigurator { layout, store }
    }

    fn entry_index(entry: &EntryRef) -> Vec<String> {
        let mut index = entry.key.index_path();
        index.push(entry.index.to_string());
        index
    }

    fn entry_row(&self, entry: &EntryRef, fields: &Fields) -> Result<(&'static str, Row), DeviceError> {
        let child = self.layout.child(entry.collection)?;
        let spec = self
            .layout
            .catalog
            .collection(entry.collection)
            .ok_or_else(|| DeviceError::rejected(anyhow!("unknown collection {}", entry.collection)))?;
        Ok((child.table, encode_row(spec.fields, child.columns, fields)?))
    }
}

impl<S: TableStore> ObjectConfigurator for TableConfigurator<S> {
    fn catalog(&self) -> &'static ObjectCatalog {
        self.layout.catalog
    }

    fn read(&mut self, key: &ObjectKey) -> Result<Option<ActualObject>, DeviceError> {
        let layout = self.layout;
        let index = key.index_path();
        let Some(row) = self.store.fetch(layout.table, &index)? else {
            return Ok(None);
        };

        let mut object = ActualObject::new(key.clone());
        (object.fields, object.derived) = decode_row(layout.catalog.fields, layout.columns, &row)?;

        for indicator in layout.indicators {
            let present = !self.store.list(indicator.table, &index)?.is_empty();
            object
                .derived
                .insert(indicator.field.to_string(), Value::Bool(present));
        }

        for spec in layout.catalog.collections {
            let child = layout.child(spec.name)?;
            let mut entries = Vec::new();
            for (entry_index, row) in self.store.list(child.table, &index)? {
                let Some(last) = entry_index.last() else {
                    continue;
                };
                let (fields, derived) = decode_row(spec.fields, child.columns, &row)?;
                entries.push(ActualEntry {
                    index: last.clone(),
                    fields,
                    derived,
                });
            }
            object.collections.insert(spec.name.to_string(), entries);
        }
        Ok(Some(object))
    }

    fn create(&mut self, key: &ObjectKey, fields: &Fields) -> Result<(), DeviceError> {
        let layout = self.layout;
        let index = key.index_path();
        if let Some(parent) = layout.parent {
            let parent_index = &index[..index.len().saturating_sub(1)];
            if self.store.fetch(parent, parent_index)?.is_none() {
                return Err(DeviceError::rejected(anyhow!(
                    "{} {} does not exist",
                    parent,
                    parent_index.join(".")
                )));
            }
        }
        let row = encode_row(layout.catalog.fields, layout.columns, fields)?;
        debug!(table = layout.table, ?row, "insert");
        self.store.put(layout.table, &index, row, Put::Insert)
    }

    fn update(&mut self, key: &ObjectKey, fields: &Fields) -> Result<(), DeviceError> {
        let layout = self.layout;
        let row = encode_row(layout.catalog.fields, layout.columns, fields)?;
        debug!(table = layout.table, ?row, "merge");
        self.store.put(layout.table, &key.index_path(), row, Put::Merge)
    }

    fn delete(&mut self, key: &ObjectKey) -> Result<(), DeviceError> {
        let layout = self.layout;
        let index = key.index_path();
        for table in layout.dependent_tables() {
            for (child_index, _) in self.store.list(table, &index)? {
                self.store.remove(table, &child_index)?;
            }
        }
        self.store.remove(layout.table, &index)
    }

    fn create_entry(&mut self, entry: &EntryRef, fields: &Fields) -> Result<(), DeviceError> {
        let (table, row) = self.entry_row(entry, fields)?;
        self.store.put(table, &Self::entry_index(entry), row, Put::Insert)
    }

    fn update_entry(&mut self, entry: &EntryRef, fields: &Fields) -> Result<(), DeviceError> {
        let (table, row) = self.entry_row(entry, fields)?;
        self.store.put(table, &Self::entry_index(entry), row, Put::Merge)
    }

    fn delete_entry(&mut self, entry: &EntryRef) -> Result<(), DeviceError> {
        let child = self.layout.child(entry.collection)?;
        self.store.remove(child.table, &Self::entry_index(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_class::{CONTENT_CLASS, CONTENT_CLASS_LAYOUT, HOST_NAME_LAYOUT};
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m.into_iter().collect(),
            _ => panic!("expected an object"),
        }
    }

    fn cc3() -> ObjectKey {
        ObjectKey::new([("content_class_id", "3")])
    }

    #[test]
    fn test_encode_decode_cells() {
        let match_type = CONTENT_CLASS.collections[0].field("match_type").unwrap();
        assert_eq!(encode(match_type, &json!("equal")).unwrap(), json!(3));
        assert_eq!(decode(match_type, &json!(6)).unwrap(), json!("unsupported"));
        assert!(decode(match_type, &json!(0)).is_err());
        assert!(decode(match_type, &json!(7)).is_err());

        let indicator = CONTENT_CLASS.field("cookie").unwrap();
        assert_eq!(decode(indicator, &json!(1)).unwrap(), json!(true));
        assert_eq!(decode(indicator, &json!(2)).unwrap(), json!(false));
    }

    #[test]
    fn test_create_and_read() {
        let store = MemoryStore::default();
        let mut cc = TableConfigurator::new(&CONTENT_CLASS_LAYOUT, store.clone());
        cc.create(
            &cc3(),
            &fields(json!({"name": "cc3", "content_class_type": "http2"})),
        )
        .unwrap();
        assert_eq!(
            store.row("l7ContentClass", &["3"]),
            Some(json!({"Name": "cc3", "Type": 2}))
        );

        let actual = cc.read(&cc3()).unwrap().unwrap();
        assert_eq!(actual.fields["content_class_type"], json!("http2"));
        assert_eq!(actual.derived["host_name"], json!(false));
        assert_eq!(actual.derived["xml_tag"], json!(false));
        assert!(actual.entries("host_names").is_empty());
        assert!(actual.collections.contains_key("host_names"));
    }

    #[test]
    fn test_read_missing() {
        let mut cc = TableConfigurator::new(&CONTENT_CLASS_LAYOUT, MemoryStore::default());
        assert!(cc.read(&cc3()).unwrap().is_none());
    }

    #[test]
    fn test_entries_and_indicator() {
        let store = MemoryStore::default();
        let mut cc = TableConfigurator::new(&CONTENT_CLASS_LAYOUT, store.clone());
        cc.create(&cc3(), &Fields::new()).unwrap();
        let key = cc3();
        let entry = EntryRef {
            key: &key,
            collection: "host_names",
            index: "h1",
        };
        cc.create_entry(&entry, &fields(json!({"host_name": "a", "match_type": "prefx"})))
            .unwrap();
        cc.update_entry(&entry, &fields(json!({"host_name": "b"}))).unwrap();

        let actual = cc.read(&key).unwrap().unwrap();
        assert_eq!(actual.derived["host_name"], json!(true));
        let entries = actual.entries("host_names");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, "h1");
        assert_eq!(entries[0].fields["host_name"], json!("b"));
        assert_eq!(entries[0].fields["match_type"], json!("prefx"));

        cc.delete_entry(&entry).unwrap();
        assert!(cc.delete_entry(&entry).is_err());
    }

    #[test]
    fn test_delete_cascades() {
        let store = MemoryStore::default();
        let mut cc = TableConfigurator::new(&CONTENT_CLASS_LAYOUT, store.clone());
        cc.create(&cc3(), &Fields::new()).unwrap();
        let key = cc3();
        let entry = EntryRef {
            key: &key,
            collection: "host_names",
            index: "h1",
        };
        cc.create_entry(&entry, &Fields::new()).unwrap();
        cc.delete(&key).unwrap();
        assert!(store.row("l7ContentClass", &["3"]).is_none());
        assert!(store.row("l7ContentClassHostName", &["3", "h1"]).is_none());
    }

    #[test]
    fn test_standalone_host_name_requires_class() {
        let store = MemoryStore::default();
        let mut hosts = TableConfigurator::new(&HOST_NAME_LAYOUT, store.clone());
        let key = ObjectKey::new([("content_class_id", "3"), ("host_name_id", "h1")]);
        assert!(hosts.create(&key, &Fields::new()).is_err());

        let mut cc = TableConfigurator::new(&CONTENT_CLASS_LAYOUT, store.clone());
        cc.create(&cc3(), &Fields::new()).unwrap();
        hosts
            .create(&key, &fields(json!({"host_name": "a", "match_type": "regex"})))
            .unwrap();

        // both object types address the same rows
        let actual = cc.read(&cc3()).unwrap().unwrap();
        assert_eq!(actual.entries("host_names")[0].fields["match_type"], json!("regex"));
    }

    #[test]
    fn test_read_only_fields_cannot_be_written() {
        let mut cc = TableConfigurator::new(&CONTENT_CLASS_LAYOUT, MemoryStore::default());
        let err = cc
            .create(&cc3(), &fields(json!({"host_name": true})))
            .unwrap_err();
        assert!(matches!(err, DeviceError::Rejected(_)));
    }
}
