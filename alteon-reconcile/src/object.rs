//! Desired and actual configuration objects.
//!
//! Desired state can only be built from parameters through its catalog, and
//! it keeps mutable fields only: read-only values given by the caller are
//! dropped on the way in, so they can never end up in a write payload. Actual
//! state, as decoded by a configurator, keeps device-computed values apart in
//! `derived`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use serde_json::{Map, Value};

use crate::catalog::{CollectionSpec, FieldSpec, ObjectCatalog};
use crate::error::ValidationError;

/// Normalized field values by field name.
pub type Fields = BTreeMap<String, Value>;

/// Primary key of an object: one value per catalog key field, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(Vec<(String, String)>);

impl ObjectKey {
    pub fn new<K: Into<String>, V: Into<String>>(parts: impl IntoIterator<Item = (K, V)>) -> Self {
        ObjectKey(
            parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.0
    }

    /// Key values in key order, as a device index path.
    pub fn index_path(&self) -> Vec<String> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Parse only the key fields out of a parameter object.
    pub fn from_parameters(
        catalog: &ObjectCatalog,
        parameters: &Map<String, Value>,
    ) -> Result<Self, ValidationError> {
        let mut parts = Vec::with_capacity(catalog.keys.len());
        for key in catalog.keys {
            let value = match parameters.get(*key) {
                None | Some(Value::Null) => {
                    return Err(ValidationError::MissingParameter {
                        field: key.to_string(),
                    })
                }
                Some(v) => normalize_index(key, v)?,
            };
            parts.push((key.to_string(), value));
        }
        Ok(ObjectKey(parts))
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        Ok(())
    }
}

/// Keys and sub-indices compare as strings.
fn normalize_index(field: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a non-empty index, got {}", other),
        }),
    }
}

/// One entry of a desired sub-object collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredEntry {
    pub index: String,
    pub fields: Fields,
}

/// The caller's description of an object. Unset fields are left unspecified.
#[derive(Debug, Clone)]
pub struct DesiredObject {
    catalog: &'static ObjectCatalog,
    key: ObjectKey,
    fields: Fields,
    collections: BTreeMap<String, Vec<DesiredEntry>>,
}

impl DesiredObject {
    /// Validate `parameters` against `catalog` and build the desired state.
    ///
    /// `null` values count as unset. Read-only fields are accepted and
    /// dropped; read-only choice values are rejected.
    pub fn from_parameters(
        catalog: &'static ObjectCatalog,
        parameters: &Value,
    ) -> Result<Self, ValidationError> {
        let parameters = parameters
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject {
                object_type: catalog.object_type.to_string(),
            })?;
        let key = ObjectKey::from_parameters(catalog, parameters)?;

        let mut fields = Fields::new();
        let mut collections = BTreeMap::new();
        for (name, value) in parameters {
            if catalog.is_key(name) || value.is_null() {
                continue;
            }
            if let Some(spec) = catalog.field(name) {
                if let Some(v) = desired_value(spec, name, value)? {
                    fields.insert(name.clone(), v);
                }
            } else if let Some(spec) = catalog.collection(name) {
                collections.insert(name.clone(), parse_collection(catalog, spec, value)?);
            } else {
                return Err(ValidationError::UnknownField {
                    object_type: catalog.object_type.to_string(),
                    field: name.clone(),
                });
            }
        }

        Ok(DesiredObject {
            catalog,
            key,
            fields,
            collections,
        })
    }

    pub fn catalog(&self) -> &'static ObjectCatalog {
        self.catalog
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Mutable fields the caller specified.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Collections the caller specified, each in the caller's order.
    pub fn collections(&self) -> &BTreeMap<String, Vec<DesiredEntry>> {
        &self.collections
    }
}

fn desired_value(
    spec: &FieldSpec,
    name: &str,
    value: &Value,
) -> Result<Option<Value>, ValidationError> {
    let normalized = spec
        .type_
        .normalize(value)
        .map_err(|reason| ValidationError::InvalidValue {
            field: name.to_string(),
            reason,
        })?;
    if !spec.is_mutable() {
        tracing::debug!(field = name, "ignoring read-only parameter");
        return Ok(None);
    }
    if !spec.type_.is_writable(&normalized) {
        return Err(ValidationError::ReadOnlyValue {
            field: name.to_string(),
            value: normalized.as_str().unwrap_or_default().to_string(),
        });
    }
    Ok(Some(normalized))
}

fn parse_collection(
    catalog: &ObjectCatalog,
    spec: &CollectionSpec,
    value: &Value,
) -> Result<Vec<DesiredEntry>, ValidationError> {
    let name = spec.name;
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::InvalidValue {
            field: name.to_string(),
            reason: "expected a list of entries".to_string(),
        })?;

    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let item = item.as_object().ok_or_else(|| ValidationError::InvalidValue {
            field: name.to_string(),
            reason: format!("expected an object entry, got {}", item),
        })?;
        let index = match item.get(spec.index) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingParameter {
                    field: format!("{}.{}", name, spec.index),
                })
            }
            Some(v) => normalize_index(spec.index, v)?,
        };
        if !seen.insert(index.clone()) {
            return Err(ValidationError::DuplicateIndex {
                collection: name.to_string(),
                index: spec.index.to_string(),
                value: index,
            });
        }

        let mut fields = Fields::new();
        for (field, v) in item {
            if field == spec.index || v.is_null() {
                continue;
            }
            let field_spec = spec.field(field).ok_or_else(|| ValidationError::UnknownField {
                object_type: format!("{}.{}", catalog.object_type, name),
                field: field.clone(),
            })?;
            if let Some(v) = desired_value(field_spec, field, v)? {
                fields.insert(field.clone(), v);
            }
        }
        entries.push(DesiredEntry { index, fields });
    }
    Ok(entries)
}

/// One entry of a collection as read from the device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActualEntry {
    pub index: String,
    pub fields: Fields,
    pub derived: Fields,
}

/// An object as read from the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ActualObject {
    pub key: ObjectKey,
    /// Mutable fields, comparable with desired fields.
    pub fields: Fields,
    /// Read-only values computed by the device.
    pub derived: Fields,
    /// Every collection of the type, in device order; empty when the device has no entries.
    pub collections: BTreeMap<String, Vec<ActualEntry>>,
}

impl ActualObject {
    pub fn new(key: ObjectKey) -> Self {
        ActualObject {
            key,
            fields: Fields::new(),
            derived: Fields::new(),
            collections: BTreeMap::new(),
        }
    }

    pub fn entries(&self, collection: &str) -> &[ActualEntry] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Translate back into the caller's parameter format.
    pub fn to_parameters(&self, catalog: &ObjectCatalog) -> Value {
        let mut out = Map::new();
        for (k, v) in self.key.parts() {
            out.insert(k.clone(), Value::String(v.clone()));
        }
        render_fields(&mut out, catalog.fields, [&self.fields, &self.derived]);
        for spec in catalog.collections {
            let entries = self
                .entries(spec.name)
                .iter()
                .map(|entry| {
                    let mut e = Map::new();
                    e.insert(spec.index.to_string(), Value::String(entry.index.clone()));
                    render_fields(&mut e, spec.fields, [&entry.fields, &entry.derived]);
                    Value::Object(e)
                })
                .collect();
            out.insert(spec.name.to_string(), Value::Array(entries));
        }
        Value::Object(out)
    }
}

fn render_fields(out: &mut Map<String, Value>, specs: &[FieldSpec], sources: [&Fields; 2]) {
    for spec in specs {
        if let Some(v) = sources.iter().find_map(|s| s.get(spec.name)) {
            out.insert(spec.name.to_string(), spec.type_.render(v));
        }
    }
}
