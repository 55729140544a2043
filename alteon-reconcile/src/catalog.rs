//! Static capability descriptors: which fields an object type has, whether
//! they can be written, and how their values compare.

use serde::Serialize;
use serde_json::Value;

/// Whether a field may be sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    Mutable,
    /// Computed by the device; never part of a create or update payload.
    ReadOnly,
}

/// The semantic type values of a field are normalized to before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Integer,
    /// A boolean that callers and the device spell as `yes`/`no`.
    Flag,
    Choice {
        values: &'static [&'static str],
        /// Values the device may report but that cannot be configured.
        #[serde(skip_serializing_if = "is_empty")]
        read_only_values: &'static [&'static str],
    },
}

impl FieldType {
    /// Normalize a parameter or device value to its canonical JSON form.
    pub fn normalize(&self, value: &Value) -> Result<Value, String> {
        match self {
            FieldType::Text => match value {
                Value::String(s) => Ok(Value::String(s.clone())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                other => Err(format!("expected a string, got {}", other)),
            },
            FieldType::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| format!("expected an integer, got {:?}", s)),
                other => Err(format!("expected an integer, got {}", other)),
            },
            FieldType::Flag => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "yes" | "true" | "enabled" => Ok(Value::Bool(true)),
                    "no" | "false" | "disabled" => Ok(Value::Bool(false)),
                    _ => Err(format!("expected yes or no, got {:?}", s)),
                },
                other => Err(format!("expected yes or no, got {}", other)),
            },
            FieldType::Choice {
                values,
                read_only_values,
            } => {
                let s = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    other => return Err(format!("expected a string, got {}", other)),
                };
                if values.contains(&s.as_str()) || read_only_values.contains(&s.as_str()) {
                    Ok(Value::String(s))
                } else {
                    Err(format!(
                        "expected one of {}, got {:?}",
                        values.join(", "),
                        s
                    ))
                }
            }
        }
    }

    /// Whether a normalized value may be sent to the device.
    pub fn is_writable(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Choice { read_only_values, .. }, Value::String(s)) => {
                !read_only_values.contains(&s.as_str())
            }
            _ => true,
        }
    }

    /// Render a normalized value in parameter format.
    pub fn render(&self, value: &Value) -> Value {
        match (self, value) {
            (FieldType::Flag, Value::Bool(true)) => Value::String("yes".to_string()),
            (FieldType::Flag, Value::Bool(false)) => Value::String("no".to_string()),
            _ => value.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub access: Access,
    #[serde(rename = "type")]
    pub type_: FieldType,
    /// Can only be chosen when the object is created.
    #[serde(skip_serializing_if = "is_false")]
    pub create_only: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_empty(values: &&'static [&'static str]) -> bool {
    values.is_empty()
}

impl FieldSpec {
    pub const fn mutable(name: &'static str, type_: FieldType) -> Self {
        FieldSpec {
            name,
            access: Access::Mutable,
            type_,
            create_only: false,
        }
    }

    pub const fn read_only(name: &'static str, type_: FieldType) -> Self {
        FieldSpec {
            name,
            access: Access::ReadOnly,
            type_,
            create_only: false,
        }
    }

    pub const fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }

    pub fn is_mutable(&self) -> bool {
        self.access == Access::Mutable
    }
}

/// A repeated sub-object, keyed by `index` within its parent.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub index: &'static str,
    pub fields: &'static [FieldSpec],
}

impl CollectionSpec {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Everything the engine needs to know about one object type.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ObjectCatalog {
    pub object_type: &'static str,
    /// Fields that together form the primary key, outermost first.
    pub keys: &'static [&'static str],
    pub fields: &'static [FieldSpec],
    pub collections: &'static [CollectionSpec],
}

impl ObjectCatalog {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.keys.contains(&name)
    }
}
