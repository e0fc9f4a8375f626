//! Inbound change-data-capture records.
//!
//! These are produced by the upstream decoder; the writer only reads them.

mod value;

use serde::{Deserialize, Serialize};
pub use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Insert,
    Update,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Insert => "INSERT",
            Method::Update => "UPDATE",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    #[serde(default)]
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Field { name: name.into(), value: value.into() }
    }
}

/// A single row change captured from the source system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub table: String,

    pub method: Method,

    /// Name of the primary-key field, empty when the source table has none.
    #[serde(default)]
    pub primary_key: String,

    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ChangeRecord {
    pub fn new(table: impl Into<String>, method: Method, primary_key: impl Into<String>) -> Self {
        ChangeRecord {
            table: table.into(),
            method,
            primary_key: primary_key.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn primary_field(&self) -> Option<&Field> {
        if !self.has_primary_key() {
            return None;
        }

        self.fields.iter().find(|field| field.name == self.primary_key)
    }
}
