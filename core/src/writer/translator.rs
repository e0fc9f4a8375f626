use std::collections::HashMap;

use tracing::error;

use crate::record::{ChangeRecord, Value};

/// Binding name the primary-key value is stored under.
pub const PRIMARY_BINDING: &str = "primary_val";

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub column_name: String,
    pub binding_name: String,
    pub value: Value,
}

/// A change record normalized into bindable columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordDefinition {
    pub has_primary: bool,
    pub primary_column: String,
    /// Binding name to value, `primary_val` included when `has_primary` is set.
    pub values: HashMap<String, Value>,
    /// Non-primary columns in field order.
    pub column_defs: Vec<ColumnDefinition>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Primary key {0} not found in record fields")]
    PrimaryKeyNotFound(String),
}

#[inline]
fn binding_name(index: usize) -> String {
    format!("val_{}", index)
}

/// Splits a record's fields into the primary key and the generic columns.
///
/// Binding names use the field's position in the original list, so a skipped primary field
/// leaves a gap (`val_0`, `val_2`); they only need to be unique within one statement.
pub fn get_definition(record: &ChangeRecord) -> Result<RecordDefinition, TranslateError> {
    let mut definition = RecordDefinition {
        has_primary: false,
        primary_column: String::new(),
        values: HashMap::with_capacity(record.fields.len()),
        column_defs: Vec::with_capacity(record.fields.len()),
    };

    for (n, field) in record.fields.iter().enumerate() {
        if record.has_primary_key() && field.name == record.primary_key {
            definition.values.insert(PRIMARY_BINDING.to_string(), field.value.clone());
            definition.has_primary = true;
            definition.primary_column = field.name.clone();
            continue;
        }

        let binding_name = binding_name(n);
        definition.values.insert(binding_name.clone(), field.value.clone());
        definition.column_defs.push(ColumnDefinition {
            column_name: field.name.clone(),
            binding_name,
            value: field.value.clone(),
        });
    }

    if record.has_primary_key() && !definition.has_primary {
        error!(column = %record.primary_key, table = %record.table, "Not found primary key");
        return Err(TranslateError::PrimaryKeyNotFound(record.primary_key.clone()));
    }

    Ok(definition)
}
