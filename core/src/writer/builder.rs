//! Parameterized statement templates.
//!
//! Identifiers are inserted as given; quoting them is up to whoever produces the record.

use std::collections::HashMap;

use crate::{
    record::{ChangeRecord, Method, Value},
    writer::translator::{RecordDefinition, PRIMARY_BINDING},
};

/// Two commands with equal shapes produce statements that can be merged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    pub method: Method,
    pub table: String,
    /// Columns in the order they appear in the statement.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: HashMap<String, Value>,
    pub shape: ShapeKey,
}

pub fn delete_predicate(table: &str, primary_column: &str) -> String {
    format!("DELETE FROM {} WHERE {}", table, primary_column)
}

/// `INSERT INTO <table> (<[primary,]cols>) VALUES (<:bindings>)`
///
/// Returns `None` when the record carries no fields at all.
pub fn build_insert(table: &str, definition: &RecordDefinition) -> Option<Statement> {
    let param_length = definition.column_defs.len() + usize::from(definition.has_primary);
    if param_length == 0 {
        return None;
    }

    let mut col_names: Vec<String> = Vec::with_capacity(param_length);
    let mut val_names: Vec<String> = Vec::with_capacity(param_length);

    if definition.has_primary {
        col_names.push(definition.primary_column.clone());
        val_names.push(format!(":{}", PRIMARY_BINDING));
    }

    for def in &definition.column_defs {
        col_names.push(def.column_name.clone());
        val_names.push(format!(":{}", def.binding_name));
    }

    let sql =
        format!("INSERT INTO {} ({}) VALUES ({})", table, col_names.join(","), val_names.join(","));

    Some(Statement {
        sql,
        args: definition.values.clone(),
        shape: ShapeKey { method: Method::Insert, table: table.to_string(), columns: col_names },
    })
}

/// `UPDATE <table> SET col = :binding,... WHERE <primary> = :primary_val`
///
/// Returns `None` without a resolved primary key, or when there is nothing to set.
pub fn build_update(table: &str, definition: &RecordDefinition) -> Option<Statement> {
    if !definition.has_primary || definition.column_defs.is_empty() {
        return None;
    }

    let updates: Vec<String> = definition
        .column_defs
        .iter()
        .map(|def| format!("{} = :{}", def.column_name, def.binding_name))
        .collect();

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = :{}",
        table,
        updates.join(","),
        definition.primary_column,
        PRIMARY_BINDING
    );

    let mut columns: Vec<String> =
        definition.column_defs.iter().map(|def| def.column_name.clone()).collect();
    columns.push(definition.primary_column.clone());

    Some(Statement {
        sql,
        args: definition.values.clone(),
        shape: ShapeKey { method: Method::Update, table: table.to_string(), columns },
    })
}

/// `DELETE FROM <table> WHERE <primary> = :primary_val`
///
/// Returns `None` when the record declares no primary key or does not carry it.
pub fn build_delete(record: &ChangeRecord) -> Option<Statement> {
    let field = record.primary_field()?;

    let sql = format!("{} = :{}", delete_predicate(&record.table, &field.name), PRIMARY_BINDING);

    Some(Statement {
        sql,
        args: HashMap::from([(PRIMARY_BINDING.to_string(), field.value.clone())]),
        shape: ShapeKey {
            method: Method::Delete,
            table: record.table.clone(),
            columns: vec![field.name.clone()],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::translator::get_definition;

    fn users_record(method: Method) -> ChangeRecord {
        ChangeRecord::new("users", method, "id")
            .with_field("name", "alice")
            .with_field("id", 7i64)
            .with_field("age", 30i64)
    }

    #[test]
    fn test_build_insert_primary_first() {
        let record = users_record(Method::Insert);
        let definition = get_definition(&record).unwrap();

        let statement = build_insert(&record.table, &definition).unwrap();

        assert_eq!(
            statement.sql,
            "INSERT INTO users (id,name,age) VALUES (:primary_val,:val_0,:val_2)"
        );
        assert_eq!(statement.shape.columns, vec!["id", "name", "age"]);
        assert_eq!(statement.args.len(), 3);
    }

    #[test]
    fn test_build_insert_without_primary() {
        let record = ChangeRecord::new("logs", Method::Insert, "").with_field("line", "boot");
        let definition = get_definition(&record).unwrap();

        let statement = build_insert(&record.table, &definition).unwrap();

        assert_eq!(statement.sql, "INSERT INTO logs (line) VALUES (:val_0)");
    }

    #[test]
    fn test_build_insert_without_fields() {
        let record = ChangeRecord::new("logs", Method::Insert, "");
        let definition = get_definition(&record).unwrap();

        assert!(build_insert(&record.table, &definition).is_none());
    }

    #[test]
    fn test_build_update() {
        let record = users_record(Method::Update);
        let definition = get_definition(&record).unwrap();

        let statement = build_update(&record.table, &definition).unwrap();

        assert_eq!(
            statement.sql,
            "UPDATE users SET name = :val_0,age = :val_2 WHERE id = :primary_val"
        );
        assert_eq!(statement.shape.method, Method::Update);
    }

    #[test]
    fn test_build_update_requires_primary() {
        let record = ChangeRecord::new("users", Method::Update, "").with_field("name", "bob");
        let definition = get_definition(&record).unwrap();

        assert!(build_update(&record.table, &definition).is_none());
    }

    #[test]
    fn test_build_update_nothing_to_set() {
        let record = ChangeRecord::new("users", Method::Update, "id").with_field("id", 1i64);
        let definition = get_definition(&record).unwrap();

        assert!(build_update(&record.table, &definition).is_none());
    }

    #[test]
    fn test_build_delete() {
        let record = users_record(Method::Delete);

        let statement = build_delete(&record).unwrap();

        assert_eq!(statement.sql, "DELETE FROM users WHERE id = :primary_val");
        assert_eq!(statement.args.get(PRIMARY_BINDING), Some(&Value::Int(7)));
        assert_eq!(statement.shape.columns, vec!["id"]);
    }

    #[test]
    fn test_build_delete_without_primary() {
        let record = ChangeRecord::new("users", Method::Delete, "").with_field("id", 7i64);

        assert!(build_delete(&record).is_none());
    }

    #[test]
    fn test_same_columns_same_shape() {
        let a = ChangeRecord::new("t", Method::Insert, "id").with_field("id", 1i64).with_field("a", "x");
        let b = ChangeRecord::new("t", Method::Insert, "id").with_field("a", "y").with_field("id", 2i64);

        let shape_a = build_insert("t", &get_definition(&a).unwrap()).unwrap().shape;
        let shape_b = build_insert("t", &get_definition(&b).unwrap()).unwrap().shape;

        assert_eq!(shape_a, shape_b);
    }
}
