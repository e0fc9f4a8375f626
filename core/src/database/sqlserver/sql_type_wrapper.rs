use std::borrow::Cow;

use tiberius::{ColumnData, ToSql};

use crate::record::Value;

/// Binds a record [`Value`] as a typed TDS parameter.
pub struct SqlServerTypeWrapper<'a>(pub &'a Value);

impl ToSql for SqlServerTypeWrapper<'_> {
    fn to_sql(&self) -> ColumnData<'_> {
        match self.0 {
            Value::Null => ColumnData::String(None),
            Value::Bool(value) => ColumnData::Bit(Some(*value)),
            Value::Int(value) => ColumnData::I64(Some(*value)),
            Value::Float(value) => ColumnData::F64(Some(*value)),
            Value::String(value) => ColumnData::String(Some(Cow::Borrowed(value.as_str()))),
            Value::Bytes(value) => ColumnData::Binary(Some(Cow::Borrowed(value.as_slice()))),
            // SQL Server converts ISO 8601 strings implicitly; the value is still sent as a
            // parameter, never inlined into the script.
            Value::Timestamp(value) => ColumnData::String(Some(Cow::Owned(
                value.format("%Y-%m-%dT%H:%M:%S%.f%:z").to_string(),
            ))),
        }
    }
}

pub fn wrap_params(args: &[Value]) -> Vec<SqlServerTypeWrapper<'_>> {
    args.iter().map(SqlServerTypeWrapper).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_to_sql_mapping() {
        assert!(matches!(SqlServerTypeWrapper(&Value::Null).to_sql(), ColumnData::String(None)));
        assert!(matches!(
            SqlServerTypeWrapper(&Value::Bool(true)).to_sql(),
            ColumnData::Bit(Some(true))
        ));
        assert!(matches!(SqlServerTypeWrapper(&Value::Int(-4)).to_sql(), ColumnData::I64(Some(-4))));

        let ts = Value::Timestamp(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap());
        match SqlServerTypeWrapper(&ts).to_sql() {
            ColumnData::String(Some(s)) => assert_eq!(s, "2023-01-02T03:04:05+00:00"),
            other => panic!("unexpected column data {:?}", other),
        }
    }
}
