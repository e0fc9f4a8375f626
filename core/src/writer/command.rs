use std::collections::HashMap;

use crate::{
    record::{ChangeRecord, Value},
    writer::{
        builder::{ShapeKey, Statement},
        translator::RecordDefinition,
    },
};

/// A translated record waiting to be written.
///
/// Owned by the queue until a chunk takes it, then by the executor until the chunk commits and
/// the completion handler has seen it.
#[derive(Debug, Clone)]
pub struct WriteCommand<R> {
    /// Opaque value handed back to the completion handler for ack correlation.
    pub reference: R,
    pub record: ChangeRecord,
    pub query: String,
    pub args: HashMap<String, Value>,
    pub definition: Option<RecordDefinition>,
    pub tables: Vec<String>,
    pub shape: ShapeKey,
}

impl<R> WriteCommand<R> {
    pub fn new(
        reference: R,
        record: ChangeRecord,
        statement: Statement,
        definition: Option<RecordDefinition>,
        tables: Vec<String>,
    ) -> Self {
        WriteCommand {
            reference,
            record,
            query: statement.sql,
            args: statement.args,
            definition,
            tables,
            shape: statement.shape,
        }
    }
}
