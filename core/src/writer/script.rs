//! Turns a chunk of commands into one multi-statement script.
//!
//! Every statement is bound on its own (numbered from `@p1`), but the engine shares one parameter
//! namespace across the whole `;`-joined script, so each token is re-rendered from a chunk-wide
//! [`PlaceholderSequence`]. Consecutive commands of the same shape are merged:
//!
//! - INSERTs become one multi-row `VALUES (..),(..)`
//! - DELETEs become one `WHERE <primary> IN (..)`
//! - UPDATEs are never merged, each has its own predicate

use tracing::error;

use crate::{
    database::bind::{bind_named, BindError, BoundQuery},
    record::{Method, Value},
    writer::{
        builder::{delete_predicate, ShapeKey},
        command::WriteCommand,
        placeholder::PlaceholderSequence,
    },
};

#[derive(Debug)]
enum PendingStatement {
    Single(String),
    Insert(String),
    Delete { predicate: String, keys: Vec<String> },
}

impl PendingStatement {
    fn render(&self) -> String {
        match self {
            PendingStatement::Single(sql) | PendingStatement::Insert(sql) => sql.clone(),
            PendingStatement::Delete { predicate, keys } => {
                if keys.len() == 1 {
                    format!("{} = {}", predicate, keys[0])
                } else {
                    format!("{} IN ({})", predicate, keys.join(","))
                }
            }
        }
    }
}

/// The executable form of a chunk; `args[i]` binds `@p{i + 1}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub sql: String,
    pub args: Vec<Value>,
    pub statement_count: usize,
}

impl Script {
    pub fn is_empty(&self) -> bool {
        self.statement_count == 0
    }
}

#[derive(Debug, Default)]
pub struct ScriptBuilder {
    sequence: PlaceholderSequence,
    statements: Vec<PendingStatement>,
    args: Vec<Value>,
    last_shape: Option<ShapeKey>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one command. On a bind error nothing is added and the shape chain is left as it was.
    pub fn push<R>(&mut self, command: &WriteCommand<R>) -> Result<(), BindError> {
        let bound = bind_named(&command.query, &command.args)?;
        self.push_bound(&command.shape, bound);
        Ok(())
    }

    fn push_bound(&mut self, shape: &ShapeKey, bound: BoundQuery) {
        let same_shape = self.last_shape.as_ref() == Some(shape);
        if !(same_shape && self.coalesce(shape, &bound)) {
            self.start_statement(shape, &bound);
        }

        self.args.extend(bound.into_args());
        if !same_shape {
            self.last_shape = Some(shape.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Merges into the previous statement; returns false when it cannot.
    fn coalesce(&mut self, shape: &ShapeKey, bound: &BoundQuery) -> bool {
        let sequence = &mut self.sequence;

        match (shape.method, self.statements.last_mut()) {
            (Method::Insert, Some(PendingStatement::Insert(sql))) => {
                let tokens: Vec<String> =
                    (0..bound.len()).map(|_| sequence.next_placeholder()).collect();
                sql.push_str(&format!(",({})", tokens.join(",")));
                true
            }
            (Method::Delete, Some(PendingStatement::Delete { keys, .. })) if bound.len() == 1 => {
                keys.push(sequence.next_placeholder());
                true
            }
            _ => false,
        }
    }

    fn start_statement(&mut self, shape: &ShapeKey, bound: &BoundQuery) {
        let sequence = &mut self.sequence;

        let statement = match shape.method {
            Method::Delete if bound.len() == 1 && shape.columns.len() == 1 => {
                PendingStatement::Delete {
                    predicate: delete_predicate(&shape.table, &shape.columns[0]),
                    keys: vec![sequence.next_placeholder()],
                }
            }
            Method::Insert => PendingStatement::Insert(bound.render(|_| sequence.next_placeholder())),
            _ => PendingStatement::Single(bound.render(|_| sequence.next_placeholder())),
        };

        self.statements.push(statement);
    }

    pub fn finish(self) -> Script {
        let sql = self.statements.iter().map(PendingStatement::render).collect::<Vec<_>>().join(";");

        Script { sql, args: self.args, statement_count: self.statements.len() }
    }
}

/// Builds the scripts for a whole chunk, in arrival order, starting a new script whenever the
/// next command would take one past `max_args` parameters. Each script numbers from `@p1`.
/// Commands that fail to bind are logged and left out; empty scripts are never returned.
pub fn build_scripts<R>(commands: &[WriteCommand<R>], max_args: usize) -> Vec<Script> {
    let mut scripts = Vec::new();
    let mut builder = ScriptBuilder::new();

    for command in commands {
        let bound = match bind_named(&command.query, &command.args) {
            Ok(bound) => bound,
            Err(e) => {
                error!(table = %command.record.table, query = %command.query, "Skipping command: {}", e);
                continue;
            }
        };

        if !builder.is_empty() && builder.arg_count() + bound.len() > max_args {
            scripts.push(std::mem::take(&mut builder).finish());
        }

        builder.push_bound(&command.shape, bound);
    }

    if !builder.is_empty() {
        scripts.push(builder.finish());
    }

    scripts
}

/// The whole chunk as a single script, however many parameters it binds.
pub fn build_script<R>(commands: &[WriteCommand<R>]) -> Script {
    build_scripts(commands, usize::MAX).pop().unwrap_or_default()
}
