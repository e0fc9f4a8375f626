//! Named-to-positional parameter binding.
//!
//! Statements are built with `:name` parameters and sent to the engine with
//! positional `@p<n>` parameters. The bound form keeps the literal SQL
//! fragments between tokens so callers can re-render the tokens with any
//! numbering, which is what lets many statements share one parameter space.

use std::collections::HashMap;

use crate::record::Value;

pub const PLACEHOLDER_PREFIX: &str = "@p";

/// Formats the positional placeholder for the given 1-based position.
#[inline]
pub fn placeholder(position: u64) -> String {
    format!("{}{}", PLACEHOLDER_PREFIX, position)
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BindError {
    #[error("Named argument :{0} has no value in the argument map")]
    MissingArgument(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    /// Always one longer than `args`; token `i` sits between `fragments[i]` and `fragments[i + 1]`.
    fragments: Vec<String>,
    args: Vec<Value>,
}

impl BoundQuery {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    /// Renders the SQL text, asking `token` for the placeholder of each position (1-based),
    /// left to right.
    pub fn render<F>(&self, mut token: F) -> String
    where
        F: FnMut(usize) -> String,
    {
        let mut sql = String::with_capacity(self.fragments.iter().map(String::len).sum::<usize>());
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i > 0 {
                sql.push_str(&token(i));
            }
            sql.push_str(fragment);
        }
        sql
    }

    /// The statement as the engine would bind it on its own, numbered from `@p1`.
    pub fn to_positional_sql(&self) -> String {
        self.render(|i| placeholder(i as u64))
    }
}

#[inline]
fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

#[inline]
fn is_ident_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Replaces every `:name` parameter in `sql` with a positional token and collects the
/// matching values in order of appearance. A name used twice is bound twice.
///
/// `::` casts and anything inside single or double quotes are left alone.
pub fn bind_named(sql: &str, args: &HashMap<String, Value>) -> Result<BoundQuery, BindError> {
    let bytes = sql.as_bytes();
    let mut fragments = Vec::new();
    let mut values = Vec::new();

    let mut quote: Option<u8> = None;
    let mut fragment_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];

        if let Some(open) = quote {
            if byte == open {
                quote = None;
            }
            i += 1;
            continue;
        }

        match byte {
            b'\'' | b'"' => {
                quote = Some(byte);
                i += 1;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
            }
            b':' if bytes.get(i + 1).copied().is_some_and(is_ident_start) => {
                let name_start = i + 1;
                let mut name_end = name_start;
                while name_end < bytes.len() && is_ident_char(bytes[name_end]) {
                    name_end += 1;
                }

                let name = &sql[name_start..name_end];
                let value =
                    args.get(name).ok_or_else(|| BindError::MissingArgument(name.to_string()))?;

                fragments.push(sql[fragment_start..i].to_string());
                values.push(value.clone());

                fragment_start = name_end;
                i = name_end;
            }
            _ => {
                i += 1;
            }
        }
    }

    fragments.push(sql[fragment_start..].to_string());

    Ok(BoundQuery { fragments, args: values })
}
