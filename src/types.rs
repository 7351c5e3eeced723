use serde_json::{Map, Value};
use std::collections::HashSet;

/// One flattened record: path-style column names mapped to scalar values.
///
/// Produced by [`crate::flatten::flatten`]; after flattening no value is an
/// object or an array.
pub type FlatRow = Map<String, Value>;

/// The ordered column set of the persisted table.
///
/// Columns are append-only: once a name is in the schema it stays, and its
/// position never changes. Rows that lack a column are padded with an empty
/// cell when written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    columns: Vec<String>,
    known: HashSet<String>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Build a schema from an existing header row. Repeated names keep their
    /// first position.
    pub fn from_columns(columns: impl IntoIterator<Item = String>) -> Self {
        let mut schema = Schema::new();
        schema.widen(columns);
        schema
    }

    /// Column names in table order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Append every not-yet-known column, preserving the iteration order.
    pub fn widen(&mut self, columns: impl IntoIterator<Item = String>) {
        for column in columns {
            if self.known.insert(column.clone()) {
                self.columns.push(column);
            }
        }
    }
}

/// Render a scalar value as a table cell.
///
/// Nulls become the empty cell, strings are written bare, everything else
/// uses its JSON rendering. The same rendering feeds identity comparison, so
/// a value and its read-back cell always agree.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
