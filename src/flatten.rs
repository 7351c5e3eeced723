//! Recursive record flattening.
//!
//! Collapses one arbitrarily nested listing record into a single flat row
//! whose keys are underscore-joined paths (`engine_fuel`, `photos_0_url`).
//! Every value in the output is a scalar; nesting survives only in the key
//! names.

use serde_json::{Map, Value};

use crate::types::FlatRow;

/// Separator between path segments in flattened column names.
///
/// Fixed rather than configurable: the persisted table's header was produced
/// with it, and new rows must keep matching those column names.
pub const SEPARATOR: char = '_';

/// Lists under this key are pared down to each element's `url` and `title`
/// instead of being flattened generically.
const MEDIA_KEY: &str = "media";

/// Flatten one record into a single flat row.
///
/// Pure and deterministic: scalars keep their JSON value, nested mappings
/// recurse with the parent path as prefix, and sequence elements are indexed
/// into the path. If two input paths collapse to the same flattened key, the
/// one visited later overwrites the earlier one.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trawler::flatten;
///
/// let record = json!({
///     "id": 7,
///     "engine": {"fuel": "diesel"},
///     "tags": ["fast", "clean"]
/// });
///
/// let row = flatten(record.as_object().unwrap());
/// assert_eq!(row.get("engine_fuel").unwrap(), "diesel");
/// assert_eq!(row.get("tags_1").unwrap(), "clean");
/// ```
pub fn flatten(record: &Map<String, Value>) -> FlatRow {
    let mut row = FlatRow::new();
    flatten_into(record, "", &mut row);
    row
}

fn flatten_into(mapping: &Map<String, Value>, prefix: &str, row: &mut FlatRow) {
    for (key, value) in mapping {
        let path = join_path(prefix, key);
        match value {
            Value::Object(inner) => flatten_into(inner, &path, row),
            Value::Array(items) if key.as_str() == MEDIA_KEY => {
                flatten_media(items, &path, row);
            }
            Value::Array(items) => flatten_sequence(items, &path, row),
            scalar => {
                row.insert(path, scalar.clone());
            }
        }
    }
}

/// Media lists are noisy; only each element's `url` and `title` are kept.
fn flatten_media(items: &[Value], path: &str, row: &mut FlatRow) {
    for (index, item) in items.iter().enumerate() {
        if let Value::Object(entry) = item {
            if let Some(url) = entry.get("url") {
                row.insert(format!("{}{}{}_url", path, SEPARATOR, index), url.clone());
            }
            if let Some(title) = entry.get("title") {
                row.insert(format!("{}{}{}_title", path, SEPARATOR, index), title.clone());
            }
        }
    }
}

fn flatten_sequence(items: &[Value], path: &str, row: &mut FlatRow) {
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{}{}{}", path, SEPARATOR, index);
        match item {
            Value::Object(inner) => flatten_into(inner, &item_path, row),
            Value::Array(nested) => {
                row.insert(item_path, Value::String(join_items(nested)));
            }
            scalar => {
                row.insert(item_path, scalar.clone());
            }
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", prefix, SEPARATOR, key)
    }
}

/// A sequence nested inside another sequence collapses into one
/// comma-separated string.
fn join_items(items: &[Value]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    parts.join(", ")
}
