//! Append-or-rewrite persistence for the flat table.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::HarvestResult;
use crate::types::{cell_text, FlatRow, Schema};

/// Writes batches of flat rows to the persisted CSV table.
///
/// Appending under the known schema is the common case. A batch that
/// introduces columns the table has never seen triggers a full rewrite
/// instead: every existing row is read back, padded for the new columns,
/// and the whole table is replaced through a temporary file in the same
/// directory, so an interrupted rewrite leaves the previous table intact.
#[derive(Debug)]
pub struct TableWriter {
    path: PathBuf,
    /// Whether the next append must start with the header row. Captured at
    /// construction, cleared by the first write of the run.
    write_header: bool,
}

impl TableWriter {
    /// Create a writer for the table at `path`, creating parent directories
    /// as needed.
    pub fn open(path: impl Into<PathBuf>) -> HarvestResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // A zero-byte file left by an interrupted run still needs a header.
        let write_header = fs::metadata(&path).map_or(true, |meta| meta.len() == 0);
        Ok(TableWriter { path, write_header })
    }

    /// Persist one batch of rows and return the (possibly widened) schema.
    ///
    /// Rows are projected onto the schema's column order with absent cells
    /// left empty. When `known_schema` already covers every batch column the
    /// batch is appended; otherwise the table is rewritten under the widened
    /// schema. An empty batch writes nothing. The returned schema is always
    /// a superset of `known_schema` with its column positions unchanged.
    pub fn persist(
        &mut self,
        new_rows: &[FlatRow],
        known_schema: &Schema,
    ) -> HarvestResult<Schema> {
        if new_rows.is_empty() {
            return Ok(known_schema.clone());
        }

        let mut batch_columns = Schema::new();
        for row in new_rows {
            batch_columns.widen(row.keys().cloned());
        }

        if known_schema.is_empty() {
            // Cold start: the first batch defines the schema.
            info!(
                columns = batch_columns.len(),
                rows = new_rows.len(),
                path = %self.path.display(),
                "creating table"
            );
            self.rewrite(new_rows, &batch_columns)?;
            return Ok(batch_columns);
        }

        let new_columns: Vec<&str> = batch_columns
            .columns()
            .iter()
            .filter(|column| !known_schema.contains(column))
            .map(String::as_str)
            .collect();

        if new_columns.is_empty() {
            self.append(new_rows, known_schema)?;
            return Ok(known_schema.clone());
        }

        // Without the rewrite these columns would be dropped on the floor.
        info!(
            count = new_columns.len(),
            columns = ?new_columns,
            "batch introduces unseen columns, rewriting table with widened schema"
        );
        let mut widened = known_schema.clone();
        widened.widen(batch_columns.columns().iter().cloned());
        self.rewrite(new_rows, &widened)?;
        Ok(widened)
    }

    /// Append the batch under the known schema, writing the header first if
    /// the table was missing or empty when this writer was opened.
    fn append(&mut self, rows: &[FlatRow], schema: &Schema) -> HarvestResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if self.write_header {
            writer.write_record(schema.columns())?;
        }
        for row in rows {
            writer.write_record(projected(row, schema))?;
        }
        writer.flush()?;
        self.write_header = false;

        debug!(rows = rows.len(), path = %self.path.display(), "appended batch");
        Ok(())
    }

    /// Rewrite the whole table under `schema`: existing rows first, then the
    /// batch. Written to a temporary file alongside the table and renamed
    /// into place so a crash mid-rewrite cannot truncate the old table.
    fn rewrite(&mut self, rows: &[FlatRow], schema: &Schema) -> HarvestResult<()> {
        let tmp_path = self.tmp_path();
        let mut writer = csv::Writer::from_path(&tmp_path)?;
        writer.write_record(schema.columns())?;

        let mut carried = 0usize;
        if self.path.exists() {
            let mut reader = csv::Reader::from_path(&self.path)?;
            let old_header = reader.headers()?.clone();
            let positions: Vec<Option<usize>> = schema
                .columns()
                .iter()
                .map(|column| old_header.iter().position(|name| name == column))
                .collect();
            for record in reader.records() {
                let record = record?;
                let cells: Vec<&str> = positions
                    .iter()
                    .map(|position| position.and_then(|i| record.get(i)).unwrap_or(""))
                    .collect();
                writer.write_record(&cells)?;
                carried += 1;
            }
        }
        for row in rows {
            writer.write_record(projected(row, schema))?;
        }
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp_path, &self.path)?;
        self.write_header = false;

        info!(
            carried_rows = carried,
            new_rows = rows.len(),
            columns = schema.len(),
            path = %self.path.display(),
            "table rewritten"
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("table"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// A row's cells in schema order; columns the row lacks become empty cells.
fn projected<'a>(row: &'a FlatRow, schema: &'a Schema) -> impl Iterator<Item = String> + 'a {
    schema
        .columns()
        .iter()
        .map(|column| row.get(column).map(cell_text).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use tempfile::tempdir;

    fn row(value: serde_json::Value) -> FlatRow {
        value.as_object().unwrap().clone()
    }

    fn read_table(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .map(|record| record.unwrap().iter().map(str::to_string).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn test_first_batch_defines_schema_and_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();

        let schema = writer
            .persist(&[row(json!({"id": 1, "make": "Bavaria"}))], &Schema::new())
            .unwrap();

        assert_eq!(schema.columns(), &["id", "make"]);
        let (header, rows) = read_table(&path);
        assert_eq!(header, vec!["id", "make"]);
        assert_eq!(rows, vec![vec!["1".to_string(), "Bavaria".to_string()]]);
    }

    #[test]
    fn test_append_projects_and_pads_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();

        let schema = writer
            .persist(
                &[row(json!({"id": 1, "make": "Bavaria", "price": 24950}))],
                &Schema::new(),
            )
            .unwrap();
        let schema = writer
            .persist(&[row(json!({"id": 2, "make": "Jeanneau"}))], &schema)
            .unwrap();

        assert_eq!(schema.columns(), &["id", "make", "price"]);
        let (header, rows) = read_table(&path);
        assert_eq!(header, vec!["id", "make", "price"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["2".to_string(), "Jeanneau".to_string(), String::new()]);
    }

    #[test]
    fn test_batch_using_subset_of_schema_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();
        let schema = writer
            .persist(&[row(json!({"a": 1, "b": 2, "id": 1}))], &Schema::new())
            .unwrap();

        let updated = writer
            .persist(&[row(json!({"a": 9, "id": 2}))], &schema)
            .unwrap();

        assert_eq!(updated, schema);
        let (_, rows) = read_table(&path);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_unseen_column_triggers_widening_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();
        let schema = writer
            .persist(&[row(json!({"id": 1, "make": "Bavaria"}))], &Schema::new())
            .unwrap();

        let widened = writer
            .persist(&[row(json!({"id": 2, "color": "blue"}))], &schema)
            .unwrap();

        assert_eq!(widened.columns(), &["id", "make", "color"]);
        let (header, rows) = read_table(&path);
        assert_eq!(header, vec!["id", "make", "color"]);
        // The old row is padded for the new column, the new row for the old.
        assert_eq!(
            rows,
            vec![
                vec!["1".to_string(), "Bavaria".to_string(), String::new()],
                vec!["2".to_string(), String::new(), "blue".to_string()],
            ]
        );
    }

    #[test]
    fn test_schema_grows_monotonically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();

        let batches = [
            row(json!({"id": 1, "make": "Bavaria"})),
            row(json!({"id": 2, "year": 1999})),
            row(json!({"id": 3, "make": "Nimbus", "price": 5})),
        ];
        let mut schema = Schema::new();
        let mut previous: Vec<String> = Vec::new();
        for batch in &batches {
            schema = writer.persist(std::slice::from_ref(batch), &schema).unwrap();
            for column in &previous {
                assert!(schema.contains(column), "column {column} was dropped");
            }
            previous = schema.columns().to_vec();
        }

        assert_eq!(schema.columns(), &["id", "make", "year", "price"]);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();

        let schema = writer.persist(&[], &Schema::new()).unwrap();

        assert!(schema.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_reopened_writer_skips_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let schema = {
            let mut writer = TableWriter::open(&path).unwrap();
            writer
                .persist(&[row(json!({"id": 1, "make": "Bavaria"}))], &Schema::new())
                .unwrap()
        };

        // A later run opens the existing table and appends without a header.
        let mut writer = TableWriter::open(&path).unwrap();
        writer
            .persist(&[row(json!({"id": 2, "make": "Jeanneau"}))], &schema)
            .unwrap();

        let (header, rows) = read_table(&path);
        assert_eq!(header, vec!["id", "make"]);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|cells| cells[0] != "id"));
    }

    #[test]
    fn test_append_onto_zero_byte_file_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        fs::write(&path, "").unwrap();
        let mut writer = TableWriter::open(&path).unwrap();
        let schema = Schema::from_columns(vec!["id".to_string(), "make".to_string()]);

        writer
            .persist(&[row(json!({"id": 1, "make": "Bavaria"}))], &schema)
            .unwrap();

        let (header, rows) = read_table(&path);
        assert_eq!(header, vec!["id", "make"]);
        assert_eq!(rows, vec![vec!["1".to_string(), "Bavaria".to_string()]]);
    }

    #[test]
    fn test_append_to_fresh_file_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();
        let schema = Schema::from_columns(vec!["id".to_string(), "make".to_string()]);

        writer.persist(&[row(json!({"id": 1}))], &schema).unwrap();
        writer.persist(&[row(json!({"id": 2}))], &schema).unwrap();

        let (header, rows) = read_table(&path);
        assert_eq!(header, vec!["id", "make"]);
        assert_eq!(
            rows,
            vec![
                vec!["1".to_string(), String::new()],
                vec!["2".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_no_temporary_file_survives_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();
        let schema = writer
            .persist(&[row(json!({"id": 1}))], &Schema::new())
            .unwrap();
        writer
            .persist(&[row(json!({"id": 2, "new_field": true}))], &schema)
            .unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["boats.csv".to_string()]);
    }

    #[test]
    fn test_cells_are_rendered_with_cell_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boats.csv");
        let mut writer = TableWriter::open(&path).unwrap();

        writer
            .persist(
                &[row(json!({
                    "available": true,
                    "broker": null,
                    "id": 1,
                    "price": 19.5
                }))],
                &Schema::new(),
            )
            .unwrap();

        let (_, rows) = read_table(&path);
        assert_eq!(rows[0], vec!["true", "", "1", "19.5"]);
    }
}
