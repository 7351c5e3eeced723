//! Identity-set and schema read-back from the persisted table.
//!
//! There is no separate manifest: whatever the table file says is what the
//! run knows. A run that crashes after an append therefore resumes exactly
//! from the rows that reached disk.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{HarvestError, HarvestResult};
use crate::types::{cell_text, FlatRow, Schema};

/// Column holding each record's identifier.
pub const ID_COLUMN: &str = "id";

/// The set of record ids already present in the persisted table.
///
/// Rebuilt from the table at the start of every run and extended in memory
/// as pages are ingested; it never shrinks. Durability is implicit in the
/// table's own rows.
#[derive(Debug, Default)]
pub struct IdentityStore {
    ids: HashSet<String>,
}

impl IdentityStore {
    pub fn new() -> Self {
        IdentityStore::default()
    }

    /// Read the persisted table back into an identity set and schema.
    ///
    /// A missing file is the expected cold-start state and yields an empty
    /// store and empty schema; a zero-byte file, which a run interrupted
    /// between creating the table and its first flush leaves behind, is
    /// treated the same way. A non-empty file whose header has no `id`
    /// column is surfaced as [`HarvestError::MissingIdColumn`] instead:
    /// treating it as a cold start would let the next persist overwrite
    /// real data.
    pub fn load(path: &Path) -> HarvestResult<(IdentityStore, Schema)> {
        if fs::metadata(path).map_or(true, |meta| meta.len() == 0) {
            info!(path = %path.display(), "table missing or empty, starting cold");
            return Ok((IdentityStore::new(), Schema::new()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let schema = Schema::from_columns(headers.iter().map(str::to_string));
        let id_index = headers
            .iter()
            .position(|name| name == ID_COLUMN)
            .ok_or_else(|| HarvestError::MissingIdColumn {
                path: path.display().to_string(),
            })?;

        let mut ids = HashSet::new();
        let mut rows = 0usize;
        for record in reader.records() {
            let record = record?;
            rows += 1;
            if let Some(cell) = record.get(id_index) {
                if !cell.is_empty() {
                    ids.insert(cell.to_string());
                }
            }
        }

        info!(
            path = %path.display(),
            rows,
            unique_ids = ids.len(),
            columns = schema.len(),
            "loaded persisted table"
        );
        Ok((IdentityStore { ids }, schema))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Insert an id, returning whether it was new.
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Extract a row's identity string.
///
/// The `id` cell is rendered with the same [`cell_text`] rules the writer
/// uses, so an id always compares equal to its read-back form. A row whose
/// id is missing or renders empty fails the page it arrived on rather than
/// being silently skipped.
pub fn row_identity(row: &FlatRow, index: usize) -> HarvestResult<String> {
    row.get(ID_COLUMN)
        .map(cell_text)
        .filter(|id| !id.is_empty())
        .ok_or(HarvestError::MissingRecordId { index })
}
