//! The persisted CSV table and the state derived from it.
//!
//! The table file is the single source of truth: the set of already-seen
//! record ids and the known column set are both re-derived from it at the
//! start of every run. [`store`] handles that read-back plus the in-memory
//! identity set; [`writer`] handles appends and the schema-widening rewrite.

pub mod store;
pub mod writer;

pub use store::{row_identity, IdentityStore, ID_COLUMN};
pub use writer::TableWriter;
