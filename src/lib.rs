//! # Trawler - Incremental Listing Harvester
//!
//! A library for pulling paginated listing records out of a remote search
//! API and into one growing CSV table: fetch, flatten, deduplicate, persist.
//!
//! ## Modules
//!
//! - **harvest**: the page-by-page loop behind backfill and daily-update runs
//! - **flatten**: collapse nested records into flat, underscore-keyed rows
//! - **table**: the persisted CSV table, its identity set, and schema widening
//! - **fetch**: HTTP access through a rendering proxy, behind the [`Fetcher`] trait
//! - **config**: run settings, partitions, and query URL templates
//!
//! ## Quick Start
//!
//! ### Flattening one record
//!
//! ```rust
//! use serde_json::json;
//! use trawler::flatten;
//!
//! let record = json!({
//!     "id": 314,
//!     "specifications": {"dimensions": {"lengths": {"nominal": {"ft": 40.0}}}},
//!     "media": [{"url": "https://img.example/1.jpg", "title": "bow", "width": 800}]
//! });
//!
//! let row = flatten(record.as_object().unwrap());
//! assert_eq!(
//!     row.get("specifications_dimensions_lengths_nominal_ft").unwrap(),
//!     &json!(40.0)
//! );
//! assert_eq!(row.get("media_0_url").unwrap(), "https://img.example/1.jpg");
//! // Media entries keep only url and title.
//! assert!(!row.contains_key("media_0_width"));
//! ```
//!
//! ### Running a harvest
//!
//! ```rust,no_run
//! use trawler::{HarvestConfig, Harvester, ProxyConfig, ProxyFetcher};
//!
//! # fn main() -> anyhow::Result<()> {
//! let api_key = std::env::var("ZENROWS_API_KEY")?;
//! let fetcher = ProxyFetcher::new(ProxyConfig::new(api_key))?;
//! let mut harvester = Harvester::new(HarvestConfig::default(), fetcher)?;
//! harvester.run_daily_update()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod flatten;
pub mod harvest;
pub mod table;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{HarvestConfig, ProxyConfig};
pub use error::{HarvestError, HarvestResult};
pub use fetch::{Fetcher, ProxyFetcher, SearchPage};
pub use flatten::flatten;
pub use harvest::Harvester;
pub use table::{IdentityStore, TableWriter};
pub use types::{FlatRow, Schema};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_flatten_then_persist() {
        let record = json!({
            "id": 7,
            "specs": {"loa": 12.3}
        });
        let row = flatten(record.as_object().unwrap());

        let dir = tempdir().unwrap();
        let mut writer = TableWriter::open(dir.path().join("boats.csv")).unwrap();
        let schema = writer.persist(&[row], &Schema::new()).unwrap();

        assert_eq!(schema.columns(), &["id", "specs_loa"]);
    }
}
