//! The paginated fetch loop driving both harvest modes.
//!
//! Backfill walks an ordered list of year-range partitions; the daily
//! update walks a single recency-sorted sequence and stops once it sees an
//! id it already knows. Both share the same page cycle: fetch, parse,
//! flatten, deduplicate, persist.

use std::collections::HashSet;
use std::thread;

use tracing::{info, warn};

use crate::config::HarvestConfig;
use crate::error::HarvestResult;
use crate::fetch::{Fetcher, SearchPage};
use crate::flatten::flatten;
use crate::table::{row_identity, IdentityStore, TableWriter};
use crate::types::{FlatRow, Schema};

/// What a successfully processed page means for the loop.
enum PageOutcome {
    /// The page had zero primary records; this pagination sequence is done.
    EndOfResults,
    /// The page was ingested and persisted.
    Ingested {
        /// Whether any record on the page carried an id the store already
        /// knew before the page was processed.
        known_id_seen: bool,
    },
}

/// Which record lists a page contributes.
#[derive(Clone, Copy)]
enum RecordScope {
    /// Primary and sponsored records together (backfill).
    WithSponsored,
    /// Primary records only (daily update).
    PrimaryOnly,
}

/// Drives page-by-page harvesting against one persisted table.
///
/// Strictly sequential: one page is fetched, flattened, deduplicated, and
/// flushed to disk before the next begins. The only waits are the courtesy
/// delay between successful pages and the backoff before a retry.
#[derive(Debug)]
pub struct Harvester<F: Fetcher> {
    fetcher: F,
    config: HarvestConfig,
    store: IdentityStore,
    schema: Schema,
    writer: TableWriter,
}

impl<F: Fetcher> Harvester<F> {
    /// Validate the configuration and rebuild the identity set and schema
    /// from the persisted table.
    pub fn new(config: HarvestConfig, fetcher: F) -> HarvestResult<Self> {
        config.validate()?;
        let (store, schema) = IdentityStore::load(&config.table_path)?;
        let writer = TableWriter::open(&config.table_path)?;
        Ok(Harvester {
            fetcher,
            config,
            store,
            schema,
            writer,
        })
    }

    /// Ids seen so far, including those loaded from the table.
    pub fn unique_ids(&self) -> usize {
        self.store.len()
    }

    /// The current column set of the persisted table.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Walk every configured partition from its first page until a page
    /// comes back without primary records.
    ///
    /// A partition whose failure count exceeds the retry budget is abandoned
    /// and the walk continues with the next one; only a fatal error stops
    /// the whole run.
    pub fn run_backfill(&mut self) -> HarvestResult<()> {
        let partitions = self.config.partitions.clone();
        info!(partitions = partitions.len(), "starting backfill");
        for partition in &partitions {
            self.backfill_partition(partition)?;
        }
        info!(
            unique_ids = self.store.len(),
            columns = self.schema.len(),
            "backfill finished"
        );
        Ok(())
    }

    fn backfill_partition(&mut self, partition: &str) -> HarvestResult<()> {
        let mut failures = 0u32;
        let mut page = 1u32;
        loop {
            let url = self.config.backfill_url(partition, page);
            info!(partition, page, "fetching page");
            match self.harvest_page(&url, RecordScope::WithSponsored) {
                Ok(PageOutcome::EndOfResults) => {
                    info!(partition, pages = page - 1, "no more results for partition");
                    return Ok(());
                }
                Ok(PageOutcome::Ingested { .. }) => {
                    page += 1;
                    thread::sleep(self.config.request_delay);
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures > self.config.backfill_retry_budget {
                        warn!(
                            partition,
                            page,
                            failures,
                            error = %err,
                            "retry budget exhausted, abandoning partition; its data may be incomplete"
                        );
                        return Ok(());
                    }
                    warn!(partition, page, failures, error = %err, "page failed, retrying");
                    thread::sleep(self.config.retry_backoff);
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    /// Page through the recency-sorted feed until it is caught up.
    ///
    /// Stops on an empty page, or after fully ingesting a page on which an
    /// already-known id appeared: results are sorted newest-first, so a
    /// known id means everything newer has now been seen. Failed pages are
    /// retried forever unless a retry limit is configured, in which case
    /// exceeding it surfaces the last error.
    pub fn run_daily_update(&mut self) -> HarvestResult<()> {
        info!("starting daily update");
        let mut failures = 0u32;
        let mut page = 1u32;
        loop {
            let url = self.config.update_url(page);
            info!(page, "fetching page");
            match self.harvest_page(&url, RecordScope::PrimaryOnly) {
                Ok(PageOutcome::EndOfResults) => {
                    info!(page, "no more results");
                    break;
                }
                Ok(PageOutcome::Ingested { known_id_seen }) => {
                    if known_id_seen {
                        info!(page, "known id encountered, update caught up");
                        break;
                    }
                    page += 1;
                    thread::sleep(self.config.request_delay);
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    match self.config.update_retry_limit {
                        Some(limit) if failures > limit => {
                            warn!(page, failures, error = %err, "retry limit exceeded, giving up");
                            return Err(err);
                        }
                        _ => {
                            warn!(page, failures, error = %err, "page failed, retrying");
                            thread::sleep(self.config.retry_backoff);
                        }
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }
        info!(
            unique_ids = self.store.len(),
            columns = self.schema.len(),
            "daily update finished"
        );
        Ok(())
    }

    /// One page cycle: fetch, parse, flatten, deduplicate, persist.
    ///
    /// Ids enter the store only after the batch has reached disk, so a page
    /// that fails mid-cycle is re-collected in full when it is retried.
    fn harvest_page(&mut self, url: &str, scope: RecordScope) -> HarvestResult<PageOutcome> {
        let payload = self.fetcher.fetch(url)?;
        let page = SearchPage::from_value(payload)?;

        if let Some(count) = &page.search.count {
            info!(approx_total = %count, "results reported for this query");
        }
        if page.search.records.is_empty() {
            return Ok(PageOutcome::EndOfResults);
        }

        let mut rows: Vec<FlatRow> = page.search.records.iter().map(flatten).collect();
        if matches!(scope, RecordScope::WithSponsored) {
            rows.extend(page.sponsored.records.iter().map(flatten));
        }

        let mut new_rows = Vec::new();
        let mut pending = HashSet::new();
        let mut known_id_seen = false;
        for (index, row) in rows.into_iter().enumerate() {
            let id = row_identity(&row, index)?;
            if self.store.contains(&id) {
                known_id_seen = true;
                continue;
            }
            // A repeat within the same page collapses to its first
            // occurrence; it says nothing about being caught up.
            if pending.insert(id) {
                new_rows.push(row);
            }
        }

        let ingested = new_rows.len();
        self.schema = self.writer.persist(&new_rows, &self.schema)?;
        for id in pending {
            self.store.add(id);
        }

        info!(
            new_rows = ingested,
            unique_ids = self.store.len(),
            "page ingested"
        );
        Ok(PageOutcome::Ingested { known_id_seen })
    }
}
