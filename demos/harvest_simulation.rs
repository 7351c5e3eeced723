/// Example: a full harvest cycle against canned API pages
/// Simulates a backfill over one partition followed by a daily update,
/// showing deduplication and schema widening along the way.
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;
use trawler::{Fetcher, HarvestConfig, HarvestResult, Harvester};

/// Serves pre-recorded pages instead of hitting the network. Once the
/// recording runs out it answers with empty pages, which is exactly how the
/// real API signals the end of a pagination sequence.
struct CannedPages {
    responses: RefCell<VecDeque<Value>>,
}

impl CannedPages {
    fn new(responses: Vec<Value>) -> Self {
        CannedPages {
            responses: RefCell::new(responses.into()),
        }
    }
}

impl Fetcher for CannedPages {
    fn fetch(&self, _url: &str) -> HarvestResult<Value> {
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| json!({"search": {"records": []}})))
    }
}

fn main() -> anyhow::Result<()> {
    println!("=== Simulated Harvest ===\n");

    let table = std::path::PathBuf::from("./demo-output/boats.csv");
    let _ = std::fs::remove_file(&table);

    let mut config = HarvestConfig::default();
    config.table_path = table.clone();
    config.request_delay = Duration::ZERO;
    config.retry_backoff = Duration::ZERO;
    config.partitions = vec!["1990-2000".to_string()];

    // Two backfill pages: the second introduces a column the first never
    // had, so persisting it widens the table.
    let backfill_pages = vec![
        json!({
            "search": {
                "count": 3,
                "records": [
                    {"id": 1, "make": "Bavaria", "year": 1996,
                     "specifications": {"dimensions": {"lengths": {"nominal": {"ft": 37.0}}}}},
                    {"id": 2, "make": "Jeanneau", "year": 1999}
                ]
            },
            "sponsored": {
                "records": [
                    {"id": 3, "make": "Hallberg-Rassy", "year": 1992,
                     "media": [{"url": "https://img.example/hr.jpg", "title": "bow", "width": 800}]}
                ]
            }
        }),
        json!({
            "search": {
                "records": [
                    {"id": 4, "make": "Nimbus", "year": 1994, "cpybLogo": true}
                ]
            }
        }),
    ];

    println!("Backfill over partition 1990-2000...");
    let mut harvester = Harvester::new(config.clone(), CannedPages::new(backfill_pages))?;
    harvester.run_backfill()?;
    println!("  Unique ids after backfill: {}", harvester.unique_ids());
    println!("  Columns: {}\n", harvester.schema().columns().join(", "));

    // The daily update sees one page sorted newest-first: id 5 is new, id 4
    // is already in the table, so the loop ingests the page and stops.
    let update_pages = vec![json!({
        "search": {
            "records": [
                {"id": 5, "make": "X-Yachts", "year": 2001},
                {"id": 4, "make": "Nimbus", "year": 1994, "cpybLogo": true}
            ]
        }
    })];

    println!("Daily update...");
    let mut harvester = Harvester::new(config, CannedPages::new(update_pages))?;
    harvester.run_daily_update()?;
    println!("  Unique ids after update: {}", harvester.unique_ids());

    let mut reader = csv::Reader::from_path(&table)?;
    let rows = reader.records().count();
    println!("\n✓ {} rows persisted to {}", rows, table.display());
    println!("\nInspect the table:");
    println!("  column -s, -t < {}", table.display());

    Ok(())
}
