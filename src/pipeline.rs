use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::db::Store;
use crate::extract::{self, PageRecord};
use crate::fetch::Fetch;
use crate::summary::RunSummary;

/// Fetch, measure and save each URL in turn, then summarize the run.
///
/// Every record is stamped with `timestamp`. A page that cannot be fetched or
/// measured is logged and skipped; a failed insert ends the run.
pub async fn run<F: Fetch>(
    fetcher: &F,
    store: &Store,
    urls: &[String],
    timestamp: DateTime<Utc>,
) -> Result<RunSummary> {
    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut records: Vec<PageRecord> = Vec::with_capacity(urls.len());
    let mut skipped = 0usize;

    for url in urls {
        pb.inc(1);

        let page = match fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Skipping {}: {:#}", url, e);
                skipped += 1;
                continue;
            }
        };

        let record = match extract::build_record(url, &page, timestamp) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping {}: {}", url, e);
                skipped += 1;
                continue;
            }
        };

        store
            .insert(&record)
            .await
            .with_context(|| format!("Failed to save record for {}", url))?;
        records.push(record);
    }

    pb.finish_and_clear();
    info!("Saved {} records ({} skipped)", records.len(), skipped);

    Ok(RunSummary::from_records(&records, skipped))
}
