mod alerts;
mod db;
mod extract;
mod fetch;
mod pipeline;
mod settings;
mod sitemap;
mod summary;

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use clap::Parser;
use tracing::info;

use crate::db::Store;
use crate::fetch::HttpFetcher;
use crate::settings::DbSettings;

#[derive(Parser)]
#[command(
    name = "seo_crawler",
    about = "Crawl a sitemap and record on-page SEO signals for every listed page"
)]
struct Cli {
    /// Sitemap or sitemap index URL
    sitemap_url: String,
    /// Write to this SQLite file instead of PostgreSQL (DB_* variables not needed)
    #[arg(long, value_name = "PATH")]
    sqlite: Option<PathBuf>,
    /// Max pages to crawl (default: all)
    #[arg(short = 'n', long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let timestamp = Utc::now();
    let cli = Cli::parse();

    let store = match &cli.sqlite {
        Some(path) => Store::open_sqlite(path)?,
        None => {
            let settings = DbSettings::from_env()?;
            info!(settings = ?settings, "Database settings loaded");
            Store::connect(&settings).await?
        }
    };
    store.init_schema().await?;

    let fetcher = HttpFetcher::new()?;
    let mut urls = sitemap::collect_page_urls(&fetcher, &cli.sitemap_url).await?;
    if let Some(n) = cli.limit {
        urls.truncate(n);
    }
    if urls.is_empty() {
        println!("No page URLs found in {}", cli.sitemap_url);
        return Ok(());
    }

    println!("Crawling {} pages...", urls.len());
    let summary = pipeline::run(&fetcher, &store, &urls, timestamp).await?;
    summary.print();

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
