use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use card_price_tracker::config::{FetcherKind, TrackerConfig};
use card_price_tracker::jobs::price_tracker::PriceTracker;
use card_price_tracker::scrapers::browser::BrowserFetcher;
use card_price_tracker::scrapers::http::HttpFetcher;
use card_price_tracker::scrapers::PageFetcher;
use card_price_tracker::storage::{CsvStore, PriceStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,card_price_tracker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = TrackerConfig::from_env()?;

    tracing::info!("Opening price store in {}", config.data_dir.display());
    let store = Arc::new(CsvStore::open(&config.data_dir)?);

    let fetcher: Arc<dyn PageFetcher> = match config.fetcher {
        FetcherKind::Browser => {
            tracing::info!("Using WebDriver at {}", config.webdriver_url);
            Arc::new(BrowserFetcher::from_config(&config))
        }
        FetcherKind::Http => {
            tracing::info!("Using plain HTTP fetcher");
            Arc::new(HttpFetcher::new()?)
        }
    };

    let mut tracker = PriceTracker::new(config, fetcher, store.clone());
    let summary = tracker.run().await?;

    // The summary is the machine-readable result of the run
    println!("{}", serde_json::to_string_pretty(&summary)?);

    match tracker.build_report().await {
        Ok(report) => {
            for item in &report.items {
                tracing::info!(
                    "[REPORT] {} x{} price={:?} value={:?} profit={:?} updated={:?}",
                    item.name,
                    item.quantity,
                    item.current_price,
                    item.current_value,
                    item.profit,
                    item.last_updated
                );
            }
            tracing::info!(
                "[REPORT] {} items, total value {}",
                report.total_items,
                report.total_value
            );
        }
        Err(e) => tracing::warn!("Could not build portfolio report: {}", e),
    }

    match store.recent_observations(chrono::Duration::hours(2)).await {
        Ok(recent) => tracing::info!("{} observations recorded in the last 2 hours", recent.len()),
        Err(e) => tracing::warn!("Could not read recent observations: {}", e),
    }

    if summary.success == 0 {
        tracing::warn!("No item was scraped successfully this run");
    }

    Ok(())
}
