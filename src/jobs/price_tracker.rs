//! Portfolio price tracking run
//!
//! One run walks the portfolio strictly in order: upsert the item, scrape it
//! under the retry policy, record exactly one observation, then pause before
//! the next item. A failing item never stops the run.

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TrackerConfig;
use crate::error::{PortfolioError, ScrapeError, StorageError};
use crate::models::{
    ItemReport, PortfolioEntry, PortfolioReport, PriceObservation, RunSummary, TrackedItem,
};
use crate::scrapers::parser::parse_listing;
use crate::scrapers::retry::{RetryPolicy, with_retry};
use crate::scrapers::PageFetcher;
use crate::services::portfolio::load_portfolio;
use crate::storage::PriceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    LoadingPortfolio,
    /// 1-based position of the item being tracked
    Tracking(usize),
    Summarizing,
    Done,
}

impl fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerPhase::Idle => f.write_str("idle"),
            TrackerPhase::LoadingPortfolio => f.write_str("loading_portfolio"),
            TrackerPhase::Tracking(i) => write!(f, "tracking({})", i),
            TrackerPhase::Summarizing => f.write_str("summarizing"),
            TrackerPhase::Done => f.write_str("done"),
        }
    }
}

pub struct PriceTracker {
    config: TrackerConfig,
    retry: RetryPolicy,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn PriceStore>,
    phase: TrackerPhase,
}

impl PriceTracker {
    pub fn new(config: TrackerConfig, fetcher: Arc<dyn PageFetcher>, store: Arc<dyn PriceStore>) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            config,
            retry,
            fetcher,
            store,
            phase: TrackerPhase::Idle,
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    fn enter(&mut self, phase: TrackerPhase) {
        tracing::debug!("[PHASE] {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Load the portfolio from `config.portfolio_path` and track every item.
    ///
    /// Only an unreadable or empty portfolio fails the run.
    pub async fn run(&mut self) -> Result<RunSummary, PortfolioError> {
        self.enter(TrackerPhase::LoadingPortfolio);
        tracing::info!("Loading portfolio from {}", self.config.portfolio_path.display());

        let entries = match load_portfolio(&self.config.portfolio_path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("[ERROR] Cannot start run: {}", e);
                self.enter(TrackerPhase::Done);
                return Err(e);
            }
        };

        Ok(self.track(&entries).await)
    }

    /// Track an already loaded portfolio
    pub async fn track(&mut self, entries: &[PortfolioEntry]) -> RunSummary {
        let mut summary = RunSummary {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let total = entries.len();

        tracing::info!("[START] Tracking {} items", total);

        for (idx, entry) in entries.iter().enumerate() {
            self.enter(TrackerPhase::Tracking(idx + 1));
            tracing::info!("[{}/{}] {}", idx + 1, total, entry.name);

            summary.attempted += 1;
            match self.track_item(entry).await {
                Ok(observation) => {
                    tracing::info!(
                        "[{}] {} from_price={:?} sellers={:?}",
                        observation.scrape_status.as_str().to_uppercase(),
                        entry.name,
                        observation.from_price,
                        observation.seller_count
                    );
                    summary.record(observation.scrape_status);
                }
                Err(e) => {
                    tracing::error!("[STORAGE] {} not recorded: {}", entry.link, e);
                    summary.record_storage_error();
                }
            }

            if idx + 1 < total {
                let pause = self.inter_item_delay();
                tracing::debug!("Waiting {:?} before next item", pause);
                tokio::time::sleep(pause).await;
            }
        }

        self.enter(TrackerPhase::Summarizing);
        summary.finished_at = Some(Utc::now());
        tracing::info!(
            "[SUMMARY] attempted={} success={} partial={} failure={} storage_error={}",
            summary.attempted,
            summary.success,
            summary.partial,
            summary.failure,
            summary.storage_error
        );

        self.enter(TrackerPhase::Done);
        summary
    }

    /// Upsert, scrape and record one item.
    ///
    /// Scrape failures come back as a `failure` observation. Only storage
    /// errors are returned as `Err`.
    async fn track_item(&self, entry: &PortfolioEntry) -> Result<PriceObservation, StorageError> {
        let item = TrackedItem::from_entry(entry, Utc::now());
        let outcome = self.store.upsert_item(&item).await?;
        tracing::debug!("Registry {:?} for {}", outcome, entry.link);

        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.config.fetch_timeout;
        let link = entry.link.as_str();

        let scraped = with_retry(&self.retry, link, |attempt| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                tracing::debug!("Attempt {} for {}", attempt, link);
                let page = fetcher.fetch(link, timeout).await?;
                let listing = parse_listing(&page)?;
                Ok::<_, ScrapeError>(listing)
            }
        })
        .await;

        let scraped_at = Utc::now();
        let observation = match &scraped.result {
            Ok(listing) => PriceObservation::from_parsed(link, listing, scraped_at),
            Err(e) => PriceObservation::failure(link, e, scraped_at),
        };

        self.store.append_observation(&observation).await?;
        Ok(observation)
    }

    fn inter_item_delay(&self) -> Duration {
        let min = self.config.min_inter_item_delay.as_millis() as u64;
        let max = self.config.max_inter_item_delay.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Latest known price, value and profit for every registered item
    pub async fn build_report(&self) -> Result<PortfolioReport, StorageError> {
        build_report(self.store.as_ref()).await
    }
}

pub async fn build_report(store: &dyn PriceStore) -> Result<PortfolioReport, StorageError> {
    let items = store.items().await?;
    let mut report = PortfolioReport {
        total_items: items.len(),
        ..Default::default()
    };

    for item in items {
        let latest = store
            .history(&item.link, None)
            .await?
            .into_iter()
            .rev()
            .find(PriceObservation::is_success);

        let current_price = latest.as_ref().and_then(|o| o.from_price);
        let quantity = Decimal::from(item.quantity);
        let current_value = current_price.map(|p| p * quantity);
        let profit = match (current_value, item.purchase_price) {
            (Some(value), Some(paid)) => Some(value - paid * quantity),
            _ => None,
        };

        if let Some(value) = current_value {
            report.total_value += value;
        }

        report.items.push(ItemReport {
            name: item.name,
            link: item.link,
            quantity: item.quantity,
            purchase_price: item.purchase_price,
            current_price,
            last_updated: latest.map(|o| o.scraped_at),
            current_value,
            profit,
        });
    }

    Ok(report)
}
