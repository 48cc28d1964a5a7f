#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use card_price_tracker::config::TrackerConfig;
use card_price_tracker::error::{FetchError, StorageError};
use card_price_tracker::models::{PriceObservation, TrackedItem, UpsertOutcome};
use card_price_tracker::scrapers::{PageFetcher, RawPage};
use card_price_tracker::storage::{MemoryStore, PriceStore};

pub const LINK_A: &str = "https://www.cardmarket.com/en/Magic/Products/Singles/Alpha/Black-Lotus";
pub const LINK_B: &str = "https://www.cardmarket.com/en/Pokemon/Products/Singles/Base-Set/Charizard";
pub const LINK_C: &str = "https://www.cardmarket.com/en/Magic/Products/Singles/Beta/Mox-Sapphire";

/// Config with every wait set to zero
pub fn instant_config(portfolio_path: &Path) -> TrackerConfig {
    TrackerConfig {
        portfolio_path: portfolio_path.to_path_buf(),
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: Duration::ZERO,
        min_inter_item_delay: Duration::ZERO,
        max_inter_item_delay: Duration::ZERO,
        ..Default::default()
    }
}

pub fn write_portfolio(dir: &Path, rows: &[(&str, &str)]) -> PathBuf {
    let mut contents = String::from("link,name,purchase_date,quantity,purchase_price\n");
    for (link, name) in rows {
        contents.push_str(&format!("{},{},2024-01-15,1,10.00\n", link, name));
    }
    let path = dir.join("portfolio.csv");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Listing page with every summary label and the given seller offers
pub fn listing_html(from: &str, offers: &[&str]) -> String {
    let rows: String = offers
        .iter()
        .map(|price| {
            format!(
                r#"<div class="row article-row"><div class="price-container"><span>{}</span></div></div>"#,
                price
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <dl>
            <dt>Available items</dt><dd>87</dd>
            <dt>From</dt><dd>{}</dd>
            <dt>Price Trend</dt><dd>5,20 €</dd>
            <dt>30-days average price</dt><dd>5,40 €</dd>
            <dt>7-days average price</dt><dd>5,10 €</dd>
            <dt>1-day average price</dt><dd>5,00 €</dd>
        </dl>
        <div class="table-body">{}</div>
        </body></html>"#,
        from, rows
    )
}

/// Listing page that lost its price trend row
pub fn listing_without_trend() -> String {
    r#"<html><body><dl>
        <dt>Available items</dt><dd>3</dd>
        <dt>From</dt><dd>2,00 €</dd>
        <dt>30-days average price</dt><dd>2,40 €</dd>
        <dt>7-days average price</dt><dd>2,10 €</dd>
        <dt>1-day average price</dt><dd>2,00 €</dd>
    </dl></body></html>"#
        .to_string()
}

/// Page without any price information block
pub fn redesigned_page() -> String {
    r#"<html><body><main class="product-v2"><h1>Black Lotus</h1></main></body></html>"#.to_string()
}

/// Fetcher that plays back scripted results per URL.
///
/// Once a URL's script is used up its last result repeats.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    last: Mutex<HashMap<String, Result<String, FetchError>>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, results: Vec<Result<String, FetchError>>) -> Self {
        self.scripts.lock().insert(url.to_string(), results.into());
        self
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<RawPage, FetchError> {
        *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;

        let next = self.scripts.lock().get_mut(url).and_then(|queue| queue.pop_front());
        let result = match next {
            Some(result) => {
                self.last.lock().insert(url.to_string(), result.clone());
                result
            }
            None => self
                .last
                .lock()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::not_found(format!("nothing scripted for {}", url)))),
        };

        result.map(|html| RawPage {
            html,
            final_url: url.to_string(),
        })
    }
}

/// Store whose appends fail for one link and work for everything else
pub struct FailingAppendStore {
    pub inner: MemoryStore,
    pub failing_link: String,
}

impl FailingAppendStore {
    pub fn new(failing_link: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_link: failing_link.to_string(),
        }
    }
}

#[async_trait]
impl PriceStore for FailingAppendStore {
    async fn upsert_item(&self, item: &TrackedItem) -> Result<UpsertOutcome, StorageError> {
        self.inner.upsert_item(item).await
    }

    async fn append_observation(&self, observation: &PriceObservation) -> Result<(), StorageError> {
        if observation.item_link == self.failing_link {
            return Err(StorageError::write("price_history.csv", "disk full"));
        }
        self.inner.append_observation(observation).await
    }

    async fn items(&self) -> Result<Vec<TrackedItem>, StorageError> {
        self.inner.items().await
    }

    async fn history(
        &self,
        link: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceObservation>, StorageError> {
        self.inner.history(link, since).await
    }

    async fn recent_observations(&self, window: ChronoDuration) -> Result<Vec<PriceObservation>, StorageError> {
        self.inner.recent_observations(window).await
    }
}
