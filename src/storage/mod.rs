//! Price history storage
//!
//! Two tables: the item registry (one row per link, upserted) and the price
//! history (append-only). Backends must keep previously committed rows
//! intact when a write is interrupted.

pub mod csv_store;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;
use crate::models::{PriceObservation, TrackedItem, UpsertOutcome};

pub use csv_store::CsvStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Insert or update a registry row keyed by `link`. Idempotent.
    async fn upsert_item(&self, item: &TrackedItem) -> Result<UpsertOutcome, StorageError>;

    /// Append one observation. Never overwrites, never deduplicates.
    async fn append_observation(&self, observation: &PriceObservation) -> Result<(), StorageError>;

    async fn items(&self) -> Result<Vec<TrackedItem>, StorageError>;

    /// Observations for `link`, oldest first, ties in insertion order
    async fn history(
        &self,
        link: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceObservation>, StorageError>;

    async fn latest_observation(&self, link: &str) -> Result<Option<PriceObservation>, StorageError> {
        Ok(self.history(link, None).await?.pop())
    }

    /// All observations scraped within `window` of now, oldest first
    async fn recent_observations(&self, window: Duration) -> Result<Vec<PriceObservation>, StorageError>;
}

/// Keep observations for `link` at or after `since`, ordered by `scraped_at`.
///
/// The sort is stable, so equal timestamps stay in insertion order.
pub(crate) fn select_history<'a, I>(
    observations: I,
    link: &str,
    since: Option<DateTime<Utc>>,
) -> Vec<PriceObservation>
where
    I: IntoIterator<Item = &'a PriceObservation>,
{
    let mut selected: Vec<PriceObservation> = observations
        .into_iter()
        .filter(|o| o.item_link == link)
        .filter(|o| since.is_none_or(|s| o.scraped_at >= s))
        .cloned()
        .collect();
    selected.sort_by_key(|o| o.scraped_at);
    selected
}

pub(crate) fn select_recent<'a, I>(observations: I, window: Duration) -> Vec<PriceObservation>
where
    I: IntoIterator<Item = &'a PriceObservation>,
{
    let cutoff = Utc::now() - window;
    let mut selected: Vec<PriceObservation> = observations
        .into_iter()
        .filter(|o| o.scraped_at >= cutoff)
        .cloned()
        .collect();
    selected.sort_by_key(|o| o.scraped_at);
    selected
}
