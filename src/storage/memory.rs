use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::{PriceStore, select_history, select_recent};
use crate::error::StorageError;
use crate::models::tracked_item::merge_into_registry;
use crate::models::{PriceObservation, TrackedItem, UpsertOutcome};

/// In-process store with the same semantics as the file-backed one.
///
/// Nothing survives the process; used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<TrackedItem>>,
    observations: Mutex<Vec<PriceObservation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored observation in insertion order
    pub fn observations(&self) -> Vec<PriceObservation> {
        self.observations.lock().clone()
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn upsert_item(&self, item: &TrackedItem) -> Result<UpsertOutcome, StorageError> {
        let mut items = self.items.lock();
        let position = items.iter().position(|i| i.link == item.link);
        let (outcome, row) = merge_into_registry(position.map(|p| &items[p]), item);

        match (outcome, position) {
            (UpsertOutcome::Unchanged, _) => {}
            (_, Some(p)) => items[p] = row,
            (_, None) => items.push(row),
        }

        Ok(outcome)
    }

    async fn append_observation(&self, observation: &PriceObservation) -> Result<(), StorageError> {
        self.observations.lock().push(observation.clone());
        Ok(())
    }

    async fn items(&self) -> Result<Vec<TrackedItem>, StorageError> {
        Ok(self.items.lock().clone())
    }

    async fn history(
        &self,
        link: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceObservation>, StorageError> {
        Ok(select_history(self.observations.lock().iter(), link, since))
    }

    async fn recent_observations(&self, window: Duration) -> Result<Vec<PriceObservation>, StorageError> {
        Ok(select_recent(self.observations.lock().iter(), window))
    }
}
