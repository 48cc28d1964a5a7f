//! Tracked item registry models
//!
//! One row per marketplace listing the portfolio follows, keyed by `link`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A portfolio entry as read from the portfolio definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioEntry {
    pub link: String,
    pub name: String,
    pub purchase_date: String,
    pub quantity: u32,
    pub purchase_price: Option<Decimal>,
}

/// A registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub link: String,
    pub name: String,
    #[serde(default)]
    pub purchase_date: String,
    pub quantity: u32,
    pub purchase_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedItem {
    pub fn from_entry(entry: &PortfolioEntry, now: DateTime<Utc>) -> Self {
        Self {
            link: entry.link.clone(),
            name: entry.name.clone(),
            purchase_date: entry.purchase_date.clone(),
            quantity: entry.quantity,
            purchase_price: entry.purchase_price,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the user-editable fields match; timestamps are ignored.
    pub fn same_definition(&self, other: &TrackedItem) -> bool {
        self.link == other.link
            && self.name == other.name
            && self.purchase_date == other.purchase_date
            && self.quantity == other.quantity
            && self.purchase_price == other.purchase_price
    }

    /// Merge an incoming definition into the stored row.
    ///
    /// Keeps `created_at`; `updated_at` never moves backwards.
    pub fn merged_with(&self, incoming: &TrackedItem) -> TrackedItem {
        TrackedItem {
            link: self.link.clone(),
            name: incoming.name.clone(),
            purchase_date: incoming.purchase_date.clone(),
            quantity: incoming.quantity,
            purchase_price: incoming.purchase_price,
            created_at: self.created_at,
            updated_at: std::cmp::max(self.updated_at, incoming.updated_at),
        }
    }
}

/// What an upsert did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Decide how `incoming` lands in a registry already holding `existing`.
pub fn merge_into_registry(
    existing: Option<&TrackedItem>,
    incoming: &TrackedItem,
) -> (UpsertOutcome, TrackedItem) {
    match existing {
        None => (UpsertOutcome::Created, incoming.clone()),
        Some(current) if current.same_definition(incoming) => {
            (UpsertOutcome::Unchanged, current.clone())
        }
        Some(current) => (UpsertOutcome::Updated, current.merged_with(incoming)),
    }
}
