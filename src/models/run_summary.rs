//! Run summary and portfolio report models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::price_observation::ScrapeStatus;

/// Counts for one tracker run, handed to the external reporter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub success: usize,
    pub failure: usize,
    pub partial: usize,
    pub storage_error: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn record(&mut self, status: ScrapeStatus) {
        match status {
            ScrapeStatus::Success => self.success += 1,
            ScrapeStatus::Failure => self.failure += 1,
            ScrapeStatus::Partial => self.partial += 1,
        }
    }

    pub fn record_storage_error(&mut self) {
        self.storage_error += 1;
    }
}

/// Latest known state of one tracked item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub name: String,
    pub link: String,
    pub quantity: u32,
    pub purchase_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub last_updated: Option<DateTime<Utc>>,
    /// quantity * current_price
    pub current_value: Option<Decimal>,
    /// current_value - quantity * purchase_price
    pub profit: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioReport {
    pub total_items: usize,
    pub total_value: Decimal,
    pub items: Vec<ItemReport>,
}
