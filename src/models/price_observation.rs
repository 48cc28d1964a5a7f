//! Price observation models
//!
//! An observation is one scrape attempt for one listing. Failures are
//! observations too, so the history shows every attempt.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ParseError, ScrapeError};
use crate::scrapers::ParsedListing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeStatus {
    Success,
    Failure,
    Partial,
}

impl ScrapeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStatus::Success => "success",
            ScrapeStatus::Failure => "failure",
            ScrapeStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub item_link: String,
    pub available_items: Option<u32>,
    pub from_price: Option<Decimal>,
    pub price_trend: Option<Decimal>,
    pub avg_30_days: Option<Decimal>,
    pub avg_7_days: Option<Decimal>,
    pub avg_1_day: Option<Decimal>,
    pub min_seller_price: Option<Decimal>,
    pub max_seller_price: Option<Decimal>,
    pub seller_count: Option<u32>,
    /// Seller prices in page (rank) order
    pub seller_prices: Vec<Decimal>,
    pub scraped_at: DateTime<Utc>,
    pub scrape_status: ScrapeStatus,
    pub error_message: Option<String>,
}

impl PriceObservation {
    /// Observation for a page that parsed.
    ///
    /// Status is `partial` when any summary label was missing from the page.
    pub fn from_parsed(link: &str, parsed: &ParsedListing, scraped_at: DateTime<Utc>) -> Self {
        let (status, error_message) = if parsed.missing_fields.is_empty() {
            (ScrapeStatus::Success, None)
        } else {
            let err = ParseError::FieldMissing(parsed.missing_fields.join(", "));
            (ScrapeStatus::Partial, Some(err.to_string()))
        };

        let prices: Vec<Decimal> = parsed.seller_prices.iter().map(|s| s.price).collect();

        Self {
            item_link: link.to_string(),
            available_items: parsed.available_items,
            from_price: parsed.from_price,
            price_trend: parsed.price_trend,
            avg_30_days: parsed.avg_30_days,
            avg_7_days: parsed.avg_7_days,
            avg_1_day: parsed.avg_1_day,
            min_seller_price: prices.iter().min().copied(),
            max_seller_price: prices.iter().max().copied(),
            seller_count: parsed.offers_found.then_some(prices.len() as u32),
            seller_prices: prices,
            scraped_at,
            scrape_status: status,
            error_message,
        }
    }

    /// Observation for an attempt that produced no usable page.
    pub fn failure(link: &str, error: &ScrapeError, scraped_at: DateTime<Utc>) -> Self {
        Self {
            item_link: link.to_string(),
            available_items: None,
            from_price: None,
            price_trend: None,
            avg_30_days: None,
            avg_7_days: None,
            avg_1_day: None,
            min_seller_price: None,
            max_seller_price: None,
            seller_count: None,
            seller_prices: Vec::new(),
            scraped_at,
            scrape_status: ScrapeStatus::Failure,
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.scrape_status == ScrapeStatus::Success
    }
}
