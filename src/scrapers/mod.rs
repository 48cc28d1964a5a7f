pub mod browser;
pub mod http;
pub mod parser;
pub mod retry;

use async_trait::async_trait;
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FetchError, FetchErrorKind};

pub const MARKETPLACE_BASE_URL: &str = "https://www.cardmarket.com";

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Markup of a loaded listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub html: String,
    pub final_url: String,
}

/// One offer on a listing, ranked by position on the page (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerPrice {
    pub rank: u32,
    pub price: Decimal,
}

/// Fields extracted from a listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedListing {
    pub available_items: Option<u32>,
    pub from_price: Option<Decimal>,
    pub price_trend: Option<Decimal>,
    pub avg_30_days: Option<Decimal>,
    pub avg_7_days: Option<Decimal>,
    pub avg_1_day: Option<Decimal>,
    pub seller_prices: Vec<SellerPrice>,
    /// Whether the offer table was present at all
    pub offers_found: bool,
    /// Summary labels that were not on the page
    pub missing_fields: Vec<&'static str>,
}

/// Loads one listing page.
///
/// Implementations own whatever session they need and release it before
/// returning, on success and on every error path.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawPage, FetchError>;
}

lazy_static! {
    static ref TITLE_SELECTOR: Selector = Selector::parse("title").unwrap();
    static ref HEADING_SELECTOR: Selector = Selector::parse("h1").unwrap();
    static ref CHALLENGE_SELECTOR: Selector =
        Selector::parse("#challenge-form, #challenge-stage, #cf-challenge-running, .cf-turnstile").unwrap();
}

const CHALLENGE_TITLES: &[&str] = &[
    "just a moment...",
    "attention required! | cloudflare",
];

const NOT_FOUND_HEADINGS: &[&str] = &[
    "this product does not exist",
    "product not found",
    "page not found",
    "the page you requested could not be found",
];

/// Recognize pages that loaded but are not a listing.
///
/// A page with the "From" summary row is always a listing, whatever scripts
/// or widgets it embeds. Otherwise only the title, the challenge widgets and
/// the main heading are inspected. Challenge pages win over "not found".
pub fn classify_page(html: &str) -> Option<FetchErrorKind> {
    let document = Html::parse_document(html);

    if parser::has_price_summary(&document) {
        return None;
    }

    let title = first_text(&document, &TITLE_SELECTOR);
    if CHALLENGE_TITLES.iter().any(|t| title == *t)
        || document.select(&CHALLENGE_SELECTOR).next().is_some()
    {
        return Some(FetchErrorKind::Blocked);
    }

    let heading = first_text(&document, &HEADING_SELECTOR);
    if NOT_FOUND_HEADINGS
        .iter()
        .any(|m| heading.contains(m) || title.contains(m))
    {
        return Some(FetchErrorKind::NotFound);
    }

    None
}

fn first_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .unwrap_or_default()
}

/// Map an HTTP status of the listing response to a fetch failure, if any.
pub fn classify_status(status: u16) -> Option<FetchErrorKind> {
    match status {
        200..=299 => None,
        403 | 429 => Some(FetchErrorKind::Blocked),
        404 | 410 => Some(FetchErrorKind::NotFound),
        408 | 504 => Some(FetchErrorKind::Timeout),
        500..=599 => Some(FetchErrorKind::Network),
        _ => Some(FetchErrorKind::Unknown),
    }
}

/// Turn a loaded page into either a `RawPage` or the failure it represents.
pub fn checked_page(html: String, final_url: String) -> Result<RawPage, FetchError> {
    match classify_page(&html) {
        Some(kind) => Err(FetchError::new(
            kind,
            format!("{} returned a {} page", final_url, kind),
        )),
        None => Ok(RawPage { html, final_url }),
    }
}
