//! Portfolio definition loader
//!
//! Reads the user's portfolio CSV (`link, name, purchase_date, quantity,
//! purchase_price`). Spreadsheet exports with `Link, Name, Date, Quantity,
//! Price` headers and a leading BOM are accepted too.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::PortfolioError;
use crate::models::PortfolioEntry;
use crate::scrapers::parser::parse_price;

#[derive(Debug, Deserialize)]
struct PortfolioRow {
    #[serde(default, alias = "Link", alias = "\u{feff}Link", alias = "\u{feff}link")]
    link: Option<String>,
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(default, alias = "Date")]
    purchase_date: Option<String>,
    #[serde(default, alias = "Quantity")]
    quantity: Option<String>,
    #[serde(default, alias = "Price")]
    purchase_price: Option<String>,
}

/// Load and validate the portfolio.
///
/// Rows without a link or name, or with an unusable quantity/price, are
/// skipped with a warning. A link listed twice keeps its first position and
/// takes the fields of its last row.
pub fn load_portfolio(path: &Path) -> Result<Vec<PortfolioEntry>, PortfolioError> {
    let unreadable = |reason: String| PortfolioError::Unreadable {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| unreadable(e.to_string()))?;

    // Force header parsing so a binary or broken file fails here
    reader.headers().map_err(|e| unreadable(e.to_string()))?;

    let mut entries: Vec<PortfolioEntry> = Vec::new();
    let mut index_by_link: HashMap<String, usize> = HashMap::new();

    for (idx, row) in reader.deserialize::<PortfolioRow>().enumerate() {
        let line = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("[SKIP] Portfolio line {}: {}", line, e);
                continue;
            }
        };

        let entry = match validate_row(row) {
            Ok(entry) => entry,
            Err(reason) => {
                tracing::warn!("[SKIP] Portfolio line {}: {}", line, reason);
                continue;
            }
        };

        match index_by_link.get(&entry.link) {
            Some(&existing) => {
                tracing::warn!(
                    "[DUPLICATE] {} listed again on line {}, using the later definition",
                    entry.link,
                    line
                );
                entries[existing] = entry;
            }
            None => {
                tracing::info!("[LOAD] Loaded: {}", entry.name);
                index_by_link.insert(entry.link.clone(), entries.len());
                entries.push(entry);
            }
        }
    }

    if entries.is_empty() {
        return Err(PortfolioError::Empty(path.display().to_string()));
    }

    tracing::info!("[SUCCESS] Loaded {} items from {}", entries.len(), path.display());
    Ok(entries)
}

fn validate_row(row: PortfolioRow) -> Result<PortfolioEntry, String> {
    let link = row.link.unwrap_or_default();
    let name = row.name.unwrap_or_default();
    if link.is_empty() || name.is_empty() {
        return Err(format!("missing link or name (link={:?}, name={:?})", link, name));
    }

    let quantity = match row.quantity.as_deref().filter(|q| !q.is_empty()) {
        None => 1,
        Some(q) => match q.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return Err(format!("quantity must be a positive integer, got {:?}", q)),
        },
    };

    let purchase_price = match row.purchase_price.as_deref().filter(|p| !p.is_empty()) {
        None => None,
        Some(p) => Some(parse_purchase_price(p)?),
    };

    Ok(PortfolioEntry {
        link,
        name,
        purchase_date: row.purchase_date.unwrap_or_default(),
        quantity,
        purchase_price,
    })
}

fn parse_purchase_price(text: &str) -> Result<Decimal, String> {
    if text.starts_with('-') {
        return Err(format!("purchase price must not be negative, got {:?}", text));
    }
    parse_price(text).ok_or_else(|| format!("unreadable purchase price {:?}", text))
}
