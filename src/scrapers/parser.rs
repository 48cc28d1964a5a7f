use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::str::FromStr;

use super::{ParsedListing, RawPage, SellerPrice};
use crate::error::ParseError;

/// Most offers kept per observation
pub const MAX_SELLER_PRICES: usize = 50;

pub const LABEL_AVAILABLE_ITEMS: &str = "Available items";
pub const LABEL_FROM: &str = "From";
pub const LABEL_PRICE_TREND: &str = "Price Trend";
pub const LABEL_AVG_30_DAYS: &str = "30-days average price";
pub const LABEL_AVG_7_DAYS: &str = "7-days average price";
pub const LABEL_AVG_1_DAY: &str = "1-day average price";

lazy_static! {
    // First number-looking run: "1.234,56 €" -> "1.234,56"
    static ref NUMBER_REGEX: Regex = Regex::new(r"\d[\d.,]*").unwrap();

    // "1,234" / "1.234.567" style thousands grouping
    static ref GROUPED_REGEX: Regex = Regex::new(r"^\d{1,3}([.,]\d{3})+$").unwrap();

    static ref DT_SELECTOR: Selector = Selector::parse("dl dt").unwrap();
    static ref OFFER_ROW_SELECTOR: Selector = Selector::parse("div.article-row").unwrap();
    static ref OFFER_PRICE_SELECTOR: Selector = Selector::parse(".price-container span").unwrap();
}

/// Extract price fields from a listing page.
///
/// Secondary fields that are not on the page stay `None` and are listed in
/// `missing_fields`. Only a missing "From" label fails the parse.
pub fn parse_listing(page: &RawPage) -> Result<ParsedListing, ParseError> {
    let document = Html::parse_document(&page.html);
    let info = extract_info_rows(&document);

    let Some(from_text) = info.get(&normalize_label(LABEL_FROM)) else {
        return Err(ParseError::LayoutChanged(format!(
            "'{}' label not found on {}",
            LABEL_FROM, page.final_url
        )));
    };

    let mut missing = Vec::new();

    let available_items = lookup(&info, LABEL_AVAILABLE_ITEMS, &mut missing).and_then(parse_count);
    let price_trend = lookup(&info, LABEL_PRICE_TREND, &mut missing).and_then(parse_price);
    let avg_30_days = lookup(&info, LABEL_AVG_30_DAYS, &mut missing).and_then(parse_price);
    let avg_7_days = lookup(&info, LABEL_AVG_7_DAYS, &mut missing).and_then(parse_price);
    let avg_1_day = lookup(&info, LABEL_AVG_1_DAY, &mut missing).and_then(parse_price);

    let (offers_found, seller_prices) = extract_seller_prices(&document);

    Ok(ParsedListing {
        available_items,
        // "N/A" when nothing is listed; that is a valid, empty listing
        from_price: parse_price(from_text),
        price_trend,
        avg_30_days,
        avg_7_days,
        avg_1_day,
        seller_prices,
        offers_found,
        missing_fields: missing,
    })
}

/// True when the page carries the listing's "From" summary row
pub fn has_price_summary(document: &Html) -> bool {
    extract_info_rows(document).contains_key(&normalize_label(LABEL_FROM))
}

/// Map every `<dt>` label inside a `<dl>` to the text of the `<dd>` right after it
fn extract_info_rows(document: &Html) -> HashMap<String, String> {
    let mut rows = HashMap::new();

    for dt in document.select(&DT_SELECTOR) {
        let label = normalize_label(&element_text(&dt));
        if label.is_empty() || rows.contains_key(&label) {
            continue;
        }

        let value = dt
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|el| el.value().name() == "dd")
            .map(|dd| element_text(&dd));

        if let Some(value) = value {
            rows.insert(label, value);
        }
    }

    rows
}

fn lookup<'a>(
    info: &'a HashMap<String, String>,
    label: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<&'a str> {
    match info.get(&normalize_label(label)) {
        Some(value) => Some(value.as_str()),
        None => {
            missing.push(label);
            None
        }
    }
}

/// Offer rows in page order. Returns whether the offer table exists at all.
fn extract_seller_prices(document: &Html) -> (bool, Vec<SellerPrice>) {
    let mut found = false;
    let mut prices = Vec::new();

    for row in document.select(&OFFER_ROW_SELECTOR) {
        found = true;

        let price = row
            .select(&OFFER_PRICE_SELECTOR)
            .find_map(|span| parse_price(&element_text(&span)));

        if let Some(price) = price {
            prices.push(SellerPrice {
                rank: prices.len() as u32 + 1,
                price,
            });
        }

        if prices.len() >= MAX_SELLER_PRICES {
            break;
        }
    }

    (found, prices)
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Parse a marketplace price in either European or English notation.
///
/// "127,50 €" -> 127.50, "1.234,56 €" -> 1234.56, "1,234.56 €" -> 1234.56
pub fn parse_price(text: &str) -> Option<Decimal> {
    let raw = NUMBER_REGEX.find(text)?.as_str();
    let raw = raw.trim_end_matches(['.', ',']);

    let normalized = match (raw.rfind(','), raw.rfind('.')) {
        // Both separators: whichever comes last is the decimal point
        (Some(comma), Some(dot)) if comma > dot => raw.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => raw.replace(',', ""),
        _ if GROUPED_REGEX.is_match(raw) && raw.matches(['.', ',']).count() > 1 => {
            raw.replace(['.', ','], "")
        }
        (Some(_), None) if GROUPED_REGEX.is_match(raw) => raw.replace(',', ""),
        (Some(_), None) => raw.replace(',', "."),
        _ => raw.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}

/// Parse an item count, ignoring thousands separators.
pub fn parse_count(text: &str) -> Option<u32> {
    let raw = NUMBER_REGEX.find(text)?.as_str();
    raw.replace(['.', ','], "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn page(body: &str) -> RawPage {
        RawPage {
            html: format!("<html><body>{}</body></html>", body),
            final_url: "https://www.cardmarket.com/en/Magic/Products/Singles/Test/Card".into(),
        }
    }

    const INFO_BLOCK: &str = r#"
        <dl class="labeled row no-gutters mx-auto">
            <dt class="col-6 col-xl-5">Available items</dt><dd class="col-6 col-xl-7">1.234</dd>
            <dt class="col-6 col-xl-5">From</dt><dd class="col-6 col-xl-7">12,50 €</dd>
            <dt class="col-6 col-xl-5">Price Trend</dt><dd class="col-6 col-xl-7"><span>13,10 €</span></dd>
            <dt class="col-6 col-xl-5">30-days average price</dt><dd class="col-6 col-xl-7"><span>14,00 €</span></dd>
            <dt class="col-6 col-xl-5">7-days average price</dt><dd class="col-6 col-xl-7"><span>13,50 €</span></dd>
            <dt class="col-6 col-xl-5">1-day average price</dt><dd class="col-6 col-xl-7"><span>12,90 €</span></dd>
        </dl>
    "#;

    fn offer_row(price: &str) -> String {
        format!(
            r#"<div class="row g-0 article-row">
                <div class="col-sellerProductInfo">Seller</div>
                <div class="col-offer"><div class="price-container d-none d-md-flex">
                    <div class="d-flex flex-column"><span class="color-primary small text-end text-nowrap fw-bold">{}</span></div>
                </div></div>
            </div>"#,
            price
        )
    }

    #[test]
    fn test_parse_full_listing() {
        let body = format!(
            "{}<div class=\"table-body\">{}{}{}</div>",
            INFO_BLOCK,
            offer_row("12,50 €"),
            offer_row("12,95 €"),
            offer_row("1.250,00 €")
        );

        let parsed = parse_listing(&page(&body)).unwrap();
        assert_eq!(parsed.available_items, Some(1234));
        assert_eq!(parsed.from_price, Some(dec!(12.50)));
        assert_eq!(parsed.price_trend, Some(dec!(13.10)));
        assert_eq!(parsed.avg_30_days, Some(dec!(14.00)));
        assert_eq!(parsed.avg_7_days, Some(dec!(13.50)));
        assert_eq!(parsed.avg_1_day, Some(dec!(12.90)));
        assert!(parsed.offers_found);
        assert!(parsed.missing_fields.is_empty());
        assert_eq!(
            parsed.seller_prices,
            vec![
                SellerPrice { rank: 1, price: dec!(12.50) },
                SellerPrice { rank: 2, price: dec!(12.95) },
                SellerPrice { rank: 3, price: dec!(1250.00) },
            ]
        );
    }

    #[test]
    fn test_missing_seller_list_is_not_an_error() {
        let parsed = parse_listing(&page(INFO_BLOCK)).unwrap();
        assert_eq!(parsed.from_price, Some(dec!(12.50)));
        assert!(!parsed.offers_found);
        assert!(parsed.seller_prices.is_empty());
        assert!(parsed.missing_fields.is_empty());
    }

    #[test]
    fn test_missing_core_price_is_layout_change() {
        let body = r#"<dl><dt>Available items</dt><dd>3</dd><dt>Price Trend</dt><dd>1,00 €</dd></dl>"#;
        let err = parse_listing(&page(body)).unwrap_err();
        assert!(matches!(err, ParseError::LayoutChanged(_)));
    }

    #[test]
    fn test_no_listings_is_valid_with_null_price() {
        let body = r#"<dl>
            <dt>Available items</dt><dd>0</dd>
            <dt>From</dt><dd>N/A</dd>
            <dt>Price Trend</dt><dd><span>2,00 €</span></dd>
            <dt>30-days average price</dt><dd><span>2,10 €</span></dd>
            <dt>7-days average price</dt><dd><span>2,05 €</span></dd>
            <dt>1-day average price</dt><dd><span>N/A</span></dd>
        </dl>"#;

        let parsed = parse_listing(&page(body)).unwrap();
        assert_eq!(parsed.available_items, Some(0));
        assert_eq!(parsed.from_price, None);
        assert_eq!(parsed.avg_1_day, None);
        assert!(parsed.missing_fields.is_empty());
    }

    #[test]
    fn test_missing_secondary_label_is_reported() {
        let body = r#"<dl>
            <dt>Available items</dt><dd>7</dd>
            <dt>From</dt><dd>3,00 €</dd>
            <dt>Price Trend</dt><dd><span>3,20 €</span></dd>
        </dl>"#;

        let parsed = parse_listing(&page(body)).unwrap();
        assert_eq!(parsed.from_price, Some(dec!(3.00)));
        assert_eq!(
            parsed.missing_fields,
            vec![LABEL_AVG_30_DAYS, LABEL_AVG_7_DAYS, LABEL_AVG_1_DAY]
        );
    }

    #[test]
    fn test_seller_prices_are_capped() {
        let rows: String = (1..=60).map(|i| offer_row(&format!("{},00 €", i))).collect();
        let body = format!("{}{}", INFO_BLOCK, rows);

        let parsed = parse_listing(&page(&body)).unwrap();
        assert_eq!(parsed.seller_prices.len(), MAX_SELLER_PRICES);
        assert_eq!(parsed.seller_prices[49].rank, 50);
        assert_eq!(parsed.seller_prices[49].price, dec!(50.00));
    }

    #[test]
    fn test_parse_price_formats() {
        assert_eq!(parse_price("127,50 €"), Some(dec!(127.50)));
        assert_eq!(parse_price("1,234.56 €"), Some(dec!(1234.56)));
        assert_eq!(parse_price("1.234,56 €"), Some(dec!(1234.56)));
        assert_eq!(parse_price("0,02 €"), Some(dec!(0.02)));
        assert_eq!(parse_price("15 €"), Some(dec!(15)));
        assert_eq!(parse_price("1.234.567,00 €"), Some(dec!(1234567.00)));
        assert_eq!(parse_price("N/A"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("1.234"), Some(1234));
        assert_eq!(parse_count(" 42 "), Some(42));
        assert_eq!(parse_count("none"), None);
    }
}
