mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::io::Write;
use tempfile::TempDir;

use card_price_tracker::error::{FetchError, ScrapeError};
use card_price_tracker::models::{PortfolioEntry, PriceObservation, TrackedItem, UpsertOutcome};
use card_price_tracker::storage::{CsvStore, PriceStore};

use crate::common::{LINK_A, LINK_B};

fn tracked(link: &str, quantity: u32) -> TrackedItem {
    let entry = PortfolioEntry {
        link: link.to_string(),
        name: "Black Lotus".to_string(),
        purchase_date: "2024-01-15".to_string(),
        quantity,
        purchase_price: Some(dec!(9500.00)),
    };
    TrackedItem::from_entry(&entry, Utc::now())
}

fn failed(link: &str, at: chrono::DateTime<Utc>) -> PriceObservation {
    let err = ScrapeError::from(FetchError::network("connection reset"));
    PriceObservation::failure(link, &err, at)
}

#[tokio::test]
async fn test_registry_survives_reopen_and_stays_idempotent() {
    let dir = TempDir::new().unwrap();

    {
        let store = CsvStore::open(dir.path()).unwrap();
        assert_eq!(store.upsert_item(&tracked(LINK_A, 1)).await.unwrap(), UpsertOutcome::Created);
    }

    let store = CsvStore::open(dir.path()).unwrap();
    assert_eq!(store.upsert_item(&tracked(LINK_A, 1)).await.unwrap(), UpsertOutcome::Unchanged);
    assert_eq!(store.upsert_item(&tracked(LINK_A, 2)).await.unwrap(), UpsertOutcome::Updated);

    let items = store.items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert!(items[0].updated_at >= items[0].created_at);
}

#[tokio::test]
async fn test_history_filters_by_link_and_since() {
    let dir = TempDir::new().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();
    let now = Utc::now();

    store.append_observation(&failed(LINK_A, now - Duration::hours(5))).await.unwrap();
    store.append_observation(&failed(LINK_B, now - Duration::hours(1))).await.unwrap();
    store.append_observation(&failed(LINK_A, now - Duration::minutes(30))).await.unwrap();

    assert_eq!(store.history(LINK_A, None).await.unwrap().len(), 2);
    assert_eq!(
        store.history(LINK_A, Some(now - Duration::hours(2))).await.unwrap().len(),
        1
    );

    let recent = store.recent_observations(Duration::hours(2)).await.unwrap();
    let links: Vec<&str> = recent.iter().map(|o| o.item_link.as_str()).collect();
    assert_eq!(links, vec![LINK_B, LINK_A]);
}

#[tokio::test]
async fn test_rows_before_a_torn_write_stay_readable() {
    let dir = TempDir::new().unwrap();
    let store = CsvStore::open(dir.path()).unwrap();

    for _ in 0..3 {
        store.append_observation(&failed(LINK_A, Utc::now())).await.unwrap();
    }

    // Simulate a process killed halfway through an append
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(store.history_path())
        .unwrap();
    file.write_all(b"https://www.cardmarket.com/en/Magic/Products/Singles/Alpha/Black-Lo")
        .unwrap();
    drop(file);

    let reopened = CsvStore::open(dir.path()).unwrap();
    assert_eq!(reopened.history(LINK_A, None).await.unwrap().len(), 3);

    reopened.append_observation(&failed(LINK_A, Utc::now())).await.unwrap();
    assert_eq!(reopened.history(LINK_A, None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_concurrent_appends_keep_every_row() {
    let dir = TempDir::new().unwrap();
    let first = CsvStore::open(dir.path()).unwrap();
    let second = CsvStore::open(dir.path()).unwrap();

    let mut handles = Vec::new();
    for store in [first.clone(), second.clone()] {
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                store.append_observation(&failed(LINK_B, Utc::now())).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(first.history(LINK_B, None).await.unwrap().len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_keep_every_item() {
    for round in 0..20 {
        let dir = TempDir::new().unwrap();
        let first = CsvStore::open(dir.path()).unwrap();
        let second = CsvStore::open(dir.path()).unwrap();

        let link_a = format!("https://a/{}", round);
        let link_b = format!("https://b/{}", round);
        let item_a = tracked(&link_a, 1);
        let item_b = tracked(&link_b, 1);

        let (a, b) = tokio::join!(first.upsert_item(&item_a), second.upsert_item(&item_b));
        assert_eq!(a.unwrap(), UpsertOutcome::Created);
        assert_eq!(b.unwrap(), UpsertOutcome::Created);

        let mut links: Vec<String> = first.items().await.unwrap().into_iter().map(|i| i.link).collect();
        links.sort();
        assert_eq!(links, vec![link_a, link_b], "round {}", round);
    }
}
