//! Flat-file store: `portfolio_items.csv` and `price_history.csv`
//!
//! The registry is small and rewritten whole: write a temp file in the same
//! directory, fsync, rename over the old one. Readers see either the old or
//! the new registry, never a mix. The whole read-merge-write runs under an
//! exclusive advisory lock on `portfolio_items.lock`, so concurrent runs on
//! one data directory serialize their upserts instead of dropping rows.
//!
//! The history is append-only. Each observation is one newline-terminated
//! line written with a single append and fsync; a row counts as committed
//! once its newline is on disk. Readers drop an unterminated tail and skip
//! lines that do not parse, so a crash mid-append can only lose the row
//! being written.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fs4::fs_std::FileExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use super::{PriceStore, select_history, select_recent};
use crate::error::StorageError;
use crate::models::tracked_item::merge_into_registry;
use crate::models::{PriceObservation, ScrapeStatus, TrackedItem, UpsertOutcome};

pub const REGISTRY_FILE: &str = "portfolio_items.csv";
pub const HISTORY_FILE: &str = "price_history.csv";
pub const REGISTRY_LOCK_FILE: &str = "portfolio_items.lock";

/// Column order of the history file. `scraped_at` goes last so a row cut
/// short inside it no longer parses as a timestamp.
const HISTORY_COLUMNS: &[&str] = &[
    "item_link",
    "available_items",
    "from_price",
    "price_trend",
    "avg_30_days",
    "avg_7_days",
    "avg_1_day",
    "min_seller_price",
    "max_seller_price",
    "seller_count",
    "seller_prices_json",
    "scrape_status",
    "error_message",
    "scraped_at",
];

#[derive(Debug, Serialize, Deserialize)]
struct RegistryRow {
    link: String,
    name: String,
    purchase_date: String,
    quantity: u32,
    #[serde(with = "rust_decimal::serde::str_option")]
    purchase_price: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&TrackedItem> for RegistryRow {
    fn from(item: &TrackedItem) -> Self {
        Self {
            link: item.link.clone(),
            name: item.name.clone(),
            purchase_date: item.purchase_date.clone(),
            quantity: item.quantity,
            purchase_price: item.purchase_price,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

impl From<RegistryRow> for TrackedItem {
    fn from(row: RegistryRow) -> Self {
        Self {
            link: row.link,
            name: row.name,
            purchase_date: row.purchase_date,
            quantity: row.quantity,
            purchase_price: row.purchase_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    item_link: String,
    available_items: Option<u32>,
    #[serde(with = "rust_decimal::serde::str_option")]
    from_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    price_trend: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    avg_30_days: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    avg_7_days: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    avg_1_day: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    min_seller_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    max_seller_price: Option<Decimal>,
    seller_count: Option<u32>,
    seller_prices_json: String,
    scrape_status: ScrapeStatus,
    error_message: Option<String>,
    scraped_at: DateTime<Utc>,
}

impl HistoryRow {
    fn from_observation(obs: &PriceObservation) -> Result<Self, serde_json::Error> {
        let prices: Vec<String> = obs.seller_prices.iter().map(|p| p.to_string()).collect();

        Ok(Self {
            item_link: single_line(&obs.item_link),
            available_items: obs.available_items,
            from_price: obs.from_price,
            price_trend: obs.price_trend,
            avg_30_days: obs.avg_30_days,
            avg_7_days: obs.avg_7_days,
            avg_1_day: obs.avg_1_day,
            min_seller_price: obs.min_seller_price,
            max_seller_price: obs.max_seller_price,
            seller_count: obs.seller_count,
            seller_prices_json: serde_json::to_string(&prices)?,
            scrape_status: obs.scrape_status,
            error_message: obs.error_message.as_deref().map(single_line),
            scraped_at: obs.scraped_at,
        })
    }

    fn into_observation(self) -> Result<PriceObservation, String> {
        let prices: Vec<String> = if self.seller_prices_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.seller_prices_json).map_err(|e| e.to_string())?
        };
        let seller_prices = prices
            .iter()
            .map(|p| p.parse::<Decimal>().map_err(|e| format!("seller price {:?}: {}", p, e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PriceObservation {
            item_link: self.item_link,
            available_items: self.available_items,
            from_price: self.from_price,
            price_trend: self.price_trend,
            avg_30_days: self.avg_30_days,
            avg_7_days: self.avg_7_days,
            avg_1_day: self.avg_1_day,
            min_seller_price: self.min_seller_price,
            max_seller_price: self.max_seller_price,
            seller_count: self.seller_count,
            seller_prices,
            scraped_at: self.scraped_at,
            scrape_status: self.scrape_status,
            error_message: self.error_message,
        })
    }
}

/// One history row must stay one physical line
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[derive(Clone)]
pub struct CsvStore {
    files: Arc<CsvFiles>,
}

struct CsvFiles {
    dir: PathBuf,
    registry_path: PathBuf,
    history_path: PathBuf,
    lock_path: PathBuf,
}

impl CsvStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StorageError::write(dir.display(), e))?;

        let files = CsvFiles {
            registry_path: dir.join(REGISTRY_FILE),
            history_path: dir.join(HISTORY_FILE),
            lock_path: dir.join(REGISTRY_LOCK_FILE),
            dir,
        };
        files.init_history()?;

        tracing::debug!("Opened CSV store at {}", files.dir.display());

        Ok(Self {
            files: Arc::new(files),
        })
    }

    pub fn registry_path(&self) -> &Path {
        &self.files.registry_path
    }

    pub fn history_path(&self) -> &Path {
        &self.files.history_path
    }
}

impl CsvFiles {
    fn init_history(&self) -> Result<(), StorageError> {
        match OpenOptions::new().write(true).create_new(true).open(&self.history_path) {
            Ok(mut file) => {
                let header = format!("{}\n", HISTORY_COLUMNS.join(","));
                file.write_all(header.as_bytes())
                    .and_then(|_| file.sync_all())
                    .map_err(|e| StorageError::write(self.history_path.display(), e))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(StorageError::write(self.history_path.display(), e)),
        }
    }

    fn read_registry(&self) -> Result<Vec<TrackedItem>, StorageError> {
        let path = &self.registry_path;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(path).map_err(|e| StorageError::read(path.display(), e))?;
        let mut items = Vec::new();

        for (idx, row) in reader.deserialize::<RegistryRow>().enumerate() {
            // The registry is only ever replaced whole, so a bad row is real damage
            let row = row.map_err(|e| StorageError::read(path.display(), format!("row {}: {}", idx + 1, e)))?;
            items.push(row.into());
        }

        Ok(items)
    }

    fn write_registry(&self, items: &[TrackedItem]) -> Result<(), StorageError> {
        let path = &self.registry_path;
        let fail = |e: &dyn std::fmt::Display| StorageError::write(path.display(), e);

        let tmp = NamedTempFile::new_in(&self.dir).map_err(|e| fail(&e))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file());
            for item in items {
                writer.serialize(RegistryRow::from(item)).map_err(|e| fail(&e))?;
            }
            writer.flush().map_err(|e| fail(&e))?;
        }
        tmp.as_file().sync_all().map_err(|e| fail(&e))?;
        tmp.persist(path).map_err(|e| fail(&e.error))?;

        Ok(())
    }

    /// Exclusive lock across processes and store handles; released on drop
    fn lock_registry(&self) -> Result<File, StorageError> {
        let path = &self.lock_path;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| StorageError::write(path.display(), e))?;
        FileExt::lock_exclusive(&file).map_err(|e| StorageError::write(path.display(), e))?;
        Ok(file)
    }

    fn upsert_item(&self, item: &TrackedItem) -> Result<UpsertOutcome, StorageError> {
        let _lock = self.lock_registry()?;

        let mut items = self.read_registry()?;
        let position = items.iter().position(|i| i.link == item.link);
        let (outcome, row) = merge_into_registry(position.map(|p| &items[p]), item);

        match (outcome, position) {
            (UpsertOutcome::Unchanged, _) => return Ok(outcome),
            (_, Some(p)) => items[p] = row,
            (_, None) => items.push(row),
        }

        self.write_registry(&items)?;
        Ok(outcome)
    }

    fn append_observation(&self, observation: &PriceObservation) -> Result<(), StorageError> {
        let path = &self.history_path;
        let fail = |e: &dyn std::fmt::Display| StorageError::write(path.display(), e);

        let row = HistoryRow::from_observation(observation).map_err(|e| fail(&e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.serialize(&row).map_err(|e| fail(&e))?;
        let line = writer.into_inner().map_err(|e| fail(&e.error()))?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| fail(&e))?;

        let mut buf = Vec::with_capacity(line.len() + 64);
        let len = file.metadata().map_err(|e| fail(&e))?.len();
        if len == 0 {
            buf.extend_from_slice(HISTORY_COLUMNS.join(",").as_bytes());
            buf.push(b'\n');
        } else if !ends_with_newline(&mut file, len).map_err(|e| fail(&e))? {
            // Seal a row torn by an earlier crash so ours starts on a fresh line
            tracing::warn!("Sealing torn trailing row in {}", path.display());
            buf.push(b'\n');
        }
        buf.extend_from_slice(&line);

        file.write_all(&buf).map_err(|e| fail(&e))?;
        file.sync_data().map_err(|e| fail(&e))?;

        Ok(())
    }

    fn read_history(&self) -> Result<Vec<PriceObservation>, StorageError> {
        let path = &self.history_path;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::read(path.display(), e)),
        };

        Ok(parse_history(&bytes, &path.display().to_string()))
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Parse committed history lines, one independent CSV record per line
fn parse_history(bytes: &[u8], source: &str) -> Vec<PriceObservation> {
    let committed = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(end) => &bytes[..=end],
        None => return Vec::new(),
    };
    if committed.len() < bytes.len() {
        tracing::warn!(
            "Ignoring {} uncommitted trailing bytes in {}",
            bytes.len() - committed.len(),
            source
        );
    }

    let headers = csv::StringRecord::from(HISTORY_COLUMNS.to_vec());
    let mut observations = Vec::new();

    for (idx, line) in committed.split(|b| *b == b'\n').enumerate() {
        // Line 0 is the header; trailing split yields an empty slice
        if idx == 0 || line.is_empty() {
            continue;
        }

        match parse_history_line(line, &headers) {
            Ok(obs) => observations.push(obs),
            Err(e) => tracing::warn!("Skipping unreadable row {} in {}: {}", idx + 1, source, e),
        }
    }

    observations
}

fn parse_history_line(line: &[u8], headers: &csv::StringRecord) -> Result<PriceObservation, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line);

    let mut record = csv::StringRecord::new();
    if !reader.read_record(&mut record).map_err(|e| e.to_string())? {
        return Err("empty row".to_string());
    }
    if record.len() != headers.len() {
        return Err(format!("expected {} fields, found {}", headers.len(), record.len()));
    }

    let row: HistoryRow = record.deserialize(Some(headers)).map_err(|e| e.to_string())?;
    row.into_observation()
}

/// Run blocking file IO off the async worker threads
async fn blocking<T, F>(path: &Path, op: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(result) => result,
        Err(e) => Err(StorageError::write(path.display(), e)),
    }
}

#[async_trait]
impl PriceStore for CsvStore {
    async fn upsert_item(&self, item: &TrackedItem) -> Result<UpsertOutcome, StorageError> {
        let files = self.files.clone();
        let item = item.clone();
        blocking(self.registry_path(), move || files.upsert_item(&item)).await
    }

    async fn append_observation(&self, observation: &PriceObservation) -> Result<(), StorageError> {
        let files = self.files.clone();
        let observation = observation.clone();
        blocking(self.history_path(), move || files.append_observation(&observation)).await
    }

    async fn items(&self) -> Result<Vec<TrackedItem>, StorageError> {
        let files = self.files.clone();
        blocking(self.registry_path(), move || files.read_registry()).await
    }

    async fn history(
        &self,
        link: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceObservation>, StorageError> {
        let files = self.files.clone();
        let all = blocking(self.history_path(), move || files.read_history()).await?;
        Ok(select_history(all.iter(), link, since))
    }

    async fn recent_observations(&self, window: Duration) -> Result<Vec<PriceObservation>, StorageError> {
        let files = self.files.clone();
        let all = blocking(self.history_path(), move || files.read_history()).await?;
        Ok(select_recent(all.iter(), window))
    }
}
