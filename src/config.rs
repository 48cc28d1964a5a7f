//! Tracker configuration
//!
//! Built once at startup and injected into the retry policy, fetchers and
//! tracker. Every option only changes pacing or robustness, never what gets
//! recorded.
//!
//! # Environment Variables
//!
//! * `TRACKER_PORTFOLIO_PATH` - Portfolio definition CSV (default: portfolio.csv)
//! * `TRACKER_DATA_DIR` - Directory holding the registry and history files (default: data)
//! * `TRACKER_FETCHER` - `browser` or `http` (default: browser)
//! * `TRACKER_WEBDRIVER_URL` - WebDriver endpoint for the browser fetcher (default: http://localhost:4444)
//! * `TRACKER_WARM_UP` - Visit the home and game pages before each listing (default: true)
//! * `TRACKER_MAX_ATTEMPTS` - Attempts per item (default: 3)
//! * `TRACKER_BASE_DELAY_MS` - First retry backoff (default: 2000)
//! * `TRACKER_MAX_DELAY_MS` - Backoff cap (default: 30000)
//! * `TRACKER_JITTER_MS` - Upper bound of random jitter added to each backoff (default: 1000)
//! * `TRACKER_FETCH_TIMEOUT_SECS` - Per-attempt page timeout (default: 30)
//! * `TRACKER_MIN_ITEM_DELAY_MS` / `TRACKER_MAX_ITEM_DELAY_MS` - Pause between items (default: 3000 / 6000)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_PORTFOLIO_PATH: &str = "TRACKER_PORTFOLIO_PATH";
pub const ENV_DATA_DIR: &str = "TRACKER_DATA_DIR";
pub const ENV_FETCHER: &str = "TRACKER_FETCHER";
pub const ENV_WEBDRIVER_URL: &str = "TRACKER_WEBDRIVER_URL";
pub const ENV_WARM_UP: &str = "TRACKER_WARM_UP";
pub const ENV_MAX_ATTEMPTS: &str = "TRACKER_MAX_ATTEMPTS";
pub const ENV_BASE_DELAY_MS: &str = "TRACKER_BASE_DELAY_MS";
pub const ENV_MAX_DELAY_MS: &str = "TRACKER_MAX_DELAY_MS";
pub const ENV_JITTER_MS: &str = "TRACKER_JITTER_MS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "TRACKER_FETCH_TIMEOUT_SECS";
pub const ENV_MIN_ITEM_DELAY_MS: &str = "TRACKER_MIN_ITEM_DELAY_MS";
pub const ENV_MAX_ITEM_DELAY_MS: &str = "TRACKER_MAX_ITEM_DELAY_MS";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_JITTER_MS: u64 = 1000;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MIN_ITEM_DELAY_MS: u64 = 3000;
const DEFAULT_MAX_ITEM_DELAY_MS: u64 = 6000;

/// Which page fetcher backs the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherKind {
    Browser,
    Http,
}

impl FromStr for FetcherKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "browser" | "webdriver" => Ok(FetcherKind::Browser),
            "http" => Ok(FetcherKind::Http),
            other => Err(ConfigError::InvalidValue {
                key: ENV_FETCHER.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub portfolio_path: PathBuf,
    pub data_dir: PathBuf,
    pub fetcher: FetcherKind,
    pub webdriver_url: String,
    pub warm_up: bool,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
    pub fetch_timeout: Duration,
    pub min_inter_item_delay: Duration,
    pub max_inter_item_delay: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            portfolio_path: PathBuf::from("portfolio.csv"),
            data_dir: PathBuf::from("data"),
            fetcher: FetcherKind::Browser,
            webdriver_url: "http://localhost:4444".to_string(),
            warm_up: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: Duration::from_millis(DEFAULT_JITTER_MS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            min_inter_item_delay: Duration::from_millis(DEFAULT_MIN_ITEM_DELAY_MS),
            max_inter_item_delay: Duration::from_millis(DEFAULT_MAX_ITEM_DELAY_MS),
        }
    }
}

impl TrackerConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            portfolio_path: lookup(ENV_PORTFOLIO_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.portfolio_path),
            data_dir: lookup(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            fetcher: match lookup(ENV_FETCHER) {
                Some(value) => value.parse()?,
                None => defaults.fetcher,
            },
            webdriver_url: lookup(ENV_WEBDRIVER_URL).unwrap_or(defaults.webdriver_url),
            warm_up: match lookup(ENV_WARM_UP) {
                Some(value) => parse_bool(ENV_WARM_UP, &value)?,
                None => defaults.warm_up,
            },
            max_attempts: parse_or(&lookup, ENV_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS)?,
            base_delay: Duration::from_millis(parse_or(&lookup, ENV_BASE_DELAY_MS, DEFAULT_BASE_DELAY_MS)?),
            max_delay: Duration::from_millis(parse_or(&lookup, ENV_MAX_DELAY_MS, DEFAULT_MAX_DELAY_MS)?),
            jitter: Duration::from_millis(parse_or(&lookup, ENV_JITTER_MS, DEFAULT_JITTER_MS)?),
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_FETCH_TIMEOUT_SECS,
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            min_inter_item_delay: Duration::from_millis(parse_or(
                &lookup,
                ENV_MIN_ITEM_DELAY_MS,
                DEFAULT_MIN_ITEM_DELAY_MS,
            )?),
            max_inter_item_delay: Duration::from_millis(parse_or(
                &lookup,
                ENV_MAX_ITEM_DELAY_MS,
                DEFAULT_MAX_ITEM_DELAY_MS,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Inconsistent(format!(
                "{} must be at least 1",
                ENV_MAX_ATTEMPTS
            )));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Inconsistent(format!(
                "{} must be positive",
                ENV_FETCH_TIMEOUT_SECS
            )));
        }
        if self.min_inter_item_delay > self.max_inter_item_delay {
            return Err(ConfigError::Inconsistent(format!(
                "{} ({:?}) is greater than {} ({:?})",
                ENV_MIN_ITEM_DELAY_MS,
                self.min_inter_item_delay,
                ENV_MAX_ITEM_DELAY_MS,
                self.max_inter_item_delay
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Inconsistent(format!(
                "{} is greater than {}",
                ENV_BASE_DELAY_MS, ENV_MAX_DELAY_MS
            )));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
