// src/lib.rs

pub mod config;
pub mod error;
pub mod models;
pub mod scrapers;
pub mod storage;

pub mod services {
    pub mod portfolio;
}

pub mod jobs {
    pub mod price_tracker;
}
