pub mod price_observation;
pub mod run_summary;
pub mod tracked_item;

pub use price_observation::{PriceObservation, ScrapeStatus};
pub use run_summary::{ItemReport, PortfolioReport, RunSummary};
pub use tracked_item::{PortfolioEntry, TrackedItem, UpsertOutcome};
