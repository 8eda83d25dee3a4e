//! Power Rank - Batch skill ratings for head-to-head team sports
//!
//! This crate fits a relative power to every team from the dominance
//! scores of its games, with region connectivity, operator anchoring and
//! power carry-forward between ranking periods.

pub mod calendar;
pub mod config;
pub mod error;
pub mod ingest;
pub mod rating;
pub mod regions;
pub mod report;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{RankingError, Result};
pub use types::*;

// Re-export key components
pub use rating::carry_forward::{CarryForwardMode, RankingHistory, Snapshot};
pub use session::{Classification, EngineKind, PeriodConfig, RankingPeriod, SolveSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
