//! Error types for the ranking engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

use chrono::NaiveDate;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific ranking scenarios
#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("Malformed game record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Drawn game is not allowed: {home} {home_score} - {away_score} {away}")]
    DrawnGame {
        home: String,
        away: String,
        home_score: u32,
        away_score: u32,
    },

    #[error("Unknown team: {name}")]
    UnknownTeam { name: String },

    #[error("No snapshot covers {team} at {date}")]
    MissingSnapshot { team: String, date: NaiveDate },

    #[error("Game on {date} falls outside the ranking period")]
    OutOfPeriod { date: NaiveDate },

    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },

    #[error("Solver failed to converge after {iterations} iterations (residual {residual:.3e})")]
    ConvergenceFailure { iterations: usize, residual: f64 },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}
