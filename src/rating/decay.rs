//! Recency decay for game weights
//!
//! Older games count for less in the regression. The age of a game is
//! measured in whole months before the period end, where a month is 1/12 of
//! a 365-day year, and mapped to a weight in [0, 1] by the configured
//! policy. All engines share the same weighting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{RankingError, Result};
use crate::utils::whole_months_before;

/// Shape of the age-to-weight curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecayPolicy {
    /// Straight line from full weight at age zero to nothing at the cutoff
    Linear,
    /// Full weight while fresh, then a linear ramp down to the cutoff
    PiecewiseRamp,
    /// Full weight while fresh, then a constant floor until the cutoff
    StepFloor,
}

/// Configuration for recency decay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    pub policy: DecayPolicy,
    /// Age in months below which a game keeps full weight
    pub fresh_months: i64,
    /// Age in months beyond which a game contributes nothing
    pub cutoff_months: i64,
    /// Weight used between fresh and cutoff by the step-floor policy
    pub floor_weight: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            policy: DecayPolicy::PiecewiseRamp,
            fresh_months: 6,
            cutoff_months: 12,
            floor_weight: 0.01,
        }
    }
}

impl DecayConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.cutoff_months <= 0 {
            return Err(RankingError::ConfigurationError {
                message: "Decay cutoff must be positive".to_string(),
            }
            .into());
        }
        if self.fresh_months < 0 || self.fresh_months >= self.cutoff_months {
            return Err(RankingError::ConfigurationError {
                message: "Decay fresh window must sit inside [0, cutoff)".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.floor_weight) {
            return Err(RankingError::ConfigurationError {
                message: "Decay floor weight must be within [0, 1]".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Weight of a game played on `date` for a period ending on `end`
    pub fn weight(&self, date: NaiveDate, end: NaiveDate) -> f64 {
        let months = whole_months_before(date, end);
        if months > self.cutoff_months {
            return 0.0;
        }

        match self.policy {
            DecayPolicy::Linear => {
                (self.cutoff_months - months) as f64 / self.cutoff_months as f64
            }
            DecayPolicy::PiecewiseRamp => {
                if months < self.fresh_months {
                    1.0
                } else {
                    (self.cutoff_months - months) as f64
                        / (self.cutoff_months - self.fresh_months) as f64
                }
            }
            DecayPolicy::StepFloor => {
                if months < self.fresh_months {
                    1.0
                } else if months < self.cutoff_months {
                    self.floor_weight
                } else {
                    0.0
                }
            }
        }
    }
}
