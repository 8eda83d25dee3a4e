//! Stationarity system for the power regression
//!
//! The model predicts the DOS of a game as `tanh(d / 2S)`, where `d` is the
//! subject-minus-opponent power difference and `S` the scaling factor. The
//! same curve written as a logistic is `-1 + 2 / (1 + exp(-d / S))`. Powers
//! are chosen to make the decay-weighted sum-of-squares prediction error
//! stationary; each team contributes one equation, the derivative of the
//! loss with respect to its own power:
//!
//! ```text
//! sum over the team's games of
//!     -w * (dos - tanh(d / 2S)) / (S * cosh^2(d / 2S))  =  0
//! ```
//!
//! with `dos` and `d` taken from the team's own perspective. An opponent's
//! power is either another unknown or, for incremental solves, a published
//! power frozen from the snapshot history.

use std::collections::HashMap;

use anyhow::anyhow;
use chrono::NaiveDate;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RankingError, Result};
use crate::rating::carry_forward::RankingHistory;
use crate::rating::decay::DecayConfig;
use crate::rating::solver::{NewtonSolver, SolverConfig};
use crate::types::{Game, TeamName, TeamRegistry};

/// Configuration for the regression engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    /// Logistic scaling factor S; the link function is tanh(d / 2S)
    pub scaling_factor: f64,
    /// Initial guess for teams with no carried-in power
    pub default_power: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            scaling_factor: 100.0,
            default_power: 700.0,
        }
    }
}

impl RegressionConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.scaling_factor <= 0.0 {
            return Err(RankingError::ConfigurationError {
                message: "Scaling factor must be positive".to_string(),
            }
            .into());
        }
        if !self.default_power.is_finite() {
            return Err(RankingError::ConfigurationError {
                message: "Default power must be finite".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Predicted DOS for a power difference `d` under scaling factor `s`
pub fn predicted_dos(d: f64, s: f64) -> f64 {
    (d / (2.0 * s)).tanh()
}

/// Power difference that would produce the given DOS; inverse of the link
pub fn power_gap_for_dos(dos: f64, s: f64) -> f64 {
    2.0 * s * dos.atanh()
}

/// Opponent power reference inside one game term
#[derive(Debug, Clone, Copy)]
enum OpponentPower {
    /// Another solver unknown, by index
    Variable(usize),
    /// Frozen published power from the snapshot history
    Fixed(f64),
}

#[derive(Debug, Clone, Copy)]
struct GameTerm {
    opponent: OpponentPower,
    subject_dos: f64,
    weight: f64,
}

/// The assembled stationarity system for one ranking period
#[derive(Debug)]
pub struct RegressionProblem {
    unknowns: Vec<TeamName>,
    terms: Vec<Vec<GameTerm>>,
    scaling_factor: f64,
}

/// Solved powers in unknown order
#[derive(Debug, Clone)]
pub struct RegressionSolution {
    pub powers: Vec<(TeamName, f64)>,
    pub iterations: usize,
    pub residual_norm: f64,
}

impl RegressionProblem {
    /// Assemble the full-period system: every team with at least one game
    /// becomes an unknown, in registry order. Zero-game teams are left out
    /// entirely; their equations would be identically zero.
    pub fn build(
        registry: &TeamRegistry,
        games: &[Game],
        decay: &DecayConfig,
        end: NaiveDate,
        config: &RegressionConfig,
    ) -> Result<Self> {
        let unknowns: Vec<TeamName> = registry
            .iter_ordered()
            .filter(|team| !team.game_ids.is_empty())
            .map(|team| team.name.clone())
            .collect();
        Self::assemble(registry, games, decay, end, config, unknowns, None)
    }

    /// Assemble the incremental system: unknowns are the teams with at
    /// least one game strictly after the newest snapshot boundary. Their
    /// older games against teams outside the unknown set enter with the
    /// opponent frozen at its published power as of the game date.
    pub fn build_incremental(
        registry: &TeamRegistry,
        games: &[Game],
        decay: &DecayConfig,
        end: NaiveDate,
        config: &RegressionConfig,
        history: &RankingHistory,
    ) -> Result<Self> {
        let boundary = history.latest_boundary().ok_or_else(|| {
            RankingError::DegenerateInput {
                reason: "incremental solve requires at least one snapshot".to_string(),
            }
        })?;

        let unknowns: Vec<TeamName> = registry
            .iter_ordered()
            .filter(|team| {
                team.game_ids
                    .iter()
                    .any(|&id| games.get(id).map_or(false, |game| game.date() > boundary))
            })
            .map(|team| team.name.clone())
            .collect();
        debug!(
            "incremental solve: {} of {} teams have games after {}",
            unknowns.len(),
            registry.len(),
            boundary
        );
        Self::assemble(registry, games, decay, end, config, unknowns, Some(history))
    }

    fn assemble(
        registry: &TeamRegistry,
        games: &[Game],
        decay: &DecayConfig,
        end: NaiveDate,
        config: &RegressionConfig,
        unknowns: Vec<TeamName>,
        history: Option<&RankingHistory>,
    ) -> Result<Self> {
        config.validate()?;
        decay.validate()?;
        if unknowns.is_empty() {
            return Err(RankingError::DegenerateInput {
                reason: "no teams with games to solve".to_string(),
            }
            .into());
        }

        let index: HashMap<&str, usize> = unknowns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut terms: Vec<Vec<GameTerm>> = vec![Vec::new(); unknowns.len()];
        for (i, name) in unknowns.iter().enumerate() {
            let team = registry.require(name)?;
            for &game_id in &team.game_ids {
                let game = games
                    .get(game_id)
                    .ok_or_else(|| anyhow!("game id {} out of range", game_id))?;
                let subject_dos = match game.dos_for(name) {
                    Some(dos) => dos,
                    None => continue,
                };
                let opponent_name = match game.opponent_of(name) {
                    Some(opponent) => opponent,
                    None => continue,
                };

                let opponent = match index.get(opponent_name) {
                    Some(&j) => OpponentPower::Variable(j),
                    None => {
                        let history = history.ok_or_else(|| {
                            anyhow!("opponent {} missing from the unknown set", opponent_name)
                        })?;
                        OpponentPower::Fixed(history.power_as_of(opponent_name, game.date())?)
                    }
                };

                terms[i].push(GameTerm {
                    opponent,
                    subject_dos,
                    weight: decay.weight(game.date(), end),
                });
            }
        }

        Ok(Self {
            unknowns,
            terms,
            scaling_factor: config.scaling_factor,
        })
    }

    /// Teams being solved for, in equation order
    pub fn unknowns(&self) -> &[TeamName] {
        &self.unknowns
    }

    pub fn len(&self) -> usize {
        self.unknowns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unknowns.is_empty()
    }

    /// Stationarity residual at the given power vector
    pub fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
        let s = self.scaling_factor;
        let mut y = DVector::zeros(self.unknowns.len());

        for (i, team_terms) in self.terms.iter().enumerate() {
            let mut acc = 0.0;
            for term in team_terms {
                let opponent_power = match term.opponent {
                    OpponentPower::Variable(j) => x[j],
                    OpponentPower::Fixed(power) => power,
                };
                let z = (x[i] - opponent_power) / (2.0 * s);
                let cosh = z.cosh();
                acc -= term.weight * (term.subject_dos - z.tanh()) / (s * cosh * cosh);
            }
            y[i] = acc;
        }
        y
    }

    /// Solve the system from the given initial guess, one entry per unknown
    pub fn solve(
        &self,
        initial: Vec<f64>,
        solver_config: &SolverConfig,
    ) -> Result<RegressionSolution> {
        if initial.len() != self.unknowns.len() {
            return Err(RankingError::DegenerateInput {
                reason: format!(
                    "initial guess has {} entries for {} unknowns",
                    initial.len(),
                    self.unknowns.len()
                ),
            }
            .into());
        }

        let solver = NewtonSolver::new(solver_config.clone())?;
        let outcome = solver.solve(|x| self.residual(x), DVector::from_vec(initial))?;
        info!(
            "regression over {} teams converged after {} iterations (residual {:.3e})",
            self.unknowns.len(),
            outcome.iterations,
            outcome.residual_norm
        );

        let powers = self
            .unknowns
            .iter()
            .cloned()
            .zip(outcome.values.iter().copied())
            .collect();
        Ok(RegressionSolution {
            powers,
            iterations: outcome.iterations,
            residual_norm: outcome.residual_norm,
        })
    }
}
