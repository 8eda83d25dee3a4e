//! Iterative K-factor rating engine
//!
//! The predecessor of the regression engine, kept as a selectable
//! alternative. Games are replayed in weekly batches: each game moves both
//! sides by `K * (dos - predicted) * weight`, accumulated per team within a
//! week and applied at week end so that results inside one week do not see
//! each other. Sweeps over the whole period repeat until no team moves by
//! more than the tolerance in a full sweep.
//!
//! Teams without a carried-in power do not move. Their games instead
//! collect (opponent power, own DOS) observations, and once enough have
//! accumulated, a starting power is fitted by bisecting the
//! one-dimensional stationarity in the team's own power. A game between
//! two unrated teams informs neither and is skipped.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::Week;
use crate::error::{RankingError, Result};
use crate::rating::decay::DecayConfig;
use crate::rating::regression::predicted_dos;
use crate::rating::solver::bisect;
use crate::types::{Game, TeamName, TeamRegistry};

/// Configuration for the iterative engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IterativeConfig {
    /// Step size per game
    pub k_factor: f64,
    /// Logistic scaling factor S, shared with the regression link
    pub scaling_factor: f64,
    /// Power given to teams with no history when seeding is disabled
    pub default_power: f64,
    /// Observations an unrated team needs before a power is fitted
    pub seed_observations: usize,
    /// Bisection bracket for the fitted starting power
    pub seed_bracket_low: f64,
    pub seed_bracket_high: f64,
    pub seed_tolerance: f64,
    /// Convergence threshold on the largest per-sweep power change
    pub tolerance: f64,
    pub max_sweeps: usize,
}

impl Default for IterativeConfig {
    fn default() -> Self {
        Self {
            k_factor: 30.0,
            scaling_factor: 100.0,
            default_power: 700.0,
            seed_observations: 3,
            seed_bracket_low: 0.0,
            seed_bracket_high: 2000.0,
            seed_tolerance: 1e-9,
            tolerance: 1e-3,
            max_sweeps: 500,
        }
    }
}

impl IterativeConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.k_factor <= 0.0 || self.scaling_factor <= 0.0 {
            return Err(RankingError::ConfigurationError {
                message: "K factor and scaling factor must be positive".to_string(),
            }
            .into());
        }
        if self.seed_observations == 0 {
            return Err(RankingError::ConfigurationError {
                message: "Seed observation threshold must be positive".to_string(),
            }
            .into());
        }
        if self.seed_bracket_low >= self.seed_bracket_high {
            return Err(RankingError::ConfigurationError {
                message: "Seed bracket is inverted".to_string(),
            }
            .into());
        }
        if self.seed_tolerance <= 0.0 || self.tolerance <= 0.0 {
            return Err(RankingError::ConfigurationError {
                message: "Iterative tolerances must be positive".to_string(),
            }
            .into());
        }
        if self.max_sweeps == 0 {
            return Err(RankingError::ConfigurationError {
                message: "Sweep limit must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Result of an iterative run
#[derive(Debug, Clone)]
pub struct IterativeOutcome {
    pub sweeps: usize,
    pub final_max_change: f64,
    /// Teams that had a starting power fitted during the run
    pub seeded: Vec<TeamName>,
}

/// Weekly-batched K-factor engine
#[derive(Debug)]
pub struct IterativeEngine {
    config: IterativeConfig,
    decay: DecayConfig,
}

impl IterativeEngine {
    pub fn new(config: IterativeConfig, decay: DecayConfig) -> Result<Self> {
        config.validate()?;
        decay.validate()?;
        Ok(Self { config, decay })
    }

    /// Sweep the period until quiescent, updating powers in place
    ///
    /// `weeks` must carry the game ids of the period, as built by the
    /// session. A sweep that fitted a starting power never counts as
    /// converged, even if nothing else moved.
    pub fn run(
        &self,
        registry: &mut TeamRegistry,
        games: &[Game],
        weeks: &[Week],
        end: NaiveDate,
    ) -> Result<IterativeOutcome> {
        let mut observations: HashMap<TeamName, Vec<(f64, f64)>> = HashMap::new();
        let mut seeded: Vec<TeamName> = Vec::new();
        let mut last_max_change = f64::INFINITY;

        for sweep in 1..=self.config.max_sweeps {
            let mut max_change: f64 = 0.0;
            let seeded_before = seeded.len();

            for week in weeks {
                let mut pending: HashMap<TeamName, f64> = HashMap::new();

                for &game_id in &week.game_ids {
                    let game = match games.get(game_id) {
                        Some(game) => game,
                        None => continue,
                    };
                    let home_power = registry.get(game.home_team()).and_then(|t| t.power);
                    let away_power = registry.get(game.away_team()).and_then(|t| t.power);

                    match (home_power, away_power) {
                        (Some(home), Some(away)) => {
                            let predicted =
                                predicted_dos(home - away, self.config.scaling_factor);
                            let weight = self.decay.weight(game.date(), end);
                            let change =
                                self.config.k_factor * (game.dos() - predicted) * weight;
                            *pending.entry(game.home_team().to_string()).or_insert(0.0) +=
                                change;
                            *pending.entry(game.away_team().to_string()).or_insert(0.0) -=
                                change;
                        }
                        (None, Some(away)) => {
                            self.observe(
                                &mut observations,
                                &mut seeded,
                                registry,
                                game.home_team(),
                                away,
                                game.dos(),
                            );
                        }
                        (Some(home), None) => {
                            self.observe(
                                &mut observations,
                                &mut seeded,
                                registry,
                                game.away_team(),
                                home,
                                -game.dos(),
                            );
                        }
                        (None, None) => {
                            debug!(
                                "game between two unrated teams carries no information: {} vs {}",
                                game.home_team(),
                                game.away_team()
                            );
                        }
                    }
                }

                for (name, change) in pending {
                    if let Some(team) = registry.get_mut(&name) {
                        if let Some(power) = team.power.as_mut() {
                            *power += change;
                            max_change = max_change.max(change.abs());
                        }
                    }
                }
            }

            last_max_change = max_change;
            let newly_seeded = seeded.len() - seeded_before;
            if max_change < self.config.tolerance && newly_seeded == 0 {
                info!(
                    "iterative engine settled after {} sweeps (max change {:.3e})",
                    sweep, max_change
                );
                return Ok(IterativeOutcome {
                    sweeps: sweep,
                    final_max_change: max_change,
                    seeded,
                });
            }
        }

        Err(RankingError::ConvergenceFailure {
            iterations: self.config.max_sweeps,
            residual: last_max_change,
        }
        .into())
    }

    /// Record one observation for an unrated team and fit its starting
    /// power once the threshold is reached. A failed fit leaves the team
    /// unrated and keeps the observations for a later attempt.
    fn observe(
        &self,
        observations: &mut HashMap<TeamName, Vec<(f64, f64)>>,
        seeded: &mut Vec<TeamName>,
        registry: &mut TeamRegistry,
        name: &str,
        opponent_power: f64,
        subject_dos: f64,
    ) {
        let samples = {
            let entry = observations.entry(name.to_string()).or_default();
            entry.push((opponent_power, subject_dos));
            if entry.len() < self.config.seed_observations {
                return;
            }
            entry.clone()
        };

        let s = self.config.scaling_factor;
        let objective = move |x: f64| {
            samples
                .iter()
                .map(|&(power, dos)| {
                    let z = (x - power) / (2.0 * s);
                    let cosh = z.cosh();
                    (dos - z.tanh()) / (cosh * cosh)
                })
                .sum::<f64>()
        };

        match bisect(
            objective,
            self.config.seed_bracket_low,
            self.config.seed_bracket_high,
            self.config.seed_tolerance,
            200,
        ) {
            Ok(power) => {
                if let Some(team) = registry.get_mut(name) {
                    team.power = Some(power);
                    team.is_new = false;
                }
                info!("fitted starting power {:.1} for {}", power, name);
                seeded.push(name.to_string());
                observations.remove(name);
            }
            Err(error) => {
                warn!("could not fit a starting power for {}: {}", name, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{build_weeks, week_index};
    use crate::rating::regression::power_gap_for_dos;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup(
        games_spec: &[(NaiveDate, &str, u32, &str, u32)],
        start: NaiveDate,
        end: NaiveDate,
    ) -> (TeamRegistry, Vec<Game>, Vec<Week>) {
        let mut registry = TeamRegistry::new();
        let mut games = Vec::new();
        let mut weeks = build_weeks(start, end);
        for (day, home, hs, away, aw) in games_spec {
            let game = Game::new(*day, *home, *hs, *away, *aw).unwrap();
            let id = games.len();
            registry.ensure(home).record_game(id, &game);
            registry.ensure(away).record_game(id, &game);
            if let Some(w) = week_index(&weeks, *day) {
                weeks[w].game_ids.push(id);
            }
            games.push(game);
        }
        (registry, games, weeks)
    }

    fn rate_all(registry: &mut TeamRegistry, power: f64) {
        for name in registry.order().to_vec() {
            if let Some(team) = registry.get_mut(&name) {
                team.power = Some(power);
            }
        }
    }

    fn engine() -> IterativeEngine {
        IterativeEngine::new(IterativeConfig::default(), DecayConfig::default()).unwrap()
    }

    #[test]
    fn test_converges_to_link_fixpoint() {
        let start = date(2018, 3, 1);
        let end = date(2018, 3, 14);
        let (mut registry, games, weeks) =
            setup(&[(start, "Reds", 3, "Blues", 1)], start, end);
        rate_all(&mut registry, 700.0);

        let outcome = engine().run(&mut registry, &games, &weeks, end).unwrap();
        assert!(outcome.sweeps > 1);
        assert!(outcome.final_max_change < 1e-3);

        let gap = registry.get("Reds").unwrap().power.unwrap()
            - registry.get("Blues").unwrap().power.unwrap();
        assert!((gap - power_gap_for_dos(0.5, 100.0)).abs() < 0.05);
    }

    #[test]
    fn test_weekly_batching_defers_application() {
        // two equal-power games in the same week must both see the
        // pre-week powers, so each contributes exactly K * dos
        let start = date(2018, 3, 1);
        let end = date(2018, 3, 7);
        let (mut registry, games, weeks) = setup(
            &[
                (start, "Reds", 3, "Blues", 1),
                (start, "Reds", 3, "Blues", 1),
            ],
            start,
            end,
        );
        rate_all(&mut registry, 700.0);

        let one_sweep = IterativeEngine::new(
            IterativeConfig {
                max_sweeps: 1,
                ..IterativeConfig::default()
            },
            DecayConfig::default(),
        )
        .unwrap();
        assert!(one_sweep.run(&mut registry, &games, &weeks, end).is_err());

        let reds = registry.get("Reds").unwrap().power.unwrap();
        let blues = registry.get("Blues").unwrap().power.unwrap();
        assert!((reds - 730.0).abs() < 1e-9);
        assert!((blues - 670.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_team_seeded_by_bisection() {
        // an unrated team beats three 700-power teams 3-1; the fitted power
        // solves tanh((x - 700) / 200) = 0.5
        let start = date(2018, 3, 1);
        let end = date(2018, 3, 28);
        let (mut registry, games, weeks) = setup(
            &[
                (date(2018, 3, 1), "Upstarts", 3, "Reds", 1),
                (date(2018, 3, 8), "Upstarts", 3, "Blues", 1),
                (date(2018, 3, 15), "Upstarts", 3, "Greens", 1),
            ],
            start,
            end,
        );
        for name in ["Reds", "Blues", "Greens"] {
            registry.get_mut(name).unwrap().power = Some(700.0);
        }
        registry.get_mut("Upstarts").unwrap().is_new = true;

        let outcome = engine().run(&mut registry, &games, &weeks, end).unwrap();
        assert_eq!(outcome.seeded, vec!["Upstarts".to_string()]);

        let upstarts = registry.get("Upstarts").unwrap();
        assert!(!upstarts.is_new);
        // the system keeps moving after the fit; the star equilibrium still
        // puts the newcomer one link-gap above everyone
        for name in ["Reds", "Blues", "Greens"] {
            let gap = upstarts.power.unwrap() - registry.get(name).unwrap().power.unwrap();
            assert!((gap - power_gap_for_dos(0.5, 100.0)).abs() < 0.1);
        }
    }

    #[test]
    fn test_game_between_two_unrated_teams_informs_neither() {
        let start = date(2018, 3, 1);
        let end = date(2018, 3, 7);
        let (mut registry, games, weeks) =
            setup(&[(start, "Reds", 3, "Blues", 1)], start, end);

        let outcome = engine().run(&mut registry, &games, &weeks, end).unwrap();
        assert_eq!(outcome.sweeps, 1);
        assert!(registry.get("Reds").unwrap().power.is_none());
        assert!(registry.get("Blues").unwrap().power.is_none());
    }

    #[test]
    fn test_under_observed_team_stays_unrated() {
        let start = date(2018, 3, 1);
        let end = date(2018, 3, 14);
        let (mut registry, games, weeks) = setup(
            &[
                (date(2018, 3, 1), "Upstarts", 3, "Reds", 1),
                (date(2018, 3, 8), "Upstarts", 3, "Blues", 1),
            ],
            start,
            end,
        );
        for name in ["Reds", "Blues"] {
            registry.get_mut(name).unwrap().power = Some(700.0);
        }

        engine().run(&mut registry, &games, &weeks, end).unwrap();
        assert!(registry.get("Upstarts").unwrap().power.is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(IterativeConfig::default().validate().is_ok());
        assert!(IterativeConfig {
            k_factor: 0.0,
            ..IterativeConfig::default()
        }
        .validate()
        .is_err());
        assert!(IterativeConfig {
            seed_bracket_low: 10.0,
            seed_bracket_high: 5.0,
            ..IterativeConfig::default()
        }
        .validate()
        .is_err());
        assert!(IterativeConfig {
            max_sweeps: 0,
            ..IterativeConfig::default()
        }
        .validate()
        .is_err());
    }
}
