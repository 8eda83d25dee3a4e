//! Ranking period session
//!
//! A `RankingPeriod` owns everything one ranking run needs: the game
//! arena, the weekly calendar, the team registry and the engine
//! configuration. It drives ingest, seeding, solving, classification and
//! snapshot capture. Anchoring is left to the caller because it may
//! involve an operator dialog.

use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::{build_weeks, week_index, Week};
use crate::error::{RankingError, Result};
use crate::rating::anchor::AnchorConfig;
use crate::rating::carry_forward::{RankingHistory, Snapshot};
use crate::rating::decay::DecayConfig;
use crate::rating::iterative::{IterativeConfig, IterativeEngine};
use crate::rating::regression::{predicted_dos, RegressionConfig, RegressionProblem};
use crate::rating::solver::{bisect, SolverConfig};
use crate::regions::{partition_regions, Region};
use crate::types::{Game, Team, TeamName, TeamRegistry, TeamStatus};

/// Power gap below which a matchup is called too close to predict
pub const CLOSE_GAME_MARGIN: f64 = 40.0;

/// Power gap above which a matchup is called lopsided
pub const LOPSIDED_MARGIN: f64 = 150.0;

/// Which engine produced a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    Regression,
    Iterative,
}

impl Default for EngineKind {
    fn default() -> Self {
        EngineKind::Regression
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Regression => write!(f, "regression"),
            EngineKind::Iterative => write!(f, "iterative"),
        }
    }
}

/// All engine configuration for one period
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub decay: DecayConfig,
    pub regression: RegressionConfig,
    pub solver: SolverConfig,
    pub iterative: IterativeConfig,
    pub anchor: AnchorConfig,
}

impl PeriodConfig {
    /// Validate all embedded configurations
    pub fn validate(&self) -> Result<()> {
        self.decay.validate()?;
        self.regression.validate()?;
        self.solver.validate()?;
        self.iterative.validate()?;
        self.anchor.validate()?;
        Ok(())
    }
}

/// Outcome of a solve, engine-agnostic
#[derive(Debug, Clone)]
pub struct SolveSummary {
    pub engine: EngineKind,
    pub teams_solved: usize,
    /// Newton iterations or full sweeps, depending on the engine
    pub iterations: usize,
    /// Final residual norm or final largest per-sweep change
    pub residual: f64,
    /// Teams that had a starting power fitted mid-run (iterative only)
    pub seeded: Vec<TeamName>,
}

/// One row of the published ranking
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTeam {
    pub rank: u32,
    pub name: TeamName,
    pub power: f64,
    pub games_played: u32,
    pub is_new: bool,
}

/// Every team of the period sorted into its publication bucket
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Active teams in rank order
    pub ranked: Vec<RankedTeam>,
    pub inactive: Vec<TeamName>,
    pub no_games: Vec<TeamName>,
    pub hiatus: Vec<TeamName>,
    pub disbanded: Vec<TeamName>,
    pub unrated: Vec<TeamName>,
}

/// Predicted outcome of a hypothetical matchup
#[derive(Debug, Clone)]
pub struct MatchupForecast {
    pub home: TeamName,
    pub away: TeamName,
    pub home_power: f64,
    pub away_power: f64,
    /// Predicted DOS from the home perspective
    pub expected_dos: f64,
}

impl MatchupForecast {
    pub fn gap(&self) -> f64 {
        self.home_power - self.away_power
    }

    /// The higher-powered side; the home side on an exact tie
    pub fn favored(&self) -> &str {
        if self.gap() >= 0.0 {
            &self.home
        } else {
            &self.away
        }
    }

    pub fn is_close(&self) -> bool {
        self.gap().abs() < CLOSE_GAME_MARGIN
    }

    pub fn is_lopsided(&self) -> bool {
        self.gap().abs() > LOPSIDED_MARGIN
    }

    /// Losing score per point of winning score implied by the DOS
    pub fn score_ratio(&self) -> f64 {
        let dos = self.expected_dos.abs();
        (1.0 - dos) / (1.0 + dos)
    }
}

/// One row of a period-over-period comparison
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub rank: u32,
    /// Places gained since the prior snapshot, negative when dropped
    pub rank_change: Option<i64>,
    pub name: TeamName,
    pub power: f64,
    pub power_change: Option<f64>,
    pub games_played: u32,
}

/// A single ranking period and everything ingested into it
#[derive(Debug)]
pub struct RankingPeriod {
    start: NaiveDate,
    end: NaiveDate,
    notes: Option<String>,
    config: PeriodConfig,
    games: Vec<Game>,
    weeks: Vec<Week>,
    registry: TeamRegistry,
    seed_overrides: HashMap<TeamName, f64>,
}

impl RankingPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        Self::with_config(start, end, PeriodConfig::default())
    }

    pub fn with_config(start: NaiveDate, end: NaiveDate, config: PeriodConfig) -> Result<Self> {
        if start > end {
            return Err(RankingError::ConfigurationError {
                message: format!("period start {} is after its end {}", start, end),
            }
            .into());
        }
        config.validate()?;

        let weeks = build_weeks(start, end);
        Ok(Self {
            start,
            end,
            notes: None,
            config,
            games: Vec::new(),
            weeks,
            registry: TeamRegistry::new(),
            seed_overrides: HashMap::new(),
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = Some(notes.into());
    }

    pub fn config(&self) -> &PeriodConfig {
        &self.config
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    pub fn registry(&self) -> &TeamRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TeamRegistry {
        &mut self.registry
    }

    /// Register teams ahead of ingest so roster-only teams are reported
    /// even when they never play
    pub fn register_roster<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.registry.ensure(name.as_ref());
        }
    }

    /// Add one game. The date must fall inside the period.
    pub fn add_game(&mut self, game: Game) -> Result<usize> {
        if game.date() < self.start || game.date() > self.end {
            return Err(RankingError::OutOfPeriod { date: game.date() }.into());
        }
        let week = week_index(&self.weeks, game.date())
            .ok_or_else(|| anyhow!("no week bucket covers {}", game.date()))?;

        let id = self.games.len();
        self.registry.ensure(game.home_team()).record_game(id, &game);
        self.registry.ensure(game.away_team()).record_game(id, &game);
        self.weeks[week].game_ids.push(id);
        self.games.push(game);
        Ok(id)
    }

    /// Add every game that falls inside the period, silently dropping the
    /// rest. Returns the number added.
    pub fn ingest_games<I>(&mut self, games: I) -> Result<usize>
    where
        I: IntoIterator<Item = Game>,
    {
        let mut added = 0;
        let mut skipped = 0;
        for game in games {
            if game.date() < self.start || game.date() > self.end {
                skipped += 1;
                continue;
            }
            self.add_game(game)?;
            added += 1;
        }
        if skipped > 0 {
            debug!(
                "dropped {} games outside {} to {}",
                skipped, self.start, self.end
            );
        }
        info!("ingested {} games across {} weeks", added, self.weeks.len());
        Ok(added)
    }

    /// Flag a team as on hiatus. Returns false for unknown teams.
    pub fn mark_hiatus(&mut self, name: &str) -> bool {
        match self.registry.get_mut(name) {
            Some(team) => {
                team.hiatus = true;
                true
            }
            None => {
                warn!("hiatus flag for unknown team {}", name);
                false
            }
        }
    }

    /// Flag a team as disbanded. Its games still count for opponents.
    pub fn mark_disbanded(&mut self, name: &str) -> bool {
        match self.registry.get_mut(name) {
            Some(team) => {
                team.disbanded = true;
                true
            }
            None => {
                warn!("disbanded flag for unknown team {}", name);
                false
            }
        }
    }

    /// Pin a team's initial guess, overriding history and defaults
    pub fn set_seed_override(&mut self, name: &str, power: f64) -> Result<()> {
        if !self.registry.contains(name) {
            return Err(RankingError::UnknownTeam {
                name: name.to_string(),
            }
            .into());
        }
        self.seed_overrides.insert(name.to_string(), power);
        Ok(())
    }

    /// Override a team's activity requirements for this period
    pub fn set_activity_requirements(
        &mut self,
        name: &str,
        min_games: u32,
        min_opponents: usize,
    ) -> Result<()> {
        let team = self.registry.require_mut(name)?;
        team.min_games_required = min_games;
        team.min_unique_opponents = min_opponents;
        Ok(())
    }

    /// Seed the registry from published history; returns the count seeded
    pub fn seed_from_history(&mut self, history: &RankingHistory) -> usize {
        history.seed_registry(&mut self.registry)
    }

    /// Connectivity partition over the current registry
    pub fn regions(&self) -> Vec<Region> {
        partition_regions(&self.registry)
    }

    /// Full-period regression solve over every team with games
    pub fn solve_regression(&mut self) -> Result<SolveSummary> {
        let problem = RegressionProblem::build(
            &self.registry,
            &self.games,
            &self.config.decay,
            self.end,
            &self.config.regression,
        )?;
        let initial = self.initial_guess(problem.unknowns());
        let solution = problem.solve(initial, &self.config.solver)?;
        self.apply_powers(&solution.powers)?;

        Ok(SolveSummary {
            engine: EngineKind::Regression,
            teams_solved: solution.powers.len(),
            iterations: solution.iterations,
            residual: solution.residual_norm,
            seeded: Vec::new(),
        })
    }

    /// Re-solve only the teams with games after the newest snapshot
    /// boundary, holding everyone else at their published power.
    ///
    /// Seed the registry from the same history first so unchanged teams
    /// keep their published powers through classification and the next
    /// snapshot. Powers stay on the published scale, so no re-anchoring
    /// is needed afterwards.
    pub fn solve_regression_incremental(
        &mut self,
        history: &RankingHistory,
    ) -> Result<SolveSummary> {
        let problem = RegressionProblem::build_incremental(
            &self.registry,
            &self.games,
            &self.config.decay,
            self.end,
            &self.config.regression,
            history,
        )?;
        let initial = self.initial_guess(problem.unknowns());
        let solution = problem.solve(initial, &self.config.solver)?;
        self.apply_powers(&solution.powers)?;

        Ok(SolveSummary {
            engine: EngineKind::Regression,
            teams_solved: solution.powers.len(),
            iterations: solution.iterations,
            residual: solution.residual_norm,
            seeded: Vec::new(),
        })
    }

    /// Weekly-batched K-factor solve
    ///
    /// With history, carried-in teams start from their published powers
    /// and the rest are fitted from observations mid-run. Without
    /// history, every team that played starts from the default power.
    pub fn solve_iterative(&mut self, history: Option<&RankingHistory>) -> Result<SolveSummary> {
        match history {
            Some(history) => {
                history.seed_registry(&mut self.registry);
            }
            None => {
                let default_power = self.config.iterative.default_power;
                let names: Vec<TeamName> = self.registry.order().to_vec();
                for name in names {
                    if let Some(team) = self.registry.get_mut(&name) {
                        if team.games_played > 0 && team.power.is_none() {
                            team.power = Some(default_power);
                        }
                    }
                }
            }
        }
        for (name, power) in &self.seed_overrides {
            if let Some(team) = self.registry.get_mut(name) {
                team.power = Some(*power);
                team.is_new = false;
            }
        }

        let engine = IterativeEngine::new(
            self.config.iterative.clone(),
            self.config.decay.clone(),
        )?;
        let outcome = engine.run(&mut self.registry, &self.games, &self.weeks, self.end)?;
        let teams_solved = self
            .registry
            .iter_ordered()
            .filter(|team| team.games_played > 0 && team.power.is_some())
            .count();

        Ok(SolveSummary {
            engine: EngineKind::Iterative,
            teams_solved,
            iterations: outcome.sweeps,
            residual: outcome.final_max_change,
            seeded: outcome.seeded,
        })
    }

    /// Rated teams in descending power order, numbered from one. Hiatus
    /// and disbanded teams never appear; inactive teams only when
    /// `only_active` is off.
    pub fn standings(&self, only_active: bool) -> Vec<RankedTeam> {
        let mut rows: Vec<(&Team, f64)> = self
            .registry
            .iter_ordered()
            .filter(|team| !team.hiatus && !team.disbanded)
            .filter_map(|team| team.power.map(|power| (team, power)))
            .filter(|(team, _)| !only_active || team.is_active())
            .collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1));

        rows.into_iter()
            .enumerate()
            .map(|(i, (team, power))| RankedTeam {
                rank: (i as u32) + 1,
                name: team.name.clone(),
                power,
                games_played: team.games_played,
                is_new: team.is_new,
            })
            .collect()
    }

    /// Sort every team into its publication bucket
    pub fn classify(&self) -> Classification {
        let mut classification = Classification {
            ranked: self.standings(true),
            ..Classification::default()
        };

        for team in self.registry.iter_ordered() {
            let name = team.name.clone();
            match team.status() {
                TeamStatus::Active => {}
                TeamStatus::Inactive => classification.inactive.push(name),
                TeamStatus::NoGames => classification.no_games.push(name),
                TeamStatus::Hiatus => classification.hiatus.push(name),
                TeamStatus::Disbanded => classification.disbanded.push(name),
                TeamStatus::Unrated => classification.unrated.push(name),
            }
        }
        classification
    }

    /// Capture every rated team for the history file. Only teams in the
    /// active ranking carry a rank.
    pub fn snapshot(&self) -> Snapshot {
        let ranks: HashMap<TeamName, u32> = self
            .standings(true)
            .into_iter()
            .map(|row| (row.name, row.rank))
            .collect();

        let mut snapshot = Snapshot::new(self.end);
        for team in self.registry.iter_ordered() {
            if let Some(power) = team.power {
                snapshot.record(&team.name, power, ranks.get(&team.name).copied());
            }
        }
        snapshot
    }

    /// Predicted outcome of a matchup between two rated teams
    pub fn expected_result(&self, home: &str, away: &str) -> Result<MatchupForecast> {
        let home_power = self.rated_power(home)?;
        let away_power = self.rated_power(away)?;
        let expected_dos = predicted_dos(
            home_power - away_power,
            self.config.regression.scaling_factor,
        );
        Ok(MatchupForecast {
            home: home.to_string(),
            away: away.to_string(),
            home_power,
            away_power,
            expected_dos,
        })
    }

    /// Power that best explains the team's results against rated
    /// opponents, holding everyone else fixed. A sanity check for
    /// unrated or borderline teams.
    pub fn expected_power(&self, name: &str) -> Result<f64> {
        let team = self.registry.require(name)?;
        let s = self.config.regression.scaling_factor;

        let mut samples: Vec<(f64, f64)> = Vec::new();
        for &game_id in &team.game_ids {
            let game = self
                .games
                .get(game_id)
                .ok_or_else(|| anyhow!("game id {} out of range", game_id))?;
            let (dos, opponent) = match (game.dos_for(name), game.opponent_of(name)) {
                (Some(dos), Some(opponent)) => (dos, opponent),
                _ => continue,
            };
            if let Some(power) = self.registry.get(opponent).and_then(|team| team.power) {
                samples.push((power, dos));
            }
        }
        if samples.is_empty() {
            return Err(RankingError::DegenerateInput {
                reason: format!("{} has no games against rated opponents", name),
            }
            .into());
        }

        let iterative = &self.config.iterative;
        bisect(
            move |x| {
                samples
                    .iter()
                    .map(|&(power, dos)| {
                        let z = (x - power) / (2.0 * s);
                        let cosh = z.cosh();
                        (dos - z.tanh()) / (cosh * cosh)
                    })
                    .sum::<f64>()
            },
            iterative.seed_bracket_low,
            iterative.seed_bracket_high,
            iterative.seed_tolerance,
            200,
        )
    }

    /// Current active ranking against a prior snapshot
    pub fn compare_with(&self, prior: &Snapshot) -> Vec<ComparisonRow> {
        self.standings(true)
            .into_iter()
            .map(|row| {
                let rank_change = prior
                    .rank_of(&row.name)
                    .map(|prior_rank| i64::from(prior_rank) - i64::from(row.rank));
                let power_change = prior
                    .power_of(&row.name)
                    .map(|prior_power| row.power - prior_power);
                ComparisonRow {
                    rank: row.rank,
                    rank_change,
                    name: row.name,
                    power: row.power,
                    power_change,
                    games_played: row.games_played,
                }
            })
            .collect()
    }

    /// A team's games in ingest order
    pub fn games_of(&self, name: &str) -> Result<Vec<&Game>> {
        let team = self.registry.require(name)?;
        let mut games = Vec::with_capacity(team.game_ids.len());
        for &game_id in &team.game_ids {
            games.push(
                self.games
                    .get(game_id)
                    .ok_or_else(|| anyhow!("game id {} out of range", game_id))?,
            );
        }
        Ok(games)
    }

    fn rated_power(&self, name: &str) -> Result<f64> {
        let team = self.registry.require(name)?;
        team.power.ok_or_else(|| {
            RankingError::DegenerateInput {
                reason: format!("{} has no power this period", name),
            }
            .into()
        })
    }

    fn initial_guess(&self, unknowns: &[TeamName]) -> Vec<f64> {
        unknowns
            .iter()
            .map(|name| {
                if let Some(&power) = self.seed_overrides.get(name) {
                    return power;
                }
                if let Some(power) = self.registry.get(name).and_then(|team| team.power) {
                    return power;
                }
                self.config.regression.default_power
            })
            .collect()
    }

    fn apply_powers(&mut self, powers: &[(TeamName, f64)]) -> Result<()> {
        for (name, power) in powers {
            let team = self.registry.require_mut(name)?;
            team.power = Some(*power);
        }
        Ok(())
    }
}
