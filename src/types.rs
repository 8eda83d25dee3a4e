//! Core data types for the ranking engine

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{RankingError, Result};

/// Team identifier used throughout the system
pub type TeamName = String;

/// Games a team must play in a period to be ranked, unless overridden
pub const DEFAULT_MIN_GAMES: u32 = 5;

/// Distinct opponents a team must face in a period to be ranked
pub const DEFAULT_MIN_OPPONENTS: usize = 3;

/// A single recorded game result
///
/// Immutable once constructed. The degree of supremacy (DOS) is derived from
/// the final score at construction and expresses the home-side margin as
/// `(home - away) / (home + away)`, strictly inside (-1, 1). Drawn games are
/// rejected: the model has no draw outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    date: NaiveDate,
    home_team: TeamName,
    home_score: u32,
    away_team: TeamName,
    away_score: u32,
    dos: f64,
}

impl Game {
    pub fn new(
        date: NaiveDate,
        home_team: impl Into<TeamName>,
        home_score: u32,
        away_team: impl Into<TeamName>,
        away_score: u32,
    ) -> Result<Self> {
        let home_team = home_team.into();
        let away_team = away_team.into();

        if home_team == away_team {
            return Err(RankingError::DegenerateInput {
                reason: format!("{} cannot play itself", home_team),
            }
            .into());
        }
        if home_score == away_score {
            return Err(RankingError::DrawnGame {
                home: home_team,
                away: away_team,
                home_score,
                away_score,
            }
            .into());
        }

        let total = f64::from(home_score) + f64::from(away_score);
        let dos = (f64::from(home_score) - f64::from(away_score)) / total;

        Ok(Self {
            date,
            home_team,
            home_score,
            away_team,
            away_score,
            dos,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn home_team(&self) -> &str {
        &self.home_team
    }

    pub fn away_team(&self) -> &str {
        &self.away_team
    }

    pub fn home_score(&self) -> u32 {
        self.home_score
    }

    pub fn away_score(&self) -> u32 {
        self.away_score
    }

    /// Degree of supremacy from the home perspective
    pub fn dos(&self) -> f64 {
        self.dos
    }

    pub fn winner(&self) -> &str {
        if self.dos > 0.0 {
            &self.home_team
        } else {
            &self.away_team
        }
    }

    pub fn loser(&self) -> &str {
        if self.dos > 0.0 {
            &self.away_team
        } else {
            &self.home_team
        }
    }

    pub fn involves(&self, name: &str) -> bool {
        self.home_team == name || self.away_team == name
    }

    pub fn opponent_of(&self, name: &str) -> Option<&str> {
        if self.home_team == name {
            Some(&self.away_team)
        } else if self.away_team == name {
            Some(&self.home_team)
        } else {
            None
        }
    }

    /// Degree of supremacy from the named team's perspective, negated for
    /// the away side
    pub fn dos_for(&self, name: &str) -> Option<f64> {
        if self.home_team == name {
            Some(self.dos)
        } else if self.away_team == name {
            Some(-self.dos)
        } else {
            None
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {:<33}  {:>3}  ||  {:<33}  {:>3}  {:>6.3}",
            self.date, self.home_team, self.home_score, self.away_team, self.away_score, self.dos
        )
    }
}

/// Classification of a team within a ranking period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeamStatus {
    /// Met the activity requirements and holds a power rating
    Active,
    /// Played games but fell short of the activity requirements
    Inactive,
    /// On the roster but played nothing this period
    NoGames,
    /// Flagged as on hiatus by the operator
    Hiatus,
    /// Flagged as disbanded; games still count for opponents
    Disbanded,
    /// Played games but no power could be assigned
    Unrated,
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TeamStatus::Active => "active",
            TeamStatus::Inactive => "inactive",
            TeamStatus::NoGames => "no games",
            TeamStatus::Hiatus => "hiatus",
            TeamStatus::Disbanded => "disbanded",
            TeamStatus::Unrated => "unrated",
        };
        write!(f, "{}", label)
    }
}

/// Mutable per-period aggregate for one team
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: TeamName,
    /// Solved power, once an engine has assigned one this period
    pub power: Option<f64>,
    pub games_played: u32,
    pub wins: u32,
    /// Distinct opponents in first-encounter order
    pub opponents: Vec<TeamName>,
    /// Indices into the period's game arena, in ingest order
    pub game_ids: Vec<usize>,
    /// Set when the team has no power carried in from a prior period
    pub is_new: bool,
    pub hiatus: bool,
    pub disbanded: bool,
    pub min_games_required: u32,
    pub min_unique_opponents: usize,
    /// Published power per prior period boundary, filled when seeding
    pub prior_powers: BTreeMap<NaiveDate, f64>,
    pub prior_ranks: BTreeMap<NaiveDate, u32>,
}

impl Team {
    pub fn new(name: impl Into<TeamName>) -> Self {
        Self {
            name: name.into(),
            power: None,
            games_played: 0,
            wins: 0,
            opponents: Vec::new(),
            game_ids: Vec::new(),
            is_new: false,
            hiatus: false,
            disbanded: false,
            min_games_required: DEFAULT_MIN_GAMES,
            min_unique_opponents: DEFAULT_MIN_OPPONENTS,
            prior_powers: BTreeMap::new(),
            prior_ranks: BTreeMap::new(),
        }
    }

    /// Fold one game into the aggregate. Games that do not involve this
    /// team are ignored.
    pub fn record_game(&mut self, game_id: usize, game: &Game) {
        let opponent = match game.opponent_of(&self.name) {
            Some(opponent) => opponent.to_string(),
            None => return,
        };

        self.games_played += 1;
        if game.winner() == self.name {
            self.wins += 1;
        }
        if !self.opponents.contains(&opponent) {
            self.opponents.push(opponent);
        }
        self.game_ids.push(game_id);
    }

    /// Whether the team meets its activity requirements for ranking
    pub fn is_active(&self) -> bool {
        self.games_played >= self.min_games_required
            && self.opponents.len() >= self.min_unique_opponents
    }

    pub fn status(&self) -> TeamStatus {
        if self.hiatus {
            TeamStatus::Hiatus
        } else if self.disbanded {
            TeamStatus::Disbanded
        } else if self.games_played == 0 {
            TeamStatus::NoGames
        } else if self.power.is_none() {
            TeamStatus::Unrated
        } else if !self.is_active() {
            TeamStatus::Inactive
        } else {
            TeamStatus::Active
        }
    }
}

/// Owned collection of teams with a stable first-seen enumeration order
///
/// The order vector pins down every downstream enumeration (regression
/// unknowns, region discovery) so results are reproducible run to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamRegistry {
    teams: HashMap<TeamName, Team>,
    order: Vec<TeamName>,
}

impl TeamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.teams.contains_key(name)
    }

    /// Look up a team, creating it at the end of the enumeration order if
    /// it has not been seen before
    pub fn ensure(&mut self, name: &str) -> &mut Team {
        match self.teams.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.order.push(name.to_string());
                entry.insert(Team::new(name))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Team> {
        self.teams.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Team> {
        self.teams.get_mut(name)
    }

    pub fn require(&self, name: &str) -> Result<&Team> {
        self.teams.get(name).ok_or_else(|| {
            RankingError::UnknownTeam {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn require_mut(&mut self, name: &str) -> Result<&mut Team> {
        self.teams.get_mut(name).ok_or_else(|| {
            RankingError::UnknownTeam {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Enumeration order: roster registrations first, then first appearance
    /// in the game history
    pub fn order(&self) -> &[TeamName] {
        &self.order
    }

    pub fn iter_ordered(&self) -> impl Iterator<Item = &Team> {
        self.order.iter().filter_map(|name| self.teams.get(name))
    }
}
