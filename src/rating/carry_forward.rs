//! Power carry-forward between ranking periods
//!
//! Each completed period publishes a snapshot: power and rank per rated
//! team, keyed by the period end date. The snapshot history seeds the next
//! period's initial guesses and pins frozen opponent powers for incremental
//! solves. Snapshots are versioned state, not regenerated report files.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RankingError, Result};
use crate::types::{TeamName, TeamRegistry};
use crate::utils::current_timestamp;

/// How a new period uses the published history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CarryForwardMode {
    /// Ignore history; every team starts from the default power
    Disabled,
    /// Seed initial guesses from the latest published powers, then
    /// re-solve the whole period
    Reseed,
    /// Re-solve only teams with games after the newest boundary, freezing
    /// everyone else at their published power
    Incremental,
}

impl Default for CarryForwardMode {
    fn default() -> Self {
        CarryForwardMode::Disabled
    }
}

/// Published state of one team at a period boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub power: f64,
    /// Rank among active teams; rated but unranked teams carry power only
    pub rank: Option<u32>,
}

/// Per-team published powers at one period end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// End date of the period this snapshot was taken from
    pub boundary: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub entries: BTreeMap<TeamName, SnapshotEntry>,
}

impl Snapshot {
    pub fn new(boundary: NaiveDate) -> Self {
        Self {
            boundary,
            created_at: current_timestamp(),
            entries: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, name: impl Into<TeamName>, power: f64, rank: Option<u32>) {
        self.entries.insert(name.into(), SnapshotEntry { power, rank });
    }

    pub fn power_of(&self, name: &str) -> Option<f64> {
        self.entries.get(name).map(|entry| entry.power)
    }

    pub fn rank_of(&self, name: &str) -> Option<u32> {
        self.entries.get(name).and_then(|entry| entry.rank)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered collection of snapshots, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankingHistory {
    snapshots: Vec<Snapshot>,
}

impl RankingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from snapshots in any order. Duplicate boundaries
    /// are rejected: two published states for the same date cannot both be
    /// authoritative.
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Result<Self> {
        let mut history = Self { snapshots };
        history
            .snapshots
            .sort_by(|a, b| b.boundary.cmp(&a.boundary));
        for pair in history.snapshots.windows(2) {
            if pair[0].boundary == pair[1].boundary {
                return Err(RankingError::ConfigurationError {
                    message: format!("duplicate snapshot boundary {}", pair[0].boundary),
                }
                .into());
            }
        }
        Ok(history)
    }

    pub fn push(&mut self, snapshot: Snapshot) -> Result<()> {
        if self
            .snapshots
            .iter()
            .any(|existing| existing.boundary == snapshot.boundary)
        {
            return Err(RankingError::ConfigurationError {
                message: format!("duplicate snapshot boundary {}", snapshot.boundary),
            }
            .into());
        }
        self.snapshots.push(snapshot);
        self.snapshots
            .sort_by(|a, b| b.boundary.cmp(&a.boundary));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots newest first
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    pub fn latest_boundary(&self) -> Option<NaiveDate> {
        self.latest().map(|snapshot| snapshot.boundary)
    }

    pub fn snapshot_at(&self, boundary: NaiveDate) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.boundary == boundary)
    }

    /// Latest published power for a team, if it was ever rated
    pub fn latest_power(&self, name: &str) -> Option<f64> {
        self.snapshots
            .iter()
            .find_map(|snapshot| snapshot.power_of(name))
    }

    /// Published power of a team as seen from a game date: the earliest
    /// boundary on or after the date that mentions the team, falling
    /// forward to later snapshots when earlier ones do not. The chosen
    /// boundary is nondecreasing in the query date.
    pub fn power_as_of(&self, name: &str, date: NaiveDate) -> Result<f64> {
        self.snapshots
            .iter()
            .rev()
            .filter(|snapshot| snapshot.boundary >= date)
            .find_map(|snapshot| snapshot.power_of(name))
            .ok_or_else(|| {
                RankingError::MissingSnapshot {
                    team: name.to_string(),
                    date,
                }
                .into()
            })
    }

    /// Seed every registry team from its latest published power, marking
    /// teams with no history as new. Prior power and rank maps are filled
    /// for reporting along the way.
    pub fn seed_registry(&self, registry: &mut TeamRegistry) -> usize {
        let names: Vec<TeamName> = registry.order().to_vec();
        let mut seeded = 0;

        for name in names {
            if let Some(team) = registry.get_mut(&name) {
                for snapshot in self.snapshots.iter().rev() {
                    if let Some(entry) = snapshot.entries.get(&name) {
                        team.prior_powers.insert(snapshot.boundary, entry.power);
                        if let Some(rank) = entry.rank {
                            team.prior_ranks.insert(snapshot.boundary, rank);
                        }
                    }
                }
                match self.latest_power(&name) {
                    Some(power) => {
                        team.power = Some(power);
                        team.is_new = false;
                        seeded += 1;
                    }
                    None => {
                        team.power = None;
                        team.is_new = true;
                    }
                }
            }
        }

        debug!("seeded {} of {} teams from history", seeded, registry.len());
        seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Three seasons; Reds rated in all, Blues missing from the middle one,
    /// Greens only rated in the newest.
    fn sample_history() -> RankingHistory {
        let mut first = Snapshot::new(date(2016, 3, 9));
        first.record("Reds", 1000.0, Some(1));
        first.record("Blues", 900.0, Some(2));

        let mut second = Snapshot::new(date(2017, 3, 8));
        second.record("Reds", 1010.0, Some(1));

        let mut third = Snapshot::new(date(2018, 3, 7));
        third.record("Reds", 1020.0, Some(2));
        third.record("Blues", 1040.0, Some(1));
        third.record("Greens", 700.0, None);

        RankingHistory::from_snapshots(vec![second, third, first]).unwrap()
    }

    #[test]
    fn test_snapshots_ordered_newest_first() {
        let history = sample_history();
        let boundaries: Vec<NaiveDate> = history
            .snapshots()
            .iter()
            .map(|snapshot| snapshot.boundary)
            .collect();
        assert_eq!(
            boundaries,
            vec![date(2018, 3, 7), date(2017, 3, 8), date(2016, 3, 9)]
        );
        assert_eq!(history.latest_boundary(), Some(date(2018, 3, 7)));
    }

    #[test]
    fn test_duplicate_boundary_rejected() {
        let a = Snapshot::new(date(2018, 3, 7));
        let b = Snapshot::new(date(2018, 3, 7));
        assert!(RankingHistory::from_snapshots(vec![a.clone(), b]).is_err());

        let mut history = RankingHistory::new();
        history.push(a.clone()).unwrap();
        assert!(history.push(a).is_err());
    }

    #[test]
    fn test_power_as_of_picks_earliest_covering_boundary() {
        let history = sample_history();
        // a game in late 2016 is covered by the 2017 snapshot first
        let power = history.power_as_of("Reds", date(2016, 11, 1)).unwrap();
        assert_eq!(power, 1010.0);
        // a game on the boundary itself uses that boundary
        let power = history.power_as_of("Reds", date(2016, 3, 9)).unwrap();
        assert_eq!(power, 1000.0);
    }

    #[test]
    fn test_power_as_of_falls_forward_past_absent_team() {
        let history = sample_history();
        // Blues are missing from the 2017 snapshot, so a 2016 game falls
        // forward to the 2018 one
        let power = history.power_as_of("Blues", date(2016, 11, 1)).unwrap();
        assert_eq!(power, 1040.0);
    }

    #[test]
    fn test_power_as_of_boundary_is_monotonic() {
        let history = sample_history();
        let dates = [
            date(2016, 1, 1),
            date(2016, 6, 1),
            date(2017, 1, 1),
            date(2017, 6, 1),
            date(2018, 3, 7),
        ];
        let mut last = f64::NEG_INFINITY;
        for query in dates {
            // Reds gain power each season, so a nondecreasing boundary
            // shows up as a nondecreasing power
            let power = history.power_as_of("Reds", query).unwrap();
            assert!(power >= last, "boundary went backwards at {}", query);
            last = power;
        }
    }

    #[test]
    fn test_power_as_of_missing_is_hard_error() {
        let history = sample_history();
        let result = history.power_as_of("Greens", date(2018, 3, 8));
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RankingError>(),
            Some(RankingError::MissingSnapshot { .. })
        ));

        assert!(history.power_as_of("Nobody", date(2016, 1, 1)).is_err());
    }

    #[test]
    fn test_latest_power_scans_newest_first() {
        let history = sample_history();
        assert_eq!(history.latest_power("Reds"), Some(1020.0));
        assert_eq!(history.latest_power("Greens"), Some(700.0));
        assert_eq!(history.latest_power("Nobody"), None);
    }

    #[test]
    fn test_seed_registry_marks_new_teams() {
        let history = sample_history();
        let mut registry = TeamRegistry::new();
        registry.ensure("Reds");
        registry.ensure("Newcomers");

        let seeded = history.seed_registry(&mut registry);
        assert_eq!(seeded, 1);

        let reds = registry.get("Reds").unwrap();
        assert_eq!(reds.power, Some(1020.0));
        assert!(!reds.is_new);
        assert_eq!(reds.prior_powers.len(), 3);
        assert_eq!(reds.prior_ranks.get(&date(2018, 3, 7)), Some(&2));

        let newcomers = registry.get("Newcomers").unwrap();
        assert_eq!(newcomers.power, None);
        assert!(newcomers.is_new);
    }

    #[test]
    fn test_snapshot_round_trip_through_json() {
        let history = sample_history();
        let serialized = serde_json::to_string_pretty(&history).unwrap();
        let restored: RankingHistory = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.latest_power("Blues"), Some(1040.0));
    }
}
