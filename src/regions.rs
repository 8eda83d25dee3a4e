//! Region connectivity analysis
//!
//! Two teams are connected when they have played each other at least once;
//! regions are the maximal connected components of that relation. Powers are
//! only comparable within a region, which is why anchoring and the ranked
//! table both start from this partition.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{TeamName, TeamRegistry};

/// One maximal connected component of the played-against graph
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    members: Vec<TeamName>,
}

impl Region {
    /// Members in discovery order
    pub fn members(&self) -> &[TeamName] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|member| member == name)
    }
}

/// Partition the roster into regions, largest first
///
/// Uses an explicit stack so deep chains of teams cannot overflow the call
/// stack. Ties on size keep first-seen order, so the partition is
/// deterministic for a given registry.
pub fn partition_regions(registry: &TeamRegistry) -> Vec<Region> {
    let order = registry.order();
    let index: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
    for (i, name) in order.iter().enumerate() {
        if let Some(team) = registry.get(name) {
            for opponent in &team.opponents {
                if let Some(&j) = index.get(opponent.as_str()) {
                    adjacency[i].push(j);
                }
            }
        }
    }

    let mut visited = vec![false; order.len()];
    let mut regions = Vec::new();
    for seed in 0..order.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut members = Vec::new();
        let mut stack = vec![seed];
        while let Some(i) = stack.pop() {
            members.push(order[i].clone());
            for &j in &adjacency[i] {
                if !visited[j] {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }
        regions.push(Region { members });
    }

    // stable sort keeps first-seen order among equal sizes
    regions.sort_by(|a, b| b.len().cmp(&a.len()));

    debug!(
        "partitioned {} teams into {} regions",
        registry.len(),
        regions.len()
    );
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Game;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn registry_from(edges: &[(&str, &str)]) -> TeamRegistry {
        let date = NaiveDate::from_ymd_opt(2018, 3, 7).unwrap();
        let mut registry = TeamRegistry::new();
        for (id, (home, away)) in edges.iter().enumerate() {
            let game = Game::new(date, *home, 2, *away, 1).unwrap();
            registry.ensure(home).record_game(id, &game);
            registry.ensure(away).record_game(id, &game);
        }
        registry
    }

    #[test]
    fn test_two_islands() {
        let registry = registry_from(&[
            ("A", "B"),
            ("B", "C"),
            ("C", "A"),
            ("D", "E"),
        ]);
        let regions = partition_regions(&registry);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].len(), 3);
        assert_eq!(regions[1].len(), 2);
        assert!(regions[0].contains("A"));
        assert!(regions[0].contains("B"));
        assert!(regions[0].contains("C"));
        assert!(regions[1].contains("D"));
        assert!(regions[1].contains("E"));
    }

    #[test]
    fn test_roster_only_team_is_own_region() {
        let mut registry = registry_from(&[("A", "B")]);
        registry.ensure("Loner");
        let regions = partition_regions(&registry);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].members(), ["Loner"]);
    }

    #[test]
    fn test_size_ties_keep_first_seen_order() {
        let registry = registry_from(&[("A", "B"), ("C", "D")]);
        let regions = partition_regions(&registry);

        assert_eq!(regions.len(), 2);
        assert!(regions[0].contains("A"));
        assert!(regions[1].contains("C"));
    }

    #[test]
    fn test_long_chain_single_region() {
        let names: Vec<String> = (0..300).map(|i| format!("T{}", i)).collect();
        let edges: Vec<(&str, &str)> = names
            .windows(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
            .collect();
        let registry = registry_from(&edges);
        let regions = partition_regions(&registry);

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].len(), 300);
    }

    proptest! {
        #[test]
        fn prop_partition_covers_every_team_once(
            edges in prop::collection::vec((0usize..12, 0usize..12), 0..40)
        ) {
            let names: Vec<String> = (0..12).map(|i| format!("T{}", i)).collect();
            let pairs: Vec<(&str, &str)> = edges
                .iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (names[*a].as_str(), names[*b].as_str()))
                .collect();
            let mut registry = registry_from(&pairs);
            for name in &names {
                registry.ensure(name);
            }

            let regions = partition_regions(&registry);
            let total: usize = regions.iter().map(Region::len).sum();
            prop_assert_eq!(total, 12);
            for name in &names {
                let hits = regions.iter().filter(|r| r.contains(name)).count();
                prop_assert_eq!(hits, 1);
            }
            // opponents always share a region
            for (a, b) in &pairs {
                let ra = regions.iter().position(|r| r.contains(a));
                let rb = regions.iter().position(|r| r.contains(b));
                prop_assert_eq!(ra, rb);
            }
            // sizes are non-increasing
            for pair in regions.windows(2) {
                prop_assert!(pair[0].len() >= pair[1].len());
            }
        }
    }
}
