//! Region anchoring
//!
//! Solved powers are only determined up to a shift within each region, so
//! the gauge has to be fixed before publication. The dominant region is
//! normalized so its top team sits at the reference power. Every
//! subordinate region of two or more teams is presented relative to its
//! own top team at zero and pinned wherever the resolver says; the
//! resolver then reviews the combined table and can send the subordinate
//! placement back for another round. Regions with fewer than two teams
//! have nothing comparable in them and are never prompted for.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RankingError, Result};
use crate::regions::Region;
use crate::types::{TeamName, TeamRegistry};

/// Configuration for anchoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Power assigned to the top team of the dominant region
    pub reference_power: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            reference_power: 1000.0,
        }
    }
}

impl AnchorConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.reference_power.is_finite() {
            return Err(RankingError::ConfigurationError {
                message: "Reference power must be finite".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// One region's rated standing, in descending power order
#[derive(Debug, Clone)]
pub struct RegionStanding {
    /// Position in the size-sorted region list (0 = dominant)
    pub index: usize,
    pub is_reference: bool,
    /// (team, power, games played), descending by power
    pub members: Vec<(TeamName, f64, u32)>,
}

/// Combined rated standings shown to the resolver for review
#[derive(Debug, Clone)]
pub struct AnchorPreview {
    /// (team, power, games played), descending by power; hiatus and
    /// disbanded teams are left out
    pub standings: Vec<(TeamName, f64, u32)>,
}

/// Decision returned by the resolver after reviewing a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorVerdict {
    Accept,
    Retry,
}

/// Supplies anchor powers for subordinate regions
///
/// Implementations range from the interactive console dialog to scripted
/// resolvers in tests and config-pinned resolvers for unattended runs.
pub trait AnchorResolver {
    /// Anchor power for the top team of the given subordinate region,
    /// presented relative to its own top at zero
    fn anchor_power(&mut self, region: &RegionStanding) -> Result<f64>;

    /// Review the combined standings after all pins are applied
    fn review(&mut self, preview: &AnchorPreview) -> Result<AnchorVerdict>;
}

/// Applied outcome of an anchoring pass
#[derive(Debug, Clone)]
pub struct AnchorOutcome {
    /// Shift that was applied to the dominant region
    pub reference_shift: f64,
    /// (top team, pinned power) per subordinate region, final round
    pub pins: Vec<(TeamName, f64)>,
    /// Review rounds taken; zero when there was nothing to pin
    pub rounds: usize,
}

/// Fix the gauge of every region with two or more teams
pub fn anchor_teams(
    registry: &mut TeamRegistry,
    regions: &[Region],
    config: &AnchorConfig,
    resolver: &mut dyn AnchorResolver,
) -> Result<AnchorOutcome> {
    config.validate()?;

    let rated_regions: Vec<&Region> = regions.iter().filter(|r| r.len() >= 2).collect();
    if rated_regions.is_empty() {
        return Err(RankingError::DegenerateInput {
            reason: "no region with two or more teams to anchor".to_string(),
        }
        .into());
    }

    let dominant = rated_regions[0];
    let (top_name, top_value) = top_power(registry, dominant)?;
    let reference_shift = config.reference_power - top_value;
    shift_region(registry, dominant, reference_shift);
    info!(
        "anchored {} at {:.1} (shift {:+.1})",
        top_name, config.reference_power, reference_shift
    );

    let subordinates = &rated_regions[1..];
    if subordinates.is_empty() {
        return Ok(AnchorOutcome {
            reference_shift,
            pins: Vec::new(),
            rounds: 0,
        });
    }

    // present each subordinate relative to its own top team at zero
    for region in subordinates {
        let (_, top) = top_power(registry, region)?;
        shift_region(registry, region, -top);
    }

    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut pins = Vec::with_capacity(subordinates.len());
        for (offset, region) in subordinates.iter().enumerate() {
            let standing = region_standing(registry, region, offset + 1, false)?;
            let pin = resolver.anchor_power(&standing)?;
            let (name, top) = top_power(registry, region)?;
            shift_region(registry, region, pin - top);
            pins.push((name, pin));
        }

        let preview = build_preview(registry);
        match resolver.review(&preview)? {
            AnchorVerdict::Accept => {
                info!("anchoring accepted after {} round(s)", rounds);
                return Ok(AnchorOutcome {
                    reference_shift,
                    pins,
                    rounds,
                });
            }
            AnchorVerdict::Retry => {
                debug!("anchoring sent back for another round");
                for region in subordinates {
                    let (_, top) = top_power(registry, region)?;
                    shift_region(registry, region, -top);
                }
            }
        }
    }
}

/// Standings for every region of two or more teams, for reporting
pub fn region_standings(
    registry: &TeamRegistry,
    regions: &[Region],
) -> Result<Vec<RegionStanding>> {
    let mut standings = Vec::new();
    for (index, region) in regions.iter().filter(|r| r.len() >= 2).enumerate() {
        standings.push(region_standing(registry, region, index, index == 0)?);
    }
    Ok(standings)
}

fn top_power(registry: &TeamRegistry, region: &Region) -> Result<(TeamName, f64)> {
    let mut best: Option<(TeamName, f64)> = None;
    for name in region.members() {
        let team = registry.require(name)?;
        if let Some(power) = team.power {
            let better = best.as_ref().map_or(true, |(_, current)| power > *current);
            if better {
                best = Some((name.clone(), power));
            }
        }
    }
    best.ok_or_else(|| {
        RankingError::DegenerateInput {
            reason: "region has no rated teams".to_string(),
        }
        .into()
    })
}

fn shift_region(registry: &mut TeamRegistry, region: &Region, delta: f64) {
    for name in region.members() {
        if let Some(team) = registry.get_mut(name) {
            if let Some(power) = team.power.as_mut() {
                *power += delta;
            }
        }
    }
}

fn region_standing(
    registry: &TeamRegistry,
    region: &Region,
    index: usize,
    is_reference: bool,
) -> Result<RegionStanding> {
    let mut members = Vec::new();
    for name in region.members() {
        let team = registry.require(name)?;
        if let Some(power) = team.power {
            members.push((name.clone(), power, team.games_played));
        }
    }
    members.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(RegionStanding {
        index,
        is_reference,
        members,
    })
}

fn build_preview(registry: &TeamRegistry) -> AnchorPreview {
    let mut standings: Vec<(TeamName, f64, u32)> = registry
        .iter_ordered()
        .filter(|team| !team.hiatus && !team.disbanded)
        .filter_map(|team| {
            team.power
                .map(|power| (team.name.clone(), power, team.games_played))
        })
        .collect();
    standings.sort_by(|a, b| b.1.total_cmp(&a.1));
    AnchorPreview { standings }
}
