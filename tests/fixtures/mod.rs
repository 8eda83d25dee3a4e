//! Test fixtures and shared helpers for integration testing

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use power_rank::error::Result;
use power_rank::rating::anchor::{AnchorPreview, AnchorResolver, AnchorVerdict, RegionStanding};

/// Two rounds of a full round robin between four teams, with a clean
/// dominance order Reds > Blues > Greens > Golds.
pub const LEAGUE_SEASON: &str = "\
20180301,Reds,3,Blues,1
20180302,Greens,3,Golds,1
20180308,Reds,4,Greens,2
20180309,Blues,4,Golds,1
20180315,Reds,5,Golds,1
20180316,Blues,3,Greens,2
20180322,Blues,1,Reds,2
20180323,Golds,1,Greens,2
20180329,Greens,1,Reds,3
20180330,Golds,2,Blues,3
20180405,Golds,1,Reds,4
20180406,Greens,2,Blues,3
";

/// A second, disconnected group that never meets the league:
/// Islanders > Pirates > Corsairs.
pub const ISLAND_SEASON: &str = "\
20180302,Islanders,4,Pirates,2
20180309,Pirates,3,Corsairs,1
20180316,Islanders,5,Corsairs,2
20180323,Pirates,1,Islanders,2
20180330,Corsairs,1,Islanders,3
20180406,Corsairs,2,Pirates,3
";

/// Write `content` to `name` inside `dir` and return the full path
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Anchor resolver that replays queued pins and rejects the first
/// `rejections` review rounds before accepting
pub struct ScriptedAnchorResolver {
    pins: VecDeque<f64>,
    rejections: usize,
    pub anchor_calls: usize,
    pub review_calls: usize,
}

impl ScriptedAnchorResolver {
    pub fn new(pins: Vec<f64>, rejections: usize) -> Self {
        Self {
            pins: pins.into(),
            rejections,
            anchor_calls: 0,
            review_calls: 0,
        }
    }

    /// Resolver that pins once per region and accepts the first review
    pub fn accepting(pins: Vec<f64>) -> Self {
        Self::new(pins, 0)
    }
}

impl AnchorResolver for ScriptedAnchorResolver {
    fn anchor_power(&mut self, _region: &RegionStanding) -> Result<f64> {
        self.anchor_calls += 1;
        self.pins
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("ran out of scripted pins"))
    }

    fn review(&mut self, _preview: &AnchorPreview) -> Result<AnchorVerdict> {
        self.review_calls += 1;
        if self.review_calls <= self.rejections {
            Ok(AnchorVerdict::Retry)
        } else {
            Ok(AnchorVerdict::Accept)
        }
    }
}
