//! Rating engines and their supporting machinery
//!
//! This module provides the batch regression engine, the iterative
//! K-factor engine, game-age decay, region anchoring, and carry-forward
//! of published powers across ranking periods.

pub mod anchor;
pub mod carry_forward;
pub mod decay;
pub mod iterative;
pub mod regression;
pub mod solver;

// Re-export commonly used types
pub use anchor::{AnchorConfig, AnchorOutcome, AnchorPreview, AnchorResolver, AnchorVerdict};
pub use carry_forward::{CarryForwardMode, RankingHistory, Snapshot, SnapshotEntry};
pub use decay::{DecayConfig, DecayPolicy};
pub use iterative::{IterativeConfig, IterativeEngine, IterativeOutcome};
pub use regression::{RegressionConfig, RegressionProblem, RegressionSolution};
pub use solver::{NewtonSolver, SolveOutcome, SolverConfig};
