//! Nonlinear system solver for the regression engine
//!
//! Solves square systems `f(x) = 0` with a damped Newton iteration and a
//! finite-difference Jacobian. The damping is not optional here: power
//! differences are invariant under a uniform shift of any connected region,
//! so the Jacobian of the stationarity system is singular by construction
//! and an undamped Newton step does not exist. The damped step
//! `(J'J + lambda*D) dx = -J'r` always does, and the iteration settles on
//! one point of the solution family.
//!
//! Also provides the scalar bisection used to seed new teams in the
//! iterative engine.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{RankingError, Result};

/// Configuration for the damped Newton solver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Outer iteration limit; each outer iteration builds one Jacobian
    pub max_iterations: usize,
    /// Convergence threshold on the residual infinity norm
    pub tolerance: f64,
    /// Relative step for the finite-difference Jacobian
    pub fd_step: f64,
    /// Starting damping factor
    pub initial_damping: f64,
    /// Damping ceiling; hitting it means no step improves the residual
    pub max_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
            fd_step: 1e-6,
            initial_damping: 1e-3,
            max_damping: 1e10,
        }
    }
}

impl SolverConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RankingError::ConfigurationError {
                message: "Solver iteration limit must be positive".to_string(),
            }
            .into());
        }
        if self.tolerance <= 0.0 || self.fd_step <= 0.0 {
            return Err(RankingError::ConfigurationError {
                message: "Solver tolerance and step must be positive".to_string(),
            }
            .into());
        }
        if self.initial_damping <= 0.0 || self.max_damping <= self.initial_damping {
            return Err(RankingError::ConfigurationError {
                message: "Solver damping range is inverted".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Solution of a nonlinear system
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub values: DVector<f64>,
    pub iterations: usize,
    /// Residual infinity norm at the solution
    pub residual_norm: f64,
}

/// Damped Newton solver over a caller-supplied residual function
#[derive(Debug)]
pub struct NewtonSolver {
    config: SolverConfig,
}

impl NewtonSolver {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Find `x` with `residual(x) = 0`, starting from `initial`
    ///
    /// The iteration limit surfaces as a `ConvergenceFailure` error rather
    /// than a silently truncated answer.
    pub fn solve<F>(&self, residual: F, initial: DVector<f64>) -> Result<SolveOutcome>
    where
        F: Fn(&DVector<f64>) -> DVector<f64>,
    {
        let n = initial.len();
        if n == 0 {
            return Err(RankingError::DegenerateInput {
                reason: "cannot solve an empty system".to_string(),
            }
            .into());
        }

        let mut x = initial;
        let mut r = residual(&x);
        let mut damping = self.config.initial_damping;

        for iteration in 0..self.config.max_iterations {
            let norm = r.amax();
            if norm < self.config.tolerance {
                debug!(
                    "solver converged after {} iterations (residual {:.3e})",
                    iteration, norm
                );
                return Ok(SolveOutcome {
                    values: x,
                    iterations: iteration,
                    residual_norm: norm,
                });
            }

            // forward-difference Jacobian, one residual evaluation per column
            let mut jacobian = DMatrix::zeros(n, n);
            for j in 0..n {
                let h = self.config.fd_step * x[j].abs().max(1.0);
                let mut shifted = x.clone();
                shifted[j] += h;
                let column = (residual(&shifted) - &r) / h;
                jacobian.set_column(j, &column);
            }

            let jt = jacobian.transpose();
            let jtj = &jt * &jacobian;
            let jtr = &jt * &r;
            let rhs = -&jtr;
            let current_squared = r.norm_squared();

            let mut accepted = false;
            while damping <= self.config.max_damping {
                let mut damped = jtj.clone();
                for d in 0..n {
                    // scale-aware damping keeps flat directions solvable
                    damped[(d, d)] += damping * jtj[(d, d)].max(1e-12);
                }

                let step = match damped.cholesky() {
                    Some(factor) => factor.solve(&rhs),
                    None => {
                        damping *= 10.0;
                        continue;
                    }
                };

                let trial = &x + &step;
                let trial_r = residual(&trial);
                if trial_r.norm_squared() < current_squared {
                    trace!(
                        "iteration {}: residual {:.3e} -> {:.3e} (damping {:.1e})",
                        iteration,
                        current_squared.sqrt(),
                        trial_r.norm_squared().sqrt(),
                        damping
                    );
                    x = trial;
                    r = trial_r;
                    damping = (damping * 0.1).max(1e-12);
                    accepted = true;
                    break;
                }
                damping *= 10.0;
            }

            if !accepted {
                return Err(RankingError::ConvergenceFailure {
                    iterations: iteration + 1,
                    residual: r.amax(),
                }
                .into());
            }
        }

        Err(RankingError::ConvergenceFailure {
            iterations: self.config.max_iterations,
            residual: r.amax(),
        }
        .into())
    }
}

/// Scalar bisection for a sign-changing function over `[lower, upper]`
pub fn bisect<F>(f: F, lower: f64, upper: f64, tolerance: f64, max_iterations: usize) -> Result<f64>
where
    F: Fn(f64) -> f64,
{
    if !(lower < upper) {
        return Err(RankingError::DegenerateInput {
            reason: format!("bisection bracket [{}, {}] is inverted", lower, upper),
        }
        .into());
    }

    let mut lo = lower;
    let mut hi = upper;
    let mut f_lo = f(lo);
    if f_lo == 0.0 {
        return Ok(lo);
    }
    let f_hi = f(hi);
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return Err(RankingError::DegenerateInput {
            reason: format!("no sign change over [{}, {}]", lower, upper),
        }
        .into());
    }

    for _ in 0..max_iterations {
        let mid = 0.5 * (lo + hi);
        if (hi - lo) * 0.5 < tolerance {
            return Ok(mid);
        }
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(RankingError::ConvergenceFailure {
        iterations: max_iterations,
        residual: hi - lo,
    }
    .into())
}
