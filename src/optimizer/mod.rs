//! Unconstrained minimization driver and its supporting pieces.
//!
//! This module provides the L-BFGS quasi-Newton minimizer together with its
//! collaborators:
//! - [`history`]: the bounded curvature-pair memory and initial-Hessian scaling
//! - [`line_search`]: the MINPACK-style safeguarded interpolating line search
//! - [`record`]: the sliding convergence record and termination tests
//! - [`lbfgs`]: the top-level driver tying the pieces together

use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;
use web_time::Duration;

pub mod history;
pub mod lbfgs;
pub(crate) mod line_search;
pub(crate) mod record;

pub use history::{CurvatureHistory, ScalingMode};
pub use lbfgs::{Lbfgs, LbfgsConfig};

/// Minimizer-specific error types for summit-solver
///
/// Numerical pathologies (negative curvature, degenerate line-search
/// intervals) are handled inside the minimization loop and never surface
/// here; these variants cover misuse and resource exhaustion.
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Vector of a different length than the minimization state
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The function evaluation budget was exhausted
    ///
    /// Used as an internal control-flow signal by the line search; the driver
    /// catches it and terminates the run with `success = false` instead of
    /// returning it to the caller.
    #[error("Exceeded the maximum of {max_evaluations} function evaluations")]
    MaxEvaluationsExceeded { max_evaluations: usize },

    /// Allocation of internal buffers failed and nothing was left to release
    #[error("Out of memory: {context}")]
    OutOfMemory { context: String },
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for minimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Terminal state of a minimization run.
///
/// [`MinimizeStatus::Running`] in a returned result means the loop was aborted
/// (evaluation budget exhausted, or degenerate arithmetic) before any
/// convergence criterion fired; every other value names the criterion that
/// stopped the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizeStatus {
    /// No termination criterion has fired
    Running,
    /// The configured iteration cap was reached
    MaxIterationsReached,
    /// The average improvement over the recent window fell below the value
    /// tolerance relative to the newest value
    AverageImprovementReached,
    /// The gradient norm shrank below the relative tolerance times the
    /// initial gradient norm
    RelativeNormReached,
    /// The gradient is numerically zero: `|g| < eps · max(1, |x|)`
    GradientNumericallyZero,
}

impl Display for MinimizeStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MinimizeStatus::Running => write!(f, "Terminated without converging"),
            MinimizeStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            MinimizeStatus::AverageImprovementReached => {
                write!(f, "Average improvement below value tolerance")
            }
            MinimizeStatus::RelativeNormReached => {
                write!(f, "Sufficient decrease in gradient norms: |g|/|g0| below tolerance")
            }
            MinimizeStatus::GradientNumericallyZero => {
                write!(f, "Gradient is numerically zero, stopped on machine epsilon")
            }
        }
    }
}

/// Detailed convergence information.
#[derive(Debug, Clone)]
pub struct ConvergenceInfo {
    /// Final gradient norm
    pub final_gradient_norm: f64,
    /// Final gradient norm divided by the initial gradient norm
    pub relative_gradient_norm: f64,
    /// Step length accepted by the last line search
    pub final_step_length: f64,
    /// Curvature updates skipped for negative curvature or a zero gradient
    /// difference
    pub skipped_updates: usize,
}

impl Display for ConvergenceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Final gradient norm: {:.2e}, Relative gradient norm: {:.2e}, Final step length: {:.2e}, Skipped curvature updates: {}",
            self.final_gradient_norm,
            self.relative_gradient_norm,
            self.final_step_length,
            self.skipped_updates
        )
    }
}

/// Result of a minimization run.
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    /// Final iterate
    pub parameters: DVector<f64>,
    /// Terminal state
    pub status: MinimizeStatus,
    /// Whether the run ended in an acceptable terminal state
    ///
    /// True for every convergence criterion (including the iteration cap);
    /// false when the run was aborted on an exhausted evaluation budget.
    pub success: bool,
    /// Objective value at the initial iterate
    pub initial_value: f64,
    /// Objective value at the final iterate
    pub final_value: f64,
    /// Number of outer iterations performed
    pub iterations: usize,
    /// Number of objective evaluations performed
    pub evaluations: usize,
    /// Total wall-clock time
    pub elapsed_time: Duration,
    /// Convergence statistics
    pub convergence_info: Option<ConvergenceInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert!(
            MinimizeStatus::GradientNumericallyZero
                .to_string()
                .contains("numerically zero")
        );
        assert!(
            MinimizeStatus::RelativeNormReached
                .to_string()
                .contains("|g|/|g0|")
        );
        assert!(MinimizeStatus::Running.to_string().contains("without converging"));
    }

    #[test]
    fn test_optimizer_error_display() {
        let e = OptimizerError::MaxEvaluationsExceeded {
            max_evaluations: 120,
        };
        assert!(e.to_string().contains("120"));
    }
}
