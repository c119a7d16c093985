//! L-BFGS minimizer implementation.
//!
//! Limited-memory BFGS is a quasi-Newton method for unconstrained minimization
//! of smooth objectives `f: ℝⁿ → ℝ`. Instead of a dense inverse Hessian it
//! keeps the last `m` secant pairs `(s, y)` and applies the implicit
//! inverse-Hessian operator with the Nocedal two-loop recursion in `O(m·n)`.
//!
//! # Algorithm Overview
//!
//! At each iteration k:
//! 1. Compute the search direction `dₖ = -Hₖ⁻¹·∇f(xₖ)` via the two-loop
//!    recursion over the stored curvature pairs
//! 2. Find a step length `αₖ` satisfying the strong Wolfe conditions with the
//!    MINPACK interpolating line search
//! 3. Update `xₖ₊₁ = xₖ + αₖ·dₖ` and offer the secant pair
//!    `(xₖ₊₁ − xₖ, ∇fₖ₊₁ − ∇fₖ)` to the curvature history
//! 4. Record the new value and gradient norm and test the termination criteria
//!
//! ## Initial-Hessian scaling
//!
//! The initial guess at the Hessian is refreshed every accepted update: either
//! a scaled identity ([`ScalingMode::Scalar`]) or a positive diagonal matrix
//! ([`ScalingMode::Diagonal`], the default), which usually wins on problems
//! with badly mixed variable scales.
//!
//! ## Convergence Criteria
//!
//! The run terminates when ANY of the following is satisfied:
//!
//! - **Average improvement**: `|avg decrease over recent window / value|` below
//!   the value tolerance
//! - **Relative gradient norm**: `|g|/|g0|` below the relative tolerance
//! - **Numerically zero gradient**: `|g| < eps·max(1, |x|)`
//! - **Maximum iterations** (optional)
//!
//! An exhausted evaluation budget aborts the run instead, with
//! `success = false`.
//!
//! # Examples
//!
//! ```
//! use nalgebra::DVector;
//! use summit_solver::{Lbfgs, LbfgsConfig, ScalingMode};
//!
//! let config = LbfgsConfig::new()
//!     .with_memory(5)
//!     .with_scaling(ScalingMode::Scalar)
//!     .with_gradient_tolerance(1e-8);
//! let mut solver = Lbfgs::with_config(config);
//!
//! // f(x) = ½‖x‖², ∇f(x) = x
//! let mut objective = |x: &DVector<f64>| (0.5 * x.norm_squared(), x.clone());
//! let result = solver
//!     .minimize(&mut objective, &DVector::from_element(10, 1.0))
//!     .expect("minimize");
//!
//! assert!(result.success);
//! assert!(result.parameters.norm() < 1e-6);
//! ```
//!
//! # References
//!
//! - Nocedal, J. & Wright, S. (2006). *Numerical Optimization* (2nd ed.).
//!   Springer. Chapter 7.
//! - Moré, J. J. & Thuente, D. J. (1994). "Line Search Algorithms with
//!   Guaranteed Sufficient Decrease". *ACM TOMS* 20(3).

use crate::error::SummitSolverResult;
use crate::math;
use crate::objective::ObjectiveFunction;
use crate::observers::{OptObserver, OptObserverVec};
use crate::optimizer::history::{CurvatureHistory, ScalingMode};
use crate::optimizer::line_search;
use crate::optimizer::record::ConvergenceRecord;
use crate::optimizer::{ConvergenceInfo, MinimizeResult, MinimizeStatus, OptimizerError};
use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, info, warn};
use web_time::{Duration, Instant};

/// Configuration parameters for the L-BFGS minimizer.
///
/// All options can be set using the builder pattern:
///
/// ```
/// use summit_solver::{LbfgsConfig, ScalingMode};
///
/// let config = LbfgsConfig::new()
///     .with_memory(15)
///     .with_scaling(ScalingMode::Diagonal)
///     .with_max_iterations(200)
///     .with_value_tolerance(1e-6);
/// ```
///
/// Tolerances are plain constructor data so tests and hosts can vary them
/// per run; nothing is read from global state.
#[derive(Debug, Clone)]
pub struct LbfgsConfig {
    /// Number of curvature pairs retained; 15 is generally plenty
    pub memory: usize,
    /// Form of the initial inverse-Hessian approximation
    pub scaling: ScalingMode,
    /// Maximum number of outer iterations; unlimited when `None`
    pub max_iterations: Option<usize>,
    /// Maximum number of objective evaluations; unlimited when `None`
    pub max_evaluations: Option<usize>,
    /// Average-improvement termination tolerance (also the line-search
    /// interval tolerance)
    pub value_tolerance: f64,
    /// Numerically-zero-gradient termination tolerance
    pub gradient_tolerance: f64,
    /// Relative gradient-norm termination tolerance
    pub relative_tolerance: f64,
    /// Emit the verbose per-iteration norm trace from the convergence test
    pub show_running_tracing: bool,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            memory: 10,
            scaling: ScalingMode::default(),
            max_iterations: None,
            max_evaluations: None,
            value_tolerance: 1e-4,
            gradient_tolerance: 1e-6,
            relative_tolerance: 1e-8,
            show_running_tracing: false,
        }
    }
}

impl LbfgsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of curvature pairs to retain.
    ///
    /// Zero degenerates to (scaled) steepest descent.
    pub fn with_memory(mut self, memory: usize) -> Self {
        self.memory = memory;
        self
    }

    /// Set the initial-Hessian scaling mode.
    pub fn with_scaling(mut self, scaling: ScalingMode) -> Self {
        self.scaling = scaling;
        self
    }

    /// Set the maximum number of outer iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Set the maximum number of objective evaluations.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = Some(max_evaluations);
        self
    }

    /// Set the average-improvement termination tolerance.
    pub fn with_value_tolerance(mut self, value_tolerance: f64) -> Self {
        self.value_tolerance = value_tolerance;
        self
    }

    /// Set the numerically-zero-gradient termination tolerance.
    pub fn with_gradient_tolerance(mut self, gradient_tolerance: f64) -> Self {
        self.gradient_tolerance = gradient_tolerance;
        self
    }

    /// Set the relative gradient-norm termination tolerance.
    pub fn with_relative_tolerance(mut self, relative_tolerance: f64) -> Self {
        self.relative_tolerance = relative_tolerance;
        self
    }

    /// Toggle the verbose per-iteration norm trace.
    pub fn with_running_tracing(mut self, show_running_tracing: bool) -> Self {
        self.show_running_tracing = show_running_tracing;
        self
    }

    /// Print configuration parameters (debug level only).
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:              L-BFGS\n  History memory:      {}\n  Scaling:             {:?}\n  Max iterations:      {:?}\n  Max evaluations:     {:?}\n  Value tolerance:     {:.2e}\n  Gradient tolerance:  {:.2e}\n  Relative tolerance:  {:.2e}",
            self.memory,
            self.scaling,
            self.max_iterations,
            self.max_evaluations,
            self.value_tolerance,
            self.gradient_tolerance,
            self.relative_tolerance,
        );
    }
}

/// Per-iteration statistics for detailed logging.
///
/// Collected (and printed) only when DEBUG logging is enabled, so the
/// non-debug path pays nothing for it.
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Iteration number (1-indexed)
    pub iteration: usize,
    /// Objective evaluations consumed so far
    pub evaluations: usize,
    /// Objective value after this iteration
    pub value: f64,
    /// Decrease in the objective value this iteration
    pub value_change: f64,
    /// L2 norm of the gradient
    pub gradient_norm: f64,
    /// Gradient norm relative to the initial one
    pub relative_norm: f64,
    /// Step length accepted by the line search
    pub step_length: f64,
    /// Termination code of the line search (MINPACK convention)
    pub line_search_info: u8,
    /// Whether the curvature pair was stored (false on a skipped update)
    pub stored: bool,
    /// Time taken for this iteration in milliseconds
    pub iter_time_ms: f64,
    /// Total elapsed time in milliseconds
    pub total_time_ms: f64,
}

impl IterationStats {
    /// Print table header for the per-iteration lines
    pub fn print_header() {
        debug!(
            "{:>4}  {:>6}  {:>13}  {:>13}  {:>13}  {:>11}  {:>11}  {:>2}  {:>6}  {:>11}  {:>13}",
            "iter",
            "evals",
            "value",
            "val_change",
            "|gradient|",
            "relnorm",
            "step",
            "ls",
            "stored",
            "iter_time",
            "total_time"
        );
    }

    /// Print single iteration line with scientific notation
    pub fn print_line(&self) {
        debug!(
            "{:>4}  {:>6}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>11.2e}  {:>11.2e}  {:>2}  {:>6}  {:>9.2}ms  {:>11.2}ms",
            self.iteration,
            self.evaluations,
            self.value,
            self.value_change,
            self.gradient_norm,
            self.relative_norm,
            self.step_length,
            self.line_search_info,
            if self.stored { "✓" } else { "✗" },
            self.iter_time_ms,
            self.total_time_ms
        );
    }
}

/// Summary statistics for a finished minimization.
#[derive(Debug, Clone)]
pub struct LbfgsSummary {
    /// Objective value at the initial iterate
    pub initial_value: f64,
    /// Objective value at the final iterate
    pub final_value: f64,
    /// Total number of outer iterations
    pub iterations: usize,
    /// Total number of objective evaluations
    pub evaluations: usize,
    /// Curvature updates skipped for negative curvature or zero gradient
    /// difference
    pub skipped_updates: usize,
    /// Final gradient norm
    pub final_gradient_norm: f64,
    /// Final gradient norm relative to the initial one
    pub relative_gradient_norm: f64,
    /// Total time elapsed
    pub total_time: Duration,
    /// Average time per iteration
    pub average_time_per_iteration: Duration,
    /// Detailed per-iteration statistics (DEBUG logging only)
    pub iteration_history: Vec<IterationStats>,
    /// Terminal state
    pub status: MinimizeStatus,
    /// Whether the run ended in an acceptable terminal state
    pub success: bool,
}

impl Display for LbfgsSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "L-BFGS Final Result")?;

        if self.success {
            writeln!(f, "CONVERGED ({:?})", self.status)?;
        } else {
            writeln!(f, "ABORTED ({:?})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Value:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_value)?;
        writeln!(f, "  Final:     {:.6e}", self.final_value)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_value - self.final_value,
            100.0 * (self.initial_value - self.final_value)
                / self.initial_value.abs().max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:           {}", self.iterations)?;
        writeln!(f, "  Evaluations:     {}", self.evaluations)?;
        writeln!(f, "  Skipped updates: {}", self.skipped_updates)?;
        writeln!(f)?;
        writeln!(f, "Gradient:")?;
        writeln!(f, "  Final norm:    {:.2e}", self.final_gradient_norm)?;
        writeln!(f, "  Relative norm: {:.2e}", self.relative_gradient_norm)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        writeln!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )?;

        Ok(())
    }
}

/// L-BFGS minimizer for unconstrained smooth objectives.
///
/// See the [module documentation](self) for the algorithm outline and a usage
/// example.
pub struct Lbfgs {
    config: LbfgsConfig,
    observers: OptObserverVec,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Self::new()
    }
}

impl Lbfgs {
    /// Create a new minimizer with default configuration.
    pub fn new() -> Self {
        Self::with_config(LbfgsConfig::default())
    }

    /// Create a new minimizer with the given configuration.
    pub fn with_config(config: LbfgsConfig) -> Self {
        Self {
            config,
            observers: OptObserverVec::new(),
        }
    }

    /// Add an observer notified after each outer iteration with the current
    /// iterate.
    ///
    /// Observer errors are logged and swallowed; they never abort the run.
    pub fn add_observer(&mut self, observer: impl OptObserver + 'static) {
        self.observers.add(observer);
    }

    /// Minimize the objective starting from `initial`.
    ///
    /// Drives the objective synchronously on the calling thread; internal
    /// buffers are allocated once and reused across iterations.
    ///
    /// # Errors
    ///
    /// Returns an error only on unrecoverable conditions: a dimension
    /// mismatch from misuse of the scaling state, or allocation failure with
    /// an already-empty history. Numerical pathologies and exhausted budgets
    /// are reported through [`MinimizeResult::status`] and
    /// [`MinimizeResult::success`] instead.
    pub fn minimize<F>(
        &mut self,
        objective: &mut F,
        initial: &DVector<f64>,
    ) -> SummitSolverResult<MinimizeResult>
    where
        F: ObjectiveFunction + ?Sized,
    {
        let start_time = Instant::now();
        let n = initial.len();
        let max_evaluations = self.config.max_evaluations.unwrap_or(usize::MAX);

        let mut history = CurvatureHistory::new(self.config.memory, self.config.scaling);

        let mut x = initial.clone_owned();
        let mut grad = DVector::zeros(n);
        let mut new_x = DVector::zeros(n);
        let mut new_grad = DVector::zeros(n);
        let mut dir = DVector::zeros(n);
        let mut alphas: Vec<f64> = Vec::with_capacity(self.config.memory);

        let mut evaluations = 1usize;
        let mut value = objective.evaluate(&x, &mut grad);
        let initial_value = value;

        let mut record = ConvergenceRecord::start(
            self.config.value_tolerance,
            self.config.gradient_tolerance,
            self.config.relative_tolerance,
            self.config.show_running_tracing,
            &grad,
            &x,
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            self.config.print_configuration();
            IterationStats::print_header();
        }

        let mut iterations = 0usize;
        let mut skipped_updates = 0usize;
        let mut success = false;
        let mut status = MinimizeStatus::Running;
        let mut final_step_length = 0.0;
        let mut iteration_stats: Vec<IterationStats> = Vec::new();
        let mut previous_value = value;

        if record.gradient_numerically_zero() {
            // Started at a stationary point; nothing to do.
            status = MinimizeStatus::GradientNumericallyZero;
            success = true;
        } else {
            loop {
                let iter_start = Instant::now();
                iterations += 1;

                compute_direction(&mut dir, &grad, &history, &mut alphas)?;

                // A NaN direction under a clean gradient means the Hessian
                // approximation went bad: reset the history and retry once.
                if math::has_nan(&dir) {
                    if math::has_nan(&grad) {
                        info!("Aborted on surprise convergence: gradient contains NaN");
                        success = true;
                        break;
                    }
                    warn!("NaN search direction (likely from the Hessian approximation), resetting history");
                    history.clear();
                    compute_direction(&mut dir, &grad, &history, &mut alphas)?;
                    if math::has_nan(&dir) {
                        info!("Aborted on surprise convergence: direction is NaN even after reset");
                        success = true;
                        break;
                    }
                }

                let search = match line_search::minpack_search(
                    objective,
                    &mut dir,
                    &x,
                    &grad,
                    value,
                    self.config.value_tolerance,
                    iterations == 1,
                    &mut new_x,
                    &mut new_grad,
                    &mut evaluations,
                    max_evaluations,
                ) {
                    Ok(found) => found,
                    Err(OptimizerError::MaxEvaluationsExceeded { .. }) => {
                        warn!(
                            "Aborted: exceeded {} objective evaluations during the line search; consider raising the budget or checking the success flag",
                            max_evaluations
                        );
                        break;
                    }
                    Err(other) => return Err(other.into()),
                };
                let new_value = search.point.value;
                final_step_length = search.point.alpha;

                // The line search's last evaluation was at new_x, so new_grad
                // already holds the matching gradient; no extra objective call
                // is needed here.
                let outcome = history.update(&new_x, &x, &new_grad, &grad, search.point.alpha)?;
                if outcome.is_skip() {
                    skipped_updates += 1;
                }

                record.add(new_value, &new_grad, &new_x);

                value = new_value;
                x.copy_from(&new_x);
                grad.copy_from(&new_grad);

                if evaluations > max_evaluations {
                    warn!(
                        "Aborted: exceeded {} objective evaluations",
                        max_evaluations
                    );
                    break;
                }

                if tracing::enabled!(tracing::Level::DEBUG) {
                    let stats = IterationStats {
                        iteration: iterations,
                        evaluations,
                        value,
                        value_change: previous_value - value,
                        gradient_norm: record.g_norm_last(),
                        relative_norm: record.relative_norm(),
                        step_length: search.point.alpha,
                        line_search_info: search.info,
                        stored: !outcome.is_skip(),
                        iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                        total_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                    };
                    stats.print_line();
                    iteration_stats.push(stats);
                }
                previous_value = value;

                self.observers.notify(&x, iterations - 1);

                status = record.to_continue(iterations, self.config.max_iterations);
                if status != MinimizeStatus::Running {
                    success = true;
                    break;
                }
            }
        }

        info!("{}", status);

        let elapsed = start_time.elapsed();
        let summary = LbfgsSummary {
            initial_value,
            final_value: value,
            iterations,
            evaluations,
            skipped_updates,
            final_gradient_norm: record.g_norm_last(),
            relative_gradient_norm: record.relative_norm(),
            total_time: elapsed,
            average_time_per_iteration: if iterations > 0 {
                elapsed / iterations as u32
            } else {
                Duration::from_secs(0)
            },
            iteration_history: iteration_stats,
            status,
            success,
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("{}", summary);
        }

        Ok(MinimizeResult {
            parameters: x,
            status,
            success,
            initial_value,
            final_value: value,
            iterations,
            evaluations,
            elapsed_time: elapsed,
            convergence_info: Some(ConvergenceInfo {
                final_gradient_norm: record.g_norm_last(),
                relative_gradient_norm: record.relative_norm(),
                final_step_length,
                skipped_updates,
            }),
        })
    }
}

/// Two-loop recursion: `dir ← -H⁻¹·grad` from the stored curvature pairs,
/// with the initial-Hessian approximation applied between the passes.
fn compute_direction(
    dir: &mut DVector<f64>,
    grad: &DVector<f64>,
    history: &CurvatureHistory,
    alphas: &mut Vec<f64>,
) -> Result<(), OptimizerError> {
    dir.copy_from(grad);

    let k = history.len();
    alphas.clear();
    alphas.resize(k, 0.0);

    for i in (0..k).rev() {
        alphas[i] = history.rho(i) * math::inner_product(history.s(i), dir);
        math::add_const_mult(dir, history.y(i), -alphas[i]);
    }

    history.apply_initial_hessian(dir)?;

    for i in 0..k {
        let beta = history.rho(i) * math::inner_product(history.y(i), dir);
        math::add_const_mult(dir, history.s(i), alphas[i] - beta);
    }

    math::scale_in_place(dir, -1.0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::ObserverResult;
    use nalgebra::dvector;
    use std::sync::{Arc, Mutex};

    fn quadratic(x: &DVector<f64>) -> (f64, DVector<f64>) {
        (0.5 * x.norm_squared(), x.clone())
    }

    #[test]
    fn test_empty_history_gives_steepest_descent() {
        let history = CurvatureHistory::new(5, ScalingMode::Scalar);
        let grad = dvector![3.0, -1.0, 2.0];
        let mut dir = DVector::zeros(3);
        let mut alphas = Vec::new();

        compute_direction(&mut dir, &grad, &history, &mut alphas).expect("direction");
        assert_eq!(dir, -&grad);
    }

    #[test]
    fn test_zero_memory_direction_stays_parallel_to_gradient() {
        let mut history = CurvatureHistory::new(0, ScalingMode::Scalar);
        // One accepted update refreshes gamma without storing the pair.
        let x = dvector![0.0, 0.0];
        let new_x = dvector![1.0, 1.0];
        let grad = dvector![-2.0, -2.0];
        let new_grad = dvector![0.0, 0.0];
        history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");

        let g = dvector![4.0, -6.0];
        let mut dir = DVector::zeros(2);
        let mut alphas = Vec::new();
        compute_direction(&mut dir, &g, &history, &mut alphas).expect("direction");

        // dir = -gamma * g with gamma = sy/yy = 4/8
        assert_eq!(dir, -history.gamma() * &g);
        assert!(dir[0] < 0.0 && dir[1] > 0.0);
    }

    #[test]
    fn test_two_loop_recovers_newton_direction_on_quadratic() {
        // For f = ½‖x‖² the true Hessian is the identity, so after one
        // curvature pair the recursion reproduces dir = -grad exactly.
        let mut history = CurvatureHistory::new(5, ScalingMode::Scalar);
        let x = dvector![1.0, 1.0];
        let new_x = dvector![0.5, 0.5];
        let grad = x.clone();
        let new_grad = new_x.clone();
        history.update(&new_x, &x, &new_grad, &grad, 0.5).expect("update");

        let mut dir = DVector::zeros(2);
        let mut alphas = Vec::new();
        compute_direction(&mut dir, &new_grad, &history, &mut alphas).expect("direction");

        assert!((dir[0] - (-0.5)).abs() < 1e-14);
        assert!((dir[1] - (-0.5)).abs() < 1e-14);
    }

    #[test]
    fn test_nan_history_poisons_direction_and_clear_recovers() {
        // A NaN gradient difference slips past the curvature checks (NaN
        // comparisons are false) and poisons rho, so the recursion yields a
        // NaN direction; clearing the history restores steepest descent.
        let mut history = CurvatureHistory::new(5, ScalingMode::Diagonal);
        let x = dvector![0.0, 0.0];
        let new_x = dvector![1.0, 1.0];
        let grad = dvector![-1.0, -1.0];
        let new_grad = dvector![f64::NAN, 0.0];
        history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");
        assert_eq!(history.len(), 1);

        let clean_grad = dvector![1.0, 2.0];
        let mut dir = DVector::zeros(2);
        let mut alphas = Vec::new();
        compute_direction(&mut dir, &clean_grad, &history, &mut alphas).expect("direction");
        assert!(math::has_nan(&dir));

        history.clear();
        compute_direction(&mut dir, &clean_grad, &history, &mut alphas).expect("direction");
        assert_eq!(dir, -&clean_grad);
    }

    #[test]
    fn test_config_defaults_and_builder() {
        let config = LbfgsConfig::new();
        assert_eq!(config.memory, 10);
        assert_eq!(config.scaling, ScalingMode::Diagonal);
        assert!(config.max_iterations.is_none());

        let config = LbfgsConfig::new()
            .with_memory(7)
            .with_scaling(ScalingMode::Scalar)
            .with_max_iterations(42)
            .with_max_evaluations(500)
            .with_value_tolerance(1e-9)
            .with_gradient_tolerance(1e-7)
            .with_relative_tolerance(1e-10)
            .with_running_tracing(true);
        assert_eq!(config.memory, 7);
        assert_eq!(config.scaling, ScalingMode::Scalar);
        assert_eq!(config.max_iterations, Some(42));
        assert_eq!(config.max_evaluations, Some(500));
        assert_eq!(config.value_tolerance, 1e-9);
        assert_eq!(config.gradient_tolerance, 1e-7);
        assert_eq!(config.relative_tolerance, 1e-10);
        assert!(config.show_running_tracing);
    }

    #[test]
    fn test_minimize_simple_quadratic() {
        let mut solver = Lbfgs::with_config(
            LbfgsConfig::new()
                .with_scaling(ScalingMode::Scalar)
                .with_value_tolerance(1e-12),
        );
        let mut objective = quadratic;
        let result = solver
            .minimize(&mut objective, &dvector![1.0, -2.0, 3.0])
            .expect("minimize");

        assert!(result.success);
        assert!(result.parameters.norm() < 1e-6);
        assert!(result.final_value < result.initial_value);
        assert!(result.iterations >= 1);
        assert!(result.evaluations > result.iterations);
    }

    #[test]
    fn test_zero_gradient_start_terminates_without_iterating() {
        let mut solver = Lbfgs::new();
        let mut objective = quadratic;
        let result = solver
            .minimize(&mut objective, &DVector::zeros(4))
            .expect("minimize");

        assert!(result.success);
        assert_eq!(result.status, MinimizeStatus::GradientNumericallyZero);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.evaluations, 1);
    }

    struct IterationCollector {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl OptObserver for IterationCollector {
        fn on_step(&self, x: &DVector<f64>, iteration: usize) -> ObserverResult<()> {
            assert!(x.iter().all(|v| v.is_finite()));
            self.seen
                .lock()
                .map_err(|e| crate::observers::ObserverError::MutexPoisoned {
                    context: "IterationCollector".to_string(),
                    reason: e.to_string(),
                })?
                .push(iteration);
            Ok(())
        }
    }

    #[test]
    fn test_observers_see_every_iteration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut solver = Lbfgs::with_config(LbfgsConfig::new().with_value_tolerance(1e-12));
        solver.add_observer(IterationCollector { seen: seen.clone() });

        let mut objective = quadratic;
        let result = solver
            .minimize(&mut objective, &dvector![2.0, 2.0])
            .expect("minimize");

        let seen = seen.lock().expect("test mutex");
        assert_eq!(seen.len(), result.iterations);
        assert_eq!(*seen, (0..result.iterations).collect::<Vec<_>>());
    }

    #[test]
    fn test_summary_display_mentions_status() {
        let summary = LbfgsSummary {
            initial_value: 10.0,
            final_value: 1.0,
            iterations: 3,
            evaluations: 7,
            skipped_updates: 0,
            final_gradient_norm: 1e-9,
            relative_gradient_norm: 1e-10,
            total_time: Duration::from_millis(5),
            average_time_per_iteration: Duration::from_millis(1),
            iteration_history: Vec::new(),
            status: MinimizeStatus::RelativeNormReached,
            success: true,
        };
        let text = summary.to_string();
        assert!(text.contains("CONVERGED"));
        assert!(text.contains("RelativeNormReached"));
    }
}
