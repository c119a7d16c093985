//! # Summit Solver
//!
//! A Rust library for unconstrained nonlinear minimization of smooth objectives
//! `f: ℝⁿ → ℝ` supplied as value-and-gradient callbacks, built around the
//! limited-memory BFGS (L-BFGS) quasi-Newton method.
//!
//! ## Features
//!
//! - **L-BFGS search directions**: the Nocedal two-loop recursion over a bounded
//!   history of curvature pairs, with scalar or diagonal initial-Hessian scaling
//! - **MINPACK line search**: safeguarded cubic/quadratic interpolation finding
//!   step lengths that satisfy the strong Wolfe conditions
//! - **Multi-criterion convergence detection**: average-improvement, relative
//!   gradient norm, and numerically-zero gradient tests, robust to objective
//!   values near zero
//! - **Observer pattern**: per-iteration callbacks for progress monitoring,
//!   metrics collection, and early inspection of iterates
//! - **Comprehensive diagnostics**: per-iteration statistics tables and final
//!   summaries emitted through `tracing`
//!
//! ## Scaling modes
//!
//! - **Scalar**: the initial inverse-Hessian guess is a scaled identity,
//!   rescaled from the most recent curvature pair
//! - **Diagonal**: a positive diagonal matrix updated as curvature information
//!   arrives; usually needs fewer iterations on badly scaled problems

pub mod error;
#[cfg(feature = "logging")]
pub mod logger;
pub mod math;
pub mod objective;
pub mod observers;
pub mod optimizer;

pub use error::{SummitSolverError, SummitSolverResult};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use objective::ObjectiveFunction;
pub use observers::{OptObserver, OptObserverVec};
pub use optimizer::{
    ConvergenceInfo, MinimizeResult, MinimizeStatus, OptimizerError,
    history::{CurvatureHistory, ScalingMode},
    lbfgs::{Lbfgs, LbfgsConfig},
};
