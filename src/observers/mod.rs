//! Observer pattern for minimization monitoring.
//!
//! Observers can be registered with the minimizer and are notified after each
//! outer iteration with the current iterate, enabling progress logging, metric
//! collection, plotting, and custom analysis without coupling the algorithm to
//! any of it.
//!
//! Observer failures never abort a minimization: errors returned from
//! [`OptObserver::on_step`] are logged through `tracing` and swallowed by
//! [`OptObserverVec::notify`].
//!
//! # Examples
//!
//! ```no_run
//! use nalgebra::DVector;
//! use summit_solver::observers::{ObserverResult, OptObserver};
//!
//! struct ValueTracker {
//!     norms: std::cell::RefCell<Vec<f64>>,
//! }
//!
//! impl OptObserver for ValueTracker {
//!     fn on_step(&self, x: &DVector<f64>, _iteration: usize) -> ObserverResult<()> {
//!         self.norms.borrow_mut().push(x.norm());
//!         Ok(())
//!     }
//! }
//! ```

use nalgebra::DVector;
use thiserror::Error;
use tracing::{error, warn};

/// Observer-specific error types for summit-solver
#[derive(Debug, Clone, Error)]
pub enum ObserverError {
    /// Observer callback reported a failure
    #[error("Observer callback failed: {0}")]
    CallbackFailed(String),

    /// Mutex was poisoned (thread panicked while holding lock)
    #[error("Mutex poisoned in {context}: {reason}")]
    MutexPoisoned { context: String, reason: String },
}

impl ObserverError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Observer trait for monitoring minimization progress.
///
/// Implement this trait to be notified after each outer iteration. Observers
/// receive the current iterate and the iteration index (0-based).
///
/// # Design Notes
///
/// - Observers should be lightweight and non-blocking
/// - Returned errors are logged and ignored by the minimizer; they cannot
///   abort the run
/// - Observers receive an immutable reference and must not retain stale views
///   of the iterate across iterations (the underlying buffer is reused)
///
/// # Thread Safety
///
/// Observers must be `Send`. Use interior mutability (`RefCell`, `Mutex`) if
/// you need to mutate state from `on_step`.
pub trait OptObserver: Send {
    /// Called after each outer iteration with the current iterate.
    fn on_step(&self, x: &DVector<f64>, iteration: usize) -> ObserverResult<()>;
}

/// Collection of observers for minimization monitoring.
///
/// Manages a vector of observers and provides a `notify()` method that calls
/// all of them in registration order. The minimizer uses this internally; it
/// is public so custom drivers can reuse it.
#[derive(Default)]
pub struct OptObserverVec {
    observers: Vec<Box<dyn OptObserver>>,
}

impl OptObserverVec {
    /// Create a new empty observer collection.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Add an observer to the collection.
    pub fn add(&mut self, observer: impl OptObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Notify all observers with the current iterate.
    ///
    /// Errors returned by individual observers are logged at WARN level and
    /// otherwise ignored; a failing observer does not prevent later observers
    /// from running, and never aborts the minimization.
    #[inline]
    pub fn notify(&self, x: &DVector<f64>, iteration: usize) {
        for observer in &self.observers {
            if let Err(e) = observer.on_step(x, iteration) {
                warn!("Ignoring observer failure at iteration {}: {}", iteration, e);
            }
        }
    }

    /// Check if any observers are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Get the number of registered observers.
    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }
}
