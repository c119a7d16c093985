//! Error types for the summit-solver library
//!
//! This module provides the main error and result types used throughout the
//! library. All errors use the `thiserror` crate for automatic trait
//! implementations.
//!
//! # Error Hierarchy
//!
//! The library uses a hierarchical error system where:
//! - **`SummitSolverError`** is the top-level error exposed to users via public APIs
//! - **Module errors** (`OptimizerError`, `ObserverError`) are wrapped inside it
//! - **Error sources** are preserved, allowing full error chain inspection
//!
//! Note that most numerical pathologies inside the minimizer (negative
//! curvature, degenerate line-search intervals, exhausted evaluation budgets)
//! are *not* errors: they are handled locally and surface through
//! [`MinimizeStatus`](crate::MinimizeStatus) and the `success` flag of the
//! result. Only unrecoverable misuse (dimension mismatches) or resource
//! exhaustion with nothing left to release reaches this type.

use crate::{observers::ObserverError, optimizer::OptimizerError};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the summit-solver library
pub type SummitSolverResult<T> = Result<T, SummitSolverError>;

/// Main error type for the summit-solver library
///
/// This is the top-level error type exposed by public APIs. It wraps
/// module-specific errors while preserving the full error chain for debugging.
#[derive(Debug, Error)]
pub enum SummitSolverError {
    /// Minimization algorithm errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Observer/callback errors
    #[error(transparent)]
    Observer(#[from] ObserverError),
}

impl SummitSolverError {
    /// Get the full error chain as a string for logging and debugging.
    ///
    /// Traverses the error source chain and returns a formatted string showing
    /// the hierarchy of errors from the top-level error down to the root cause.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// Similar to `chain()` but formats as a single line with arrow separators.
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let optimizer_error = OptimizerError::DimensionMismatch {
            expected: 10,
            actual: 3,
        };
        let error = SummitSolverError::from(optimizer_error);
        assert!(error.to_string().contains("10"));
        assert!(error.to_string().contains("3"));
    }

    #[test]
    fn test_error_chain_compact() {
        let observer_error = ObserverError::CallbackFailed("observer rejected iterate".to_string());
        let error = SummitSolverError::from(observer_error);

        let chain_compact = error.chain_compact();
        assert!(chain_compact.contains("observer rejected iterate"));
    }

    #[test]
    fn test_transparent_error_conversion() {
        let optimizer_error = OptimizerError::OutOfMemory {
            context: "history pair allocation".to_string(),
        };

        let error: SummitSolverError = optimizer_error.into();
        match error {
            SummitSolverError::Optimizer(_) => { /* Expected */ }
            _ => panic!("Expected Optimizer variant"),
        }
    }

    #[test]
    fn test_result_ok() {
        let result: SummitSolverResult<i32> = Ok(42);
        assert!(result.is_ok());
        if let Ok(value) = result {
            assert_eq!(value, 42);
        }
    }
}
