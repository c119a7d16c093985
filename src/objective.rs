//! The objective function contract.
//!
//! The minimizer drives the objective synchronously and single-threadedly; the
//! objective may parallelize internally but must be pure with respect to the
//! optimizer: evaluating the same point twice yields the same value and
//! gradient.

use nalgebra::DVector;

/// A differentiable objective `f: ℝⁿ → ℝ` evaluated together with its gradient.
///
/// The gradient is written into a caller-provided buffer so the minimizer can
/// reuse its pre-allocated workspace across iterations.
///
/// Closures of the shape `FnMut(&DVector<f64>) -> (f64, DVector<f64>)` get this
/// trait for free, which keeps tests and small experiments terse:
///
/// ```
/// use nalgebra::{DVector, dvector};
/// use summit_solver::ObjectiveFunction;
///
/// let mut objective = |x: &DVector<f64>| (0.5 * x.norm_squared(), x.clone());
/// let mut grad = DVector::zeros(2);
/// let value = objective.evaluate(&dvector![3.0, 4.0], &mut grad);
/// assert_eq!(value, 12.5);
/// assert_eq!(grad, dvector![3.0, 4.0]);
/// ```
pub trait ObjectiveFunction {
    /// Evaluate the objective at `x`, writing `∇f(x)` into `grad`.
    ///
    /// `grad` has the same length as `x`; its previous contents are overwritten.
    fn evaluate(&mut self, x: &DVector<f64>, grad: &mut DVector<f64>) -> f64;
}

impl<F> ObjectiveFunction for F
where
    F: FnMut(&DVector<f64>) -> (f64, DVector<f64>),
{
    fn evaluate(&mut self, x: &DVector<f64>, grad: &mut DVector<f64>) -> f64 {
        let (value, gradient) = self(x);
        grad.copy_from(&gradient);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    #[test]
    fn test_closure_adapter() {
        let mut quadratic = |x: &DVector<f64>| (x.norm_squared(), 2.0 * x);
        let mut grad = DVector::zeros(3);
        let value = quadratic.evaluate(&dvector![1.0, 2.0, 3.0], &mut grad);
        assert_eq!(value, 14.0);
        assert_eq!(grad, dvector![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_stateful_objective() {
        struct Counting {
            calls: usize,
        }

        impl ObjectiveFunction for Counting {
            fn evaluate(&mut self, x: &DVector<f64>, grad: &mut DVector<f64>) -> f64 {
                self.calls += 1;
                grad.copy_from(x);
                0.5 * x.norm_squared()
            }
        }

        let mut objective = Counting { calls: 0 };
        let mut grad = DVector::zeros(2);
        objective.evaluate(&dvector![1.0, 1.0], &mut grad);
        objective.evaluate(&dvector![2.0, 2.0], &mut grad);
        assert_eq!(objective.calls, 2);
        assert_eq!(grad, dvector![2.0, 2.0]);
    }
}
