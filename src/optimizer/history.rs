//! Bounded curvature-pair memory for the quasi-Newton update.
//!
//! [`CurvatureHistory`] stores up to `memory` secant pairs `(s, y)` with their
//! precomputed `ρ = 1/(s·y)`, and owns the initial inverse-Hessian
//! approximation applied in the middle of the two-loop recursion: either a
//! scaled identity ([`ScalingMode::Scalar`]) or a positive diagonal matrix
//! ([`ScalingMode::Diagonal`]) refined as curvature information arrives.
//!
//! Pairs that would break positive definiteness (`s·y < 0`) or carry no
//! curvature information (`y·y = 0`) are skipped, never stored, leaving both
//! the history and the scaling untouched.

use crate::math;
use crate::optimizer::{OptimizerError, OptimizerResult};
use nalgebra::DVector;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Condition-number cap on the diagonal scaling matrix; beyond it the
/// diagonal is refilled with the scalar approximation.
const DIAGONAL_CONDITION_LIMIT: f64 = 1e12;

/// Form of the initial inverse-Hessian approximation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScalingMode {
    /// Scaled identity, rescaled from the most recent accepted pair
    Scalar,
    /// Positive diagonal matrix updated from each accepted pair; usually
    /// needs fewer iterations on badly scaled problems
    #[default]
    Diagonal,
}

/// What [`CurvatureHistory::update`] did with a candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Pair accepted; carries the history size after the update
    Stored(usize),
    /// `s·y < 0`: storing would destroy positive definiteness
    SkippedNegativeCurvature,
    /// `y·y = 0`: either convergence, or floating point errors combined with
    /// an extremely linear region
    SkippedZeroGradientDifference,
}

impl UpdateOutcome {
    /// True when the candidate pair was not stored.
    pub fn is_skip(&self) -> bool {
        !matches!(self, UpdateOutcome::Stored(_))
    }
}

/// Bounded FIFO of curvature triples `(s, y, ρ)` plus the initial-Hessian
/// scaling state.
///
/// The oldest triple is evicted when a new pair arrives at capacity; evicted
/// vector buffers are recycled for subsequent pairs rather than reallocated.
pub struct CurvatureHistory {
    memory: usize,
    scaling: ScalingMode,
    s: VecDeque<DVector<f64>>,
    y: VecDeque<DVector<f64>>,
    rho: VecDeque<f64>,
    gamma: f64,
    diagonal: Option<DVector<f64>>,
    spare: Vec<DVector<f64>>,
}

impl CurvatureHistory {
    /// Create an empty history with the given capacity and scaling mode.
    pub fn new(memory: usize, scaling: ScalingMode) -> Self {
        Self {
            memory,
            scaling,
            s: VecDeque::with_capacity(memory),
            y: VecDeque::with_capacity(memory),
            rho: VecDeque::with_capacity(memory),
            gamma: 1.0,
            diagonal: None,
            spare: Vec::new(),
        }
    }

    /// Number of stored triples.
    pub fn len(&self) -> usize {
        self.s.len()
    }

    /// True when no triples are stored.
    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    /// Current capacity. May shrink below the constructed value if pair
    /// allocation ever fails.
    pub fn memory(&self) -> usize {
        self.memory
    }

    /// Configured scaling mode.
    pub fn scaling(&self) -> ScalingMode {
        self.scaling
    }

    /// Current scalar scaling factor.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Current diagonal scaling vector, if initialized.
    pub fn diagonal(&self) -> Option<&DVector<f64>> {
        self.diagonal.as_ref()
    }

    /// Step increment of the `i`-th stored triple, oldest first.
    pub fn s(&self, i: usize) -> &DVector<f64> {
        &self.s[i]
    }

    /// Gradient increment of the `i`-th stored triple, oldest first.
    pub fn y(&self, i: usize) -> &DVector<f64> {
        &self.y[i]
    }

    /// `ρ = 1/(s·y)` of the `i`-th stored triple, oldest first.
    pub fn rho(&self, i: usize) -> f64 {
        self.rho[i]
    }

    /// Drop all stored triples and the diagonal scaling state.
    ///
    /// Vector buffers are recycled for later pairs; the scalar factor is kept.
    pub fn clear(&mut self) {
        self.spare.extend(self.s.drain(..));
        self.spare.extend(self.y.drain(..));
        self.rho.clear();
        self.diagonal = None;
    }

    /// Multiply `v` in place by the initial inverse-Hessian approximation.
    ///
    /// In diagonal mode before the first accepted update this is a no-op (the
    /// diagonal is lazily initialized).
    ///
    /// # Errors
    ///
    /// [`OptimizerError::DimensionMismatch`] if `v` does not match the
    /// diagonal's length.
    pub fn apply_initial_hessian(&self, v: &mut DVector<f64>) -> OptimizerResult<()> {
        match self.scaling {
            ScalingMode::Scalar => math::scale_in_place(v, self.gamma),
            ScalingMode::Diagonal => {
                if let Some(d) = &self.diagonal {
                    if v.len() != d.len() {
                        return Err(OptimizerError::DimensionMismatch {
                            expected: d.len(),
                            actual: v.len(),
                        }
                        .log());
                    }
                    for i in 0..v.len() {
                        v[i] /= d[i];
                    }
                }
            }
        }
        Ok(())
    }

    /// Offer the secant pair between consecutive iterates to the history.
    ///
    /// Computes `s = new_x − x`, `y = new_grad − grad` and the curvature
    /// scalars, refreshes the scaling state, and stores `(s, y, 1/(s·y))`,
    /// evicting the oldest triple at capacity. Pairs with `s·y < 0` or
    /// `y·y = 0` are skipped and leave history and scaling unchanged.
    ///
    /// `step` is the line-search step length that produced `new_x`; diagonal
    /// scaling uses it to normalize the scalar factor so that unit steps are
    /// generally accepted.
    ///
    /// # Errors
    ///
    /// [`OptimizerError::OutOfMemory`] if buffer allocation fails with no
    /// stored triple left to release.
    pub fn update(
        &mut self,
        new_x: &DVector<f64>,
        x: &DVector<f64>,
        new_grad: &DVector<f64>,
        grad: &DVector<f64>,
        step: f64,
    ) -> OptimizerResult<UpdateOutcome> {
        let n = x.len();
        debug_assert_eq!(new_x.len(), n);
        debug_assert_eq!(new_grad.len(), n);
        debug_assert_eq!(grad.len(), n);

        let (mut new_s, mut new_y) = self.take_pair(n)?;

        // Construct the new pair and the curvature scalars in one pass.
        let mut sy = 0.0;
        let mut yy = 0.0;
        let mut sg = 0.0;
        for i in 0..n {
            let si = new_x[i] - x[i];
            let yi = new_grad[i] - grad[i];
            new_s[i] = si;
            new_y[i] = yi;
            sy += si * yi;
            yy += yi * yi;
            sg += si * new_grad[i];
        }

        if sy < 0.0 {
            debug!("Negative curvature detected, update skipped");
            self.recycle(new_s, new_y);
            return Ok(UpdateOutcome::SkippedNegativeCurvature);
        }
        if yy == 0.0 {
            debug!("Zero gradient difference: either convergence, or floating point errors combined with an extremely linear region");
            self.recycle(new_s, new_y);
            return Ok(UpdateOutcome::SkippedZeroGradientDifference);
        }

        match self.scaling {
            ScalingMode::Scalar => self.gamma = sy / yy,
            ScalingMode::Diagonal => self.update_diagonal(&new_s, &new_y, sy, yy, sg, step),
        }

        if self.memory == 0 {
            // Zero-capacity history degenerates to (scaled) steepest descent.
            self.recycle(new_s, new_y);
            return Ok(UpdateOutcome::Stored(0));
        }

        if self.s.len() == self.memory {
            self.evict_oldest();
        }
        self.s.push_back(new_s);
        self.y.push_back(new_y);
        self.rho.push_back(1.0 / sy);

        Ok(UpdateOutcome::Stored(self.s.len()))
    }

    /// Diagonal update introduced by Andrew Bradley: rescale by gamma, apply a
    /// rank-one-style correction, and guard against an ill-conditioned result.
    fn update_diagonal(
        &mut self,
        s: &DVector<f64>,
        y: &DVector<f64>,
        sy: f64,
        yy: f64,
        sg: f64,
        step: f64,
    ) {
        let d = self
            .diagonal
            .get_or_insert_with(|| DVector::from_element(s.len(), 1.0));

        // Gamma is chosen to scale such that a step length of one is
        // generally accepted.
        self.gamma = sy / (step * (sy - sg));

        let mut s_d_s = 0.0;
        for i in 0..d.len() {
            d[i] *= self.gamma;
            s_d_s += s[i] * d[i] * s[i];
        }
        for i in 0..d.len() {
            d[i] = (1.0 - d[i] * s[i] * s[i] / s_d_s) * d[i] + y[i] * y[i] / sy;
        }

        let min_d = math::min(d);
        let max_d = math::max(d);
        if min_d <= 0.0 || max_d.is_infinite() || max_d / min_d > DIAGONAL_CONDITION_LIMIT {
            warn!(
                "Diagonal update produced an unusable scaling (min {:.3e}, max {:.3e}); refilling with the scalar approximation",
                min_d, max_d
            );
            d.fill(yy / sy);
        }
    }

    /// Obtain a pair of length-`n` buffers, recycling evicted ones when
    /// available. If a fresh allocation fails, the oldest stored triple is
    /// released (permanently shrinking the capacity) and allocation retried.
    fn take_pair(&mut self, n: usize) -> OptimizerResult<(DVector<f64>, DVector<f64>)> {
        loop {
            if self.spare.len() >= 2
                && let Some(a) = self.spare.pop()
                && let Some(b) = self.spare.pop()
            {
                return Ok((a, b));
            }
            match try_alloc_vector(n) {
                Ok(v) => self.spare.push(v),
                Err(_) => {
                    if self.s.is_empty() {
                        return Err(OptimizerError::OutOfMemory {
                            context: format!("curvature pair of length {}", n),
                        }
                        .log());
                    }
                    self.evict_oldest();
                    self.memory = self.s.len();
                    warn!(
                        "Allocation failed, shrinking history memory to {}",
                        self.memory
                    );
                }
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let (Some(s), Some(y)) = (self.s.pop_front(), self.y.pop_front()) {
            self.rho.pop_front();
            self.spare.push(s);
            self.spare.push(y);
        }
    }

    fn recycle(&mut self, s: DVector<f64>, y: DVector<f64>) {
        self.spare.push(s);
        self.spare.push(y);
    }
}

/// Fallible allocation of a zeroed vector, so an exhausted heap surfaces as a
/// recoverable error instead of an abort.
fn try_alloc_vector(n: usize) -> Result<DVector<f64>, std::collections::TryReserveError> {
    let mut buf: Vec<f64> = Vec::new();
    buf.try_reserve_exact(n)?;
    buf.resize(n, 0.0);
    Ok(DVector::from_vec(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    fn stored_size(outcome: UpdateOutcome) -> usize {
        match outcome {
            UpdateOutcome::Stored(size) => size,
            other => panic!("expected Stored, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_update_sets_gamma() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Scalar);
        let x = dvector![0.0, 0.0];
        let new_x = dvector![1.0, 0.0];
        let grad = dvector![-2.0, 0.0];
        let new_grad = dvector![0.0, 0.0];

        // s = (1, 0), y = (2, 0): sy = 2, yy = 4
        let outcome = history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");
        assert_eq!(stored_size(outcome), 1);
        assert_eq!(history.gamma(), 0.5);
        assert_eq!(history.rho(0), 0.5);
    }

    #[test]
    fn test_negative_curvature_is_skipped() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Scalar);
        let x = dvector![0.0];
        let new_x = dvector![1.0];
        let grad = dvector![1.0];
        let new_grad = dvector![-1.0]; // s = 1, y = -2, sy = -2

        let outcome = history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");
        assert_eq!(outcome, UpdateOutcome::SkippedNegativeCurvature);
        assert!(outcome.is_skip());
        assert!(history.is_empty());
        assert_eq!(history.gamma(), 1.0); // scaling untouched
    }

    #[test]
    fn test_zero_gradient_difference_is_skipped() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Scalar);
        let x = dvector![0.0];
        let new_x = dvector![1.0];
        let grad = dvector![1.0];
        let new_grad = dvector![1.0]; // y = 0

        let outcome = history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");
        assert_eq!(outcome, UpdateOutcome::SkippedZeroGradientDifference);
        assert!(history.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = CurvatureHistory::new(2, ScalingMode::Scalar);
        let grad = dvector![-1.0];

        for k in 0..3 {
            let x = dvector![k as f64];
            let new_x = dvector![k as f64 + 1.0];
            // y alternates magnitude so each pair is distinguishable via rho
            let new_grad = dvector![-1.0 + (k + 1) as f64];
            let outcome = history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");
            assert!(stored_size(outcome) <= 2);
        }

        assert_eq!(history.len(), 2);
        // The k = 0 pair (s = 1, y = 1, rho = 1) was evicted; oldest is now k = 1.
        assert_eq!(history.rho(0), 0.5);
        assert_eq!(history.s(0), &dvector![1.0]);
        assert_eq!(history.y(0), &dvector![2.0]);
    }

    #[test]
    fn test_rho_matches_curvature_for_all_stored_triples() {
        let mut history = CurvatureHistory::new(4, ScalingMode::Scalar);
        let mut x = dvector![1.0, 2.0, -1.0];
        let mut grad = dvector![2.0, 4.0, -2.0];
        for _ in 0..6 {
            let new_x = 0.7 * &x;
            let new_grad = 2.0 * &new_x;
            history.update(&new_x, &x, &new_grad, &grad, 0.3).expect("update");
            x = new_x;
            grad = new_grad;
        }

        assert!(history.len() <= 4);
        for i in 0..history.len() {
            let sy = history.s(i).dot(history.y(i));
            assert!(sy > 0.0);
            assert!((history.rho(i) - 1.0 / sy).abs() < 1e-15);
        }
    }

    #[test]
    fn test_diagonal_stays_positive_and_well_conditioned() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Diagonal);
        let mut x = dvector![1.0, 10.0, 100.0];
        let mut grad = dvector![2.0, 200.0, 20000.0];
        for _ in 0..8 {
            let new_x: DVector<f64> = 0.8 * &x;
            let new_grad = dvector![2.0 * new_x[0], 20.0 * new_x[1], 200.0 * new_x[2]];
            history.update(&new_x, &x, &new_grad, &grad, 0.5).expect("update");
            x = new_x;
            grad = new_grad;

            let d = history.diagonal().expect("diagonal initialized after first update");
            let min_d = crate::math::min(d);
            let max_d = crate::math::max(d);
            assert!(min_d > 0.0);
            assert!(max_d / min_d <= 1e12);
        }
    }

    #[test]
    fn test_apply_initial_hessian_scalar() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Scalar);
        let x = dvector![0.0];
        let new_x = dvector![1.0];
        let grad = dvector![-2.0];
        let new_grad = dvector![0.0];
        history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");

        let mut v = dvector![4.0];
        history.apply_initial_hessian(&mut v).expect("apply");
        assert_eq!(v, dvector![2.0]); // gamma = 0.5
    }

    #[test]
    fn test_apply_initial_hessian_diagonal_uninitialized_is_noop() {
        let history = CurvatureHistory::new(5, ScalingMode::Diagonal);
        let mut v = dvector![1.0, 2.0];
        history.apply_initial_hessian(&mut v).expect("apply");
        assert_eq!(v, dvector![1.0, 2.0]);
    }

    #[test]
    fn test_apply_initial_hessian_dimension_mismatch() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Diagonal);
        let x = dvector![0.0, 0.0];
        let new_x = dvector![0.5, 0.5];
        let grad = dvector![-1.0, -1.0];
        let new_grad = dvector![-0.5, -0.5];
        history.update(&new_x, &x, &new_grad, &grad, 0.5).expect("update");

        let mut wrong = dvector![1.0, 2.0, 3.0];
        let err = history.apply_initial_hessian(&mut wrong).unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_zero_memory_stores_nothing_but_scales() {
        let mut history = CurvatureHistory::new(0, ScalingMode::Scalar);
        let x = dvector![0.0];
        let new_x = dvector![1.0];
        let grad = dvector![-2.0];
        let new_grad = dvector![0.0];

        let outcome = history.update(&new_x, &x, &new_grad, &grad, 1.0).expect("update");
        assert_eq!(outcome, UpdateOutcome::Stored(0));
        assert!(history.is_empty());
        assert_eq!(history.gamma(), 0.5);
    }

    #[test]
    fn test_clear_resets_pairs_and_diagonal() {
        let mut history = CurvatureHistory::new(5, ScalingMode::Diagonal);
        let x = dvector![0.0, 0.0];
        let new_x = dvector![0.5, 0.5];
        let grad = dvector![-1.0, -1.0];
        let new_grad = dvector![-0.5, -0.5];
        history.update(&new_x, &x, &new_grad, &grad, 0.5).expect("update");
        assert_eq!(history.len(), 1);
        assert!(history.diagonal().is_some());

        history.clear();
        assert!(history.is_empty());
        assert!(history.diagonal().is_none());
    }
}
