//! MINPACK-style safeguarded interpolating line search.
//!
//! Finds a step length `α` along a descent direction satisfying the strong
//! Wolfe conditions: sufficient decrease `f(x+αd) ≤ f(x) + ftol·α·∇f·d` and
//! curvature `|∇f(x+αd)·d| ≤ gtol·|∇f·d|`. The search first brackets an
//! interval guaranteed to contain such a point, then shrinks it with
//! safeguarded cubic/quadratic interpolation over a three-point state.

use crate::math;
use crate::objective::ObjectiveFunction;
use crate::optimizer::{OptimizerError, OptimizerResult};
use nalgebra::DVector;
use tracing::{debug, trace};

/// Sufficient-decrease constant of the strong Wolfe conditions.
pub(crate) const FTOL: f64 = 1e-4;
/// Curvature constant of the strong Wolfe conditions.
pub(crate) const GTOL: f64 = 0.9;
/// Smallest admissible step length.
pub(crate) const STEP_MIN: f64 = 1e-12;
/// Largest admissible step length.
pub(crate) const STEP_MAX: f64 = 1e12;
/// Bisect when less than a third of the bracket width was shed.
const P66: f64 = 0.66;
const P5: f64 = 0.5;
/// Extrapolation factor bounding trial steps outside the bracket.
const XTRAPF: f64 = 4.0;

/// One interpolation point: step length, function value there, and the
/// directional derivative `∇f(x + α·dir)·dir`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LinePoint {
    pub alpha: f64,
    pub value: f64,
    pub deriv: f64,
}

/// Accepted point plus the termination code of the search.
///
/// Codes follow the MINPACK convention: 1 strong Wolfe satisfied, 2 bracket
/// shrank below the tolerance, 4 clamped at the minimum step without
/// decrease, 5 clamped at the maximum step while still improving, 6
/// bracketed with no feasible point. Code 3 (evaluation budget exhausted)
/// surfaces as [`OptimizerError::MaxEvaluationsExceeded`] instead.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineSearchResult {
    pub point: LinePoint,
    pub info: u8,
}

/// Search along `dir` from `x` for a step satisfying the strong Wolfe
/// conditions.
///
/// If `dir` is not a descent direction it is replaced with `-grad` in place.
/// On return `new_x` holds the accepted point and `new_grad` the gradient
/// from the final evaluation, which is always taken at `new_x`; callers can
/// consume it directly instead of re-querying the objective.
///
/// The very first outer iteration starts from the conservative trial step
/// 0.1; every later one starts from 1.0, the step a well-scaled quasi-Newton
/// direction should accept.
#[allow(clippy::too_many_arguments)]
pub(crate) fn minpack_search<F>(
    objective: &mut F,
    dir: &mut DVector<f64>,
    x: &DVector<f64>,
    grad: &DVector<f64>,
    f0: f64,
    tol: f64,
    first_iteration: bool,
    new_x: &mut DVector<f64>,
    new_grad: &mut DVector<f64>,
    evaluations: &mut usize,
    max_evaluations: usize,
) -> OptimizerResult<LineSearchResult>
where
    F: ObjectiveFunction + ?Sized,
{
    let mut info: u8 = 0;
    let mut infoc: u8 = 1;
    let mut bracketed = false;
    let mut stage1 = true;
    let mut width = STEP_MAX - STEP_MIN;
    let mut width1 = 2.0 * width;

    let mut g0 = math::inner_product(grad, dir);
    if g0 >= 0.0 {
        // Looking in a direction of positive gradient; this won't work.
        debug!(
            "Non-descent direction (directional derivative {:.3e}), falling back to -gradient",
            g0
        );
        for i in 0..dir.len() {
            dir[i] = -grad[i];
        }
        g0 = math::inner_product(grad, dir);
    }
    let g_test = FTOL * g0;

    let mut new_pt = LinePoint {
        alpha: if first_iteration { 0.1 } else { 1.0 },
        value: 0.0,
        deriv: 0.0,
    };
    let mut best_pt = LinePoint {
        alpha: 0.0,
        value: f0,
        deriv: g0,
    };
    let mut end_pt = best_pt;

    loop {
        let (stp_min, stp_max) = if bracketed {
            (
                best_pt.alpha.min(end_pt.alpha),
                best_pt.alpha.max(end_pt.alpha),
            )
        } else {
            (
                best_pt.alpha,
                new_pt.alpha + XTRAPF * (new_pt.alpha - best_pt.alpha),
            )
        };

        new_pt.alpha = new_pt.alpha.clamp(STEP_MIN, STEP_MAX);

        // Use the best point if we have some sort of strange termination
        // condition.
        if (bracketed && (new_pt.alpha <= stp_min || new_pt.alpha >= stp_max))
            || *evaluations >= max_evaluations
            || infoc == 0
            || (bracketed && stp_max - stp_min <= tol * stp_max)
        {
            new_pt.alpha = best_pt.alpha;
            new_pt.value = best_pt.value;
        }

        math::plus_and_const_mult(x, dir, new_pt.alpha, new_x);
        new_pt.value = objective.evaluate(new_x, new_grad);
        new_pt.deriv = math::inner_product(new_grad, dir);
        let f_test = f0 + new_pt.alpha * g_test;
        *evaluations += 1;

        if (bracketed && (new_pt.alpha <= stp_min || new_pt.alpha >= stp_max)) || infoc == 0 {
            info = 6;
            debug!("Line search failure: bracketed but no feasible point found");
        }
        if new_pt.alpha == STEP_MAX && new_pt.value <= f_test && new_pt.deriv <= g_test {
            info = 5;
            debug!("Line search failure: sufficient decrease, but gradient is more negative");
        }
        if new_pt.alpha == STEP_MIN && (new_pt.value > f_test || new_pt.deriv >= g_test) {
            info = 4;
            debug!("Line search failure: minimum step length reached");
        }
        if *evaluations >= max_evaluations {
            return Err(OptimizerError::MaxEvaluationsExceeded { max_evaluations });
        }
        if bracketed && stp_max - stp_min <= tol * stp_max {
            info = 2;
            debug!("Line search failure: interval is too small");
        }
        if new_pt.value <= f_test && new_pt.deriv.abs() <= -GTOL * g0 {
            info = 1;
        }

        if info != 0 {
            return Ok(LineSearchResult { point: new_pt, info });
        }

        // The first stage looks for a point that is lower and increasing.
        if stage1 && new_pt.value <= f_test && new_pt.deriv >= FTOL.min(GTOL) * g0 {
            stage1 = false;
        }

        // A modified function is used to predict the step only if we have not
        // obtained a step for which the modified function has a non-positive
        // value and non-negative derivative, and if a lower function value has
        // been obtained but the decrease is not sufficient.
        if stage1 && new_pt.value <= best_pt.value && new_pt.value > f_test {
            new_pt.value -= new_pt.alpha * g_test;
            best_pt.value -= best_pt.alpha * g_test;
            end_pt.value -= end_pt.alpha * g_test;
            new_pt.deriv -= g_test;
            best_pt.deriv -= g_test;
            end_pt.deriv -= g_test;

            infoc = interpolate_step(
                &mut new_pt,
                &mut best_pt,
                &mut end_pt,
                stp_min,
                stp_max,
                &mut bracketed,
            );

            best_pt.value += best_pt.alpha * g_test;
            end_pt.value += end_pt.alpha * g_test;
            best_pt.deriv += g_test;
            end_pt.deriv += g_test;
        } else {
            infoc = interpolate_step(
                &mut new_pt,
                &mut best_pt,
                &mut end_pt,
                stp_min,
                stp_max,
                &mut bracketed,
            );
        }

        if bracketed {
            if (end_pt.alpha - best_pt.alpha).abs() >= P66 * width1 {
                new_pt.alpha = best_pt.alpha + P5 * (end_pt.alpha - best_pt.alpha);
            }
            width1 = width;
            width = (end_pt.alpha - best_pt.alpha).abs();
        }
    }
}

/// Safeguarded cubic/quadratic step selection over the three-point state,
/// after the MINPACK subroutine `cstep`.
///
/// Picks the next trial step by case analysis on the sign pattern of the
/// function values and derivatives at `best` and `new`, updates the interval
/// of uncertainty, and clamps the result into `[stp_min, stp_max]`. Returns
/// the case number (1 to 4) taken.
fn interpolate_step(
    new_pt: &mut LinePoint,
    best_pt: &mut LinePoint,
    end_pt: &mut LinePoint,
    stp_min: f64,
    stp_max: f64,
    bracketed: &mut bool,
) -> u8 {
    let info: u8;
    let bound: bool;
    let mut stpf: f64;
    let sign_g = new_pt.deriv * best_pt.deriv / best_pt.deriv.abs();

    if new_pt.value > best_pt.value {
        // First case. A higher function value. The minimum is bracketed. If
        // the cubic step is closer to best.alpha than the quadratic step, the
        // cubic step is taken.
        info = 1;
        bound = true;
        let theta = 3.0 * (best_pt.value - new_pt.value) / (new_pt.alpha - best_pt.alpha)
            + best_pt.deriv
            + new_pt.deriv;
        let s = theta.max(new_pt.deriv).max(best_pt.deriv);
        // The max(0, ..) keeps roundoff from pushing the discriminant negative.
        let mut gamma = s
            * ((theta / s) * (theta / s) - (best_pt.deriv / s) * (new_pt.deriv / s))
                .max(0.0)
                .sqrt();
        if new_pt.alpha < best_pt.alpha {
            gamma = -gamma;
        }
        let p = (gamma - best_pt.deriv) + theta;
        let q = ((gamma - best_pt.deriv) + gamma) + new_pt.deriv;
        let r = p / q;
        let stpc = best_pt.alpha + r * (new_pt.alpha - best_pt.alpha);
        let stpq = best_pt.alpha
            + ((best_pt.deriv
                / ((best_pt.value - new_pt.value) / (new_pt.alpha - best_pt.alpha)
                    + best_pt.deriv))
                / 2.0)
                * (new_pt.alpha - best_pt.alpha);

        stpf = if (stpc - best_pt.alpha).abs() < (stpq - best_pt.alpha).abs() {
            stpc
        } else {
            stpq
        };
        *bracketed = true;
        if new_pt.alpha < 0.1 {
            stpf *= 0.01;
        }
    } else if sign_g < 0.0 {
        // Second case. A lower function value and derivatives of opposite
        // sign. The minimum is bracketed. If the cubic step is farther from
        // new.alpha than the secant step, the cubic step is taken.
        info = 2;
        bound = false;
        let theta = 3.0 * (best_pt.value - new_pt.value) / (new_pt.alpha - best_pt.alpha)
            + best_pt.deriv
            + new_pt.deriv;
        let s = theta.max(best_pt.deriv).max(new_pt.deriv);
        let mut gamma = s
            * ((theta / s) * (theta / s) - (best_pt.deriv / s) * (new_pt.deriv / s))
                .max(0.0)
                .sqrt();
        if new_pt.alpha > best_pt.alpha {
            gamma = -gamma;
        }
        let p = (gamma - new_pt.deriv) + theta;
        let q = ((gamma - new_pt.deriv) + gamma) + best_pt.deriv;
        let r = p / q;
        let stpc = new_pt.alpha + r * (best_pt.alpha - new_pt.alpha);
        let stpq = new_pt.alpha
            + (new_pt.deriv / (new_pt.deriv - best_pt.deriv)) * (best_pt.alpha - new_pt.alpha);
        stpf = if (stpc - new_pt.alpha).abs() > (stpq - new_pt.alpha).abs() {
            stpc
        } else {
            stpq
        };
        *bracketed = true;
    } else if new_pt.deriv.abs() < best_pt.deriv.abs() {
        // Third case. A lower function value, derivatives of the same sign,
        // and the magnitude of the derivative decreases. The cubic step is
        // only used if it tends to infinity in the direction of the step or
        // if its minimum is beyond the trial step; otherwise the bound
        // replaces it. The closeness rule depends on whether the minimum is
        // bracketed yet.
        info = 3;
        bound = true;
        let theta = 3.0 * (best_pt.value - new_pt.value) / (new_pt.alpha - best_pt.alpha)
            + best_pt.deriv
            + new_pt.deriv;
        let s = theta.max(best_pt.deriv).max(new_pt.deriv);
        let mut gamma = s
            * ((theta / s) * (theta / s) - (best_pt.deriv / s) * (new_pt.deriv / s))
                .max(0.0)
                .sqrt();
        if new_pt.alpha < best_pt.alpha {
            gamma = -gamma;
        }
        let p = (gamma - best_pt.deriv) + theta;
        let q = ((gamma - best_pt.deriv) + gamma) + new_pt.deriv;
        let r = p / q;
        let stpc = if r < 0.0 && gamma != 0.0 {
            new_pt.alpha + r * (best_pt.alpha - new_pt.alpha)
        } else if new_pt.alpha > best_pt.alpha {
            stp_max
        } else {
            stp_min
        };
        let stpq = new_pt.alpha
            + (new_pt.deriv / (new_pt.deriv - best_pt.deriv)) * (best_pt.alpha - new_pt.alpha);

        stpf = if *bracketed {
            if (new_pt.alpha - stpc).abs() < (new_pt.alpha - stpq).abs() {
                stpc
            } else {
                stpq
            }
        } else if (new_pt.alpha - stpc).abs() > (new_pt.alpha - stpq).abs() {
            stpc
        } else {
            stpq
        };
    } else {
        // Fourth case. A lower function value, derivatives of the same sign,
        // and the magnitude of the derivative does not decrease. If the
        // minimum is not bracketed, the step is either the lower or the upper
        // bound, else the cubic step is taken.
        info = 4;
        bound = false;

        if *bracketed {
            let theta = 3.0 * (best_pt.value - new_pt.value) / (new_pt.alpha - best_pt.alpha)
                + best_pt.deriv
                + new_pt.deriv;
            let s = theta.max(best_pt.deriv).max(new_pt.deriv);
            let mut gamma = s
                * ((theta / s) * (theta / s) - (best_pt.deriv / s) * (new_pt.deriv / s))
                    .max(0.0)
                    .sqrt();
            if new_pt.alpha > best_pt.alpha {
                gamma = -gamma;
            }
            let p = (gamma - new_pt.deriv) + theta;
            let q = ((gamma - new_pt.deriv) + gamma) + best_pt.deriv;
            let r = p / q;
            stpf = new_pt.alpha + r * (best_pt.alpha - new_pt.alpha);
        } else if new_pt.alpha > best_pt.alpha {
            stpf = stp_max;
        } else {
            stpf = stp_min;
        }
    }

    // Update the interval of uncertainty. This update does not depend on the
    // new step or the case analysis above.
    if new_pt.value > best_pt.value {
        *end_pt = *new_pt;
    } else {
        if sign_g < 0.0 {
            *end_pt = *best_pt;
        }
        *best_pt = *new_pt;
    }

    trace!("Interpolation case {}", info);

    // Compute the new step and safeguard it.
    stpf = stpf.min(stp_max).max(stp_min);
    new_pt.alpha = stpf;

    if *bracketed && bound {
        if end_pt.alpha > best_pt.alpha {
            new_pt.alpha = new_pt
                .alpha
                .min(best_pt.alpha + P66 * (end_pt.alpha - best_pt.alpha));
        } else {
            new_pt.alpha = new_pt
                .alpha
                .max(best_pt.alpha + P66 * (end_pt.alpha - best_pt.alpha));
        }
    }

    info
}
