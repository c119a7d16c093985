//! Convergence record: a sliding window of objective values plus the gradient
//! and iterate norms needed by the termination tests.
//!
//! Convergence is gauged three ways, because each test alone has a failure
//! mode: the average decrease per step divided by the current value breaks
//! down when the value approaches zero, so the record also terminates when
//! the gradient norm falls sufficiently below the initial one
//! (`|g|/|g0| ≤ rtol`) and when the gradient is numerically zero compared to
//! the iterate (`|g| < eps·max(1, |x|)`).

use crate::math;
use crate::optimizer::MinimizeStatus;
use nalgebra::DVector;
use tracing::{debug, warn};
use web_time::{Duration, Instant};

pub(crate) struct ConvergenceRecord {
    /// Recent objective values, oldest first
    values: Vec<f64>,
    g_norm_init: f64,
    g_norm_last: f64,
    x_last: DVector<f64>,
    start_time: Instant,
    /// Window cap; starts at 100 and tightens to 10 once values arrive
    max_size: usize,
    value_tolerance: f64,
    gradient_tolerance: f64,
    relative_tolerance: f64,
    show_running_tracing: bool,
}

impl ConvergenceRecord {
    /// Start the record: begins the timer and captures the initial gradient
    /// norm and iterate for the norm-based tests.
    pub fn start(
        value_tolerance: f64,
        gradient_tolerance: f64,
        relative_tolerance: f64,
        show_running_tracing: bool,
        grad: &DVector<f64>,
        x: &DVector<f64>,
    ) -> Self {
        let g_norm = math::norm(grad);
        Self {
            values: Vec::new(),
            // Clamped above zero so dividing by the initial norm can never
            // produce NaN, while also never signalling false convergence.
            g_norm_init: g_norm.max(f64::MIN_POSITIVE),
            g_norm_last: g_norm,
            x_last: x.clone(),
            start_time: Instant::now(),
            max_size: 100,
            value_tolerance,
            gradient_tolerance,
            relative_tolerance,
            show_running_tracing,
        }
    }

    /// Append the value and gradient of a finished iteration.
    pub fn add(&mut self, value: f64, grad: &DVector<f64>, x: &DVector<f64>) {
        // Memory-conscious window: the cap tightens from 100 to 10 once
        // values start arriving.
        self.max_size = 10;

        self.g_norm_last = math::norm(grad);
        if self.values.len() > self.max_size {
            self.values.remove(0);
        }
        self.values.push(value);

        debug!("{:.3e} {:.2}s", value, self.how_long().as_secs_f64());

        self.x_last.copy_from(x);
    }

    /// Check for convergence through first-order optimality, numerical
    /// convergence (zero numerical gradient), and the average improvement.
    ///
    /// Returns [`MinimizeStatus::Running`] when no criterion fired.
    pub fn to_continue(
        &self,
        iterations: usize,
        max_iterations: Option<usize>,
    ) -> MinimizeStatus {
        let relative_norm = self.g_norm_last / self.g_norm_init;
        let size = self.values.len();
        let Some(&newest) = self.values.last() else {
            return MinimizeStatus::Running;
        };
        let previous = if size >= 10 {
            self.values[size - 10]
        } else {
            self.values[0]
        };
        let average_improvement = (previous - newest) / size.min(10) as f64;

        if let Some(max_itr) = max_iterations
            && iterations >= max_itr
        {
            return MinimizeStatus::MaxIterationsReached;
        }

        if size > 5 && (average_improvement / newest).abs() < self.value_tolerance {
            return MinimizeStatus::AverageImprovementReached;
        }

        if relative_norm <= self.relative_tolerance {
            return MinimizeStatus::RelativeNormReached;
        }

        // One-norm screen first: cheap, and always at least as large as the
        // two-norm.
        let x_norm_1 = 1.0_f64.max(math::norm_1(&self.x_last));
        if self.g_norm_last < self.gradient_tolerance * x_norm_1 {
            let x_norm = 1.0_f64.max(math::norm(&self.x_last));
            if self.show_running_tracing {
                warn!(
                    "**** Iteration={}, gnorm={:e}, xnorm={:e}, gnorm/xnorm={:e}",
                    iterations.saturating_sub(1),
                    self.g_norm_last,
                    x_norm,
                    self.g_norm_last / x_norm
                );
            }
            if self.g_norm_last < self.gradient_tolerance * x_norm {
                return MinimizeStatus::GradientNumericallyZero;
            }
        } else if self.show_running_tracing {
            warn!(
                "**** Iteration={}, gnorm={:e}, xnorm={:e}, gnorm/xnorm={:e}",
                iterations.saturating_sub(1),
                self.g_norm_last,
                x_norm_1,
                self.g_norm_last / x_norm_1
            );
        }

        debug!(
            " |{:.3e}| {{{:.3e}}} {:.3e}",
            self.g_norm_last,
            relative_norm,
            (average_improvement / newest).abs()
        );
        MinimizeStatus::Running
    }

    /// The numerically-zero-gradient test alone: `|g| < eps·max(1, |x|)`
    /// screened by the one-norm first. Used before the first iteration so a
    /// start at a stationary point terminates immediately.
    pub fn gradient_numerically_zero(&self) -> bool {
        let x_norm_1 = 1.0_f64.max(math::norm_1(&self.x_last));
        if self.g_norm_last < self.gradient_tolerance * x_norm_1 {
            let x_norm = 1.0_f64.max(math::norm(&self.x_last));
            return self.g_norm_last < self.gradient_tolerance * x_norm;
        }
        false
    }

    /// Most recent gradient norm.
    pub fn g_norm_last(&self) -> f64 {
        self.g_norm_last
    }

    /// Most recent gradient norm divided by the initial one.
    pub fn relative_norm(&self) -> f64 {
        self.g_norm_last / self.g_norm_init
    }

    /// Number of objective values currently in the window.
    #[cfg(test)]
    pub fn window_len(&self) -> usize {
        self.values.len()
    }

    /// Time since the record was started.
    pub fn how_long(&self) -> Duration {
        self.start_time.elapsed()
    }
}
