//! Natural cubic spline interpolation.
//!
//! The log-like transforms are expensive to evaluate exactly (hlog requires a
//! root find per value), so a transformation can be fitted once over a fixed
//! domain and evaluated through an interpolating spline instead. The fit
//! samples the exact mapping at evenly spaced knots and solves the classic
//! tridiagonal system for the knot second derivatives with natural boundary
//! conditions.

use crate::error::{Result, TransformError};

/// Number of knots sampled from the exact mapping when fitting
pub(crate) const SPLINE_KNOTS: usize = 1000;

/// A fitted natural cubic spline over `[xmin, xmax]`.
///
/// Evaluation outside the fitted domain extrapolates with the end segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot (natural boundaries: zero at the ends)
    curvature: Vec<f64>,
}

impl Spline {
    /// Fit a spline through the given knots.
    ///
    /// # Errors
    /// Will return `Err` if fewer than two knots are given, the knot count
    /// mismatches, or the knots are not strictly increasing and finite.
    pub fn fit(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n {
            return Err(TransformError::invalid_spline_domain(
                xs.first().copied().unwrap_or(f64::NAN),
                xs.last().copied().unwrap_or(f64::NAN),
                format!("need at least two knots, got {} x and {} y", n, ys.len()),
            ));
        }
        for window in xs.windows(2) {
            if !(window[1] > window[0]) || !window[0].is_finite() || !window[1].is_finite() {
                return Err(TransformError::invalid_spline_domain(
                    xs[0],
                    xs[n - 1],
                    "knots must be finite and strictly increasing",
                ));
            }
        }

        let curvature = solve_natural_curvature(&xs, &ys);
        Ok(Self { xs, ys, curvature })
    }

    /// Fit a spline by sampling `f` at evenly spaced knots over `[xmin, xmax]`.
    ///
    /// # Errors
    /// Will return `Err` if the domain is degenerate or non-finite.
    pub fn fit_function(xmin: f64, xmax: f64, f: impl Fn(f64) -> f64) -> Result<Self> {
        if !xmin.is_finite() || !xmax.is_finite() || !(xmax > xmin) {
            return Err(TransformError::invalid_spline_domain(
                xmin,
                xmax,
                "domain must be finite with xmax > xmin",
            ));
        }
        let step = (xmax - xmin) / (SPLINE_KNOTS - 1) as f64;
        let xs: Vec<f64> = (0..SPLINE_KNOTS).map(|i| xmin + step * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
        Self::fit(xs, ys)
    }

    /// The fitted domain `(xmin, xmax)`
    #[must_use]
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Evaluate the spline at `x`.
    ///
    /// Values outside the fitted domain are extrapolated with the first or
    /// last cubic segment.
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        // Locate the segment [x_i, x_{i+1}] containing x, clamping to the end
        // segments for extrapolation
        let i = self
            .xs
            .partition_point(|&knot| knot <= x)
            .clamp(1, self.xs.len() - 1)
            - 1;

        let h = self.xs[i + 1] - self.xs[i];
        let a = (self.xs[i + 1] - x) / h;
        let b = (x - self.xs[i]) / h;
        a * self.ys[i]
            + b * self.ys[i + 1]
            + ((a * a * a - a) * self.curvature[i] + (b * b * b - b) * self.curvature[i + 1])
                * (h * h)
                / 6.0
    }
}

/// Solve the tridiagonal system for knot second derivatives with natural
/// boundary conditions (Thomas algorithm).
fn solve_natural_curvature(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut curvature = vec![0.0; n];
    if n < 3 {
        return curvature;
    }

    // Forward sweep over the interior knots
    let mut diag_scratch = vec![0.0; n];
    let mut rhs_scratch = vec![0.0; n];
    for i in 1..n - 1 {
        let h_prev = xs[i] - xs[i - 1];
        let h_next = xs[i + 1] - xs[i];
        let slope_prev = (ys[i] - ys[i - 1]) / h_prev;
        let slope_next = (ys[i + 1] - ys[i]) / h_next;

        let diag = 2.0 * (h_prev + h_next) - h_prev * diag_scratch[i - 1];
        diag_scratch[i] = h_next / diag;
        rhs_scratch[i] = (6.0 * (slope_next - slope_prev) - h_prev * rhs_scratch[i - 1]) / diag;
    }

    // Back substitution; natural boundaries leave the end curvatures at zero
    for i in (1..n - 1).rev() {
        curvature[i] = rhs_scratch[i] - diag_scratch[i] * curvature[i + 1];
    }
    curvature
}
