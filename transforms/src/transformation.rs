use crate::error::Result;
use crate::kind::{DEFAULT_DECADES, Direction, TransformKind};
use crate::spline::Spline;
use once_cell::sync::OnceCell;
use tracing::debug;

/// Iterations used when numerically inverting the hlog mapping. The inverse is
/// strictly increasing, so bisection halves the bracket each step; 200 steps
/// put the result well below f32 resolution over the [-2r, 2r] bracket.
const BISECTION_STEPS: usize = 200;

/// A named, parameterized, invertible mapping for channel data.
///
/// A `Transformation` owns everything needed to reproduce a mapping exactly:
/// the transform family and its parameters, the direction, the shared range
/// parameter (decades, commonly `log10` of a channel's declared `$PnR` range),
/// and the optional one-time spline fit. Once constructed (and fitted, if
/// smoothing is used) it never changes, so the same instance can be applied to
/// any number of channels or samples and is guaranteed to map equal inputs to
/// equal outputs everywhere.
///
/// # Example
///
/// ```rust
/// use flow_transforms::{Direction, Transformation, TransformKind};
///
/// let transform = Transformation::new(TransformKind::hlog(), Direction::Forward)?
///     .with_decades(1024f64.log10());
/// let mapped = transform.map(1000.0);
/// let back = Transformation::new(TransformKind::hlog(), Direction::Inverse)?
///     .with_decades(1024f64.log10())
///     .map(mapped);
/// assert!((back - 1000.0).abs() < 0.5);
/// # Ok::<(), flow_transforms::TransformError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Transformation {
    kind: TransformKind,
    direction: Direction,
    decades: f64,
    spline: OnceCell<Spline>,
}

impl Transformation {
    /// Create a transformation with the default range parameter
    /// (`log10(2^18)`, an 18-bit acquisition range).
    ///
    /// # Errors
    /// Will return `Err` if the family parameters are outside their domain
    pub fn new(kind: TransformKind, direction: Direction) -> Result<Self> {
        kind.validate()?;
        Ok(Self {
            kind,
            direction,
            decades: DEFAULT_DECADES,
            spline: OnceCell::new(),
        })
    }

    /// Replace the range parameter (decades). Intended for use at construction
    /// time, before the transformation is shared.
    #[must_use]
    pub fn with_decades(mut self, decades: f64) -> Self {
        self.decades = decades;
        self
    }

    /// The transform family
    #[must_use]
    pub fn kind(&self) -> &TransformKind {
        &self.kind
    }

    /// The mapping direction
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The shared range parameter (decades)
    #[must_use]
    pub fn decades(&self) -> f64 {
        self.decades
    }

    /// Whether the one-time spline fit has happened
    #[must_use]
    pub fn is_fit(&self) -> bool {
        self.spline.get().is_some()
    }

    /// The fitted spline domain, if a fit has happened
    #[must_use]
    pub fn spline_domain(&self) -> Option<(f64, f64)> {
        self.spline.get().map(Spline::domain)
    }

    /// Fit the interpolation spline over `[xmin, xmax]`.
    ///
    /// The fit happens at most once: if a spline is already present the call
    /// is a no-op and the existing fit is kept verbatim. A degenerate domain
    /// (`xmin == xmax`, e.g. constant data) skips the fit entirely, and
    /// smoothed application falls back to the exact mapping.
    ///
    /// # Errors
    /// Will return `Err` if the domain is non-finite
    pub fn fit_spline(&self, xmin: f64, xmax: f64) -> Result<()> {
        if self.spline.get().is_some() {
            debug!("spline already fit, keeping existing parameters");
            return Ok(());
        }
        if xmin == xmax {
            debug!(xmin, "degenerate spline domain, using exact mapping");
            return Ok(());
        }
        let spline = Spline::fit_function(xmin, xmax, |x| self.map_exact(x))?;
        // A concurrent fit may have won the race; the first fit stands either way
        let _ = self.spline.set(spline);
        debug!(xmin, xmax, "fit transform spline");
        Ok(())
    }

    /// Map a single value through the exact (non-spline) mapping
    #[must_use]
    pub fn map(&self, value: f32) -> f32 {
        self.map_exact(f64::from(value)) as f32
    }

    /// Map a slice of values, through the fitted spline when `use_spline` is
    /// set and a fit is present, otherwise through the exact mapping.
    ///
    /// Applying the same transformation twice to disjoint data is
    /// side-effect-free: no internal state changes on application.
    #[must_use]
    pub fn map_slice(&self, values: &[f32], use_spline: bool) -> Vec<f32> {
        match (use_spline, self.spline.get()) {
            (true, Some(spline)) => values
                .iter()
                .map(|&v| spline.eval(f64::from(v)) as f32)
                .collect(),
            _ => values.iter().map(|&v| self.map(v)).collect(),
        }
    }

    fn map_exact(&self, value: f64) -> f64 {
        match self.direction {
            Direction::Forward => self.forward(value),
            Direction::Inverse => self.inverse(value),
        }
    }

    fn forward(&self, x: f64) -> f64 {
        match &self.kind {
            TransformKind::Hlog { b, r } => hlog(x, *b, *r, self.decades),
            TransformKind::Tlog { threshold, r } => {
                r / self.decades * x.max(*threshold).log10()
            }
            TransformKind::Glog { lambda } => (x + (x * x + lambda).sqrt()).log10(),
            TransformKind::Linear => x,
        }
    }

    fn inverse(&self, y: f64) -> f64 {
        match &self.kind {
            TransformKind::Hlog { b, r } => hlog_inverse(y, *b, *r, self.decades),
            TransformKind::Tlog { threshold: _, r } => 10f64.powf(y * self.decades / r),
            TransformKind::Glog { lambda } => {
                let p = 10f64.powf(y);
                (p * p - lambda) / (2.0 * p)
            }
            TransformKind::Linear => y,
        }
    }
}

/// Closed-form inverse of the hyperlog mapping.
///
/// `hlog_inverse(y) = sign(y) * 10^(|d/r * y|) + b * (d/r * y) - sign(y)`
/// (zero maps to zero; the sign convention treats zero as positive).
fn hlog_inverse(y: f64, b: f64, r: f64, d: f64) -> f64 {
    let aux = d / r * y;
    let sign = if y < 0.0 { -1.0 } else { 1.0 };
    sign * 10f64.powf(sign * aux) + b * aux - sign
}

/// Forward hyperlog mapping, obtained by root-finding the closed-form inverse.
///
/// The inverse is strictly increasing, so a bisection over the conventional
/// [-2r, 2r] bracket converges unconditionally. Inputs beyond the bracket
/// saturate at the bracket ends.
fn hlog(x: f64, b: f64, r: f64, d: f64) -> f64 {
    let mut lo = -2.0 * r;
    let mut hi = 2.0 * r;
    if x <= hlog_inverse(lo, b, r, d) {
        return lo;
    }
    if x >= hlog_inverse(hi, b, r, d) {
        return hi;
    }
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if hlog_inverse(mid, b, r, d) < x {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            break;
        }
    }
    0.5 * (lo + hi)
}
