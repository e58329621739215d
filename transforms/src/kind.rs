use crate::error::{Result, TransformError};
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Top of the display scale shared by the log-like families (10^4)
pub const DISPLAY_MAX: f64 = 1.0e4;

/// Default range parameter: log10 of an 18-bit acquisition range (2^18)
pub const DEFAULT_DECADES: f64 = 5.418539921753438;

/// Whether a transformation maps raw values to display scale or back
#[derive(
    Default, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Raw instrument values to display scale
    #[default]
    Forward,
    /// Display scale back to raw instrument values
    Inverse,
}

/// Transform family to apply to flow cytometry channel data
///
/// Transformations compress the wide dynamic range of fluorescence data onto a
/// display-friendly scale. The log-like families share a range parameter
/// (decades), typically derived as `log10` of the channel's declared maximum
/// range; see [`Transformation`](crate::Transformation).
#[derive(Display, Clone, Serialize, Deserialize, Debug, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum TransformKind {
    /// Hyperlog transformation: linear near zero, logarithmic further out.
    /// The forward mapping is the numeric inverse of
    /// `y -> sign(y) * 10^(|d/r * y|) + b * (d/r * y) - sign(y)`
    /// where `b` controls the width of the linear region and `r` is the top of
    /// the display scale.
    Hlog { b: f64, r: f64 },
    /// Truncated log transformation
    /// Formula: `r/d * log10(max(x, threshold))`
    Tlog { threshold: f64, r: f64 },
    /// Generalized log transformation
    /// Formula: `log10(x + sqrt(x^2 + lambda))`
    Glog { lambda: f64 },
    /// Linear transformation (identity)
    /// Used for scatter parameters (FSC, SSC) and time
    Linear,
}

impl TransformKind {
    /// Hyperlog with the conventional linearization width of 500
    #[must_use]
    pub fn hlog() -> Self {
        Self::Hlog {
            b: 500.0,
            r: DISPLAY_MAX,
        }
    }

    /// Truncated log with a truncation threshold of 1
    #[must_use]
    pub fn tlog() -> Self {
        Self::Tlog {
            threshold: 1.0,
            r: DISPLAY_MAX,
        }
    }

    /// Generalized log with a unit offset parameter
    #[must_use]
    pub fn glog() -> Self {
        Self::Glog { lambda: 1.0 }
    }

    /// Check the family parameters are inside their accepted domain
    /// # Errors
    /// Will return `Err` if the tlog threshold is not positive, the glog lambda
    /// is negative, or a display-scale parameter is not positive
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Hlog { b, r } => {
                if *b <= 0.0 {
                    return Err(TransformError::invalid_parameter(
                        "b",
                        format!("hlog linearization width must be positive, got {b}"),
                    ));
                }
                if *r <= 0.0 {
                    return Err(TransformError::invalid_parameter(
                        "r",
                        format!("hlog display range must be positive, got {r}"),
                    ));
                }
            }
            Self::Tlog { threshold, r } => {
                if *threshold <= 0.0 {
                    return Err(TransformError::invalid_parameter(
                        "threshold",
                        format!("tlog threshold must be positive, got {threshold}"),
                    ));
                }
                if *r <= 0.0 {
                    return Err(TransformError::invalid_parameter(
                        "r",
                        format!("tlog display range must be positive, got {r}"),
                    ));
                }
            }
            Self::Glog { lambda } => {
                if *lambda < 0.0 {
                    return Err(TransformError::invalid_parameter(
                        "lambda",
                        format!("glog lambda must be non-negative, got {lambda}"),
                    ));
                }
            }
            Self::Linear => {}
        }
        Ok(())
    }
}

impl Default for TransformKind {
    fn default() -> Self {
        Self::hlog()
    }
}

impl FromStr for TransformKind {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hlog" => Ok(Self::hlog()),
            "tlog" => Ok(Self::tlog()),
            "glog" => Ok(Self::glog()),
            "linear" => Ok(Self::Linear),
            other => Err(TransformError::unknown_kind(other)),
        }
    }
}

impl Hash for TransformKind {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::Hlog { .. } => "hlog".hash(state),
            Self::Tlog { .. } => "tlog".hash(state),
            Self::Glog { .. } => "glog".hash(state),
            Self::Linear => "linear".hash(state),
        }
    }
}

#[test]
fn test_kind_parsing() {
    assert_eq!("hlog".parse::<TransformKind>().unwrap(), TransformKind::hlog());
    assert_eq!("linear".parse::<TransformKind>().unwrap(), TransformKind::Linear);
    assert!(matches!(
        "biexp".parse::<TransformKind>(),
        Err(TransformError::UnknownKind { .. })
    ));
    assert_eq!(TransformKind::hlog().to_string(), "hlog");
}

#[test]
fn test_kind_validation() {
    assert!(TransformKind::hlog().validate().is_ok());
    assert!(
        TransformKind::Tlog {
            threshold: 0.0,
            r: DISPLAY_MAX
        }
        .validate()
        .is_err()
    );
    assert!(TransformKind::Glog { lambda: -1.0 }.validate().is_err());
}
