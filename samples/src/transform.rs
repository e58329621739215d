//! Frame-level transform application.
//!
//! [`flow_transforms::Transformation`] maps raw values; this module connects
//! it to event tables and channel annotation: resolving the shared range
//! parameter from `$PnR` metadata (auto-range), applying a transformation to
//! a channel subset of a `DataFrame`, and the option structs that configure a
//! transform call.

use crate::error::{Result, SampleError};
use crate::meta::{ChannelName, SampleMeta};
use derive_builder::Builder;
use flow_transforms::{Direction, TransformKind, Transformation};
use itertools::Itertools;
use polars::prelude::*;
use std::sync::Arc;
use tracing::warn;

/// What to transform with: a named family (a transformation is built and
/// fitted for the call) or an existing transformation reused verbatim.
#[derive(Debug, Clone)]
pub enum TransformSpec {
    /// Build a transformation of this family
    Named(TransformKind),
    /// Reuse an already-constructed transformation exactly as it is
    Custom(Transformation),
}

impl From<TransformKind> for TransformSpec {
    fn from(kind: TransformKind) -> Self {
        Self::Named(kind)
    }
}

impl From<Transformation> for TransformSpec {
    fn from(transformation: Transformation) -> Self {
        Self::Custom(transformation)
    }
}

/// Options for a transform call.
///
/// The transformation parameters are shared between all transformed channels;
/// to apply different parameters to different channels, make several transform
/// calls.
///
/// # Example
///
/// ```rust,no_run
/// use flow_samples::transform::TransformOptions;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = TransformOptions::new()
///     .channels(vec!["B1-A".into(), "Y2-A".into()])
///     .use_spline(false)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Builder, Clone, Debug)]
#[builder(setter(into, strip_option), default)]
pub struct TransformOptions {
    /// Channels to transform; `None` transforms every column currently in the
    /// data
    pub channels: Option<Vec<ChannelName>>,
    /// Forward (raw to display) or inverse mapping
    pub direction: Direction,
    /// Keep all columns in the output (`true`) or only the transformed ones
    pub return_all: bool,
    /// Derive the range parameter from the channels' declared `$PnR` range
    pub auto_range: bool,
    /// Fit and evaluate through the interpolation spline
    pub use_spline: bool,
    /// Explicit range parameter (decades). Overrides auto-range with a warning
    /// when both are given.
    pub decades: Option<f64>,
    /// ID for the resulting sample or collection; `None` keeps the original
    pub new_id: Option<Arc<str>>,
    /// Apply immediately (`true`) or queue for replay on first data access
    pub apply_now: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            channels: None,
            direction: Direction::Forward,
            return_all: true,
            auto_range: true,
            use_spline: true,
            decades: None,
            new_id: None,
            apply_now: true,
        }
    }
}

impl TransformOptions {
    /// Create a new builder for `TransformOptions`
    pub fn new() -> TransformOptionsBuilder {
        TransformOptionsBuilder::default()
    }
}

/// Tolerance for comparing declared channel ranges: floating rounding in the
/// annotation must not split channels that declare the same range.
fn ranges_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Resolve the shared range parameter (decades) for an auto-range transform.
///
/// Every selected channel of every given annotation must declare approximately
/// the same `$PnR` range; the shared range is converted to decades as
/// `log10(range)`.
///
/// # Errors
/// Will return `Err` if a selected channel is missing from an annotation, or
/// if the declared ranges disagree (the error names the members and channels
/// that disagree; they cannot be transformed together)
pub(crate) fn shared_decades<'a>(
    annotations: impl IntoIterator<Item = (&'a str, &'a SampleMeta)>,
    channels: &[ChannelName],
) -> Result<f64> {
    let mut reference: Option<(String, f64)> = None;

    for (context, meta) in annotations {
        for channel in channels {
            let descriptor = meta
                .channel(channel)
                .ok_or_else(|| SampleError::channel_not_found(channel.as_ref(), context))?;
            match &reference {
                None => {
                    reference = Some((format!("'{channel}' in {context}"), descriptor.range));
                }
                Some((first, range)) if !ranges_close(descriptor.range, *range) => {
                    return Err(SampleError::configuration(format!(
                        "not all channels share the same declared data range, so they cannot \
                         be transformed together: {first} declares {range} but '{channel}' in \
                         {context} declares {}; try transforming one channel at a time",
                        descriptor.range
                    )));
                }
                Some(_) => {}
            }
        }
    }

    let (_, range) = reference.ok_or_else(|| {
        SampleError::configuration("no channels selected for an auto-range transform")
    })?;
    Ok(range.log10())
}

/// Build the transformation for a transform call.
///
/// A [`TransformSpec::Custom`] transformation is reused as-is. For a named
/// family, the range parameter comes from an explicit `decades` option, from
/// the shared declared channel range (auto-range), or from the family default.
pub(crate) fn build_transformer<'a>(
    spec: &TransformSpec,
    options: &TransformOptions,
    channels: &[ChannelName],
    annotations: impl IntoIterator<Item = (&'a str, &'a SampleMeta)>,
) -> Result<Transformation> {
    let kind = match spec {
        TransformSpec::Custom(transformation) => return Ok(transformation.clone()),
        TransformSpec::Named(kind) => kind.clone(),
    };

    let decades = if let Some(decades) = options.decades {
        if options.auto_range {
            warn!(
                decades,
                "both auto_range and an explicit range parameter were given; the explicit value is used"
            );
        }
        Some(decades)
    } else if options.auto_range {
        Some(shared_decades(annotations, channels)?)
    } else {
        None
    };

    let transformation = Transformation::new(kind, options.direction)?;
    Ok(match decades {
        Some(decades) => transformation.with_decades(decades),
        None => transformation,
    })
}

/// Read one channel of the event table as owned values
pub(crate) fn column_values(frame: &DataFrame, channel: impl AsRef<str>) -> Result<Vec<f32>> {
    let channel = channel.as_ref();
    let column = frame
        .column(channel)
        .map_err(|_| SampleError::channel_not_found(channel, "the event data"))?;
    let values = column.as_materialized_series().f32()?;
    Ok(match values.cont_slice() {
        Ok(slice) => slice.to_vec(),
        // Chunked after a filter; fall back to iteration
        Err(_) => values.into_no_null_iter().collect(),
    })
}

/// The smallest and largest finite value across the selected channels
pub(crate) fn frame_min_max(
    frame: &DataFrame,
    channels: &[ChannelName],
) -> Result<Option<(f64, f64)>> {
    let mut bounds: Option<(f64, f64)> = None;
    for channel in channels {
        for value in column_values(frame, channel)? {
            if !value.is_finite() {
                continue;
            }
            let value = f64::from(value);
            bounds = Some(match bounds {
                None => (value, value),
                Some((min, max)) => (min.min(value), max.max(value)),
            });
        }
    }
    Ok(bounds)
}

/// Apply a transformation to the selected channels of an event table.
///
/// Other columns pass through unchanged; with `return_all = false` the output
/// keeps only the transformed channels. When `use_spline` is set and the
/// transformation has no fit yet, a spline is fitted from this table's own
/// value range (a collection-shared transformation arrives already fitted from
/// pooled data and is reused verbatim).
pub(crate) fn apply_transformation(
    frame: &DataFrame,
    transformation: &Transformation,
    channels: &[ChannelName],
    use_spline: bool,
    return_all: bool,
) -> Result<DataFrame> {
    if use_spline && !transformation.is_fit() {
        if let Some((xmin, xmax)) = frame_min_max(frame, channels)? {
            transformation.fit_spline(xmin, xmax)?;
        }
    }

    let mut transformed = frame.clone();
    for channel in channels {
        let values = column_values(frame, channel)?;
        let mapped = transformation.map_slice(&values, use_spline);
        let series = Series::new(channel.as_ref().into(), mapped);
        transformed.replace(channel.as_ref(), series)?;
    }

    if return_all {
        Ok(transformed)
    } else {
        let selected: Vec<&str> = channels.iter().map(|c| c.as_ref()).collect();
        Ok(transformed.select(selected)?)
    }
}

/// Check the requested channels all appear in the given column set
pub(crate) fn ensure_channels_present(
    channels: &[ChannelName],
    columns: &[ChannelName],
    context: &str,
) -> Result<()> {
    for channel in channels {
        if !columns.contains(channel) {
            return Err(SampleError::channel_not_found(channel.as_ref(), context));
        }
    }
    Ok(())
}

/// Format a channel list for log messages
pub(crate) fn describe_channels(channels: &[ChannelName]) -> String {
    channels.iter().join(", ")
}
