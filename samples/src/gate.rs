//! The gate boundary.
//!
//! Gate geometry (polygons, thresholds, intervals, GatingML, ...) lives
//! outside this crate. To the containers a gate is an opaque predicate over
//! one or two channels that can also draw its own outline onto a plot.

use crate::meta::ChannelName;
use crate::plot::GateCanvas;
use polars::prelude::DataFrame;
use std::fmt;
use std::sync::Arc;

/// An opaque predicate over the event table.
///
/// `mask` returns one boolean per event (`true` keeps the event); the
/// containers turn the mask into a row subset. `channels` names the channels
/// the predicate reads, so the containers can reject a gate whose channels are
/// absent from the current data before evaluating anything.
pub trait Gate: fmt::Debug + Send + Sync {
    /// The channels this gate reads
    fn channels(&self) -> &[ChannelName];

    /// Evaluate the predicate, returning one boolean per event
    fn mask(&self, frame: &DataFrame) -> anyhow::Result<Vec<bool>>;

    /// Draw the gate outline onto a plot cell
    fn plot(
        &self,
        canvas: &mut dyn GateCanvas,
        channels: &[ChannelName],
        style: &GateStyle,
    ) -> anyhow::Result<()>;
}

/// Color and line width used when overlaying a gate outline
#[derive(Clone, Debug, PartialEq)]
pub struct GateStyle {
    /// Color name handed through to the plot backend
    pub color: Arc<str>,
    pub line_width: f32,
}

impl Default for GateStyle {
    fn default() -> Self {
        Self {
            color: "b".into(),
            line_width: 1.0,
        }
    }
}

impl GateStyle {
    /// Creates a new `GateStyle`
    #[must_use]
    pub fn new(color: impl Into<Arc<str>>, line_width: f32) -> Self {
        Self {
            color: color.into(),
            line_width,
        }
    }
}
