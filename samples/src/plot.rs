//! The graphics boundary and plot configuration.
//!
//! Rendering lives outside this crate: a [`PlotBackend`] draws one event
//! table into a cell and lays out grid figures, and a [`GateCanvas`] is the
//! minimal drawing surface handed to gates when they overlay their outline.
//! The containers' responsibility ends at resolving the configuration
//! (shared histogram bin edges, axis limits, labels) and handing the backend
//! a per-cell render callback.

use crate::error::{Result, SampleError};
use crate::gate::{Gate, GateStyle};
use crate::meta::ChannelName;
use derive_builder::Builder;
use polars::prelude::DataFrame;
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// The kind of per-cell plot to draw
#[derive(Default, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum PlotKind {
    /// 1d or 2d histogram
    #[default]
    Histogram,
    /// 2d scatter
    Scatter,
}

impl PlotKind {
    /// Parse a kind name, failing loudly on anything unrecognized
    /// # Errors
    /// Will return `Err` if the name is not `histogram` or `scatter`
    pub fn parse(name: &str) -> Result<Self> {
        name.parse().map_err(|_| {
            SampleError::configuration(format!(
                "unknown plot kind '{name}' (expected 'histogram' or 'scatter')"
            ))
        })
    }
}

/// Histogram binning: either a bin count for the backend to resolve, or
/// explicit edges shared across every cell of a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum BinSpec {
    /// Number of bins; grid plots convert this to shared explicit edges
    Count(usize),
    /// Explicit bin edges for a single channel
    Edges(Vec<f32>),
    /// Explicit bin edges per channel, for 2d histograms
    PerChannel(Vec<Vec<f32>>),
}

impl Default for BinSpec {
    fn default() -> Self {
        Self::Count(200)
    }
}

/// An axis limit that is either resolved by the backend or fixed by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum AxisLimits {
    /// Let the backend derive limits from the data
    #[default]
    Auto,
    /// Fixed `(low, high)` limits
    Fixed(f32, f32),
}

/// Per-cell plot configuration.
///
/// # Example
///
/// ```rust,no_run
/// use flow_samples::plot::{BinSpec, PlotConfig, PlotKind};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PlotConfig::new()
///     .kind(PlotKind::Histogram)
///     .bins(BinSpec::Count(100))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), default)]
pub struct PlotConfig {
    /// The kind of plot to draw
    pub kind: PlotKind,
    /// Histogram binning
    pub bins: BinSpec,
    /// Horizontal axis limits
    pub xlim: AxisLimits,
    /// Vertical axis limits
    pub ylim: AxisLimits,
    /// Label axes with the channel names
    #[builder(default = "true")]
    pub autolabel: bool,
    /// Gates to overlay on the plot
    pub gates: Vec<Arc<dyn Gate>>,
    /// Colors cycled across the overlaid gates
    pub gate_colors: Vec<Arc<str>>,
    /// Line widths cycled across the overlaid gates
    pub gate_line_widths: Vec<f32>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            kind: PlotKind::Histogram,
            bins: BinSpec::Count(200),
            xlim: AxisLimits::Auto,
            ylim: AxisLimits::Auto,
            autolabel: true,
            gates: Vec::new(),
            gate_colors: Vec::new(),
            gate_line_widths: Vec::new(),
        }
    }
}

impl PlotConfig {
    /// Create a new builder for `PlotConfig`
    pub fn new() -> PlotConfigBuilder {
        PlotConfigBuilder::default()
    }

    /// The gate colors to cycle, falling back to the conventional rotation
    #[must_use]
    pub fn gate_color_cycle(&self) -> Vec<Arc<str>> {
        if self.gate_colors.is_empty() {
            ["b", "g", "r", "m", "c", "y"]
                .into_iter()
                .map(Arc::from)
                .collect()
        } else {
            self.gate_colors.clone()
        }
    }

    /// The gate line widths to cycle, falling back to a width of 1
    #[must_use]
    pub fn gate_line_width_cycle(&self) -> Vec<f32> {
        if self.gate_line_widths.is_empty() {
            vec![1.0]
        } else {
            self.gate_line_widths.clone()
        }
    }
}

/// Minimal vector-drawing surface a gate receives to draw its outline
pub trait GateCanvas {
    /// Draw a polyline through the given points in data coordinates
    fn draw_polyline(&mut self, points: &[(f32, f32)], style: &GateStyle) -> anyhow::Result<()>;

    /// Draw a vertical line spanning the cell at the given x coordinate
    fn draw_vline(&mut self, x: f32, style: &GateStyle) -> anyhow::Result<()>;

    /// Draw a horizontal line spanning the cell at the given y coordinate
    fn draw_hline(&mut self, y: f32, style: &GateStyle) -> anyhow::Result<()>;
}

/// One cell of a grid figure: its position and the key of the sample shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSlot {
    pub row: usize,
    pub col: usize,
    /// The well label at this position (e.g. `A3`)
    pub label: Arc<str>,
}

/// Layout and labeling handed to the backend's grid-figure function
#[derive(Builder, Clone, Debug, Default)]
#[builder(setter(into, strip_option), default)]
pub struct GridSpec {
    /// The well labels to render, in render order
    pub ids: Vec<Arc<str>>,
    /// Row header labels
    pub row_labels: Vec<Arc<str>>,
    /// Column header labels
    pub col_labels: Vec<Arc<str>>,
    /// Shared horizontal axis limits
    pub xlim: AxisLimits,
    /// Shared vertical axis limits
    pub ylim: AxisLimits,
    /// Figure-level x axis label
    pub xlabel: Option<Arc<str>>,
    /// Figure-level y axis label
    pub ylabel: Option<Arc<str>>,
}

impl GridSpec {
    /// Create a new builder for `GridSpec`
    pub fn new() -> GridSpecBuilder {
        GridSpecBuilder::default()
    }
}

/// A rendering collaborator.
///
/// `Axes` is whatever the backend draws a single cell into; it must also be a
/// [`GateCanvas`] so gates can overlay their outlines on it.
pub trait PlotBackend {
    /// The per-cell drawing surface
    type Axes: GateCanvas;
    /// The figure handle returned by grid layout
    type Output;

    /// Render one event table into the given cell
    fn plot_frame(
        &self,
        axes: &mut Self::Axes,
        frame: &DataFrame,
        channels: &[ChannelName],
        config: &PlotConfig,
    ) -> anyhow::Result<()>;

    /// Lay out a grid figure, invoking `draw` once per slot
    fn grid_plot(
        &self,
        spec: &GridSpec,
        draw: &mut dyn FnMut(&GridSlot, &mut Self::Axes) -> Result<()>,
    ) -> anyhow::Result<Self::Output>;
}

/// Evenly spaced bin edges over `[min, max]`, inclusive of both ends
pub(crate) fn linspace_edges(min: f32, max: f32, count: usize) -> Vec<f32> {
    if count < 2 {
        return vec![min];
    }
    let step = (max - min) / (count - 1) as f32;
    (0..count).map(|i| min + step * i as f32).collect()
}
