use crate::collection::{CollectionTransformOptions, SampleCollection};
use crate::error::{Result, SampleError};
use crate::gate::Gate;
use crate::io::{EventSource, IdStrategy, ReadOptions};
use crate::meta::ChannelName;
use crate::plot::{BinSpec, GridSlot, GridSpec, PlotBackend, PlotConfig, PlotKind, linspace_edges};
use crate::sample::{GateOptions, Sample};
use crate::subsample::{SampleKey, SampleOrder};
use crate::transform::{TransformSpec, column_values};
use derive_builder::Builder;
use flow_transforms::Transformation;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

/// The row-letter/column-number shape of a plate.
///
/// Well labels combine a row label and a column label: row `A` and column `3`
/// form `A3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateLayout {
    rows: Vec<Arc<str>>,
    cols: Vec<Arc<str>>,
}

static WELL_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)(\d+)$").expect("valid well label pattern"));

impl PlateLayout {
    /// A layout with the given row and column labels
    #[must_use]
    pub fn new(rows: Vec<Arc<str>>, cols: Vec<Arc<str>>) -> Self {
        Self { rows, cols }
    }

    /// A layout of `n_rows` lettered rows (`A`, `B`, ...) by `n_cols`
    /// numbered columns (`1`, `2`, ...)
    #[must_use]
    pub fn with_dimensions(n_rows: usize, n_cols: usize) -> Self {
        let rows = (0..n_rows)
            .map(|i| Arc::from(((b'A' + (i % 26) as u8) as char).to_string().as_str()))
            .collect();
        let cols = (1..=n_cols).map(|i| Arc::from(i.to_string().as_str())).collect();
        Self { rows, cols }
    }

    /// The standard 96-well layout: rows A-H, columns 1-12
    #[must_use]
    pub fn standard_96() -> Self {
        Self::with_dimensions(8, 12)
    }

    /// Row header labels
    #[must_use]
    pub fn row_labels(&self) -> &[Arc<str>] {
        &self.rows
    }

    /// Column header labels
    #[must_use]
    pub fn col_labels(&self) -> &[Arc<str>] {
        &self.cols
    }

    /// The well label at a grid position
    #[must_use]
    pub fn label(&self, row: usize, col: usize) -> Option<Arc<str>> {
        let (row, col) = (self.rows.get(row)?, self.cols.get(col)?);
        Some(Arc::from(format!("{row}{col}").as_str()))
    }

    /// The grid position of a well label (e.g. `A3`), if it falls inside the
    /// layout. Leading zeros in the column are accepted (`A03` is `A3`).
    #[must_use]
    pub fn position(&self, label: &str) -> Option<(usize, usize)> {
        let captures = WELL_LABEL.captures(label)?;
        let row_label = captures.get(1)?.as_str();
        let col_number: usize = captures.get(2)?.as_str().parse().ok()?;

        let row = self.rows.iter().position(|r| r.as_ref() == row_label)?;
        let col = self
            .cols
            .iter()
            .position(|c| c.parse::<usize>().ok() == Some(col_number))?;
        Some((row, col))
    }

    /// All well labels in row-major order
    #[must_use]
    pub fn labels(&self) -> Vec<Arc<str>> {
        let mut labels = Vec::with_capacity(self.rows.len() * self.cols.len());
        for row in 0..self.rows.len() {
            for col in 0..self.cols.len() {
                if let Some(label) = self.label(row, col) {
                    labels.push(label);
                }
            }
        }
        labels
    }
}

impl Default for PlateLayout {
    fn default() -> Self {
        Self::standard_96()
    }
}

/// Grid-level options for a plate plot
#[derive(Builder, Clone, Debug, Default)]
#[builder(setter(into, strip_option), default)]
pub struct GridOptions {
    /// Wells to render; `None` renders the full layout
    pub ids: Option<Vec<Arc<str>>>,
    /// Override for the row header labels
    pub row_labels: Option<Vec<Arc<str>>>,
    /// Override for the column header labels
    pub col_labels: Option<Vec<Arc<str>>>,
}

impl GridOptions {
    /// Create a new builder for `GridOptions`
    pub fn new() -> GridOptionsBuilder {
        GridOptionsBuilder::default()
    }
}

/// A collection of samples arranged on a 2D plate.
///
/// Wells are keyed by their position label (`A3`); broadcast operations
/// behave exactly as on [`SampleCollection`] but return a `Plate` with the
/// same layout. Grid plotting computes shared histogram bin edges across the
/// whole plate, so every well is drawn against identical axes.
#[derive(Debug, Clone)]
pub struct Plate {
    layout: PlateLayout,
    samples: SampleCollection,
}

impl Plate {
    /// Create an empty plate
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>, layout: PlateLayout) -> Self {
        Self {
            layout,
            samples: SampleCollection::new(id),
        }
    }

    /// Load a plate from a directory of datafiles, placing each file by the
    /// well label found in its name.
    ///
    /// # Errors
    /// Will return `Err` if the directory cannot be read, or a file's well
    /// label does not fall inside the layout
    pub fn from_dir(
        id: impl Into<Arc<str>>,
        dir: &Path,
        pattern: &str,
        reader: Arc<dyn EventSource>,
        options: ReadOptions,
        layout: PlateLayout,
    ) -> Result<Self> {
        let samples = SampleCollection::from_dir(
            id,
            dir,
            pattern,
            reader,
            options,
            &IdStrategy::WellFromName,
        )?;
        let plate = Self { layout, samples };
        for key in plate.samples.keys() {
            if plate.layout.position(&key).is_none() {
                return Err(SampleError::configuration(format!(
                    "well label '{key}' does not fall inside the plate layout"
                )));
            }
        }
        Ok(plate)
    }

    /// The plate ID
    #[must_use]
    pub fn id(&self) -> &Arc<str> {
        self.samples.id()
    }

    /// The plate layout
    #[must_use]
    pub fn layout(&self) -> &PlateLayout {
        &self.layout
    }

    /// The underlying keyed collection
    #[must_use]
    pub fn collection(&self) -> &SampleCollection {
        &self.samples
    }

    /// Place a sample at a well label
    ///
    /// # Errors
    /// Will return `Err` if the label does not fall inside the layout
    pub fn set_well(&mut self, label: impl Into<Arc<str>>, sample: Sample) -> Result<()> {
        let label = label.into();
        if self.layout.position(&label).is_none() {
            return Err(SampleError::configuration(format!(
                "well label '{label}' does not fall inside the plate layout"
            )));
        }
        self.samples.insert(sample.with_id(label));
        Ok(())
    }

    /// Look up a well by label
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Sample> {
        self.samples.get(label)
    }

    /// Number of occupied wells
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the plate has no occupied wells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Apply a transform to each well; see
    /// [`SampleCollection::transform_with`].
    ///
    /// # Errors
    /// See [`SampleCollection::transform_with`]
    pub fn transform(
        &self,
        spec: impl Into<TransformSpec>,
        options: &CollectionTransformOptions,
    ) -> Result<Self> {
        Ok(self.transform_with(spec, options)?.0)
    }

    /// Apply a transform to each well, also returning the shared
    /// transformation; see [`SampleCollection::transform_with`].
    ///
    /// # Errors
    /// See [`SampleCollection::transform_with`]
    pub fn transform_with(
        &self,
        spec: impl Into<TransformSpec>,
        options: &CollectionTransformOptions,
    ) -> Result<(Self, Option<Transformation>)> {
        let (samples, transformation) = self.samples.transform_with(spec, options)?;
        Ok((
            Self {
                layout: self.layout.clone(),
                samples,
            },
            transformation,
        ))
    }

    /// Apply a gate to each well; see [`SampleCollection::gate`]
    ///
    /// # Errors
    /// See [`SampleCollection::gate`]
    pub fn gate(&self, gate: &Arc<dyn Gate>, options: &GateOptions) -> Result<Self> {
        Ok(Self {
            layout: self.layout.clone(),
            samples: self.samples.gate(gate, options)?,
        })
    }

    /// Subsample each well; see [`SampleCollection::subsample`]
    ///
    /// # Errors
    /// See [`SampleCollection::subsample`]
    pub fn subsample(
        &self,
        key: impl Into<SampleKey>,
        order: SampleOrder,
        auto_resize: bool,
        new_id: Option<Arc<str>>,
    ) -> Result<Self> {
        Ok(Self {
            layout: self.layout.clone(),
            samples: self.samples.subsample(key, order, auto_resize, new_id)?,
        })
    }

    /// Event counts per well; see [`SampleCollection::counts`]
    ///
    /// # Errors
    /// See [`SampleCollection::counts`]
    pub fn counts(
        &self,
        keys: Option<&[&str]>,
    ) -> Result<rustc_hash::FxHashMap<Arc<str>, usize>> {
        self.samples.counts(keys)
    }

    /// Produce a grid figure with one cell per well position.
    ///
    /// For integer-binned histograms, the bin edges are computed **once** for
    /// the whole plate (the global minimum and maximum per channel across
    /// every selected well) and reused identically in every cell, so cells
    /// are directly comparable. A single-channel plot collapses the
    /// per-channel edge list to one flat sequence. Per-cell rendering is
    /// delegated to each well's [`Sample::plot`], and figure layout to the
    /// backend's grid function.
    ///
    /// # Errors
    /// Will return `Err` if a selected channel is missing from a well, or
    /// the backend fails
    pub fn plot<B: PlotBackend>(
        &self,
        backend: &B,
        channels: &[ChannelName],
        config: &PlotConfig,
        grid: &GridOptions,
    ) -> Result<B::Output> {
        let ids = match &grid.ids {
            Some(ids) => ids.clone(),
            None => self.layout.labels(),
        };

        let mut cell_config = config.clone();
        if cell_config.kind == PlotKind::Histogram {
            if let BinSpec::Count(nbins) = cell_config.bins {
                if let Some(bins) = self.shared_bins(&ids, channels, nbins)? {
                    cell_config.bins = bins;
                }
            }
        }
        // Grid headers carry the labels; cells stay bare
        cell_config.autolabel = false;

        let (xlabel, ylabel) = if config.autolabel {
            (
                channels.first().cloned(),
                if channels.len() == 2 {
                    channels.get(1).cloned()
                } else {
                    None
                },
            )
        } else {
            (None, None)
        };

        let spec = GridSpec {
            ids,
            row_labels: grid
                .row_labels
                .clone()
                .unwrap_or_else(|| self.layout.rows.clone()),
            col_labels: grid
                .col_labels
                .clone()
                .unwrap_or_else(|| self.layout.cols.clone()),
            xlim: config.xlim,
            ylim: config.ylim,
            xlabel,
            ylabel,
        };

        let output = backend.grid_plot(&spec, &mut |slot: &GridSlot, axes| {
            if let Some(sample) = self.samples.get(&slot.label) {
                sample.plot(backend, axes, channels, &cell_config)?;
            }
            Ok(())
        })?;
        Ok(output)
    }

    /// Shared histogram bin edges: per channel, the global min and max across
    /// every selected well's data determine `nbins` evenly spaced edges.
    /// `None` when no well holds any finite value (the caller's bin count is
    /// left for the backend to resolve).
    fn shared_bins(
        &self,
        ids: &[Arc<str>],
        channels: &[ChannelName],
        nbins: usize,
    ) -> Result<Option<BinSpec>> {
        let mut per_channel: Vec<Vec<f32>> = Vec::with_capacity(channels.len());
        for channel in channels {
            let mut bounds: Option<(f32, f32)> = None;
            for id in ids {
                let Some(sample) = self.samples.get(id) else {
                    continue;
                };
                let frame = sample.data()?;
                for value in column_values(&frame, channel)? {
                    if !value.is_finite() {
                        continue;
                    }
                    bounds = Some(match bounds {
                        None => (value, value),
                        Some((min, max)) => (min.min(value), max.max(value)),
                    });
                }
            }
            match bounds {
                Some((min, max)) => per_channel.push(linspace_edges(min, max, nbins)),
                None => return Ok(None),
            }
        }

        Ok(Some(if per_channel.len() == 1 {
            BinSpec::Edges(per_channel.remove(0))
        } else {
            BinSpec::PerChannel(per_channel)
        }))
    }
}
