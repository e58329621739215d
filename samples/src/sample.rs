use crate::error::{Result, SampleError};
use crate::gate::{Gate, GateStyle};
use crate::io::DataSource;
use crate::meta::{ChannelName, SampleMeta};
use crate::plot::{GateCanvas, PlotBackend, PlotConfig};
use crate::queue::QueuedOp;
use crate::subsample::{RowSelection, SampleKey, SampleOrder, resolve_key};
use crate::transform::{
    TransformOptions, TransformSpec, build_transformer, describe_channels, ensure_channels_present,
};
use derive_builder::Builder;
use once_cell::sync::OnceCell;
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Event data stored as a Polars DataFrame for efficient columnar access.
/// Each column represents one channel (e.g., FSC-A, SSC-A, B1-A).
pub type EventDataFrame = Arc<DataFrame>;

/// Options for a gate call
#[derive(Builder, Clone, Debug)]
#[builder(setter(into, strip_option), default)]
pub struct GateOptions {
    /// Apply immediately (`true`) or queue for replay on first data access
    pub apply_now: bool,
    /// ID for the resulting sample or collection; `None` keeps the original
    pub new_id: Option<Arc<str>>,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            apply_now: true,
            new_id: None,
        }
    }
}

impl GateOptions {
    /// Create a new builder for `GateOptions`
    pub fn new() -> GateOptionsBuilder {
        GateOptionsBuilder::default()
    }
}

/// A single flow cytometry sample: one well or one tube.
///
/// A sample couples an event table with its immutable annotation (channel
/// descriptors and keyword fields). Data may live inline or in a backing
/// datafile that is read lazily on first access. Every operation
/// ([`transform`](Self::transform), [`gate`](Self::gate),
/// [`subsample`](Self::subsample)) returns a **new** sample and leaves the
/// original untouched; a deferred operation (`apply_now = false`) is recorded
/// in an ordered log and replayed against the raw data the first time the
/// result's data is accessed.
#[derive(Debug, Clone)]
pub struct Sample {
    id: Arc<str>,
    source: Option<DataSource>,
    meta: OnceCell<Arc<SampleMeta>>,
    /// The raw event table before any queued operation, read lazily
    baseline: OnceCell<EventDataFrame>,
    queue: Vec<QueuedOp>,
    /// Cache of the queue folded over the baseline
    materialized: OnceCell<EventDataFrame>,
}

impl Sample {
    /// Create a sample backed by a datafile. Nothing is read until the
    /// annotation or data is first accessed.
    #[must_use]
    pub fn from_file(id: impl Into<Arc<str>>, source: DataSource) -> Self {
        Self {
            id: id.into(),
            source: Some(source),
            meta: OnceCell::new(),
            baseline: OnceCell::new(),
            queue: Vec::new(),
            materialized: OnceCell::new(),
        }
    }

    /// Create a sample from in-memory annotation and events.
    ///
    /// # Errors
    /// Will return `Err` if the event table carries a column that is not a
    /// known channel name (data may be a subset of the annotated channels,
    /// never a superset)
    pub fn with_data(
        id: impl Into<Arc<str>>,
        meta: SampleMeta,
        frame: DataFrame,
    ) -> Result<Self> {
        let names = meta.channel_names();
        for column in frame.get_column_names() {
            if !names.iter().any(|name| name.as_ref() == column.as_str()) {
                return Err(SampleError::channel_not_found(
                    column.as_str(),
                    "the channel annotation",
                ));
            }
        }

        Ok(Self {
            id: id.into(),
            source: None,
            meta: OnceCell::with_value(Arc::new(meta)),
            baseline: OnceCell::with_value(Arc::new(frame)),
            queue: Vec::new(),
            materialized: OnceCell::new(),
        })
    }

    /// The sample ID
    #[must_use]
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    /// The same sample under a different ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.id = id.into();
        self
    }

    /// The path of the backing datafile, if any
    #[must_use]
    pub fn datafile(&self) -> Option<&std::path::Path> {
        self.source.as_ref().map(|s| s.path.as_path())
    }

    /// The sample annotation, read from the datafile on first access.
    ///
    /// # Errors
    /// Will return `Err` if the sample has no annotation and no datafile, or
    /// the parser collaborator fails
    pub fn meta(&self) -> Result<Arc<SampleMeta>> {
        self.meta
            .get_or_try_init(|| {
                let source = self
                    .source
                    .as_ref()
                    .ok_or_else(|| SampleError::missing_data(self.id.as_ref()))?;
                debug!(id = %self.id, path = %source.path.display(), "reading annotation");
                Ok(Arc::new(source.read_meta()?))
            })
            .cloned()
    }

    /// The channel names from the annotation, in acquisition order
    /// # Errors
    /// Will return `Err` if the annotation cannot be read
    pub fn channel_names(&self) -> Result<Vec<ChannelName>> {
        Ok(self.meta()?.channel_names())
    }

    /// Return the value of an annotation keyword field (e.g. `$SRC`)
    /// # Errors
    /// Will return `Err` if the field does not exist in the annotation
    pub fn meta_field(&self, field: &str) -> Result<String> {
        let meta = self.meta()?;
        meta.field(field).map(str::to_string).map_err(|_| {
            SampleError::metadata_field(
                field,
                self.datafile()
                    .map_or_else(|| self.id.to_string(), |p| p.display().to_string()),
            )
        })
    }

    /// Return several annotation keyword fields at once
    /// # Errors
    /// Will return `Err` if any of the fields does not exist in the annotation
    pub fn meta_fields(&self, fields: &[&str]) -> Result<FxHashMap<String, String>> {
        self.meta()?.lookup_fields(fields)
    }

    /// Derive the sample's well ID from an annotation keyword (e.g. the `$SRC`
    /// keyword written by the acquisition software).
    ///
    /// # Errors
    /// Will return `Err` if the keyword does not exist in the annotation;
    /// files produced by other instruments may not carry it
    pub fn id_from_meta(&self, field: &str) -> Result<Arc<str>> {
        Ok(Arc::from(self.meta_field(field)?))
    }

    /// The event table, materialized.
    ///
    /// Reads the raw data on first access if the sample is file-backed, then
    /// replays any queued operations in order. The result is cached, so
    /// repeated access is cheap.
    ///
    /// # Errors
    /// Will return `Err` if the sample has neither data nor a datafile, the
    /// parser collaborator fails, or a queued operation fails
    pub fn data(&self) -> Result<EventDataFrame> {
        if self.queue.is_empty() {
            return self.baseline();
        }
        self.materialized
            .get_or_try_init(|| {
                let baseline = self.baseline()?;
                debug!(
                    id = %self.id,
                    operations = self.queue.len(),
                    "replaying queued operations"
                );
                let mut frame = (*baseline).clone();
                for op in &self.queue {
                    frame = op.apply(&frame)?;
                }
                Ok(Arc::new(frame))
            })
            .cloned()
    }

    /// Total number of events
    /// # Errors
    /// Will return `Err` if the data cannot be materialized
    pub fn counts(&self) -> Result<usize> {
        Ok(self.data()?.height())
    }

    /// Whether operations are queued and not yet materialized
    #[must_use]
    pub fn has_queued_operations(&self) -> bool {
        !self.queue.is_empty()
    }

    /// The columns the data logically has, without materializing it: the
    /// baseline columns (or the annotated channel names if nothing is loaded)
    /// folded through the column effects of every queued operation.
    ///
    /// # Errors
    /// Will return `Err` if the annotation cannot be read
    pub fn logical_channels(&self) -> Result<Vec<ChannelName>> {
        let mut columns = match self.baseline.get() {
            Some(frame) => frame
                .get_column_names()
                .iter()
                .map(|name| Arc::from(name.as_str()))
                .collect(),
            None => self.channel_names()?,
        };
        for op in &self.queue {
            columns = op.columns_after(columns);
        }
        Ok(columns)
    }

    /// Apply a transformation to the specified channels.
    ///
    /// The transformation parameters are shared between all transformed
    /// channels; if different parameters are needed per channel, make several
    /// calls. Returns a new sample, leaving this one untouched. See
    /// [`TransformOptions`] for channel selection, direction, auto-range,
    /// spline smoothing, and eager-versus-deferred execution.
    ///
    /// # Errors
    /// Will return `Err` if a selected channel is missing, the channels
    /// disagree on their declared range under auto-range, or the data cannot
    /// be materialized (eager only)
    pub fn transform(
        &self,
        spec: impl Into<TransformSpec>,
        options: &TransformOptions,
    ) -> Result<Self> {
        Ok(self.transform_with(spec, options)?.0)
    }

    /// Like [`transform`](Self::transform), but also returns the
    /// transformation that was applied, so the identical parameters can be
    /// reused on other samples. This is how collections share one fitted
    /// transformation across their members.
    ///
    /// # Errors
    /// See [`transform`](Self::transform)
    pub fn transform_with(
        &self,
        spec: impl Into<TransformSpec>,
        options: &TransformOptions,
    ) -> Result<(Self, flow_transforms::Transformation)> {
        let spec = spec.into();
        let columns = self.logical_channels()?;
        let channels = match &options.channels {
            Some(channels) => {
                ensure_channels_present(channels, &columns, "the current data")?;
                channels.clone()
            }
            None => columns,
        };

        let transformation = {
            let meta = self.meta()?;
            build_transformer(
                &spec,
                options,
                &channels,
                [(self.id.as_ref(), meta.as_ref())],
            )?
        };
        debug!(
            id = %self.id,
            transform = %transformation.kind(),
            channels = %describe_channels(&channels),
            apply_now = options.apply_now,
            "transforming"
        );

        let op = QueuedOp::Transform {
            transformation: transformation.clone(),
            channels,
            return_all: options.return_all,
            use_spline: options.use_spline,
        };
        let new = self.apply_or_queue(op, options.apply_now)?;
        Ok((new.maybe_with_id(options.new_id.clone()), transformation))
    }

    /// Apply a gate, returning a new sample whose data is the subset of
    /// events that pass it. Columns are unchanged.
    ///
    /// # Errors
    /// Will return `Err` if the gate references a channel absent from the
    /// current data, or the data cannot be materialized (eager only)
    pub fn gate(&self, gate: &Arc<dyn Gate>, options: &GateOptions) -> Result<Self> {
        // Check the gate's channels up front so a deferred gate fails at the
        // call site, not at materialization
        let columns = self.logical_channels()?;
        for channel in gate.channels() {
            if !columns.contains(channel) {
                return Err(SampleError::gate_channel(channel.as_ref()));
            }
        }

        let op = QueuedOp::Gate { gate: gate.clone() };
        let new = self.apply_or_queue(op, options.apply_now)?;
        Ok(new.maybe_with_id(options.new_id.clone()))
    }

    /// Arbitrary slicing (subsampling) of the events.
    ///
    /// `key` selects a fraction, fractional range, count, or row range of the
    /// events (see [`SampleKey`]); `order` applies to count-like keys; with
    /// `auto_resize`, out-of-bounds counts and ranges clamp to the available
    /// events instead of failing.
    ///
    /// # Errors
    /// Will return `Err` for a malformed key, an out-of-bounds request
    /// without `auto_resize`, or if the data cannot be materialized
    pub fn subsample(
        &self,
        key: impl Into<SampleKey>,
        order: SampleOrder,
        auto_resize: bool,
    ) -> Result<Self> {
        let data = self.data()?;
        let selection = resolve_key(key.into(), data.height(), order, auto_resize)?;
        let frame = match selection {
            RowSelection::Slice { start, len } => data.slice(start as i64, len),
            RowSelection::Random { len } => {
                let mut rng = rand::rng();
                let indices: Vec<IdxSize> = rand::seq::index::sample(&mut rng, data.height(), len)
                    .into_iter()
                    .map(|i| i as IdxSize)
                    .collect();
                data.take(&IdxCa::from_vec("idx".into(), indices))?
            }
        };
        Ok(self.replaced(frame))
    }

    /// Plot the sample's events on the given cell, then overlay the configured
    /// gates, cycling colors and line widths.
    ///
    /// # Errors
    /// Will return `Err` if the data cannot be materialized or the backend
    /// fails
    pub fn plot<B: PlotBackend>(
        &self,
        backend: &B,
        axes: &mut B::Axes,
        channels: &[ChannelName],
        config: &PlotConfig,
    ) -> Result<()> {
        let frame = self.data()?;
        backend.plot_frame(axes, &frame, channels, config)?;

        let colors = config.gate_color_cycle();
        let widths = config.gate_line_width_cycle();
        for ((gate, color), width) in config
            .gates
            .iter()
            .zip(colors.iter().cycle())
            .zip(widths.iter().cycle())
        {
            let style = GateStyle::new(color.clone(), *width);
            let canvas: &mut dyn GateCanvas = &mut *axes;
            gate.plot(canvas, channels, &style)?;
        }
        Ok(())
    }

    /// Run an operation now, or append it to the queue, returning the new
    /// sample either way. This is the single code path behind eager and
    /// deferred execution.
    fn apply_or_queue(&self, op: QueuedOp, apply_now: bool) -> Result<Self> {
        if apply_now {
            let current = self.data()?;
            let next = op.apply(&current)?;
            Ok(self.replaced(next))
        } else {
            let mut queue = self.queue.clone();
            queue.push(op);
            Ok(Self {
                id: self.id.clone(),
                source: self.source.clone(),
                meta: self.meta.clone(),
                baseline: self.baseline.clone(),
                queue,
                materialized: OnceCell::new(),
            })
        }
    }

    /// A copy of this sample whose data is `frame`, with an empty queue
    fn replaced(&self, frame: DataFrame) -> Self {
        Self {
            id: self.id.clone(),
            source: self.source.clone(),
            meta: self.meta.clone(),
            baseline: OnceCell::with_value(Arc::new(frame)),
            queue: Vec::new(),
            materialized: OnceCell::new(),
        }
    }

    fn maybe_with_id(self, id: Option<Arc<str>>) -> Self {
        match id {
            Some(id) => self.with_id(id),
            None => self,
        }
    }

    fn baseline(&self) -> Result<EventDataFrame> {
        self.baseline
            .get_or_try_init(|| {
                let source = self
                    .source
                    .as_ref()
                    .ok_or_else(|| SampleError::missing_data(self.id.as_ref()))?;
                let (meta, frame) = source.read()?;
                debug!(
                    id = %self.id,
                    path = %source.path.display(),
                    events = frame.height(),
                    "loaded event data"
                );
                // The read already paid for the annotation; keep it
                let _ = self.meta.set(Arc::new(meta));
                Ok(Arc::new(frame))
            })
            .cloned()
    }
}
