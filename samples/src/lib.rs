//! # flow-samples
//!
//! Containers for flow cytometry samples and the operations that move their
//! event data through an analysis: transformation, gating, subsampling, and
//! plotting, on one sample or broadcast across a whole plate.
//!
//! ## Overview
//!
//! - [`Sample`]: one well or tube, an event table plus immutable channel
//!   annotation. Data is read lazily from its datafile on first access.
//! - [`SampleCollection`]: a keyed set of samples; every operation broadcasts
//!   across the members and returns a new collection.
//! - [`Plate`]: a collection arranged on a 2D grid of wells, with grid
//!   plotting and shared histogram binning.
//!
//! ## Copy-on-write pipelines
//!
//! Every operation returns a new container and never mutates its input, so a
//! gating strategy reads as a chain:
//!
//! ```rust,no_run
//! # use flow_samples::prelude::*;
//! # fn example(plate: flow_samples::Plate, cd8: std::sync::Arc<dyn flow_samples::Gate>) -> Result<(), flow_samples::SampleError> {
//! let transformed = plate.transform(TransformKind::hlog(), &Default::default())?;
//! let gated = transformed.gate(&cd8, &Default::default())?;
//! let counts = gated.counts(None)?;
//! # Ok(())
//! # }
//! ```
//!
//! Operations can also be **deferred**: with `apply_now = false` a transform
//! or gate is recorded instead of executed, and the whole log is replayed the
//! first time the result's data is accessed. Eager and deferred pipelines
//! produce identical data.
//!
//! ## Shared transforms
//!
//! Transforming a collection fits the transformation **once** (the range
//! parameter validated across every member's annotation, the smoothing spline
//! fitted from the pooled data of all members) and applies the identical
//! instance to each member. Members that disagree on their declared channel
//! ranges fail the broadcast before any member is touched.
//!
//! ## Collaborator boundaries
//!
//! Datafile parsing, gate geometry, and rendering live outside this crate,
//! behind the [`EventSource`], [`Gate`], and [`PlotBackend`] traits.

pub use collection::{
    CollectionTransformOptions, CollectionTransformOptionsBuilder, SampleCollection,
};
pub use error::{Result, SampleError};
pub use gate::{Gate, GateStyle};
pub use io::{
    ChannelNaming, DataSource, EventSource, IdStrategy, ReadOptions, ReadOptionsBuilder,
    collect_datafiles, well_label_from_filename,
};
pub use meta::{ChannelDescriptor, ChannelName, SampleMeta};
pub use plate::{GridOptions, GridOptionsBuilder, Plate, PlateLayout};
pub use plot::{
    AxisLimits, BinSpec, GateCanvas, GridSlot, GridSpec, GridSpecBuilder, PlotBackend, PlotConfig,
    PlotConfigBuilder, PlotKind,
};
pub use queue::QueuedOp;
pub use sample::{EventDataFrame, GateOptions, GateOptionsBuilder, Sample};
pub use subsample::{SampleKey, SampleOrder};
pub use transform::{TransformOptions, TransformOptionsBuilder, TransformSpec};

// Re-export the transform crate's public surface alongside the containers
pub use flow_transforms::{Direction, TransformKind, Transformation};

pub mod collection;
pub mod error;
pub mod gate;
pub mod io;
pub mod meta;
pub mod plate;
pub mod plot;
mod queue;
pub mod sample;
pub mod subsample;
pub mod transform;

mod tests;

/// The common imports for working with samples and plates
pub mod prelude {
    pub use crate::collection::{CollectionTransformOptions, SampleCollection};
    pub use crate::gate::{Gate, GateStyle};
    pub use crate::io::{ChannelNaming, DataSource, EventSource, ReadOptions};
    pub use crate::meta::{ChannelDescriptor, ChannelName, SampleMeta};
    pub use crate::plate::{Plate, PlateLayout};
    pub use crate::sample::{GateOptions, Sample};
    pub use crate::subsample::{SampleKey, SampleOrder};
    pub use crate::transform::{TransformOptions, TransformSpec};
    pub use flow_transforms::{Direction, TransformKind, Transformation};
}
