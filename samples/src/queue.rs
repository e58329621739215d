//! The deferred-operation log.
//!
//! A sample can either apply a transform or gate immediately or record it for
//! later. Deferred operations are kept as an ordered log of tagged entries and
//! replayed, in the exact order they were queued, the first time the sample's
//! data is materialized. Applying an operation eagerly and queueing it then
//! materializing produce identical data: both paths run [`QueuedOp::apply`]
//! against the same logical input.

use crate::error::{Result, SampleError};
use crate::gate::Gate;
use crate::meta::ChannelName;
use crate::transform::apply_transformation;
use flow_transforms::Transformation;
use polars::prelude::*;
use std::sync::Arc;

/// A recorded operation, with everything needed to replay it later.
///
/// Transform entries carry a ready-built transformation (channel resolution
/// and auto-range validation happen when the operation is requested, not at
/// replay), so a collection-shared transformation keeps its pooled parameters
/// through any number of deferred replays.
#[derive(Debug, Clone)]
pub enum QueuedOp {
    /// Apply a transformation to the given channels
    Transform {
        transformation: Transformation,
        channels: Vec<ChannelName>,
        return_all: bool,
        use_spline: bool,
    },
    /// Filter rows through a gate
    Gate { gate: Arc<dyn Gate> },
}

impl QueuedOp {
    /// Run the operation against an event table, producing a new table
    pub(crate) fn apply(&self, frame: &DataFrame) -> Result<DataFrame> {
        match self {
            Self::Transform {
                transformation,
                channels,
                return_all,
                use_spline,
            } => apply_transformation(frame, transformation, channels, *use_spline, *return_all),
            Self::Gate { gate } => apply_gate(frame, gate.as_ref()),
        }
    }

    /// The column set after this operation, given the columns before it.
    ///
    /// This is what makes a sample's logical columns computable without
    /// materializing data: gates keep columns, and a transform keeps them
    /// unless it restricts the output to the transformed channels.
    pub(crate) fn columns_after(&self, columns: Vec<ChannelName>) -> Vec<ChannelName> {
        match self {
            Self::Transform {
                channels,
                return_all: false,
                ..
            } => channels.clone(),
            _ => columns,
        }
    }
}

/// Filter an event table through a gate.
///
/// The gate's channels are checked against the table first, so a stale gate
/// fails with the offending channel named instead of whatever the collaborator
/// would report.
pub(crate) fn apply_gate(frame: &DataFrame, gate: &dyn Gate) -> Result<DataFrame> {
    for channel in gate.channels() {
        if frame.column(channel.as_ref()).is_err() {
            return Err(SampleError::gate_channel(channel.as_ref()));
        }
    }

    let mask = gate.mask(frame)?;
    if mask.len() != frame.height() {
        return Err(SampleError::Collaborator(anyhow::anyhow!(
            "gate produced {} mask entries for {} events",
            mask.len(),
            frame.height()
        )));
    }

    let mask_series = Series::new("mask".into(), mask);
    let mask_ca = mask_series.bool()?;
    Ok(frame.filter(mask_ca)?)
}
