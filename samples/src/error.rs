//! Error types for sample and collection operations.
//!
//! This module defines `SampleError`, the error type for everything that can
//! go wrong while transforming, gating, subsampling, or loading measurements.
//! It uses `thiserror` for convenient construction and carries enough context
//! to name the offending channel, field, member, or key.

use flow_transforms::TransformError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error type for sample operations.
///
/// All fallible operations in this crate return `Result<T, SampleError>`.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Incompatible shared parameters, e.g. channels or collection members
    /// that disagree on their declared data range under an auto-range
    /// transform
    #[error("Incompatible configuration: {message}")]
    Configuration { message: String },

    /// A requested channel name absent from metadata or from the current data
    #[error("Channel '{channel}' not found in {context}")]
    ChannelNotFound { channel: String, context: String },

    /// A gate referencing a channel that the current data does not carry
    #[error("Gate references channel '{channel}' which is absent from the current data")]
    GateChannel { channel: String },

    /// A requested metadata field absent from the parsed annotation
    #[error("Metadata field '{field}' does not exist in {context}")]
    MetadataField { field: String, context: String },

    /// A malformed subsample key (fraction outside [0, 1], bad range)
    #[error("Invalid subsample key: {message}")]
    InvalidKey { message: String },

    /// An unrecognized sampling order name
    #[error("Unknown sampling order '{order}' (expected 'random', 'start' or 'end')")]
    UnknownOrder { order: String },

    /// A count or row range beyond the available events, without auto-resize
    #[error(
        "Requested {requested} events but only {available} are available (set auto_resize to clamp)"
    )]
    OutOfBounds { requested: usize, available: usize },

    /// A collection member key that is not present
    #[error("Measurement '{key}' is not present in the collection")]
    MemberNotFound { key: String },

    /// A measurement with neither inline data nor a backing datafile
    #[error("Measurement '{id}' has no event data and no backing datafile")]
    MissingData { id: String },

    /// Transform construction or fitting failures
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Event table operation failures
    #[error("Event table error: {0}")]
    Frame(#[from] PolarsError),

    /// Failures raised by an external collaborator (parser, gate, plot backend)
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

impl SampleError {
    /// Create a Configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a ChannelNotFound error
    pub fn channel_not_found(channel: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel: channel.into(),
            context: context.into(),
        }
    }

    /// Create a GateChannel error
    pub fn gate_channel(channel: impl Into<String>) -> Self {
        Self::GateChannel {
            channel: channel.into(),
        }
    }

    /// Create a MetadataField error
    pub fn metadata_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MetadataField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an InvalidKey error with a message
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Create an OutOfBounds error
    pub fn out_of_bounds(requested: usize, available: usize) -> Self {
        Self::OutOfBounds {
            requested,
            available,
        }
    }

    /// Create a MemberNotFound error
    pub fn member_not_found(key: impl Into<String>) -> Self {
        Self::MemberNotFound { key: key.into() }
    }

    /// Create a MissingData error
    pub fn missing_data(id: impl Into<String>) -> Self {
        Self::MissingData { id: id.into() }
    }
}

// Type alias for Result using SampleError
pub type Result<T> = std::result::Result<T, SampleError>;
