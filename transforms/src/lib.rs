//! # flow-transforms
//!
//! Parameterized, invertible transformations for flow cytometry channel data.
//!
//! Fluorescence intensities span several decades, so raw values are usually
//! remapped onto a log-like display scale before gating or plotting. This crate
//! provides the transform families used for that remapping and a
//! [`Transformation`] object that owns the fitted parameters so the exact same
//! mapping can be applied to many datasets:
//!
//! - **hlog**: hyperlog compression, linear near zero and logarithmic above,
//!   handling negative values gracefully
//! - **tlog**: truncated log10 scaling
//! - **glog**: generalized (bi-symmetric) log
//! - **linear**: identity, for scatter and time channels
//!
//! ## Shared parameters
//!
//! A [`Transformation`] is constructed once, optionally given a range parameter
//! (decades) derived from channel metadata, and optionally fitted with a cubic
//! spline over a fixed domain. After that it is immutable: applying it to any
//! number of datasets reuses the identical parameters, which is what makes it
//! safe to broadcast one transformation across a whole collection of samples.
//!
//! ```rust
//! use flow_transforms::{Direction, Transformation, TransformKind};
//!
//! let transform = Transformation::new(TransformKind::hlog(), Direction::Forward)?;
//! let display = transform.map_slice(&[0.0, 100.0, 10_000.0], false);
//! # Ok::<(), flow_transforms::TransformError>(())
//! ```

pub use error::{Result, TransformError};
pub use kind::{Direction, TransformKind, DEFAULT_DECADES, DISPLAY_MAX};
pub use spline::Spline;
pub use transformation::Transformation;

mod error;
mod kind;
mod spline;
mod transformation;
