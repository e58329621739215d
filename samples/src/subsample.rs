//! Subsample keys and their resolution to concrete row selections.
//!
//! A subsample request can arrive as a fraction of the events, a fractional
//! range, an absolute count, or a row range. [`SampleKey`] makes the four
//! shapes explicit, and [`resolve_key`] turns any of them into a single
//! [`RowSelection`] with all validation and clamping in one place.

use crate::error::{Result, SampleError};
use std::ops::Range;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Which rows an absolute-count subsample draws
#[derive(Default, Display, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum SampleOrder {
    /// Draw rows without replacement, in random order
    #[default]
    Random,
    /// Take the first rows, in original order
    Start,
    /// Take the last rows, in original order
    End,
}

impl SampleOrder {
    /// Parse an order name, failing loudly on anything unrecognized
    /// # Errors
    /// Will return `Err` if the name is not `random`, `start` or `end`
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| SampleError::UnknownOrder {
            order: name.to_string(),
        })
    }
}

/// A subsample request.
///
/// `From` conversions keep call sites terse: `0.25` becomes a fraction,
/// `(0.1, 0.3)` a fractional range, `100usize` a count, and `10..20` a row
/// range.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleKey {
    /// A fraction of the events in `[0.0, 1.0]`, truncated to a count
    Fraction(f64),
    /// A contiguous fractional slice `[start * n, stop * n)`
    FractionRange(f64, f64),
    /// An absolute number of events
    Count(usize),
    /// An absolute row range
    Rows(Range<usize>),
}

impl From<f64> for SampleKey {
    fn from(fraction: f64) -> Self {
        Self::Fraction(fraction)
    }
}

impl From<(f64, f64)> for SampleKey {
    fn from((start, stop): (f64, f64)) -> Self {
        Self::FractionRange(start, stop)
    }
}

impl From<usize> for SampleKey {
    fn from(count: usize) -> Self {
        Self::Count(count)
    }
}

impl From<Range<usize>> for SampleKey {
    fn from(rows: Range<usize>) -> Self {
        Self::Rows(rows)
    }
}

/// A resolved subsample: the concrete rows to keep
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RowSelection {
    /// A contiguous slice starting at `start`
    Slice { start: usize, len: usize },
    /// `len` rows drawn without replacement, in random order
    Random { len: usize },
}

/// Resolve a subsample key against the available number of events.
///
/// `order` only applies to count-like keys (fractions resolve to counts);
/// range keys select their rows directly. With `auto_resize`, counts and
/// ranges beyond the available events clamp instead of failing. A count below
/// one deterministically yields an empty selection from the start of the data
/// rather than failing or sampling.
pub(crate) fn resolve_key(
    key: SampleKey,
    num_events: usize,
    order: SampleOrder,
    auto_resize: bool,
) -> Result<RowSelection> {
    match key {
        SampleKey::Fraction(fraction) => {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(SampleError::invalid_key(format!(
                    "a fractional key must be between 0.0 and 1.0, got {fraction}"
                )));
            }
            let count = (num_events as f64 * fraction) as usize;
            resolve_count(count, num_events, order, auto_resize)
        }
        SampleKey::FractionRange(start, stop) => {
            if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&stop) {
                return Err(SampleError::invalid_key(format!(
                    "a fractional range must consist of two fractions, each between 0.0 and \
                     1.0, got ({start}, {stop})"
                )));
            }
            let start = (num_events as f64 * start) as usize;
            let stop = (num_events as f64 * stop) as usize;
            Ok(RowSelection::Slice {
                start,
                len: stop.saturating_sub(start),
            })
        }
        SampleKey::Count(count) => resolve_count(count, num_events, order, auto_resize),
        SampleKey::Rows(rows) => {
            let (mut start, mut stop) = (rows.start, rows.end);
            if auto_resize {
                start = start.min(num_events);
                stop = stop.min(num_events);
            } else if stop > num_events || start > num_events {
                return Err(SampleError::out_of_bounds(stop.max(start), num_events));
            }
            Ok(RowSelection::Slice {
                start,
                len: stop.saturating_sub(start),
            })
        }
    }
}

fn resolve_count(
    count: usize,
    num_events: usize,
    order: SampleOrder,
    auto_resize: bool,
) -> Result<RowSelection> {
    let count = if count > num_events {
        if auto_resize {
            num_events
        } else {
            return Err(SampleError::out_of_bounds(count, num_events));
        }
    } else {
        count
    };

    // Below one event there is nothing to order or randomize
    if count == 0 {
        return Ok(RowSelection::Slice { start: 0, len: 0 });
    }

    Ok(match order {
        SampleOrder::Random => RowSelection::Random { len: count },
        SampleOrder::Start => RowSelection::Slice {
            start: 0,
            len: count,
        },
        SampleOrder::End => RowSelection::Slice {
            start: num_events - count,
            len: count,
        },
    })
}
