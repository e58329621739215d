use crate::error::{Result, SampleError};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The name of a channel ($PnN keyword), shared cheaply across samples
pub type ChannelName = Arc<str>;

/// Descriptor for one acquisition channel, as parsed from the file annotation.
///
/// Carries the fields the pipeline needs: the channel name (`$PnN`), the stain
/// label (`$PnS`), and the declared data range (`$PnR`) that auto-range
/// transforms derive their decades parameter from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// The offset of the channel in the file's event data (1-based index)
    pub channel_number: usize,
    /// The name of the channel ($PnN keyword)
    pub name: ChannelName,
    /// The stain label of the channel ($PnS keyword)
    pub label: Arc<str>,
    /// The declared maximum data range ($PnR keyword)
    pub range: f64,
}

impl ChannelDescriptor {
    /// Creates a new `ChannelDescriptor`
    #[must_use]
    pub fn new(channel_number: usize, name: &str, label: &str, range: f64) -> Self {
        Self {
            channel_number,
            name: name.into(),
            label: label.into(),
            range,
        }
    }
}

/// Parsed annotation for one sample: an ordered channel descriptor table plus
/// the remaining keyword fields as strings.
///
/// A `SampleMeta` is immutable once read; samples share it behind an `Arc` and
/// every derived sample (transformed, gated, subsampled) points at the same
/// annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleMeta {
    /// Keyword fields from the annotation (e.g. `$SRC`, `$DATE`)
    pub fields: FxHashMap<String, String>,
    /// Ordered channel descriptor table
    pub channels: Vec<ChannelDescriptor>,
}

impl SampleMeta {
    /// Creates annotation holding the given channel table and no extra fields
    #[must_use]
    pub fn new(channels: Vec<ChannelDescriptor>) -> Self {
        Self {
            fields: FxHashMap::default(),
            channels,
        }
    }

    /// Add a keyword field, builder style
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The channel names, in acquisition order
    #[must_use]
    pub fn channel_names(&self) -> Vec<ChannelName> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Look up a channel descriptor by name
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&ChannelDescriptor> {
        self.channels.iter().find(|c| c.name.as_ref() == name)
    }

    /// Return the value of a keyword field
    /// # Errors
    /// Will return `Err` if the field is not present in the annotation
    pub fn field(&self, key: &str) -> Result<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SampleError::metadata_field(key, "the sample annotation"))
    }

    /// Return several keyword fields at once
    /// # Errors
    /// Will return `Err` if any of the fields is not present
    pub fn lookup_fields(&self, keys: &[&str]) -> Result<FxHashMap<String, String>> {
        keys.iter()
            .map(|key| Ok(((*key).to_string(), self.field(key)?.to_string())))
            .collect()
    }

    /// Serialize the annotation to a JSON string via serde
    /// # Errors
    /// Will return `Err` if serialization fails
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| anyhow::Error::from(e).into())
    }
}
