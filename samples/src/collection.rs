use crate::error::{Result, SampleError};
use crate::gate::Gate;
use crate::io::{DataSource, EventSource, IdStrategy, ReadOptions, collect_datafiles, well_label_from_filename};
use crate::meta::{ChannelName, SampleMeta};
use crate::sample::{GateOptions, Sample};
use crate::subsample::{SampleKey, SampleOrder};
use crate::transform::{
    TransformOptions, TransformSpec, build_transformer, column_values, describe_channels,
};
use derive_builder::Builder;
use flow_transforms::Transformation;
use polars::prelude::*;
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Options for a collection-level transform call
#[derive(Builder, Clone, Debug)]
#[builder(setter(into), default)]
pub struct CollectionTransformOptions {
    /// Fit one transformation from the pooled collection and apply it to
    /// every member (`true`), or let each member fit its own (`false`)
    pub share_transform: bool,
    /// The per-sample transform options
    pub sample: TransformOptions,
}

impl Default for CollectionTransformOptions {
    fn default() -> Self {
        Self {
            share_transform: true,
            sample: TransformOptions::default(),
        }
    }
}

impl CollectionTransformOptions {
    /// Create a new builder for `CollectionTransformOptions`
    pub fn new() -> CollectionTransformOptionsBuilder {
        CollectionTransformOptionsBuilder::default()
    }
}

/// A keyed set of flow cytometry samples.
///
/// Broadcasts [`transform`](Self::transform), [`gate`](Self::gate), and
/// [`subsample`](Self::subsample) across all members, returning a new
/// collection and leaving the original untouched. Under a shared transform
/// the parameters are computed once (the range validated across every
/// member's annotation, the spline fitted from the pooled data of the whole
/// collection) and the identical transformation is applied to each member.
#[derive(Debug, Clone, Default)]
pub struct SampleCollection {
    id: Arc<str>,
    samples: FxHashMap<Arc<str>, Sample>,
}

impl SampleCollection {
    /// Create an empty collection
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            samples: FxHashMap::default(),
        }
    }

    /// Create a collection from samples, keyed by their IDs
    #[must_use]
    pub fn from_samples(id: impl Into<Arc<str>>, samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut collection = Self::new(id);
        for sample in samples {
            collection.insert(sample);
        }
        collection
    }

    /// Build a collection from datafiles, deriving member keys per `ids`.
    /// Reading is lazy: no file content is touched here unless `ids` requires
    /// the annotation.
    ///
    /// # Errors
    /// Will return `Err` if an ID keyword is missing from a file's annotation
    pub fn from_files(
        id: impl Into<Arc<str>>,
        paths: impl IntoIterator<Item = std::path::PathBuf>,
        reader: Arc<dyn EventSource>,
        options: ReadOptions,
        ids: &IdStrategy,
    ) -> Result<Self> {
        let mut collection = Self::new(id);
        for path in paths {
            let source = DataSource::new(&path, reader.clone(), options);
            let sample = Sample::from_file(stem_of(&path), source);
            let key: Arc<str> = match ids {
                IdStrategy::Stem => stem_of(&path),
                IdStrategy::WellFromName => well_label_from_filename(&path)
                    .map_or_else(|| stem_of(&path), Arc::from),
                IdStrategy::MetaField(field) => sample.id_from_meta(field)?,
            };
            collection.insert(sample.with_id(key));
        }
        debug!(id = %collection.id, members = collection.len(), "loaded collection");
        Ok(collection)
    }

    /// Load every file in `dir` whose name matches `pattern` (a regular
    /// expression), deriving member keys per `ids`.
    ///
    /// # Errors
    /// Will return `Err` if the directory cannot be read, the pattern is
    /// invalid, or an ID keyword is missing from a file's annotation
    pub fn from_dir(
        id: impl Into<Arc<str>>,
        dir: &Path,
        pattern: &str,
        reader: Arc<dyn EventSource>,
        options: ReadOptions,
        ids: &IdStrategy,
    ) -> Result<Self> {
        Self::from_files(id, collect_datafiles(dir, pattern)?, reader, options, ids)
    }

    /// The collection ID
    #[must_use]
    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    /// The same collection under a different ID
    #[must_use]
    pub fn with_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.id = id.into();
        self
    }

    /// Insert a sample, keyed by its ID; an existing sample under the same
    /// key is replaced
    pub fn insert(&mut self, sample: Sample) {
        self.samples.insert(sample.id().clone(), sample);
    }

    /// Look up a member by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Sample> {
        self.samples.get(key)
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the collection has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Member keys, sorted for deterministic iteration
    #[must_use]
    pub fn keys(&self) -> Vec<Arc<str>> {
        let mut keys: Vec<Arc<str>> = self.samples.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Iterate over `(key, sample)` pairs in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Sample)> {
        self.samples.iter()
    }

    /// Apply a transform to each member; see
    /// [`transform_with`](Self::transform_with).
    ///
    /// # Errors
    /// See [`transform_with`](Self::transform_with)
    pub fn transform(
        &self,
        spec: impl Into<TransformSpec>,
        options: &CollectionTransformOptions,
    ) -> Result<Self> {
        Ok(self.transform_with(spec, options)?.0)
    }

    /// Apply a transform to each member, returning the new collection and,
    /// under a shared transform, the single transformation that every member
    /// received.
    ///
    /// With `share_transform`, the range parameter is validated against
    /// **all** members' channel annotation and the spline (when smoothing is
    /// requested) is fitted from the pooled minimum and maximum across all
    /// members' data, before any member is transformed; a mismatch anywhere
    /// fails the whole broadcast. Without it, each member constructs and fits
    /// independently.
    ///
    /// # Errors
    /// Will return `Err` if members disagree on their declared channel ranges
    /// under auto-range, a channel is missing from a member, or any member
    /// transform fails
    pub fn transform_with(
        &self,
        spec: impl Into<TransformSpec>,
        options: &CollectionTransformOptions,
    ) -> Result<(Self, Option<Transformation>)> {
        let spec = spec.into();
        if !options.share_transform {
            // The new ID renames the collection, never its members
            let member_options = TransformOptions {
                new_id: None,
                ..options.sample.clone()
            };
            let transformed =
                self.map_members(|sample| sample.transform(spec.clone(), &member_options))?;
            return Ok((transformed.maybe_with_id(options.sample.new_id.clone()), None));
        }

        let keys = self.keys();

        // Resolve the channel list from the options or a reference member
        let channels: Vec<ChannelName> = match &options.sample.channels {
            Some(channels) => channels.clone(),
            None => {
                let first = keys.first().ok_or_else(|| {
                    SampleError::configuration("cannot share a transform across an empty collection")
                })?;
                self.samples[first].channel_names()?
            }
        };

        // One transformation for the whole collection: range validated across
        // every member's annotation
        let transformation = {
            let annotations: Vec<(Arc<str>, Arc<SampleMeta>)> = keys
                .iter()
                .map(|key| Ok((key.clone(), self.samples[key].meta()?)))
                .collect::<Result<_>>()?;
            build_transformer(
                &spec,
                &options.sample,
                &channels,
                annotations
                    .iter()
                    .map(|(key, meta)| (key.as_ref(), meta.as_ref())),
            )?
        };

        // Smoothing fits once, from the pooled value range of all members
        if options.sample.use_spline && !transformation.is_fit() {
            if let Some((xmin, xmax)) = self.pooled_min_max(&keys, &channels)? {
                transformation.fit_spline(xmin, xmax)?;
            }
        }
        debug!(
            id = %self.id,
            transform = %transformation.kind(),
            channels = %describe_channels(&channels),
            members = keys.len(),
            "sharing one transformation across the collection"
        );

        let member_options = TransformOptions {
            channels: Some(channels),
            new_id: None,
            ..options.sample.clone()
        };
        let transformed = self.map_members(|sample| {
            sample.transform(transformation.clone(), &member_options)
        })?;
        Ok((
            transformed.maybe_with_id(options.sample.new_id.clone()),
            Some(transformation),
        ))
    }

    /// Apply a gate to each member, returning a new collection
    ///
    /// # Errors
    /// Will return `Err` if the gate references a channel absent from any
    /// member's data
    pub fn gate(&self, gate: &Arc<dyn Gate>, options: &GateOptions) -> Result<Self> {
        let member_options = GateOptions {
            new_id: None,
            ..options.clone()
        };
        let gated = self.map_members(|sample| sample.gate(gate, &member_options))?;
        Ok(gated.maybe_with_id(options.new_id.clone()))
    }

    /// Subsample each member, returning a new collection.
    ///
    /// With `SampleOrder::Random`, each member draws its own independent
    /// random subset; there is no shared index set across members.
    ///
    /// # Errors
    /// Will return `Err` if any member's key resolution fails
    pub fn subsample(
        &self,
        key: impl Into<SampleKey>,
        order: SampleOrder,
        auto_resize: bool,
        new_id: Option<Arc<str>>,
    ) -> Result<Self> {
        let key = key.into();
        let subsampled =
            self.map_members(|sample| sample.subsample(key.clone(), order, auto_resize))?;
        Ok(subsampled.maybe_with_id(new_id))
    }

    /// Event counts per member, keyed by member key.
    ///
    /// `keys = None` counts every member.
    ///
    /// # Errors
    /// Will return `Err` if a requested key is not present or a member's data
    /// cannot be materialized
    pub fn counts(&self, keys: Option<&[&str]>) -> Result<FxHashMap<Arc<str>, usize>> {
        self.selected_keys(keys)?
            .into_iter()
            .map(|key| {
                let counts = self.samples[&key].counts()?;
                Ok((key, counts))
            })
            .collect()
    }

    /// Event counts per member as a two-column table (`id`, `counts`), sorted
    /// by member key.
    ///
    /// # Errors
    /// Will return `Err` if a requested key is not present or a member's data
    /// cannot be materialized
    pub fn counts_table(&self, keys: Option<&[&str]>) -> Result<DataFrame> {
        let keys = self.selected_keys(keys)?;
        let counts: Vec<u64> = keys
            .iter()
            .map(|key| Ok(self.samples[key].counts()? as u64))
            .collect::<Result<_>>()?;
        let ids: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        Ok(DataFrame::new(vec![
            Column::new("id".into(), ids),
            Column::new("counts".into(), counts),
        ])?)
    }

    /// The pooled minimum and maximum over the given channels across all of
    /// the given members' data. `None` when no finite values exist.
    pub(crate) fn pooled_min_max(
        &self,
        keys: &[Arc<str>],
        channels: &[ChannelName],
    ) -> Result<Option<(f64, f64)>> {
        let mut bounds: Option<(f64, f64)> = None;
        for key in keys {
            let frame = self.samples[key].data()?;
            for channel in channels {
                for value in column_values(&frame, channel)? {
                    if !value.is_finite() {
                        continue;
                    }
                    let value = f64::from(value);
                    bounds = Some(match bounds {
                        None => (value, value),
                        Some((min, max)) => (min.min(value), max.max(value)),
                    });
                }
            }
        }
        Ok(bounds)
    }

    /// Build a new collection by applying `operation` to every member. Fails
    /// on the first member error, before any result is returned.
    fn map_members(&self, operation: impl Fn(&Sample) -> Result<Sample>) -> Result<Self> {
        let samples = self
            .samples
            .iter()
            .map(|(key, sample)| Ok((key.clone(), operation(sample)?)))
            .collect::<Result<FxHashMap<_, _>>>()?;
        Ok(Self {
            id: self.id.clone(),
            samples,
        })
    }

    fn maybe_with_id(self, id: Option<Arc<str>>) -> Self {
        match id {
            Some(id) => self.with_id(id),
            None => self,
        }
    }

    fn selected_keys(&self, keys: Option<&[&str]>) -> Result<Vec<Arc<str>>> {
        match keys {
            None => Ok(self.keys()),
            Some(keys) => keys
                .iter()
                .map(|key| {
                    self.samples
                        .get_key_value(*key)
                        .map(|(key, _)| key.clone())
                        .ok_or_else(|| SampleError::member_not_found(*key))
                })
                .collect(),
        }
    }
}

fn stem_of(path: &Path) -> Arc<str> {
    path.file_stem()
        .or_else(|| path.file_name())
        .and_then(|stem| stem.to_str())
        .map_or_else(|| Arc::from(path.to_string_lossy().as_ref()), Arc::from)
}
