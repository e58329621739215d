#[cfg(test)]
mod container_tests {
    use std::cell::RefCell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::collection::{CollectionTransformOptions, SampleCollection};
    use crate::error::SampleError;
    use crate::gate::{Gate, GateStyle};
    use crate::io::{DataSource, EventSource, ReadOptions};
    use crate::meta::{ChannelDescriptor, ChannelName, SampleMeta};
    use crate::plate::{GridOptions, Plate, PlateLayout};
    use crate::plot::{
        BinSpec, GateCanvas, GridSlot, GridSpec, PlotBackend, PlotConfig, linspace_edges,
    };
    use crate::sample::{GateOptions, Sample};
    use crate::subsample::SampleOrder;
    use crate::transform::TransformOptions;
    use approx::assert_relative_eq;
    use flow_transforms::TransformKind;
    use polars::prelude::*;

    fn annotation() -> SampleMeta {
        SampleMeta::new(vec![
            ChannelDescriptor::new(1, "FSC-A", "FSC-A", 1024.0),
            ChannelDescriptor::new(2, "SSC-A", "SSC-A", 1024.0),
            ChannelDescriptor::new(3, "B1-A", "CD8", 1024.0),
        ])
        .with_field("$SRC", "A3")
    }

    fn mismatched_annotation() -> SampleMeta {
        SampleMeta::new(vec![
            ChannelDescriptor::new(1, "FSC-A", "FSC-A", 1024.0),
            ChannelDescriptor::new(2, "SSC-A", "SSC-A", 2048.0),
            ChannelDescriptor::new(3, "B1-A", "CD8", 1024.0),
        ])
    }

    fn ramp_frame(num_events: usize) -> DataFrame {
        let fsc: Vec<f32> = (0..num_events).map(|i| i as f32).collect();
        let ssc: Vec<f32> = (0..num_events).map(|i| (i * 2) as f32).collect();
        let b1: Vec<f32> = (0..num_events).map(|i| i as f32 * 10.0).collect();
        DataFrame::new(vec![
            Column::new("FSC-A".into(), fsc),
            Column::new("SSC-A".into(), ssc),
            Column::new("B1-A".into(), b1),
        ])
        .expect("test frame")
    }

    fn ramp_sample(id: &str, num_events: usize) -> Sample {
        Sample::with_data(id, annotation(), ramp_frame(num_events)).expect("test sample")
    }

    fn column(frame: &DataFrame, name: &str) -> Vec<f32> {
        frame
            .column(name)
            .unwrap()
            .as_materialized_series()
            .f32()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    /// A gate keeping events strictly above a threshold on one channel
    #[derive(Debug)]
    struct ThresholdGate {
        channels: Vec<ChannelName>,
        threshold: f32,
    }

    impl ThresholdGate {
        fn above(channel: &str, threshold: f32) -> Arc<dyn Gate> {
            Arc::new(Self {
                channels: vec![channel.into()],
                threshold,
            })
        }
    }

    impl Gate for ThresholdGate {
        fn channels(&self) -> &[ChannelName] {
            &self.channels
        }

        fn mask(&self, frame: &DataFrame) -> anyhow::Result<Vec<bool>> {
            let values = frame
                .column(self.channels[0].as_ref())?
                .as_materialized_series()
                .f32()?;
            Ok(values
                .into_no_null_iter()
                .map(|value| value > self.threshold)
                .collect())
        }

        fn plot(
            &self,
            canvas: &mut dyn GateCanvas,
            _channels: &[ChannelName],
            style: &GateStyle,
        ) -> anyhow::Result<()> {
            canvas.draw_vline(self.threshold, style)
        }
    }

    /// The conjunction of several gates, evaluated in one pass
    #[derive(Debug)]
    struct AndGate {
        channels: Vec<ChannelName>,
        gates: Vec<Arc<dyn Gate>>,
    }

    impl AndGate {
        fn of(gates: Vec<Arc<dyn Gate>>) -> Arc<dyn Gate> {
            let channels = gates
                .iter()
                .flat_map(|gate| gate.channels().to_vec())
                .collect();
            Arc::new(Self { channels, gates })
        }
    }

    impl Gate for AndGate {
        fn channels(&self) -> &[ChannelName] {
            &self.channels
        }

        fn mask(&self, frame: &DataFrame) -> anyhow::Result<Vec<bool>> {
            let mut combined = vec![true; frame.height()];
            for gate in &self.gates {
                for (slot, value) in combined.iter_mut().zip(gate.mask(frame)?) {
                    *slot = *slot && value;
                }
            }
            Ok(combined)
        }

        fn plot(
            &self,
            canvas: &mut dyn GateCanvas,
            channels: &[ChannelName],
            style: &GateStyle,
        ) -> anyhow::Result<()> {
            for gate in &self.gates {
                gate.plot(canvas, channels, style)?;
            }
            Ok(())
        }
    }

    /// An in-memory datafile, counting how often the event data is read
    #[derive(Debug)]
    struct StaticSource {
        meta: SampleMeta,
        frame: DataFrame,
        full_reads: AtomicUsize,
    }

    impl StaticSource {
        fn new(meta: SampleMeta, frame: DataFrame) -> Arc<Self> {
            Arc::new(Self {
                meta,
                frame,
                full_reads: AtomicUsize::new(0),
            })
        }
    }

    impl EventSource for StaticSource {
        fn read_meta(&self, _path: &std::path::Path, _options: &ReadOptions) -> anyhow::Result<SampleMeta> {
            Ok(self.meta.clone())
        }

        fn read(
            &self,
            _path: &std::path::Path,
            _options: &ReadOptions,
        ) -> anyhow::Result<(SampleMeta, DataFrame)> {
            self.full_reads.fetch_add(1, Ordering::SeqCst);
            Ok((self.meta.clone(), self.frame.clone()))
        }
    }

    // ==================== copy-on-write ====================

    #[test]
    fn operations_leave_the_original_untouched() {
        let sample = ramp_sample("s1", 100);
        let before = (*sample.data().unwrap()).clone();

        sample
            .transform(TransformKind::hlog(), &TransformOptions::default())
            .unwrap();
        sample
            .gate(&ThresholdGate::above("FSC-A", 50.0), &GateOptions::default())
            .unwrap();
        sample
            .subsample(10usize, SampleOrder::Start, false)
            .unwrap();

        assert!(sample.data().unwrap().equals(&before));
        assert_eq!(sample.meta().unwrap().field("$SRC").unwrap(), "A3");
    }

    // ==================== transform ====================

    #[test]
    fn transform_replaces_selected_channels_only() {
        let sample = ramp_sample("s1", 50);
        let options = TransformOptions::new()
            .channels(vec![ChannelName::from("B1-A")])
            .use_spline(false)
            .build()
            .unwrap();
        let transformed = sample.transform(TransformKind::hlog(), &options).unwrap();

        let frame = transformed.data().unwrap();
        assert_eq!(frame.width(), 3);
        // Untouched channels pass through unchanged
        assert_eq!(column(&frame, "FSC-A"), column(&sample.data().unwrap(), "FSC-A"));
        assert_ne!(column(&frame, "B1-A"), column(&sample.data().unwrap(), "B1-A"));
    }

    #[test]
    fn transform_can_restrict_output_to_selected_channels() {
        let sample = ramp_sample("s1", 50);
        let options = TransformOptions::new()
            .channels(vec![ChannelName::from("B1-A")])
            .return_all(false)
            .use_spline(false)
            .build()
            .unwrap();
        let transformed = sample.transform(TransformKind::hlog(), &options).unwrap();

        let frame = transformed.data().unwrap();
        assert_eq!(frame.width(), 1);
        assert!(frame.column("B1-A").is_ok());
    }

    #[test]
    fn auto_range_derives_decades_from_the_declared_range() {
        let sample = ramp_sample("s1", 20);
        let options = TransformOptions::new().use_spline(false).build().unwrap();
        let (_, transformation) = sample
            .transform_with(TransformKind::tlog(), &options)
            .unwrap();
        assert_relative_eq!(transformation.decades(), 1024f64.log10());
    }

    #[test]
    fn auto_range_rejects_mismatched_channel_ranges() {
        let sample =
            Sample::with_data("s1", mismatched_annotation(), ramp_frame(20)).unwrap();

        // FSC-A (1024) and SSC-A (2048) cannot be transformed together
        let options = TransformOptions::new()
            .channels(vec![ChannelName::from("FSC-A"), ChannelName::from("SSC-A")])
            .build()
            .unwrap();
        let result = sample.transform(TransformKind::hlog(), &options);
        assert!(matches!(result, Err(SampleError::Configuration { .. })));

        // Channels agreeing on 1024 are fine
        let options = TransformOptions::new()
            .channels(vec![ChannelName::from("FSC-A"), ChannelName::from("B1-A")])
            .build()
            .unwrap();
        assert!(sample.transform(TransformKind::hlog(), &options).is_ok());
    }

    #[test]
    fn explicit_decades_override_auto_range() {
        let sample = ramp_sample("s1", 20);
        let options = TransformOptions::new()
            .use_spline(false)
            .decades(3.0f64)
            .build()
            .unwrap();
        let (_, transformation) = sample
            .transform_with(TransformKind::tlog(), &options)
            .unwrap();
        assert_relative_eq!(transformation.decades(), 3.0);
    }

    #[test]
    fn missing_channels_are_rejected_up_front() {
        let sample = ramp_sample("s1", 20);
        let options = TransformOptions::new()
            .channels(vec![ChannelName::from("Y2-A")])
            .build()
            .unwrap();
        assert!(matches!(
            sample.transform(TransformKind::hlog(), &options),
            Err(SampleError::ChannelNotFound { .. })
        ));
    }

    #[test]
    fn a_returned_transformer_reproduces_the_identical_mapping() {
        let first = ramp_sample("s1", 80);
        let second = ramp_sample("s2", 80);

        let options = TransformOptions::default();
        let (transformed_first, transformer) = first
            .transform_with(TransformKind::hlog(), &options)
            .unwrap();
        let transformed_second = second.transform(transformer, &options).unwrap();

        assert!(
            transformed_first
                .data()
                .unwrap()
                .equals(&transformed_second.data().unwrap())
        );
    }

    // ==================== gate ====================

    #[test]
    fn gating_keeps_the_passing_rows() {
        let sample = ramp_sample("s1", 100);
        let gated = sample
            .gate(&ThresholdGate::above("FSC-A", 49.0), &GateOptions::default())
            .unwrap();
        assert_eq!(gated.counts().unwrap(), 50);
        assert_eq!(column(&gated.data().unwrap(), "FSC-A")[0], 50.0);
    }

    #[test]
    fn sequential_gates_match_a_combined_predicate() {
        let sample = ramp_sample("s1", 100);
        let size = ThresholdGate::above("FSC-A", 20.0);
        let stain = ThresholdGate::above("SSC-A", 60.0);

        let sequential = sample
            .gate(&size, &GateOptions::default())
            .unwrap()
            .gate(&stain, &GateOptions::default())
            .unwrap();
        let combined = sample
            .gate(&AndGate::of(vec![size, stain]), &GateOptions::default())
            .unwrap();

        assert!(sequential.data().unwrap().equals(&combined.data().unwrap()));
    }

    #[test]
    fn gates_on_absent_channels_fail() {
        let sample = ramp_sample("s1", 10);
        assert!(matches!(
            sample.gate(&ThresholdGate::above("Y2-A", 0.0), &GateOptions::default()),
            Err(SampleError::GateChannel { .. })
        ));
    }

    // ==================== subsample ====================

    #[test]
    fn fractional_keys_truncate_to_counts() {
        let sample = ramp_sample("s1", 100);
        let subsampled = sample.subsample(0.25, SampleOrder::Start, false).unwrap();
        assert_eq!(subsampled.counts().unwrap(), 25);
    }

    #[test]
    fn fractional_ranges_take_the_contiguous_slice() {
        let sample = ramp_sample("s1", 100);
        let subsampled = sample
            .subsample((0.1, 0.3), SampleOrder::Random, false)
            .unwrap();
        let values = column(&subsampled.data().unwrap(), "FSC-A");
        assert_eq!(values.len(), 20);
        assert_eq!(values[0], 10.0);
        assert_eq!(values[19], 29.0);
    }

    #[test]
    fn counted_keys_respect_order() {
        let sample = ramp_sample("s1", 100);

        let head = sample.subsample(10usize, SampleOrder::Start, false).unwrap();
        assert_eq!(
            column(&head.data().unwrap(), "FSC-A"),
            (0..10).map(|i| i as f32).collect::<Vec<_>>()
        );

        let tail = sample.subsample(10usize, SampleOrder::End, false).unwrap();
        assert_eq!(
            column(&tail.data().unwrap(), "FSC-A"),
            (90..100).map(|i| i as f32).collect::<Vec<_>>()
        );
    }

    #[test]
    fn random_subsampling_draws_without_replacement() {
        let sample = ramp_sample("s1", 100);
        let subsampled = sample.subsample(10usize, SampleOrder::Random, false).unwrap();

        let mut values = column(&subsampled.data().unwrap(), "FSC-A");
        assert_eq!(values.len(), 10);
        values.sort_by(f32::total_cmp);
        values.dedup();
        assert_eq!(values.len(), 10, "drawn rows must be distinct");
        assert!(values.iter().all(|v| (0.0..100.0).contains(v)));
    }

    #[test]
    fn zero_counts_yield_an_empty_sample() {
        let sample = ramp_sample("s1", 100);
        let empty = sample.subsample(0usize, SampleOrder::Random, true).unwrap();
        assert_eq!(empty.counts().unwrap(), 0);
    }

    #[test]
    fn out_of_bounds_counts_fail_or_clamp() {
        let sample = ramp_sample("s1", 100);

        assert!(matches!(
            sample.subsample(150usize, SampleOrder::Start, false),
            Err(SampleError::OutOfBounds { .. })
        ));

        let clamped = sample.subsample(150usize, SampleOrder::Start, true).unwrap();
        assert_eq!(clamped.counts().unwrap(), 100);
    }

    // ==================== deferred execution ====================

    #[test]
    fn deferred_and_eager_pipelines_produce_identical_data() {
        let sample = ramp_sample("s1", 100);
        let gate = ThresholdGate::above("FSC-A", 30.0);
        let transform_options = TransformOptions::new()
            .channels(vec![ChannelName::from("B1-A")])
            .build()
            .unwrap();

        let eager = sample
            .transform(TransformKind::hlog(), &transform_options)
            .unwrap()
            .gate(&gate, &GateOptions::default())
            .unwrap();

        let deferred_transform = TransformOptions { apply_now: false, ..transform_options };
        let deferred_gate = GateOptions::new().apply_now(false).build().unwrap();
        let deferred = sample
            .transform(TransformKind::hlog(), &deferred_transform)
            .unwrap()
            .gate(&gate, &deferred_gate)
            .unwrap();

        assert!(deferred.has_queued_operations());
        assert!(eager.data().unwrap().equals(&deferred.data().unwrap()));
    }

    #[test]
    fn eager_operations_compose_onto_a_queued_lineage() {
        let sample = ramp_sample("s1", 100);
        let gate = ThresholdGate::above("FSC-A", 30.0);
        let deferred_transform = TransformOptions::new()
            .use_spline(false)
            .apply_now(false)
            .build()
            .unwrap();

        // Queue a transform, then gate eagerly on the still-unmaterialized data
        let mixed = sample
            .transform(TransformKind::hlog(), &deferred_transform)
            .unwrap()
            .gate(&gate, &GateOptions::default())
            .unwrap();

        let eager_options = TransformOptions::new().use_spline(false).build().unwrap();
        let eager = sample
            .transform(TransformKind::hlog(), &eager_options)
            .unwrap()
            .gate(&gate, &GateOptions::default())
            .unwrap();

        assert!(!mixed.has_queued_operations());
        assert!(mixed.data().unwrap().equals(&eager.data().unwrap()));
    }

    #[test]
    fn deferred_operations_read_the_datafile_once_and_lazily() {
        let source = StaticSource::new(annotation(), ramp_frame(60));
        let sample = Sample::from_file(
            "well",
            DataSource::new("in-memory.fcs", source.clone(), ReadOptions::default()),
        );

        let deferred = TransformOptions::new()
            .channels(vec![ChannelName::from("B1-A")])
            .use_spline(false)
            .apply_now(false)
            .build()
            .unwrap();
        let gated = sample
            .transform(TransformKind::hlog(), &deferred)
            .unwrap()
            .gate(
                // FSC-A is untouched by the transform, so the threshold is in
                // raw units
                &ThresholdGate::above("FSC-A", 30.0),
                &GateOptions::new().apply_now(false).build().unwrap(),
            )
            .unwrap();

        // Queueing touched only the annotation, never the event data
        assert_eq!(source.full_reads.load(Ordering::SeqCst), 0);

        assert_eq!(gated.counts().unwrap(), 29);
        assert_eq!(source.full_reads.load(Ordering::SeqCst), 1);

        // Materialization is cached
        gated.data().unwrap();
        assert_eq!(source.full_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queued_column_restrictions_are_visible_without_materializing() {
        let sample = ramp_sample("s1", 40);
        let narrowing = TransformOptions::new()
            .channels(vec![ChannelName::from("B1-A")])
            .return_all(false)
            .use_spline(false)
            .apply_now(false)
            .build()
            .unwrap();
        let narrowed = sample.transform(TransformKind::hlog(), &narrowing).unwrap();

        // The queued restriction already hides the other channels
        assert!(matches!(
            narrowed.gate(&ThresholdGate::above("FSC-A", 0.0), &GateOptions::default()),
            Err(SampleError::GateChannel { .. })
        ));
    }

    // ==================== directory loading ====================

    #[test]
    fn plates_load_from_a_directory_of_datafiles() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Specimen_001_A1.fcs", "Specimen_001_B3.fcs", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let source = StaticSource::new(annotation(), ramp_frame(40));
        let plate = Plate::from_dir(
            "p1",
            dir.path(),
            r"\.fcs$",
            source.clone(),
            ReadOptions::default(),
            PlateLayout::with_dimensions(2, 3),
        )
        .unwrap();

        assert_eq!(plate.len(), 2);
        assert!(plate.get("A1").is_some());
        assert!(plate.get("B3").is_some());
        // Loading is lazy: nothing was parsed yet
        assert_eq!(source.full_reads.load(Ordering::SeqCst), 0);
        assert_eq!(plate.counts(None).unwrap()["A1"], 40);
    }

    #[test]
    fn collections_key_members_by_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["tube1.fcs", "tube2.fcs"] {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let source = StaticSource::new(annotation(), ramp_frame(10));
        let collection = SampleCollection::from_dir(
            "run",
            dir.path(),
            r"\.fcs$",
            source,
            ReadOptions::default(),
            &crate::io::IdStrategy::Stem,
        )
        .unwrap();

        let mut keys: Vec<String> = collection.keys().iter().map(|k| k.to_string()).collect();
        keys.sort();
        assert_eq!(keys, ["tube1", "tube2"]);
    }

    // ==================== annotation ====================

    #[test]
    fn well_ids_come_from_the_annotation() {
        let sample = ramp_sample("s1", 5);
        assert_eq!(sample.id_from_meta("$SRC").unwrap().as_ref(), "A3");
        assert!(matches!(
            sample.id_from_meta("$MISSING"),
            Err(SampleError::MetadataField { .. })
        ));
    }

    // ==================== collections ====================

    fn ramp_collection() -> SampleCollection {
        SampleCollection::from_samples(
            "plate-1",
            [ramp_sample("A1", 100), ramp_sample("A2", 100)],
        )
    }

    #[test]
    fn shared_transforms_apply_one_parameter_set_to_every_member() {
        let collection = ramp_collection();
        let (transformed, transformation) = collection
            .transform_with(TransformKind::hlog(), &CollectionTransformOptions::default())
            .unwrap();

        let transformation = transformation.expect("shared transforms return the transformer");
        assert!(transformation.is_fit());

        // Identical raw inputs must map to identical outputs in every member
        let first = transformed.get("A1").unwrap().data().unwrap();
        let second = transformed.get("A2").unwrap().data().unwrap();
        assert!(first.equals(&second));

        // And the original collection is untouched
        assert!(
            collection
                .get("A1")
                .unwrap()
                .data()
                .unwrap()
                .equals(&ramp_frame(100))
        );
    }

    #[test]
    fn shared_spline_fits_use_the_pooled_range() {
        let meta = annotation();
        let narrow = Sample::with_data(
            "narrow",
            meta.clone(),
            DataFrame::new(vec![Column::new(
                "B1-A".into(),
                (0..50).map(|i| i as f32).collect::<Vec<_>>(),
            )])
            .unwrap(),
        )
        .unwrap();
        let wide = Sample::with_data(
            "wide",
            meta,
            DataFrame::new(vec![Column::new(
                "B1-A".into(),
                (0..50).map(|i| i as f32 * 100.0).collect::<Vec<_>>(),
            )])
            .unwrap(),
        )
        .unwrap();

        let collection = SampleCollection::from_samples("pool", [narrow, wide]);
        let options = CollectionTransformOptions {
            share_transform: true,
            sample: TransformOptions::new()
                .channels(vec![ChannelName::from("B1-A")])
                .build()
                .unwrap(),
        };
        let (_, transformation) = collection
            .transform_with(TransformKind::hlog(), &options)
            .unwrap();

        // The fit domain is the global min/max across both members, not
        // either member's own range
        let (xmin, xmax) = transformation.unwrap().spline_domain().unwrap();
        assert_relative_eq!(xmin, 0.0);
        assert_relative_eq!(xmax, 4900.0);
    }

    #[test]
    fn unshared_transforms_fit_each_member_independently() {
        let collection = ramp_collection();
        let options = CollectionTransformOptions {
            share_transform: false,
            sample: TransformOptions::new().use_spline(false).build().unwrap(),
        };
        let (transformed, transformation) = collection
            .transform_with(TransformKind::hlog(), &options)
            .unwrap();
        assert!(transformation.is_none());
        assert_eq!(transformed.len(), 2);
    }

    #[test]
    fn shared_transforms_fail_fast_on_range_disagreement() {
        let collection = SampleCollection::from_samples(
            "mixed",
            [
                ramp_sample("A1", 20),
                Sample::with_data("A2", mismatched_annotation(), ramp_frame(20)).unwrap(),
            ],
        );

        // A2's SSC-A declares 2048 while every other channel declares 1024
        let result =
            collection.transform(TransformKind::hlog(), &CollectionTransformOptions::default());
        assert!(matches!(result, Err(SampleError::Configuration { .. })));
    }

    #[test]
    fn collection_gates_and_subsamples_broadcast() {
        let collection = ramp_collection();

        let gated = collection
            .gate(&ThresholdGate::above("FSC-A", 49.0), &GateOptions::default())
            .unwrap();
        assert_eq!(gated.counts(None).unwrap()["A1"], 50);

        let subsampled = collection
            .subsample(0.1, SampleOrder::Random, false, None)
            .unwrap();
        assert_eq!(subsampled.counts(None).unwrap()["A2"], 10);
    }

    #[test]
    fn counts_cover_exactly_the_collection_keys() {
        let collection = SampleCollection::from_samples(
            "sizes",
            [
                ramp_sample("B2", 30),
                ramp_sample("A1", 10),
                ramp_sample("C3", 20),
            ],
        );

        let counts = collection.counts(None).unwrap();
        let mut keys: Vec<&str> = counts.keys().map(|k| k.as_ref()).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["A1", "B2", "C3"]);
        assert_eq!(counts["A1"], 10);
        assert_eq!(counts["B2"], 30);
        assert_eq!(counts["C3"], 20);

        let subset = collection.counts(Some(&["C3"])).unwrap();
        assert_eq!(subset.len(), 1);
        assert_eq!(subset["C3"], 20);

        assert!(matches!(
            collection.counts(Some(&["D4"])),
            Err(SampleError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn counts_table_is_sorted_by_key() {
        let collection = SampleCollection::from_samples(
            "sizes",
            [ramp_sample("B1", 30), ramp_sample("A1", 10)],
        );
        let table = collection.counts_table(None).unwrap();
        assert_eq!(table.height(), 2);
        let ids = table.column("id").unwrap().str().unwrap();
        assert_eq!(ids.get(0), Some("A1"));
        assert_eq!(ids.get(1), Some("B1"));
        let counts = table.column("counts").unwrap().u64().unwrap();
        assert_eq!(counts.get(0), Some(10));
        assert_eq!(counts.get(1), Some(30));
    }

    // ==================== plates ====================

    /// A backend that records the binning every cell was drawn with
    #[derive(Debug, Default)]
    struct RecordingAxes {
        vlines: Vec<f32>,
    }

    impl GateCanvas for RecordingAxes {
        fn draw_polyline(&mut self, _points: &[(f32, f32)], _style: &GateStyle) -> anyhow::Result<()> {
            Ok(())
        }

        fn draw_vline(&mut self, x: f32, _style: &GateStyle) -> anyhow::Result<()> {
            self.vlines.push(x);
            Ok(())
        }

        fn draw_hline(&mut self, _y: f32, _style: &GateStyle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingBackend {
        cell_bins: RefCell<Vec<BinSpec>>,
        grid_specs: RefCell<Vec<GridSpec>>,
    }

    impl PlotBackend for RecordingBackend {
        type Axes = RecordingAxes;
        type Output = usize;

        fn plot_frame(
            &self,
            _axes: &mut Self::Axes,
            _frame: &DataFrame,
            _channels: &[ChannelName],
            config: &PlotConfig,
        ) -> anyhow::Result<()> {
            self.cell_bins.borrow_mut().push(config.bins.clone());
            Ok(())
        }

        fn grid_plot(
            &self,
            spec: &GridSpec,
            draw: &mut dyn FnMut(&GridSlot, &mut Self::Axes) -> crate::error::Result<()>,
        ) -> anyhow::Result<usize> {
            self.grid_specs.borrow_mut().push(spec.clone());
            let cols = spec.col_labels.len().max(1);
            for (index, label) in spec.ids.iter().enumerate() {
                let slot = GridSlot {
                    row: index / cols,
                    col: index % cols,
                    label: label.clone(),
                };
                let mut axes = RecordingAxes::default();
                draw(&slot, &mut axes)?;
            }
            Ok(spec.ids.len())
        }
    }

    fn two_well_plate() -> Plate {
        let mut plate = Plate::new("p1", PlateLayout::with_dimensions(2, 3));
        plate
            .set_well(
                "A1",
                Sample::with_data(
                    "A1",
                    annotation(),
                    DataFrame::new(vec![Column::new(
                        "B1-A".into(),
                        (0..50).map(|i| i as f32).collect::<Vec<_>>(),
                    )])
                    .unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        plate
            .set_well(
                "B3",
                Sample::with_data(
                    "B3",
                    annotation(),
                    DataFrame::new(vec![Column::new(
                        "B1-A".into(),
                        (50..100).map(|i| i as f32).collect::<Vec<_>>(),
                    )])
                    .unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        plate
    }

    #[test]
    fn wells_outside_the_layout_are_rejected() {
        let mut plate = Plate::new("p1", PlateLayout::with_dimensions(2, 3));
        assert!(plate.set_well("C1", ramp_sample("C1", 5)).is_err());
        assert!(plate.set_well("A4", ramp_sample("A4", 5)).is_err());
        assert!(plate.set_well("B3", ramp_sample("B3", 5)).is_ok());
    }

    #[test]
    fn plate_broadcasts_preserve_the_layout() {
        let plate = two_well_plate();
        let options = CollectionTransformOptions {
            share_transform: true,
            sample: TransformOptions::new()
                .channels(vec![ChannelName::from("B1-A")])
                .use_spline(false)
                .build()
                .unwrap(),
        };
        let transformed = plate.transform(TransformKind::hlog(), &options).unwrap();

        assert_eq!(transformed.layout(), plate.layout());
        assert_eq!(transformed.len(), 2);
        assert_eq!(transformed.counts(None).unwrap()["A1"], 50);
    }

    #[test]
    fn grid_histograms_share_bin_edges_across_all_wells() {
        let plate = two_well_plate();
        let backend = RecordingBackend::default();
        let config = PlotConfig::new().bins(BinSpec::Count(5)).build().unwrap();

        let cells = plate
            .plot(
                &backend,
                &[ChannelName::from("B1-A")],
                &config,
                &GridOptions::default(),
            )
            .unwrap();

        // Every slot in the 2x3 layout is offered to the backend
        assert_eq!(cells, 6);

        // Both occupied wells were drawn with the identical global edges:
        // min 0 (from A1) to max 99 (from B3)
        let expected = BinSpec::Edges(linspace_edges(0.0, 99.0, 5));
        let bins = backend.cell_bins.borrow();
        assert_eq!(bins.len(), 2);
        assert!(bins.iter().all(|b| *b == expected));

        // The grid spec carries the layout labels and the channel name
        let specs = backend.grid_specs.borrow();
        assert_eq!(specs[0].row_labels.len(), 2);
        assert_eq!(specs[0].col_labels.len(), 3);
        assert_eq!(specs[0].xlabel.as_deref(), Some("B1-A"));
    }

    #[test]
    fn gate_overlays_draw_through_the_cell_canvas() {
        let sample = ramp_sample("s1", 20);
        let backend = RecordingBackend::default();
        let mut axes = RecordingAxes::default();
        let config = PlotConfig::new()
            .gates(vec![ThresholdGate::above("FSC-A", 5.0)])
            .build()
            .unwrap();

        sample
            .plot(&backend, &mut axes, &[ChannelName::from("FSC-A")], &config)
            .unwrap();
        assert_eq!(axes.vlines, vec![5.0]);
    }
}
