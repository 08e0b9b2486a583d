#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    use tempfile::tempdir;
    use vzip_core::telemetry;
    use vzip_core::telemetry::tags;
    use vzip_core::{
        BufferPool, DefaultStageTelemetry, FramePipeline, PipelineConfig, StageRole,
        StageTelemetry,
    };

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn archive_run_records_pipeline_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::reset();

        let dir = tempdir()?;
        let frame: Vec<u8> = b"P6 telemetry frame\n"
            .iter()
            .copied()
            .cycle()
            .take(512)
            .collect();
        for order in 1..=6 {
            let path = dir.path().join(format!("{order}.ppm"));
            fs::write(path, &frame)?;
        }

        let pipeline = FramePipeline::new(PipelineConfig::default().with_threads(2, 3))?;
        let (archive, _) = pipeline.archive_directory(dir.path(), Vec::new())?;
        assert!(!archive.is_empty());

        let snapshot = telemetry::snapshot();
        let finished = snapshot.counter(tags::METRIC_STAGE_TASK_FINISH_COUNT);
        assert_eq!(snapshot.counter(tags::METRIC_ARCHIVE_RUN_COUNT), Some(1));
        assert_eq!(finished, Some(12));
        assert_eq!(snapshot.gauge(tags::METRIC_STAGE_ACTIVE_COUNT), Some(0));

        let pipeline = snapshot.pipeline();
        assert_eq!(pipeline.frames_scanned, 6);
        assert_eq!(pipeline.frames_read, 6);
        assert_eq!(pipeline.frames_compressed, 6);
        assert_eq!(pipeline.archive_entries, 6);
        assert_eq!(pipeline.frames_pending(), 0);
        assert_eq!(pipeline.codec_input_bytes, 6 * 512);
        assert!(pipeline.peak_active_tasks >= 1);
        assert!(pipeline.codec_ratio() > 0.0 && pipeline.codec_ratio() < 1.0);

        let codec_hist = snapshot
            .histogram(tags::METRIC_CODEC_LATENCY_US)
            .expect("codec latency histogram missing");
        assert_eq!(codec_hist.count, 6);

        let read_hist = snapshot
            .histogram(tags::METRIC_PRODUCER_READ_BYTES)
            .expect("producer read histogram missing");
        assert_eq!(read_hist.max, 512);
        Ok(())
    }

    #[test]
    fn buffer_pool_records_acquire_and_recycle() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::reset();

        let pool = BufferPool::new(64, 1);
        {
            let _first = pool.acquire().expect("first buffer");
        }
        {
            let _second = pool.acquire().expect("second buffer");
        }

        let snapshot = telemetry::snapshot();
        assert_eq!(
            snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT),
            Some(1)
        );
        assert_eq!(
            snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT),
            Some(1)
        );
        assert_eq!(
            snapshot.counter(tags::METRIC_BUFFER_RECYCLE_OK_COUNT),
            Some(2)
        );
    }

    #[test]
    fn gauges_keep_their_peak_after_draining() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::reset();

        let stage_telemetry = DefaultStageTelemetry;
        for depth in [2, 9, 4, 0] {
            stage_telemetry.on_queue_depth(StageRole::Consumer, 0, depth);
        }
        stage_telemetry.on_task_started(StageRole::Producer, 0, "read");
        stage_telemetry.on_task_started(StageRole::Consumer, 0, "compress");
        let elapsed = Duration::from_micros(10);
        stage_telemetry.on_task_finished(StageRole::Producer, 0, "read", elapsed);
        stage_telemetry.on_task_finished(StageRole::Consumer, 0, "compress", elapsed);

        let snapshot = telemetry::snapshot();
        let depth = tags::METRIC_READY_QUEUE_DEPTH;
        assert_eq!(snapshot.gauge(depth), Some(0));
        assert_eq!(snapshot.gauge_peak(depth), Some(9));

        let pipeline = snapshot.pipeline();
        assert_eq!(pipeline.peak_ready_depth, 9);
        assert_eq!(pipeline.peak_active_tasks, 2);

        telemetry::reset();
        assert_eq!(telemetry::snapshot().gauge_peak(depth), None);
    }

    #[test]
    fn stage_telemetry_tracks_tasks_and_queue_depth() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        telemetry::reset();

        let stage_telemetry = DefaultStageTelemetry;
        stage_telemetry.on_queue_depth(StageRole::Consumer, 0, 7);
        stage_telemetry.on_task_started(StageRole::Consumer, 0, "compress");
        stage_telemetry.on_task_finished(
            StageRole::Consumer,
            0,
            "compress",
            Duration::from_micros(120),
        );
        stage_telemetry.on_task_started(StageRole::Producer, 1, "read");
        stage_telemetry.on_task_failed(StageRole::Producer, 1, "read", Duration::from_micros(75));

        let snapshot = telemetry::snapshot();
        let started = snapshot.counter(tags::METRIC_STAGE_TASK_START_COUNT);
        let failed = snapshot.counter(tags::METRIC_STAGE_TASK_FAIL_COUNT);
        assert_eq!(snapshot.gauge(tags::METRIC_READY_QUEUE_DEPTH), Some(7));
        assert_eq!(snapshot.gauge(tags::METRIC_STAGE_ACTIVE_COUNT), Some(0));
        assert_eq!(started, Some(2));
        assert_eq!(failed, Some(1));

        let task_hist = snapshot
            .histogram(tags::METRIC_STAGE_TASK_LATENCY_US)
            .expect("stage task histogram missing");
        assert_eq!(task_hist.count, 2);
        assert!(task_hist.max >= task_hist.min);
    }
}

#[cfg(not(feature = "telemetry"))]
mod telemetry_disabled_tests {
    use std::time::Duration;

    use vzip_core::telemetry;
    use vzip_core::telemetry::tags;
    use vzip_core::{DefaultStageTelemetry, StageRole, StageTelemetry};

    #[test]
    fn telemetry_api_is_noop_without_feature() {
        telemetry::reset();

        telemetry::increment_counter(tags::METRIC_STAGE_TASK_START_COUNT, 7, &[]);
        telemetry::record_histogram(tags::METRIC_STAGE_TASK_LATENCY_US, 11, &[]);
        telemetry::set_gauge(tags::METRIC_READY_QUEUE_DEPTH, 3, &[]);
        telemetry::add_gauge(tags::METRIC_READY_QUEUE_DEPTH, 2, &[]);
        telemetry::sub_gauge_saturating(tags::METRIC_READY_QUEUE_DEPTH, 10, &[]);

        let stage_telemetry = DefaultStageTelemetry;
        stage_telemetry.on_queue_depth(StageRole::Consumer, 0, 7);
        stage_telemetry.on_task_started(StageRole::Consumer, 0, "compress");
        stage_telemetry.on_task_finished(
            StageRole::Consumer,
            0,
            "compress",
            Duration::from_micros(120),
        );

        let snapshot = telemetry::snapshot();
        assert!(snapshot.counters.is_empty());
        assert!(snapshot.gauges.is_empty());
        assert!(snapshot.gauge_peaks.is_empty());
        assert!(snapshot.histograms.is_empty());
        assert_eq!(snapshot.pipeline().peak_ready_depth, 0);
    }
}
