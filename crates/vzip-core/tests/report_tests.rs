mod common;

use std::io::Cursor;

use tempfile::tempdir;
use vzip_core::report::RunReport;
use vzip_core::{
    ExtractReport, FrameExtractor, FramePipeline, PipelineConfig, ReportBuildOptions,
    ReportExport, ReportValue,
};

#[test]
fn archive_run_exports_report_and_flat_map() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 8, 1024, "ppm")?;

    let pipeline = FramePipeline::new(PipelineConfig::default().with_threads(3, 2))?;
    let (_, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    let report = stats.to_report(ReportBuildOptions::default());
    assert_eq!(report.frames_total, 8);
    assert_eq!(report.nominal_input_bytes, 8 * 1024);
    assert_eq!(report.workers.len(), 5);
    assert!(report.telemetry.is_none());
    assert!(report.compression_rate > 0.0 && report.compression_rate < 100.0);

    let map = report.to_flat_map();
    assert_eq!(
        map.get("archive.frames_total"),
        Some(&ReportValue::U64(8))
    );
    assert_eq!(
        map.get("archive.worker_count"),
        Some(&ReportValue::U64(5))
    );
    assert!(matches!(
        map.get("archive.compression_rate"),
        Some(ReportValue::F64(_))
    ));
    assert!(matches!(
        map.get("worker.producer.0.tasks_completed"),
        Some(ReportValue::U64(_))
    ));
    assert!(matches!(
        map.get("worker.consumer.1.busy_us"),
        Some(ReportValue::U64(_))
    ));
    assert!(map.contains_key("thread.main.stage.partition_us"));
    assert!(map.contains_key("thread.main.stage.run_us"));
    assert!(map.contains_key("thread.main.stage.emit_us"));
    assert_eq!(
        map.get("thread.main.name"),
        Some(&ReportValue::Text("main".to_string()))
    );
    Ok(())
}

#[test]
fn telemetry_snapshot_is_attached_on_request() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 4, 512, "ppm")?;

    let pipeline = FramePipeline::new(PipelineConfig::default().with_threads(2, 2))?;
    let (_, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    let report = stats.to_report(ReportBuildOptions {
        include_telemetry_snapshot: true,
    });
    assert!(report.telemetry.is_some());
    Ok(())
}

#[test]
fn extract_report_exports_ratio() -> Result<(), Box<dyn std::error::Error>> {
    let source = tempdir()?;
    common::write_frames(source.path(), 3, 2048, "ppm")?;

    let pipeline = FramePipeline::new(PipelineConfig::default().with_threads(1, 2))?;
    let (archive, _) = pipeline.archive_directory(source.path(), Vec::new())?;

    let out = tempdir()?;
    let stats = FrameExtractor::default().extract_to_dir(Cursor::new(archive), out.path())?;
    let report = ExtractReport::from_stats(&stats, ReportBuildOptions::default());

    assert_eq!(report.entries, 3);
    assert!(report.output_archive_ratio > 1.0);

    let map = RunReport::Extract(report).to_flat_map();
    assert_eq!(map.get("extract.entries"), Some(&ReportValue::U64(3)));
    assert_eq!(
        map.get("extract.output_bytes"),
        Some(&ReportValue::U64(3 * 2048))
    );
    Ok(())
}
