mod common;

use std::fs;
use std::io::Cursor;
use std::time::Duration;

use tempfile::tempdir;
use vzip_core::compression::decompress_frame;
use vzip_core::{
    ArchiveReader, CancellationToken, CapacityPolicy, FrameExtractor, FramePipeline,
    PartitionStrategy, PipelineConfig, PipelineState, StageRole, VzipError,
};

fn config(producers: usize, consumers: usize, extension: &str) -> PipelineConfig {
    let mut config = PipelineConfig::default()
        .with_threads(producers, consumers)
        .with_extension(extension);
    config.wait_poll_interval = Duration::from_millis(5);
    config.stall_timeout = Some(Duration::from_secs(30));
    config
}

fn inflate_entries(archive: &[u8], size_hint: usize) -> vzip_core::Result<Vec<Vec<u8>>> {
    ArchiveReader::new(Cursor::new(archive))
        .map(|entry| decompress_frame(&entry?, size_hint))
        .collect()
}

#[test]
fn archives_three_frames_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let frames = common::write_frames(dir.path(), 3, 256, "frame")?;

    let pipeline = FramePipeline::new(config(2, 2, "frame"))?;
    let (archive, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(stats.frames_total, 3);
    assert_eq!(stats.frame_capacity, 256);
    assert_eq!(stats.bytes_read, 3 * 256);
    assert_eq!(stats.archive_bytes, archive.len() as u64);
    assert_eq!(stats.payload_bytes + 3 * 4, stats.archive_bytes);
    assert_eq!(stats.state, PipelineState::Closed);
    assert!(stats.compression_rate() > 0.0);

    assert_eq!(stats.producer_plan.shares().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(stats.consumer_plan.shares().collect::<Vec<_>>(), vec![1, 2]);

    assert_eq!(inflate_entries(&archive, 256)?, frames);
    Ok(())
}

#[test]
fn entry_order_follows_frame_numbers_not_file_names() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let frames = common::write_frames(dir.path(), 37, 512, "ppm")?;

    let pipeline = FramePipeline::new(config(8, 11, "ppm"))?;
    let (archive, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(stats.frames_total, 37);
    let restored = inflate_entries(&archive, 512)?;
    assert_eq!(restored.len(), 37);
    for (index, frame) in restored.iter().enumerate() {
        assert_eq!(frame, &frames[index], "entry {index}");
    }
    Ok(())
}

#[test]
fn every_thread_performs_its_planned_share() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 23, 128, "ppm")?;

    let pipeline = FramePipeline::new(config(4, 6, "ppm"))?;
    let (_, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(stats.threads.len(), 10);
    for thread in &stats.threads {
        assert_eq!(thread.tasks_completed, thread.assigned);
    }
    let produced: usize = stats
        .threads
        .iter()
        .filter(|thread| thread.role == StageRole::Producer)
        .map(|thread| thread.tasks_completed)
        .sum();
    let consumed: usize = stats
        .threads
        .iter()
        .filter(|thread| thread.role == StageRole::Consumer)
        .map(|thread| thread.tasks_completed)
        .sum();
    assert_eq!((produced, consumed), (23, 23));
    Ok(())
}

#[test]
fn more_threads_than_frames_still_completes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let frames = common::write_frames(dir.path(), 2, 200, "ppm")?;

    let pipeline = FramePipeline::new(config(8, 11, "ppm"))?;
    let (archive, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(stats.producer_plan.strategy(), PartitionStrategy::Floor);
    assert_eq!(inflate_entries(&archive, 200)?, frames);
    Ok(())
}

#[test]
fn single_frame_single_thread() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let frames = common::write_frames(dir.path(), 1, 300, "ppm")?;

    let pipeline = FramePipeline::new(config(1, 1, "ppm"))?;
    let (archive, _) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(inflate_entries(&archive, 300)?, frames);
    Ok(())
}

#[test]
fn empty_directory_produces_no_archive() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    let pipeline = FramePipeline::new(config(2, 2, "ppm"))?;
    let result = pipeline.archive_directory(dir.path(), Vec::new());

    assert!(matches!(result, Err(VzipError::EmptyInput)));
    Ok(())
}

#[test]
fn strict_ceil_partition_fails_before_threads_start() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 10, 64, "ppm")?;

    let mut config = config(8, 2, "ppm");
    config.partition = PartitionStrategy::Ceil;
    let pipeline = FramePipeline::new(config)?;

    let error = match pipeline.archive_directory(dir.path(), Vec::new()) {
        Ok(_) => panic!("ceil partition of 10 over 8 threads must fail"),
        Err(error) => error,
    };
    assert!(error.is_configuration());
    assert!(error.to_string().contains("partitioning producers"));
    Ok(())
}

#[test]
fn frames_longer_than_the_buffer_are_truncated() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("1.ppm"), common::frame_payload(1, 100))?;
    fs::write(dir.path().join("2.ppm"), common::frame_payload(2, 160))?;
    fs::write(dir.path().join("3.ppm"), common::frame_payload(3, 40))?;

    let pipeline = FramePipeline::new(config(2, 3, "ppm"))?;
    let (archive, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(stats.frame_capacity, 100);
    assert_eq!(stats.bytes_read, 100 + 100 + 40);
    let restored = inflate_entries(&archive, 100)?;
    assert_eq!(restored[0], common::frame_payload(1, 100));
    assert_eq!(restored[1], common::frame_payload(2, 100));
    assert_eq!(restored[2], common::frame_payload(3, 40));
    Ok(())
}

#[test]
fn largest_frame_capacity_keeps_every_byte() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("1.ppm"), common::frame_payload(1, 100))?;
    fs::write(dir.path().join("2.ppm"), common::frame_payload(2, 160))?;

    let mut config = config(2, 2, "ppm");
    config.capacity = CapacityPolicy::LargestFrame;
    let pipeline = FramePipeline::new(config)?;
    let (archive, stats) = pipeline.archive_directory(dir.path(), Vec::new())?;

    assert_eq!(stats.frame_capacity, 160);
    let restored = inflate_entries(&archive, 160)?;
    assert_eq!(restored[1], common::frame_payload(2, 160));
    Ok(())
}

#[test]
fn strict_mode_rejects_mismatched_frame_sizes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("1.ppm"), common::frame_payload(1, 128))?;
    fs::write(dir.path().join("2.ppm"), common::frame_payload(2, 64))?;

    let mut config = config(2, 2, "ppm");
    config.strict_frame_size = true;
    let pipeline = FramePipeline::new(config)?;

    let error = match pipeline.archive_directory(dir.path(), Vec::new()) {
        Ok(_) => panic!("size mismatch must fail in strict mode"),
        Err(error) => error,
    };
    assert!(error.to_string().contains("has 64 bytes"));
    Ok(())
}

#[test]
fn incompressible_frame_fails_without_hanging() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 6, 4096, "ppm")?;
    fs::write(
        dir.path().join("4.ppm"),
        common::pseudo_random_bytes(4096, 0x5eed),
    )?;

    let pipeline = FramePipeline::new(config(3, 4, "ppm"))?;
    let error = match pipeline.archive_directory(dir.path(), Vec::new()) {
        Ok(_) => panic!("random data cannot fit the frame buffer after deflate"),
        Err(error) => error,
    };

    assert!(!error.is_cancelled());
    let message = error.to_string();
    assert!(message.contains("codec error"), "{message}");
    assert!(message.contains("frame 4"), "{message}");
    Ok(())
}

#[test]
fn unreadable_frame_is_reported_with_its_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 5, 128, "ppm")?;

    let pipeline = FramePipeline::new(config(2, 2, "ppm"))?;
    let frames = pipeline.discover(dir.path())?;
    fs::remove_file(dir.path().join("3.ppm"))?;

    let error = match pipeline.archive_frames(frames, Vec::new()) {
        Ok(_) => panic!("missing frame file must fail the run"),
        Err(error) => error,
    };
    let message = error.to_string();
    assert!(message.contains("failed to read frame"), "{message}");
    assert!(message.contains("3.ppm"), "{message}");
    Ok(())
}

#[test]
fn cancelled_run_stops_with_cancelled_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 16, 128, "ppm")?;

    let pipeline = FramePipeline::new(config(2, 2, "ppm"))?;
    let frames = pipeline.discover(dir.path())?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = pipeline.archive_frames_cancellable(frames, Vec::new(), cancel);
    match result {
        Err(error) => assert!(error.is_cancelled(), "{error}"),
        Ok(_) => panic!("a cancelled run must not emit an archive"),
    }
    Ok(())
}

#[test]
fn inflight_window_bounds_outstanding_frames() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let frames = common::write_frames(dir.path(), 40, 256, "ppm")?;

    let mut config = config(4, 2, "ppm");
    config.max_inflight = Some(3);
    let pipeline = FramePipeline::new(config)?;
    let discovered = pipeline.discover(dir.path())?;

    let mut peak_in_flight = 0usize;
    let (archive, stats) = pipeline.archive_frames_with_progress(
        discovered,
        Vec::new(),
        Duration::from_millis(1),
        |snapshot| peak_in_flight = peak_in_flight.max(snapshot.in_flight),
    )?;

    assert!(peak_in_flight <= 3, "peak in flight {peak_in_flight}");
    assert!(stats.buffer_pool.created <= 3 + stats.buffer_pool.dropped);
    assert_eq!(inflate_entries(&archive, 256)?, frames);
    Ok(())
}

#[test]
fn progress_reports_a_complete_final_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    common::write_frames(dir.path(), 12, 256, "ppm")?;

    let pipeline = FramePipeline::new(config(3, 3, "ppm"))?;
    let frames = pipeline.discover(dir.path())?;

    let mut snapshots = Vec::new();
    pipeline.archive_frames_with_progress(
        frames,
        Vec::new(),
        Duration::from_millis(1),
        |snapshot| snapshots.push(snapshot),
    )?;

    let last = snapshots.last().ok_or("no progress snapshot")?;
    assert!(last.is_complete());
    assert_eq!(last.frames_read, 12);
    assert_eq!(last.bytes_read, 12 * 256);
    assert_eq!(last.ready_depth, 0);
    assert_eq!(last.in_flight, 0);
    Ok(())
}

#[test]
fn extracted_frames_match_the_originals() -> Result<(), Box<dyn std::error::Error>> {
    let source = tempdir()?;
    let frames = common::write_frames(source.path(), 9, 384, "ppm")?;

    let pipeline = FramePipeline::new(config(3, 2, "ppm"))?;
    let (archive, stats) = pipeline.archive_directory(source.path(), Vec::new())?;

    let restored = tempdir()?;
    let extractor = FrameExtractor::new("ppm");
    let extract = extractor.extract_to_dir(Cursor::new(archive), restored.path())?;

    assert_eq!(extract.entries, 9);
    assert_eq!(extract.archive_bytes, stats.archive_bytes);
    assert_eq!(extract.output_bytes, 9 * 384);
    for (index, frame) in frames.iter().enumerate() {
        let path = restored.path().join(format!("{}.ppm", index + 1));
        assert_eq!(&fs::read(path)?, frame);
    }
    Ok(())
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let zero_threads = PipelineConfig {
        consumer_threads: 0,
        ..PipelineConfig::default()
    };
    assert!(matches!(
        FramePipeline::new(zero_threads),
        Err(VzipError::InvalidConfig(_))
    ));

    let bad_level = PipelineConfig {
        compression_level: 10,
        ..PipelineConfig::default()
    };
    assert!(matches!(
        FramePipeline::new(bad_level),
        Err(VzipError::InvalidConfig(_))
    ));

    let no_window = PipelineConfig {
        max_inflight: Some(0),
        ..PipelineConfig::default()
    };
    assert!(matches!(
        FramePipeline::new(no_window),
        Err(VzipError::InvalidConfig(_))
    ));
}
