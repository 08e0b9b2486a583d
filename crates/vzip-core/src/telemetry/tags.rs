/// Tracing target for orchestrator lifecycle events.
pub const TARGET_PIPELINE: &str = "vzip.pipeline";
/// Tracing target for producer and consumer thread events.
pub const TARGET_STAGE: &str = "vzip.stage";
/// Tracing target for directory discovery.
pub const TARGET_SCANNER: &str = "vzip.scanner";
/// Tracing target for codec calls.
pub const TARGET_CODEC: &str = "vzip.codec";
/// Tracing target for buffer pool events.
pub const TARGET_BUFFER: &str = "vzip.buffer";
/// Tracing target for archive extraction.
pub const TARGET_EXTRACT: &str = "vzip.extract";

pub const METRIC_SCAN_FRAME_COUNT: &str = "vzip.scan.frame.count";
pub const METRIC_SCAN_SKIPPED_COUNT: &str = "vzip.scan.skipped.count";
pub const METRIC_SCAN_LATENCY_US: &str = "vzip.scan.latency_us";

pub const METRIC_BUFFER_ACQUIRE_CREATED_COUNT: &str = "vzip.buffer.acquire.created.count";
pub const METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT: &str = "vzip.buffer.acquire.recycled.count";
pub const METRIC_BUFFER_RECYCLE_OK_COUNT: &str = "vzip.buffer.recycle.ok.count";
pub const METRIC_BUFFER_RECYCLE_DROPPED_COUNT: &str = "vzip.buffer.recycle.dropped.count";
pub const METRIC_BUFFER_POOL_ESTIMATED_BYTES: &str = "vzip.buffer.pool.estimated_bytes";

pub const METRIC_PRODUCER_READ_COUNT: &str = "vzip.producer.read.count";
pub const METRIC_PRODUCER_READ_BYTES: &str = "vzip.producer.read.bytes";
pub const METRIC_CONSUMER_COMPRESS_COUNT: &str = "vzip.consumer.compress.count";
pub const METRIC_CODEC_INPUT_BYTES: &str = "vzip.codec.input.bytes";
pub const METRIC_CODEC_OUTPUT_BYTES: &str = "vzip.codec.output.bytes";
pub const METRIC_CODEC_FAILURE_COUNT: &str = "vzip.codec.failure.count";
pub const METRIC_CODEC_LATENCY_US: &str = "vzip.codec.latency_us";

pub const METRIC_STAGE_TASK_START_COUNT: &str = "vzip.stage.task.start.count";
pub const METRIC_STAGE_TASK_FINISH_COUNT: &str = "vzip.stage.task.finish.count";
pub const METRIC_STAGE_TASK_FAIL_COUNT: &str = "vzip.stage.task.fail.count";
pub const METRIC_STAGE_TASK_LATENCY_US: &str = "vzip.stage.task.latency_us";
pub const METRIC_STAGE_ACTIVE_COUNT: &str = "vzip.stage.active.count";
pub const METRIC_READY_QUEUE_DEPTH: &str = "vzip.ready_queue.depth";
pub const METRIC_READY_QUEUE_DEPTH_HIST: &str = "vzip.ready_queue.depth.hist";

pub const METRIC_ARCHIVE_RUN_COUNT: &str = "vzip.archive.run.count";
pub const METRIC_ARCHIVE_ENTRY_COUNT: &str = "vzip.archive.entry.count";
pub const METRIC_ARCHIVE_BYTES: &str = "vzip.archive.bytes";
pub const METRIC_ARCHIVE_LATENCY_US: &str = "vzip.archive.latency_us";
pub const METRIC_EXTRACT_ENTRY_COUNT: &str = "vzip.extract.entry.count";
