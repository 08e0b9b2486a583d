use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vzip_core::pipeline::{
    DEFAULT_ARCHIVE_NAME, DEFAULT_CONSUMER_THREADS, DEFAULT_PRODUCER_THREADS,
};
use vzip_core::telemetry;
use vzip_core::{
    ArchiveRunStats, CapacityPolicy, FrameExtractor, FramePipeline, PartitionStrategy,
    PipelineConfig, ProgressSnapshot, ReportBuildOptions, ReportExport, StageRole,
};

#[derive(Parser)]
#[command(
    name = "vzip",
    version,
    about = "Compress a directory of numbered frames into a single archive",
    long_about = "Reads every <n>.<ext> frame from a directory with a pool of producer threads, \
compresses them with a pool of consumer threads and writes one length-prefixed zlib entry \
per frame, in frame order.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    compress: CompressArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore numbered frames from an archive.
    Extract {
        /// Archive produced by `vzip`.
        archive: PathBuf,

        /// Directory that receives the restored frames.
        #[arg(short, long, default_value = "frames")]
        output: PathBuf,

        /// Extension given to restored frames.
        #[arg(long, default_value = "ppm")]
        extension: String,

        /// Print the flat report after extracting.
        #[arg(long)]
        summary: bool,
    },
}

#[derive(Args)]
struct CompressArgs {
    /// Directory holding the numbered frames.
    source: Option<PathBuf>,

    /// Archive path.
    #[arg(short, long, default_value = DEFAULT_ARCHIVE_NAME)]
    output: PathBuf,

    /// Number of producer (reader) threads.
    #[arg(long, default_value_t = DEFAULT_PRODUCER_THREADS)]
    producers: usize,

    /// Number of consumer (compressor) threads.
    #[arg(long, default_value_t = DEFAULT_CONSUMER_THREADS)]
    consumers: usize,

    /// zlib compression level (0-9).
    #[arg(long, default_value_t = 9)]
    level: u32,

    /// Frame file extension.
    #[arg(long, default_value = "ppm")]
    extension: String,

    /// How frame counts are split across threads.
    #[arg(long, value_enum, default_value_t = PartitionArg::Auto)]
    partition: PartitionArg,

    /// Fixed per-frame buffer size in bytes (defaults to the size of frame 1).
    #[arg(long)]
    frame_size: Option<usize>,

    /// Fail when a frame differs in size from the buffer size.
    #[arg(long)]
    strict: bool,

    /// Upper bound on frames read but not yet compressed.
    #[arg(long)]
    max_inflight: Option<usize>,

    /// Fail if a thread waits longer than this without progress.
    #[arg(long)]
    stall_timeout_ms: Option<u64>,

    /// Stream a progress line to stderr while running.
    #[arg(long)]
    progress: bool,

    /// Print per-thread statistics after archiving.
    #[arg(long)]
    summary: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PartitionArg {
    Auto,
    Ceil,
    Floor,
}

impl From<PartitionArg> for PartitionStrategy {
    fn from(value: PartitionArg) -> Self {
        match value {
            PartitionArg::Auto => PartitionStrategy::Auto,
            PartitionArg::Ceil => PartitionStrategy::Ceil,
            PartitionArg::Floor => PartitionStrategy::Floor,
        }
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Extract {
            archive,
            output,
            extension,
            summary,
        }) => extract_command(&archive, &output, &extension, summary),
        None => compress_command(cli.compress),
    }
}

fn compress_command(args: CompressArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source = args
        .source
        .clone()
        .ok_or("missing frame directory (usage: vzip <SOURCE>)")?;

    let mut config = PipelineConfig::default()
        .with_threads(args.producers, args.consumers)
        .with_extension(args.extension.as_str());
    config.compression_level = args.level;
    config.partition = args.partition.into();
    config.strict_frame_size = args.strict;
    config.max_inflight = args.max_inflight;
    config.stall_timeout = args.stall_timeout_ms.map(Duration::from_millis);
    if let Some(size) = args.frame_size {
        config.capacity = CapacityPolicy::Fixed(size);
    }

    let pipeline = FramePipeline::new(config)?;
    let frames = pipeline.discover(&source)?;
    if args.progress {
        eprintln!(
            "found {} frames ({}) in {}",
            frames.len(),
            format_bytes(frames.total_size()),
            source.display()
        );
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let output = BufWriter::new(File::create(&args.output)?);

    let result = if args.progress {
        pipeline.archive_frames_with_progress(
            frames,
            output,
            Duration::from_millis(250),
            print_progress,
        )
    } else {
        pipeline.archive_frames(frames, output)
    };

    let stats = match result {
        Ok((mut writer, stats)) => {
            writer.flush()?;
            stats
        }
        Err(error) => {
            let _ = fs::remove_file(&args.output);
            return Err(error.into());
        }
    };

    if args.progress {
        eprintln!();
    }
    println!("Compression rate: {:.2}%", stats.compression_rate());
    println!("Time: {:.2} seconds", stats.elapsed.as_secs_f64());

    if args.summary {
        print_summary(&source, &args.output, &stats);
    }

    Ok(())
}

fn print_progress(snapshot: ProgressSnapshot) {
    let percent = if snapshot.frames_total > 0 {
        snapshot.frames_compressed as f64 / snapshot.frames_total as f64 * 100.0
    } else {
        100.0
    };
    let elapsed_secs = snapshot.elapsed.as_secs_f64().max(1e-6);
    let line = format!(
        "\r\x1b[2K[{percent:6.2}%] read {}/{} | compressed {}/{} | in {} ({}/s) | out {} | ready {} | in flight {} | {}",
        snapshot.frames_read,
        snapshot.frames_total,
        snapshot.frames_compressed,
        snapshot.frames_total,
        format_bytes(snapshot.bytes_read),
        format_rate(snapshot.bytes_read as f64 / elapsed_secs),
        format_bytes(snapshot.bytes_compressed),
        snapshot.ready_depth,
        snapshot.in_flight,
        format_duration(snapshot.elapsed),
    );
    eprint!("{line}");
    let _ = io::stderr().flush();
}

fn extract_command(
    archive: &Path,
    output: &Path,
    extension: &str,
    summary: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = FrameExtractor::new(extension);
    let stats = extractor.extract_to_dir(File::open(archive)?, output)?;

    println!("extract complete");
    println!("  archive: {}", archive.display());
    println!("  output: {}", output.display());
    println!("  frames: {}", stats.entries);
    println!("  archive bytes: {}", format_bytes(stats.archive_bytes));
    println!("  restored bytes: {}", format_bytes(stats.output_bytes));
    println!("  elapsed: {}", format_duration(stats.elapsed));

    if summary {
        let report = vzip_core::ExtractReport::from_stats(&stats, ReportBuildOptions::default());
        for (key, value) in report.to_flat_map() {
            println!("  {key}: {value:?}");
        }
    }
    Ok(())
}

fn print_summary(source: &Path, output: &Path, stats: &ArchiveRunStats) {
    let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);

    println!("archive complete");
    println!("  source: {}", source.display());
    println!("  output: {}", output.display());
    println!("  elapsed: {}", format_duration(stats.elapsed));
    println!(
        "  frames: {} (buffer {})",
        stats.frames_total,
        format_bytes(stats.frame_capacity as u64)
    );
    println!("  bytes read: {}", format_bytes(stats.bytes_read));
    println!("  payload bytes: {}", format_bytes(stats.payload_bytes));
    println!("  archive bytes: {}", format_bytes(stats.archive_bytes));
    println!(
        "  read throughput: {}/s",
        format_rate(stats.bytes_read as f64 / elapsed_secs)
    );
    println!(
        "  producers: {} threads, {} frames each, {} on thread 0",
        stats.producer_plan.threads(),
        stats.producer_plan.regular(),
        stats.producer_plan.remainder()
    );
    println!(
        "  consumers: {} threads, {} frames each, {} on thread 0",
        stats.consumer_plan.threads(),
        stats.consumer_plan.regular(),
        stats.consumer_plan.remainder()
    );

    for role in [StageRole::Producer, StageRole::Consumer] {
        println!("  {role} runtime:");
        for thread in stats.threads.iter().filter(|thread| thread.role == role) {
            println!(
                "    t{:02} frames {:>6} | uptime {:>8} | busy {:>8} | idle {:>8} | util {:>6.2}%",
                thread.thread_id,
                thread.tasks_completed,
                format_duration(thread.uptime),
                format_duration(thread.busy),
                format_duration(thread.idle),
                thread.utilization * 100.0,
            );
        }
    }

    let pool = &stats.buffer_pool;
    println!(
        "  buffer pool: created {} | recycled {} | dropped {}",
        pool.created, pool.recycled, pool.dropped
    );

    let pipeline = telemetry::snapshot().pipeline();
    if pipeline.frames_read > 0 {
        println!(
            "  peaks: ready queue {} | active tasks {}",
            pipeline.peak_ready_depth, pipeline.peak_active_tasks
        );
    }

    let flat = stats.to_flat_map(ReportBuildOptions::default());
    for (key, value) in &flat {
        if key.starts_with("thread.main.stage") {
            println!("  {key}: {value:?}");
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
