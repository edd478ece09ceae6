use anyhow::{Context, Result};
use boothmatte::pipeline::{CancellationToken, MattingWorker, PipelineOrchestrator};
use boothmatte::segmentation;
use boothmatte::sink::{PngDirectorySink, ResultSink};
use boothmatte::source::{FrameSource, StillSequence};
use boothmatte::{PipelineConfig, RasterBuffer};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input frames (any format the `image` crate reads)
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Background to composite the subject onto
    #[arg(short, long)]
    background: Option<PathBuf>,

    /// Path to segmentation model (ONNX file)
    /// If not provided, the heuristic color segmentation is used
    #[arg(long)]
    model: Option<PathBuf>,

    /// Pipeline configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving the output images
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,

    /// Run the frames through the throttled preview pipeline instead of the final one
    #[arg(long)]
    preview: bool,

    /// Frame rate the inputs are replayed at in preview mode
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Also write the matte as a grayscale silhouette
    #[arg(long)]
    show_matte: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("boothmatte starting");

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    tracing::info!(
        "Final max side {}, preview max side {}, confidence threshold {:.2}",
        config.max_side,
        config.preview_max_side,
        config.confidence_threshold
    );

    let background = args
        .background
        .as_ref()
        .map(|path| {
            image::open(path)
                .map(RasterBuffer::from)
                .with_context(|| format!("Failed to read background {}", path.display()))
        })
        .transpose()?;

    let engine = segmentation::create_default_engine(args.model.as_deref(), &config.model);
    tracing::info!("Segmentation strategy: {}", engine.strategy_name());

    let threads = config.worker_threads;
    let orchestrator = Arc::new(PipelineOrchestrator::new(engine, config));
    let worker = MattingWorker::spawn(Arc::clone(&orchestrator), threads);

    let mut source = StillSequence::new(args.input.clone());
    let mut sink = PngDirectorySink::new(&args.out_dir, args.show_matte)?;

    if args.preview {
        run_preview(&worker, &mut source, &mut sink, background, args.fps)?;
    } else {
        run_final(&worker, &mut source, &mut sink, background)?;
    }

    worker.shutdown();
    orchestrator.shutdown();
    tracing::info!("Outputs written to {}", args.out_dir.display());

    Ok(())
}

fn run_final<S, O>(
    worker: &MattingWorker,
    source: &mut S,
    sink: &mut O,
    background: Option<RasterBuffer>,
) -> Result<()>
where
    S: FrameSource,
    O: ResultSink,
{
    let mut index = 0usize;
    while let Some(frame) = source.next_frame()? {
        index += 1;
        let pending = worker.submit_final(frame, background.clone(), CancellationToken::new());
        let outcome = pending
            .recv()
            .context("Matting worker stopped before returning a result")?;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    "Capture {}: confidence={:.2}, external_fallback={}, total={:.1}ms",
                    index,
                    result.confidence(),
                    result.used_external_fallback(),
                    result.timings().total().as_secs_f64() * 1000.0
                );
                if result.is_failed() {
                    tracing::warn!("Capture {} could not be matted", index);
                }
                sink.write_result(&format!("capture-{index}"), &result)?;
            }
            Err(err) => tracing::warn!("Capture {} not processed: {}", index, err),
        }
    }
    Ok(())
}

fn run_preview<S, O>(
    worker: &MattingWorker,
    source: &mut S,
    sink: &mut O,
    background: Option<RasterBuffer>,
    target_fps: u32,
) -> Result<()>
where
    S: FrameSource,
    O: ResultSink,
{
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let (stream, results) = worker.preview_stream(background);
    let mut offered = 0u64;
    let mut accepted = 0u64;

    loop {
        let loop_start = Instant::now();

        let Some(frame) = source.next_frame()? else {
            break;
        };
        offered += 1;
        if stream.submit(frame).is_some() {
            accepted += 1;
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    tracing::info!("Preview: {} frame(s) offered, {} accepted", offered, accepted);
    drop(stream);

    for frame in results.iter() {
        tracing::info!(
            "Preview {}: confidence={:.2}, latency={:.1}ms",
            frame.sequence,
            frame.result.confidence(),
            frame.captured_at.elapsed().as_secs_f64() * 1000.0
        );
        sink.write_result(&format!("preview-{}", frame.sequence), &frame.result)?;
    }
    Ok(())
}
