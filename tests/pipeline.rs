mod common;

use boothmatte::error::{MatteError, Result};
use boothmatte::pipeline::{
    CancellationToken, MattingWorker, PipelineOrchestrator, RemoteMatting, Stage,
};
use boothmatte::segmentation::SegmentationModel;
use boothmatte::{AlphaMatte, PipelineConfig, RasterBuffer, SegmentationEngine};
use common::synthetic::{center_block, solid};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct FailingSegmenter;

impl SegmentationModel for FailingSegmenter {
    fn segment(&self, _frame: &RasterBuffer) -> Result<AlphaMatte> {
        Err(MatteError::inference("no model loaded"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Always returns an all-transparent matte, which scores low.
struct EmptySegmenter;

impl SegmentationModel for EmptySegmenter {
    fn segment(&self, frame: &RasterBuffer) -> Result<AlphaMatte> {
        Ok(AlphaMatte::transparent(frame.width(), frame.height()))
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}

/// Takes longer than the preview interval for every frame.
struct SlowSegmenter(Duration);

impl SegmentationModel for SlowSegmenter {
    fn segment(&self, frame: &RasterBuffer) -> Result<AlphaMatte> {
        std::thread::sleep(self.0);
        Ok(AlphaMatte::filled(frame.width(), frame.height(), 255))
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

struct PanickingSegmenter;

impl SegmentationModel for PanickingSegmenter {
    fn segment(&self, _frame: &RasterBuffer) -> Result<AlphaMatte> {
        panic!("segmenter crashed")
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// Remote service answering with a fixed alpha value.
struct FixedRemote {
    available: bool,
    alpha: Option<u8>,
    calls: AtomicUsize,
}

impl FixedRemote {
    fn new(available: bool, alpha: Option<u8>) -> Self {
        Self {
            available,
            alpha,
            calls: AtomicUsize::new(0),
        }
    }
}

impl RemoteMatting for FixedRemote {
    fn is_available(&self) -> bool {
        self.available
    }

    fn remove_background(&self, png: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(alpha) = self.alpha else {
            return Err(MatteError::RemoteFallbackFailure("service unavailable".into()));
        };
        let request = image::load_from_memory(png)?;
        let (w, h) = (request.width(), request.height());
        let response = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, alpha]));
        let mut bytes = Cursor::new(Vec::new());
        response.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }
}

fn orchestrator(model: Box<dyn SegmentationModel>, config: PipelineConfig) -> PipelineOrchestrator {
    PipelineOrchestrator::new(SegmentationEngine::from_model(model), config)
}

fn low_confidence_config(remote_enabled: bool) -> PipelineConfig {
    PipelineConfig {
        confidence_threshold: 0.9,
        remote_fallback_enabled: remote_enabled,
        ..PipelineConfig::default()
    }
}

#[test]
fn final_pipeline_produces_cutout_and_composite() {
    let orchestrator = PipelineOrchestrator::new(SegmentationEngine::heuristic(), PipelineConfig::default());
    let frame = center_block(150, 50, [210, 60, 40], [30, 90, 200]);
    let background = solid(150, 150, [0, 255, 0]);

    let result = orchestrator
        .process_final(&frame, Some(&background), &CancellationToken::new())
        .unwrap();

    assert!(!result.is_failed());
    assert!(result.confidence() > 0.0 && result.confidence() <= 1.0);
    assert!(!result.used_external_fallback());

    let cutout = result.foreground().unwrap();
    assert_eq!(cutout.dimensions(), (150, 150));
    assert_eq!(cutout.rgba(75, 75)[3], 255);
    assert_eq!(cutout.rgba(2, 2)[3], 0);

    let composite = result.composite().unwrap();
    assert_eq!(composite.rgba(75, 75), [210, 60, 40, 255]);
    assert_eq!(composite.rgba(2, 2), [0, 255, 0, 255]);

    for stage in [Stage::Preprocess, Stage::Segment, Stage::Postprocess, Stage::Score, Stage::Compose] {
        assert!(result.timings().get(stage).is_some(), "missing timing for {stage:?}");
    }
    assert!(result.timings().get(Stage::RemoteFallback).is_none());
}

#[test]
fn large_inputs_are_downscaled() {
    let config = PipelineConfig {
        max_side: 100,
        ..PipelineConfig::default()
    };
    let orchestrator = PipelineOrchestrator::new(SegmentationEngine::heuristic(), config);
    let frame = center_block(300, 100, [250, 250, 250], [5, 5, 5]);
    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();
    assert_eq!(result.matte().unwrap().dimensions(), (100, 100));
    assert!(result.composite().is_none());
}

#[test]
fn segmentation_failure_yields_zero_confidence() {
    let remote = Arc::new(FixedRemote::new(true, Some(255)));
    let orchestrator = orchestrator(Box::new(FailingSegmenter), low_confidence_config(true))
        .with_remote(remote.clone());
    let frame = solid(64, 64, [100, 100, 100]);

    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();

    assert_eq!(result.confidence(), 0.0);
    assert!(!result.used_external_fallback());
    assert!(result.is_failed());
    assert!(result.foreground().is_none());
    assert!(result.timings().get(Stage::Segment).is_some());
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_stage_keeps_earlier_timings() {
    let orchestrator = orchestrator(Box::new(PanickingSegmenter), PipelineConfig::default());
    let frame = solid(32, 32, [100, 100, 100]);

    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();
    assert!(result.is_failed());
    assert_eq!(result.confidence(), 0.0);
    assert!(result.timings().get(Stage::Preprocess).is_some());
    assert!(result.timings().get(Stage::Segment).is_some());
    assert!(result.timings().get(Stage::Postprocess).is_none());

    let preview = orchestrator.process_preview(&frame, None);
    assert!(preview.is_failed());
    assert!(preview.timings().get(Stage::Preprocess).is_some());
}

#[test]
fn low_confidence_without_fallback_keeps_local_result() {
    let remote = Arc::new(FixedRemote::new(true, Some(255)));
    let orchestrator = orchestrator(Box::new(EmptySegmenter), low_confidence_config(false))
        .with_remote(remote.clone());
    let frame = solid(64, 64, [100, 100, 100]);

    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();

    assert!(result.confidence() < 0.9);
    assert!(result.confidence() > 0.0);
    assert!(!result.used_external_fallback());
    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn remote_fallback_replaces_low_confidence_matte() {
    let remote = Arc::new(FixedRemote::new(true, Some(200)));
    let orchestrator = orchestrator(Box::new(EmptySegmenter), low_confidence_config(true))
        .with_remote(remote.clone());
    let frame = solid(48, 32, [100, 100, 100]);

    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert!(result.used_external_fallback());
    assert_eq!(result.confidence(), 1.0);
    let matte = result.matte().unwrap();
    assert_eq!(matte.dimensions(), (48, 32));
    assert!(matte.as_bytes().iter().all(|&v| v == 200));
    assert!(result.timings().get(Stage::RemoteFallback).is_some());
}

#[test]
fn remote_failure_keeps_local_result() {
    let remote = Arc::new(FixedRemote::new(true, None));
    let orchestrator = orchestrator(Box::new(EmptySegmenter), low_confidence_config(true))
        .with_remote(remote.clone());
    let frame = solid(32, 32, [100, 100, 100]);

    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert!(!result.used_external_fallback());
    assert!(!result.is_failed());
    assert!(result.confidence() < 0.9);
}

#[test]
fn unreachable_remote_is_not_called() {
    let remote = Arc::new(FixedRemote::new(false, Some(255)));
    let orchestrator = orchestrator(Box::new(EmptySegmenter), low_confidence_config(true))
        .with_remote(remote.clone());
    let frame = solid(32, 32, [100, 100, 100]);

    let result = orchestrator
        .process_final(&frame, None, &CancellationToken::new())
        .unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    assert!(!result.used_external_fallback());
}

#[test]
fn cancelled_run_returns_no_result() {
    let orchestrator = PipelineOrchestrator::new(SegmentationEngine::heuristic(), PipelineConfig::default());
    let frame = solid(32, 32, [100, 100, 100]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = orchestrator.process_final(&frame, None, &cancel);
    assert!(matches!(outcome, Err(MatteError::Cancelled)));
}

#[test]
fn preview_pipeline_failure_is_degraded_not_fatal() {
    let orchestrator = orchestrator(Box::new(FailingSegmenter), PipelineConfig::default());
    let result = orchestrator.process_preview(&solid(32, 32, [1, 2, 3]), None);
    assert_eq!(result.confidence(), 0.0);
    assert!(result.is_failed());
}

#[test]
fn worker_delivers_final_result_asynchronously() {
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        SegmentationEngine::heuristic(),
        PipelineConfig::default(),
    ));
    let worker = MattingWorker::spawn(orchestrator, 2);
    let frame = center_block(80, 30, [240, 10, 10], [10, 10, 240]);

    let pending = worker.submit_final(frame, None, CancellationToken::new());
    let result = pending
        .recv_timeout(Duration::from_secs(30))
        .expect("worker replied")
        .expect("not cancelled");
    assert!(!result.is_failed());
    worker.shutdown();
}

#[test]
fn throttled_preview_frame_is_dropped() {
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        SegmentationEngine::heuristic(),
        PipelineConfig::default(),
    ));
    let worker = MattingWorker::spawn(orchestrator, 1);
    let (stream, results) = worker.preview_stream(None);
    let frame = center_block(64, 24, [240, 240, 240], [0, 0, 0]);

    let t0 = Instant::now();
    assert_eq!(stream.submit_at(frame.clone(), t0), Some(1));
    assert_eq!(stream.submit_at(frame.clone(), t0 + Duration::from_millis(50)), None);
    drop(stream);

    let delivered: Vec<_> = results.iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].sequence, 1);
}

#[test]
fn spaced_preview_frames_are_all_processed() {
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        SegmentationEngine::heuristic(),
        PipelineConfig::default(),
    ));
    let worker = MattingWorker::spawn(orchestrator, 1);
    let (stream, results) = worker.preview_stream(Some(solid(64, 64, [0, 255, 0])));
    let frame = center_block(64, 24, [240, 240, 240], [0, 0, 0]);

    let t0 = Instant::now();
    assert_eq!(stream.submit_at(frame.clone(), t0), Some(1));
    let first = results.recv_timeout(Duration::from_secs(30)).expect("first preview");
    assert_eq!(first.sequence, 1);

    assert_eq!(stream.submit_at(frame, t0 + Duration::from_millis(120)), Some(2));
    assert_eq!(stream.last_frame().map(|f| f.sequence), Some(2));
    drop(stream);

    let second: Vec<_> = results.iter().collect();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].sequence, 2);
    assert!(first.result.composite().is_some());
    assert!(second[0].result.composite().is_some());
}

#[test]
fn preview_frames_are_dropped_while_previous_is_processing() {
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        SegmentationEngine::from_model(Box::new(SlowSegmenter(Duration::from_millis(400)))),
        PipelineConfig::default(),
    ));
    let worker = MattingWorker::spawn(orchestrator, 1);
    let (stream, results) = worker.preview_stream(None);
    let frame = solid(32, 32, [90, 90, 90]);

    // Arrival times are spaced past the throttle interval, but the first
    // frame is still being segmented when the others arrive.
    let t0 = Instant::now();
    assert_eq!(stream.submit_at(frame.clone(), t0), Some(1));
    let mut accepted = 1;
    for i in 1..10u64 {
        let arrival = t0 + Duration::from_millis(125 * i);
        if stream.submit_at(frame.clone(), arrival).is_some() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    let first = results.recv_timeout(Duration::from_secs(30)).expect("first preview");
    assert_eq!(first.sequence, 1);

    // Once the result is out, the next spaced frame is accepted again.
    let later = t0 + Duration::from_millis(2000);
    assert_eq!(stream.submit_at(frame, later), Some(2));
    drop(stream);
    let rest: Vec<u64> = results.iter().map(|f| f.sequence).collect();
    assert_eq!(rest, vec![2]);
}
