use super::cancel::CancellationToken;
use super::remote::{remote_matte, RemoteMatting};
use super::result::{MattingResult, Stage, StageTimings};
use crate::compositor::Compositor;
use crate::confidence::ConfidenceScorer;
use crate::config::PipelineConfig;
use crate::error::{MatteError, Result};
use crate::postprocess::MattePostProcessor;
use crate::profile::ProfileKind;
use crate::raster::{AlphaMatte, RasterBuffer};
use crate::segmentation::SegmentationEngine;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Sequences segmentation, refinement, scoring, optional remote fallback and
/// compositing.
///
/// Holds no per-call state: one instance can serve any number of concurrent
/// pipeline runs.
pub struct PipelineOrchestrator {
    engine: SegmentationEngine,
    postprocessor: MattePostProcessor,
    scorer: ConfidenceScorer,
    remote: Option<Arc<dyn RemoteMatting>>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(engine: SegmentationEngine, config: PipelineConfig) -> Self {
        Self {
            engine,
            postprocessor: MattePostProcessor::new(),
            scorer: ConfidenceScorer::new(),
            remote: None,
            config,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteMatting>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &SegmentationEngine {
        &self.engine
    }

    /// High-quality pipeline for a single capture.
    ///
    /// Processing failures never surface as errors: they produce a
    /// zero-confidence result. The only error is `MatteError::Cancelled`,
    /// returned when `cancel` fires between stages.
    pub fn process_final(
        &self,
        input: &RasterBuffer,
        background: Option<&RasterBuffer>,
        cancel: &CancellationToken,
    ) -> Result<MattingResult> {
        let _span = tracing::info_span!("final_pipeline").entered();

        let mut timings = StageTimings::default();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.run_final(input, background, cancel, &mut timings)
        }));
        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(Failure::Cancelled)) => {
                tracing::info!("final pipeline cancelled");
                Err(MatteError::Cancelled)
            }
            Ok(Err(Failure::Stage)) => Ok(MattingResult::failed(ProfileKind::Final, timings)),
            Err(_) => {
                tracing::error!("final pipeline panicked, returning empty result");
                Ok(MattingResult::failed(ProfileKind::Final, timings))
            }
        }
    }

    /// Low-latency pipeline for live frames. Never cancelled, never fails:
    /// errors produce a zero-confidence result.
    pub fn process_preview(
        &self,
        frame: &RasterBuffer,
        background: Option<&RasterBuffer>,
    ) -> MattingResult {
        let _span = tracing::debug_span!("preview_pipeline").entered();

        let mut timings = StageTimings::default();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.run_preview(frame, background, &mut timings)
        }));
        match outcome {
            Ok(Some(result)) => result,
            Ok(None) => MattingResult::failed(ProfileKind::Preview, timings),
            Err(_) => {
                tracing::error!("preview pipeline panicked, returning empty result");
                MattingResult::failed(ProfileKind::Preview, timings)
            }
        }
    }

    /// Release the inference session. Called once when the host shuts down.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    fn run_final(
        &self,
        input: &RasterBuffer,
        background: Option<&RasterBuffer>,
        cancel: &CancellationToken,
        timings: &mut StageTimings,
    ) -> std::result::Result<MattingResult, Failure> {
        let profile = &self.config.final_profile;

        cancel.check()?;
        let working = timings.measure(Stage::Preprocess, || input.fit_within(self.config.max_side));

        cancel.check()?;
        let raw = timings.measure_result(Stage::Segment, || self.engine.try_infer(&working));
        let raw = stage_output(raw, Stage::Segment)?;

        cancel.check()?;
        let refined =
            timings.measure_result(Stage::Postprocess, || self.postprocessor.refine(&raw, profile));
        drop(raw);
        let refined = stage_output(refined, Stage::Postprocess)?;

        cancel.check()?;
        let mut confidence = timings.measure(Stage::Score, || self.scorer.score(&refined));
        let mut matte = refined;
        let mut used_external_fallback = false;

        if confidence < self.config.confidence_threshold {
            if let Some(remote) = self.remote_candidate() {
                cancel.check()?;
                tracing::info!(confidence, "local confidence below threshold, trying remote matting");
                match timings.measure_result(Stage::RemoteFallback, || {
                    remote_matte(remote.as_ref(), &working)
                }) {
                    Ok(replacement) => {
                        matte = replacement;
                        confidence = 1.0;
                        used_external_fallback = true;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "remote matting failed, keeping local matte");
                    }
                }
            } else {
                tracing::debug!(confidence, "low confidence, remote fallback not available");
            }
        }

        cancel.check()?;
        let compositor = Compositor::for_profile(profile);
        let composed = timings.measure_result(Stage::Compose, || {
            compose_outputs(&compositor, &working, background, &matte)
        });
        let (foreground, composite) = stage_output(composed, Stage::Compose)?;

        let mut result = MattingResult::empty(ProfileKind::Final);
        result.timings = std::mem::take(timings);
        result.foreground = Some(foreground);
        result.composite = composite;
        result.matte = Some(matte);
        result.confidence = confidence;
        result.used_external_fallback = used_external_fallback;

        tracing::info!(
            confidence,
            used_external_fallback,
            elapsed_ms = result.timings.total().as_secs_f64() * 1000.0,
            "final pipeline finished"
        );
        Ok(result)
    }

    /// `None` when a stage failed; the caller builds the degraded result.
    fn run_preview(
        &self,
        frame: &RasterBuffer,
        background: Option<&RasterBuffer>,
        timings: &mut StageTimings,
    ) -> Option<MattingResult> {
        let profile = &self.config.preview;

        let fail = |stage: Stage, err: MatteError| {
            tracing::warn!(stage = stage.as_str(), error = %err, "preview stage failed");
        };

        let working = timings.measure(Stage::Preprocess, || {
            frame.fit_within(self.config.preview_max_side)
        });

        let raw = timings
            .measure_result(Stage::Segment, || self.engine.try_infer(&working))
            .map_err(|e| fail(Stage::Segment, e))
            .ok()?;

        let matte = timings
            .measure_result(Stage::Postprocess, || self.postprocessor.refine(&raw, profile))
            .map_err(|e| fail(Stage::Postprocess, e))
            .ok()?;

        let confidence = timings.measure(Stage::Score, || self.scorer.score(&matte));

        let compositor = Compositor::for_profile(profile);
        let (foreground, composite) = timings
            .measure_result(Stage::Compose, || {
                compose_outputs(&compositor, &working, background, &matte)
            })
            .map_err(|e| fail(Stage::Compose, e))
            .ok()?;

        let mut result = MattingResult::empty(ProfileKind::Preview);
        result.timings = std::mem::take(timings);
        result.foreground = Some(foreground);
        result.composite = composite;
        result.matte = Some(matte);
        result.confidence = confidence;
        Some(result)
    }

    fn remote_candidate(&self) -> Option<&Arc<dyn RemoteMatting>> {
        if !self.config.remote_fallback_enabled {
            return None;
        }
        self.remote.as_ref().filter(|remote| remote.is_available())
    }
}

/// Why a final run stopped early.
enum Failure {
    Cancelled,
    /// A stage failed; the caller hands back a degraded result.
    Stage,
}

impl From<MatteError> for Failure {
    fn from(err: MatteError) -> Self {
        match err {
            MatteError::Cancelled => Failure::Cancelled,
            other => {
                tracing::warn!(error = %other, "final pipeline failed");
                Failure::Stage
            }
        }
    }
}

fn stage_output<T>(output: Result<T>, stage: Stage) -> std::result::Result<T, Failure> {
    output.map_err(|err| {
        tracing::warn!(stage = stage.as_str(), error = %err, "final stage failed");
        Failure::Stage
    })
}

fn compose_outputs(
    compositor: &Compositor,
    working: &RasterBuffer,
    background: Option<&RasterBuffer>,
    matte: &AlphaMatte,
) -> Result<(RasterBuffer, Option<RasterBuffer>)> {
    let foreground = compositor.cutout(working, matte)?;
    let composite = background
        .map(|bg| compositor.compose(working, bg, matte))
        .transpose()?;
    Ok((foreground, composite))
}
