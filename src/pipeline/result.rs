use crate::profile::ProfileKind;
use crate::raster::{AlphaMatte, RasterBuffer};
use std::time::{Duration, Instant};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Preprocess,
    Segment,
    Postprocess,
    Score,
    RemoteFallback,
    Compose,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::Segment => "segment",
            Self::Postprocess => "postprocess",
            Self::Score => "score",
            Self::RemoteFallback => "remote_fallback",
            Self::Compose => "compose",
        }
    }
}

/// Elapsed time per executed stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    entries: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.entries.push((stage, elapsed));
    }

    /// Run `f`, recording how long it took under `stage`.
    ///
    /// The stage is recorded even when `f` panics.
    pub fn measure<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        self.timed(stage, f, |_| "ok")
    }

    /// Like [`measure`](Self::measure) for fallible stages; the logged
    /// outcome is `ok` or `error`.
    pub fn measure_result<T, E>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        self.timed(stage, f, |out| if out.is_ok() { "ok" } else { "error" })
    }

    fn timed<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> T,
        outcome: impl FnOnce(&T) -> &'static str,
    ) -> T {
        let mut clock = StageClock {
            timings: self,
            stage,
            start: Instant::now(),
            outcome: "ok",
        };
        let out = f();
        clock.outcome = outcome(&out);
        out
    }

    pub fn get(&self, stage: Stage) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }

    pub fn total(&self) -> Duration {
        self.entries.iter().map(|(_, d)| *d).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        self.entries.iter().copied()
    }
}

/// Records a stage on drop, so unwinding through it still leaves a timing.
struct StageClock<'a> {
    timings: &'a mut StageTimings,
    stage: Stage,
    start: Instant,
    outcome: &'static str,
}

impl Drop for StageClock<'_> {
    fn drop(&mut self) {
        let outcome = if std::thread::panicking() {
            "panicked"
        } else {
            self.outcome
        };
        let elapsed = self.start.elapsed();
        self.timings.record(self.stage, elapsed);
        tracing::debug!(
            stage = self.stage.as_str(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            outcome,
            "stage finished"
        );
    }
}

/// Outcome of one pipeline run.
///
/// Populated stage by stage by the orchestrator and read-only afterwards.
/// A failed run carries zero confidence and no buffers.
#[derive(Debug, Clone)]
pub struct MattingResult {
    pub(crate) profile: ProfileKind,
    pub(crate) foreground: Option<RasterBuffer>,
    pub(crate) composite: Option<RasterBuffer>,
    pub(crate) matte: Option<AlphaMatte>,
    pub(crate) confidence: f32,
    pub(crate) timings: StageTimings,
    pub(crate) used_external_fallback: bool,
}

impl MattingResult {
    pub(crate) fn empty(profile: ProfileKind) -> Self {
        Self {
            profile,
            foreground: None,
            composite: None,
            matte: None,
            confidence: 0.0,
            timings: StageTimings::default(),
            used_external_fallback: false,
        }
    }

    /// Zero-confidence result keeping only the timings gathered so far.
    pub(crate) fn failed(profile: ProfileKind, timings: StageTimings) -> Self {
        Self {
            timings,
            ..Self::empty(profile)
        }
    }

    pub fn profile(&self) -> ProfileKind {
        self.profile
    }

    /// Isolated subject with the matte in its alpha channel.
    pub fn foreground(&self) -> Option<&RasterBuffer> {
        self.foreground.as_ref()
    }

    /// Subject blended onto the supplied background, fully opaque.
    pub fn composite(&self) -> Option<&RasterBuffer> {
        self.composite.as_ref()
    }

    pub fn matte(&self) -> Option<&AlphaMatte> {
        self.matte.as_ref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn used_external_fallback(&self) -> bool {
        self.used_external_fallback
    }

    pub fn is_failed(&self) -> bool {
        self.matte.is_none()
    }

    /// Hand the buffers over to the caller.
    pub fn into_buffers(self) -> (Option<RasterBuffer>, Option<RasterBuffer>, Option<AlphaMatte>) {
        (self.foreground, self.composite, self.matte)
    }
}
