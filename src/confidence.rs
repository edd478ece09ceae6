//! Reliability score for a refined matte.
//!
//! Three sub-metrics are combined as a fixed weighted sum:
//! edge quality (0.40), coverage (0.35) and consistency (0.25).

use crate::raster::AlphaMatte;

const EDGE_WEIGHT: f32 = 0.40;
const COVERAGE_WEIGHT: f32 = 0.35;
const CONSISTENCY_WEIGHT: f32 = 0.25;

/// Transition pixels lie strictly inside this band.
const TRANSITION_LOW: u8 = 10;
const TRANSITION_HIGH: u8 = 245;
/// Mean normalized gradient of a crisp but anti-aliased edge.
const EXPECTED_GRADIENT: f32 = 0.3;
const NEUTRAL_EDGE_SCORE: f32 = 0.5;

const OPAQUE_THRESHOLD: u8 = 128;
const MIN_COVERAGE: f32 = 0.05;
const IDEAL_COVERAGE: f32 = 0.30;
const MAX_COVERAGE: f32 = 0.60;

const VARIANCE_SCALE: f32 = 1000.0;

/// Individual sub-metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBreakdown {
    pub edge_quality: f32,
    pub coverage: f32,
    pub consistency: f32,
}

impl ConfidenceBreakdown {
    pub fn combined(&self) -> f32 {
        (EDGE_WEIGHT * self.edge_quality
            + COVERAGE_WEIGHT * self.coverage
            + CONSISTENCY_WEIGHT * self.consistency)
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Overall confidence in [0, 1]; an empty matte scores 0.
    pub fn score(&self, matte: &AlphaMatte) -> f32 {
        let _span = tracing::debug_span!("score").entered();
        if matte.is_empty() {
            return 0.0;
        }
        let breakdown = self.breakdown(matte);
        let score = breakdown.combined();
        tracing::debug!(
            edge = breakdown.edge_quality,
            coverage = breakdown.coverage,
            consistency = breakdown.consistency,
            score,
            "matte confidence"
        );
        score
    }

    pub fn breakdown(&self, matte: &AlphaMatte) -> ConfidenceBreakdown {
        let fraction = opaque_fraction(matte);
        ConfidenceBreakdown {
            edge_quality: edge_quality(matte, fraction),
            coverage: coverage_score(fraction),
            consistency: consistency(matte),
        }
    }
}

/// Fraction of pixels with opacity above 128.
pub fn opaque_fraction(matte: &AlphaMatte) -> f32 {
    if matte.is_empty() {
        return 0.0;
    }
    let opaque = matte
        .as_bytes()
        .iter()
        .filter(|&&v| v > OPAQUE_THRESHOLD)
        .count();
    opaque as f32 / matte.len() as f32
}

/// Mean Sobel magnitude over transition pixels, relative to a crisp edge.
///
/// A matte with no transition pixels is neutral (0.5) unless it has no
/// foreground at all, in which case there is no edge to judge and it scores 0.
fn edge_quality(matte: &AlphaMatte, opaque_fraction: f32) -> f32 {
    let (w, h) = matte.dimensions();
    let mut total = 0.0f64;
    let mut count = 0usize;

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let v = matte.get(x, y);
            if v <= TRANSITION_LOW || v >= TRANSITION_HIGH {
                continue;
            }
            let p = |dx: i64, dy: i64| matte.get_clamped(x as i64 + dx, y as i64 + dy) as f32;
            let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
            let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            total += ((gx * gx + gy * gy).sqrt() / 255.0) as f64;
            count += 1;
        }
    }

    if count == 0 {
        return if opaque_fraction > 0.0 { NEUTRAL_EDGE_SCORE } else { 0.0 };
    }
    let mean = (total / count as f64) as f32;
    (mean / EXPECTED_GRADIENT).min(1.0)
}

/// Score the opaque fraction against the ideal subject size.
///
/// Continuous over [0, 1]: below `MIN_COVERAGE` it ramps linearly to zero,
/// meeting the ratio-to-ideal band at `MIN_COVERAGE`.
pub fn coverage_score(fraction: f32) -> f32 {
    if fraction < MIN_COVERAGE {
        (fraction / MIN_COVERAGE) * (MIN_COVERAGE / IDEAL_COVERAGE)
    } else if fraction > MAX_COVERAGE {
        ((1.0 - fraction) / (1.0 - MAX_COVERAGE)).clamp(0.0, 1.0)
    } else {
        (fraction / IDEAL_COVERAGE).min(1.0)
    }
}

/// Mean local variance over 3x3 windows sampled every second pixel, mapped
/// so that a flat matte scores 1.
fn consistency(matte: &AlphaMatte) -> f32 {
    let (w, h) = matte.dimensions();
    let mut total = 0.0f64;
    let mut windows = 0usize;

    for y in (1..h.saturating_sub(1)).step_by(2) {
        for x in (1..w.saturating_sub(1)).step_by(2) {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let v = matte.get_clamped(x as i64 + dx, y as i64 + dy) as f64;
                    sum += v;
                    sum_sq += v * v;
                }
            }
            let mean = sum / 9.0;
            total += sum_sq / 9.0 - mean * mean;
            windows += 1;
        }
    }

    if windows == 0 {
        return 1.0;
    }
    let variance = (total / windows as f64) as f32;
    (1.0 - variance / VARIANCE_SCALE).clamp(0.0, 1.0)
}
