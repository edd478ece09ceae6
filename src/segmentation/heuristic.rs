//! Color-distance segmentation used when no model is available.
//!
//! The frame center is assumed to hold the subject and the border band the
//! backdrop. Each pixel is classified by comparing its distance to both
//! reference colors, with the required evidence depending on how far the pixel
//! sits from the image center. The boolean mask is then smoothed with a 3x3
//! majority vote and feathered towards the image border.

use super::types::SegmentationModel;
use super::validate_frame;
use crate::error::Result;
use crate::raster::{AlphaMatte, RasterBuffer};

/// Tuning constants for the heuristic segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicParams {
    /// Frames with a side shorter than this yield a transparent matte.
    pub min_side: u32,
    /// Side of the central sampling window as a fraction of the frame.
    pub center_fraction: f32,
    /// Width of the border sampling band as a fraction of the shorter side.
    pub border_fraction: f32,
    /// Normalized center distance below which pixels are presumed foreground.
    pub inner_zone: f32,
    /// Normalized center distance above which pixels are presumed background.
    pub outer_zone: f32,
    /// Inner zone: how much closer to the background color a pixel must be to be rejected.
    pub inner_margin: f32,
    /// Middle zone: how much closer to the foreground color a pixel must be to be accepted.
    pub middle_margin: f32,
    /// Outer zone: how much closer to the foreground color a pixel must be to be accepted.
    pub outer_margin: f32,
    /// Outer zone: maximum absolute distance to the foreground color.
    pub outer_distance_cap: f32,
    /// Opacity ramps from 0 to 255 over this many pixels from the frame edge.
    pub feather_radius: u32,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            min_side: 16,
            center_fraction: 0.2,
            border_fraction: 0.1,
            inner_zone: 0.30,
            outer_zone: 0.75,
            inner_margin: 30.0,
            middle_margin: 20.0,
            outer_margin: 40.0,
            outer_distance_cap: 60.0,
            feather_radius: 6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicSegmenter {
    params: HeuristicParams,
}

impl HeuristicSegmenter {
    pub fn new(params: HeuristicParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HeuristicParams {
        &self.params
    }

    /// Average color of the central window and of the border band.
    fn reference_colors(&self, frame: &RasterBuffer) -> ([f32; 3], [f32; 3]) {
        let (w, h) = frame.dimensions();
        let p = &self.params;

        let cw = ((w as f32 * p.center_fraction) as u32).max(1);
        let ch = ((h as f32 * p.center_fraction) as u32).max(1);
        let cx0 = (w - cw) / 2;
        let cy0 = (h - ch) / 2;

        let band = ((w.min(h) as f32 * p.border_fraction) as u32).max(1);

        let mut fg = Accumulator::default();
        let mut bg = Accumulator::default();
        for y in 0..h {
            for x in 0..w {
                let in_center = x >= cx0 && x < cx0 + cw && y >= cy0 && y < cy0 + ch;
                let in_border = x < band || y < band || x >= w - band || y >= h - band;
                if !(in_center || in_border) {
                    continue;
                }
                let [r, g, b, _] = frame.rgba(x, y);
                if in_center {
                    fg.add(r, g, b);
                }
                if in_border {
                    bg.add(r, g, b);
                }
            }
        }
        (fg.mean(), bg.mean())
    }

    fn classify(&self, frame: &RasterBuffer, fg_ref: [f32; 3], bg_ref: [f32; 3]) -> Vec<bool> {
        let (w, h) = frame.dimensions();
        let p = &self.params;
        let half_w = w as f32 / 2.0;
        let half_h = h as f32 / 2.0;
        let half_diagonal = (half_w * half_w + half_h * half_h).sqrt();

        let mut mask = Vec::with_capacity(w as usize * h as usize);
        for y in 0..h {
            for x in 0..w {
                let [r, g, b, _] = frame.rgba(x, y);
                let color = [r as f32, g as f32, b as f32];
                let d_fg = color_distance(color, fg_ref);
                let d_bg = color_distance(color, bg_ref);

                let dx = x as f32 + 0.5 - half_w;
                let dy = y as f32 + 0.5 - half_h;
                let radial = (dx * dx + dy * dy).sqrt() / half_diagonal;

                let foreground = if radial < p.inner_zone {
                    d_bg + p.inner_margin >= d_fg
                } else if radial > p.outer_zone {
                    d_fg + p.outer_margin < d_bg && d_fg < p.outer_distance_cap
                } else {
                    d_fg + p.middle_margin < d_bg
                };
                mask.push(foreground);
            }
        }
        mask
    }

    fn feather(&self, mask: &[bool], width: u32, height: u32) -> AlphaMatte {
        let radius = self.params.feather_radius as f32;
        AlphaMatte::from_fn(width, height, |x, y| {
            if !mask[y as usize * width as usize + x as usize] {
                return 0;
            }
            if radius <= 0.0 {
                return 255;
            }
            let edge = x.min(y).min(width - 1 - x).min(height - 1 - y) as f32;
            (255.0 * (edge / radius).min(1.0)).round() as u8
        })
    }
}

impl SegmentationModel for HeuristicSegmenter {
    fn segment(&self, frame: &RasterBuffer) -> Result<AlphaMatte> {
        let _span = tracing::debug_span!("heuristic_segment").entered();

        validate_frame(frame, self.params.min_side)?;
        let (w, h) = frame.dimensions();

        let (fg_ref, bg_ref) = self.reference_colors(frame);
        tracing::debug!(?fg_ref, ?bg_ref, "heuristic reference colors");

        let mask = self.classify(frame, fg_ref, bg_ref);
        let mask = majority_smooth(&mask, w as usize, h as usize);
        Ok(self.feather(&mask, w, h))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

#[derive(Default)]
struct Accumulator {
    sum: [u64; 3],
    count: u64,
}

impl Accumulator {
    fn add(&mut self, r: u8, g: u8, b: u8) {
        self.sum[0] += r as u64;
        self.sum[1] += g as u64;
        self.sum[2] += b as u64;
        self.count += 1;
    }

    fn mean(&self) -> [f32; 3] {
        let n = self.count.max(1) as f32;
        [
            self.sum[0] as f32 / n,
            self.sum[1] as f32 / n,
            self.sum[2] as f32 / n,
        ]
    }
}

fn color_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

/// 3x3 majority vote; neighborhoods are truncated at the frame edge.
fn majority_smooth(mask: &[bool], width: usize, height: usize) -> Vec<bool> {
    let mut out = vec![false; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut votes = 0usize;
            let mut total = 0usize;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    total += 1;
                    if mask[ny * width + nx] {
                        votes += 1;
                    }
                }
            }
            out[y * width + x] = votes * 2 > total;
        }
    }
    out
}
