//! Blends a foreground over a background through a matte.

use crate::error::{MatteError, Result};
use crate::profile::ProcessingProfile;
use crate::raster::{AlphaMatte, PixelFormat, RasterBuffer};
use rayon::prelude::*;

/// Translucent band where background bleed is most visible.
const DESPILL_LOW: f32 = 0.2;
const DESPILL_HIGH: f32 = 0.5;
const DESPILL_PEAK: f32 = 0.35;

/// Below this matte opacity the foreground's own alpha also gates the blend.
const FAINT_EDGE_ALPHA: f32 = 0.1;

pub const DEFAULT_DESPILL_STRENGTH: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    despill_strength: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(DEFAULT_DESPILL_STRENGTH)
    }
}

impl Compositor {
    pub fn new(despill_strength: f32) -> Self {
        Self {
            despill_strength: despill_strength.clamp(0.0, 1.0),
        }
    }

    pub fn for_profile(profile: &ProcessingProfile) -> Self {
        Self::new(profile.despill_strength)
    }

    pub fn despill_strength(&self) -> f32 {
        self.despill_strength
    }

    /// Blend `foreground` over `background`. The result is `Rgba8` with every
    /// alpha byte at 255, sized to the smallest common dimensions of the inputs.
    pub fn compose(
        &self,
        foreground: &RasterBuffer,
        background: &RasterBuffer,
        matte: &AlphaMatte,
    ) -> Result<RasterBuffer> {
        let _span = tracing::debug_span!("compose").entered();

        let (width, height) = reconciled_size(&[
            foreground.dimensions(),
            background.dimensions(),
            matte.dimensions(),
        ])?;
        let foreground = fit_raster(&foreground.to_straight(), width, height);
        let background = fit_raster(background, width, height);
        let matte = matte.resize_to(width, height);

        let row_bytes = width as usize * 4;
        let mut data = vec![0u8; row_bytes * height as usize];
        data.par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for (x, out) in row.chunks_exact_mut(4).enumerate() {
                    let x = x as u32;
                    let fg = foreground.rgba(x, y);
                    let bg = background.rgba(x, y);
                    let alpha = self.effective_alpha(matte.get(x, y), fg[3]);
                    for c in 0..3 {
                        let blended = fg[c] as f32 * alpha + bg[c] as f32 * (1.0 - alpha);
                        out[c] = blended.round().clamp(0.0, 255.0) as u8;
                    }
                    out[3] = 255;
                }
            });

        RasterBuffer::from_raw(width, height, PixelFormat::Rgba8, data)
    }

    /// Isolated subject: the foreground with the matte written into its alpha
    /// channel. The result is straight-alpha `Rgba8`.
    pub fn cutout(&self, foreground: &RasterBuffer, matte: &AlphaMatte) -> Result<RasterBuffer> {
        let _span = tracing::debug_span!("cutout").entered();

        let (width, height) = reconciled_size(&[foreground.dimensions(), matte.dimensions()])?;
        let foreground = fit_raster(&foreground.to_straight(), width, height);
        let matte = matte.resize_to(width, height);

        let mut out = RasterBuffer::new(width, height, PixelFormat::Rgba8);
        for y in 0..height {
            for x in 0..width {
                let [r, g, b, _] = foreground.rgba(x, y);
                out.set_rgba(x, y, [r, g, b, matte.get(x, y)]);
            }
        }
        Ok(out)
    }

    /// Matte opacity after despill and faint-edge gating, in [0, 1].
    fn effective_alpha(&self, matte_value: u8, foreground_alpha: u8) -> f32 {
        let mut alpha = despill_alpha(matte_value as f32 / 255.0, self.despill_strength);
        if alpha < FAINT_EDGE_ALPHA && foreground_alpha < 255 {
            alpha *= foreground_alpha as f32 / 255.0;
        }
        alpha.clamp(0.0, 1.0)
    }
}

/// Reduce `alpha` by up to `strength` (relative) inside the despill band,
/// peaking at 0.35 and tapering linearly to nothing at 0.2 and 0.5.
pub fn despill_alpha(alpha: f32, strength: f32) -> f32 {
    if strength <= 0.0 || alpha <= DESPILL_LOW || alpha >= DESPILL_HIGH {
        return alpha;
    }
    let half_width = (DESPILL_HIGH - DESPILL_LOW) / 2.0;
    let weight = 1.0 - (alpha - DESPILL_PEAK).abs() / half_width;
    alpha * (1.0 - strength * weight)
}

/// Smallest width and height among `sizes`.
pub fn reconciled_size(sizes: &[(u32, u32)]) -> Result<(u32, u32)> {
    let width = sizes.iter().map(|s| s.0).min().unwrap_or(0);
    let height = sizes.iter().map(|s| s.1).min().unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MatteError::invalid_input(format!(
            "cannot composite buffers of sizes {sizes:?}"
        )));
    }
    Ok((width, height))
}

fn fit_raster(raster: &RasterBuffer, width: u32, height: u32) -> RasterBuffer {
    if raster.dimensions() == (width, height) {
        raster.clone()
    } else {
        raster.resize_to(width, height)
    }
}
