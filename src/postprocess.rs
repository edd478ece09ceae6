//! Matte refinement: clamp-core, (selective) Gaussian blur and erosion.
//!
//! Every stage is a pure function from one matte to a new one; the profile
//! decides which stages run and with which parameters.

use crate::error::{MatteError, Result};
use crate::profile::ProcessingProfile;
use crate::raster::AlphaMatte;
use image::imageops;

#[derive(Debug, Clone, Copy, Default)]
pub struct MattePostProcessor;

impl MattePostProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Run the full refinement chain for `profile`.
    pub fn refine(&self, matte: &AlphaMatte, profile: &ProcessingProfile) -> Result<AlphaMatte> {
        let _span = tracing::debug_span!("refine", profile = ?profile.kind).entered();

        if matte.is_empty() {
            return Err(MatteError::PostprocessFailure("cannot refine an empty matte".into()));
        }
        if profile.clamp_low >= profile.clamp_high {
            return Err(MatteError::PostprocessFailure(format!(
                "clamp band {}..{} is empty",
                profile.clamp_low, profile.clamp_high
            )));
        }

        let clamped = clamp_core(matte, profile.clamp_low, profile.clamp_high);

        let blurred = if profile.blur_sigma <= 0.0 {
            clamped
        } else if profile.selective_blur {
            selective_blur(&clamped, profile.blur_sigma, profile.clamp_low, profile.clamp_high)
        } else {
            gaussian_blur(&clamped, profile.blur_sigma)
        };

        let eroded = if profile.erosion_radius > 0 {
            erode(&blurred, profile.erosion_radius)
        } else {
            blurred
        };

        Ok(despill_hook(eroded))
    }
}

/// Snap values at or beyond the thresholds to 0 / 255, keep the band between.
pub fn clamp_core(matte: &AlphaMatte, low: u8, high: u8) -> AlphaMatte {
    matte.map(|v| {
        if v >= high {
            255
        } else if v <= low {
            0
        } else {
            v
        }
    })
}

pub fn gaussian_blur(matte: &AlphaMatte, sigma: f32) -> AlphaMatte {
    AlphaMatte::from_gray_image(imageops::blur(&matte.to_gray_image(), sigma))
}

/// Blur only the transition band; solid core and solid background stay sharp.
pub fn selective_blur(matte: &AlphaMatte, sigma: f32, low: u8, high: u8) -> AlphaMatte {
    let blurred = gaussian_blur(matte, sigma);
    AlphaMatte::from_fn(matte.width(), matte.height(), |x, y| {
        let original = matte.get(x, y);
        if original > low && original < high {
            blurred.get(x, y)
        } else {
            original
        }
    })
}

/// Per-pixel minimum over a (2r+1)x(2r+1) window, edges clamped.
pub fn erode(matte: &AlphaMatte, radius: u32) -> AlphaMatte {
    let r = radius as i64;
    let horizontal = AlphaMatte::from_fn(matte.width(), matte.height(), |x, y| {
        (-r..=r)
            .map(|dx| matte.get_clamped(x as i64 + dx, y as i64))
            .min()
            .unwrap_or(0)
    });
    AlphaMatte::from_fn(matte.width(), matte.height(), |x, y| {
        (-r..=r)
            .map(|dy| horizontal.get_clamped(x as i64, y as i64 + dy))
            .min()
            .unwrap_or(0)
    })
}

/// Edge desaturation needs color as well as alpha, so it happens in the
/// compositor. This stage passes the matte through.
fn despill_hook(matte: AlphaMatte) -> AlphaMatte {
    matte
}
