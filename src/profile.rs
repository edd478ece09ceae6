/// Which of the two pipelines a profile is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Preview,
    Final,
}

/// Refinement and compositing parameters.
///
/// The defaults are empirically tuned; every field can be overridden from the
/// `[preview]` / `[final]` tables of the pipeline configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingProfile {
    pub kind: ProfileKind,
    /// Values at or below this become fully transparent.
    pub clamp_low: u8,
    /// Values at or above this become fully opaque.
    pub clamp_high: u8,
    /// Gaussian sigma in pixels.
    pub blur_sigma: f32,
    /// Only blur the transition band between `clamp_low` and `clamp_high`.
    pub selective_blur: bool,
    /// Radius of the min-filter, 0 disables erosion.
    pub erosion_radius: u32,
    /// Peak fractional alpha reduction applied by the compositor's despill.
    pub despill_strength: f32,
}

impl ProcessingProfile {
    /// Low-latency settings for the live preview stream.
    pub fn preview() -> Self {
        Self {
            kind: ProfileKind::Preview,
            clamp_low: 10,
            clamp_high: 240,
            blur_sigma: 0.8,
            selective_blur: false,
            erosion_radius: 0,
            despill_strength: 0.0,
        }
    }

    /// Quality settings for the one-shot final capture.
    pub fn final_quality() -> Self {
        Self {
            kind: ProfileKind::Final,
            clamp_low: 5,
            clamp_high: 250,
            blur_sigma: 2.5,
            selective_blur: true,
            erosion_radius: 1,
            despill_strength: 0.05,
        }
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Preview => Self::preview(),
            ProfileKind::Final => Self::final_quality(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_band_is_wider_than_preview() {
        let preview = ProcessingProfile::preview();
        let fin = ProcessingProfile::final_quality();
        assert!(fin.clamp_low < preview.clamp_low);
        assert!(fin.clamp_high > preview.clamp_high);
        assert_eq!(preview.erosion_radius, 0);
        assert_eq!(preview.despill_strength, 0.0);
        assert!(fin.erosion_radius > 0);
    }
}
