//! Pipeline configuration, loadable from TOML.
//!
//! ```toml
//! max_side = 1600
//! confidence_threshold = 0.6
//! remote_fallback_enabled = true
//!
//! [final]
//! blur_sigma = 2.0
//!
//! [model]
//! input_size = 512
//! ```

use crate::error::{MatteError, Result};
use crate::profile::{ProcessingProfile, ProfileKind};
use crate::segmentation::ModelConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Final-pipeline inputs are downscaled so their longer side fits.
    pub max_side: u32,
    /// Same, for preview frames.
    pub preview_max_side: u32,
    /// Below this confidence the remote fallback is consulted.
    pub confidence_threshold: f32,
    pub remote_fallback_enabled: bool,
    /// Minimum spacing between accepted preview frames.
    pub preview_interval: Duration,
    pub worker_threads: usize,
    pub preview: ProcessingProfile,
    pub final_profile: ProcessingProfile,
    pub model: ModelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_side: 1600,
            preview_max_side: 640,
            confidence_threshold: 0.6,
            remote_fallback_enabled: false,
            preview_interval: Duration::from_millis(120),
            worker_threads: 2,
            preview: ProcessingProfile::preview(),
            final_profile: ProcessingProfile::final_quality(),
            model: ModelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| MatteError::Config(e.to_string()))?;
        Ok(file.into())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| MatteError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn profile(&self, kind: ProfileKind) -> &ProcessingProfile {
        match kind {
            ProfileKind::Preview => &self.preview,
            ProfileKind::Final => &self.final_profile,
        }
    }
}

/// On-disk shape: every key optional, missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    max_side: Option<u32>,
    preview_max_side: Option<u32>,
    confidence_threshold: Option<f32>,
    remote_fallback_enabled: Option<bool>,
    preview_interval_ms: Option<u64>,
    worker_threads: Option<usize>,
    preview: ProfileOverrides,
    #[serde(rename = "final")]
    final_profile: ProfileOverrides,
    model: ModelConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProfileOverrides {
    clamp_low: Option<u8>,
    clamp_high: Option<u8>,
    blur_sigma: Option<f32>,
    selective_blur: Option<bool>,
    erosion_radius: Option<u32>,
    despill_strength: Option<f32>,
}

impl ProfileOverrides {
    fn apply(self, kind: ProfileKind) -> ProcessingProfile {
        let base = ProcessingProfile::for_kind(kind);
        ProcessingProfile {
            kind,
            clamp_low: self.clamp_low.unwrap_or(base.clamp_low),
            clamp_high: self.clamp_high.unwrap_or(base.clamp_high),
            blur_sigma: self.blur_sigma.unwrap_or(base.blur_sigma),
            selective_blur: self.selective_blur.unwrap_or(base.selective_blur),
            erosion_radius: self.erosion_radius.unwrap_or(base.erosion_radius),
            despill_strength: self.despill_strength.unwrap_or(base.despill_strength),
        }
    }
}

impl From<ConfigFile> for PipelineConfig {
    fn from(file: ConfigFile) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            max_side: file.max_side.unwrap_or(defaults.max_side),
            preview_max_side: file.preview_max_side.unwrap_or(defaults.preview_max_side),
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            remote_fallback_enabled: file
                .remote_fallback_enabled
                .unwrap_or(defaults.remote_fallback_enabled),
            preview_interval: file
                .preview_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.preview_interval),
            worker_threads: file.worker_threads.unwrap_or(defaults.worker_threads).max(1),
            preview: file.preview.apply(ProfileKind::Preview),
            final_profile: file.final_profile.apply(ProfileKind::Final),
            model: file.model,
        }
    }
}
