use super::preprocess::{Preprocessor, IMAGENET_MEAN, IMAGENET_STD};
use super::types::{InferenceBackend, SegmentationModel};
use super::validate_frame;
use crate::error::Result;
use crate::raster::{AlphaMatte, RasterBuffer};
use serde::Deserialize;
use std::sync::Arc;

/// Smallest frame the model path will accept.
const MIN_MODEL_SIDE: u32 = 2;

/// Model input/output conventions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Square input resolution
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Output channel holding the subject class; `None` selects the last channel
    pub subject_channel: Option<usize>,
    /// Intra-op threads for the inference session
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_size: 320,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            subject_channel: None,
            intra_threads: 4,
        }
    }
}

/// Segmentation through an inference backend
pub struct ModelSegmenter {
    backend: Arc<dyn InferenceBackend>,
    preprocessor: Preprocessor,
    subject_channel: Option<usize>,
}

impl ModelSegmenter {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &ModelConfig) -> Self {
        let preprocessor = Preprocessor::new(backend.input_size(), config.mean, config.std);
        Self {
            backend,
            preprocessor,
            subject_channel: config.subject_channel,
        }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }
}

impl SegmentationModel for ModelSegmenter {
    fn segment(&self, frame: &RasterBuffer) -> Result<AlphaMatte> {
        let _span = tracing::debug_span!("model_segment").entered();

        validate_frame(frame, MIN_MODEL_SIDE)?;

        let input = self.preprocessor.preprocess(frame)?;

        let output = {
            let _infer_span = tracing::debug_span!("inference").entered();
            self.backend.run(input)?
        };

        let plane = Preprocessor::subject_plane(&output, self.subject_channel)?;
        let (width, height) = frame.dimensions();
        Ok(Preprocessor::postprocess_matte(plane, width, height))
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
