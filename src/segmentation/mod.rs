mod heuristic;
mod model;
#[cfg(feature = "onnx")]
mod onnx;
mod preprocess;
pub mod types;

pub use heuristic::{HeuristicParams, HeuristicSegmenter};
pub use model::{ModelConfig, ModelSegmenter};
#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;
pub use preprocess::{Preprocessor, IMAGENET_MEAN, IMAGENET_STD};
pub use types::{InferenceBackend, SegmentationModel};

use crate::error::{MatteError, Result};
use crate::raster::{AlphaMatte, RasterBuffer};
use std::path::Path;
use std::sync::Arc;

/// Reject frames the segmenters cannot work with.
pub(crate) fn validate_frame(frame: &RasterBuffer, min_side: u32) -> Result<()> {
    if frame.is_empty() {
        return Err(MatteError::invalid_input("frame has no pixels"));
    }
    let (w, h) = frame.dimensions();
    if w < min_side || h < min_side {
        return Err(MatteError::invalid_input(format!(
            "frame {w}x{h} below minimum side {min_side}"
        )));
    }
    Ok(())
}

/// Produces raw alpha mattes with a strategy chosen once at construction.
///
/// A model-backed engine keeps a heuristic segmenter around and uses it when
/// the backend is unavailable or returns a tensor of unexpected shape.
pub struct SegmentationEngine {
    strategy: Box<dyn SegmentationModel>,
    fallback: Option<HeuristicSegmenter>,
    backend: Option<Arc<dyn InferenceBackend>>,
}

impl SegmentationEngine {
    pub fn heuristic() -> Self {
        Self::from_model(Box::new(HeuristicSegmenter::default()))
    }

    /// Model-backed engine degrading to the heuristic segmenter.
    pub fn with_backend(backend: Arc<dyn InferenceBackend>, config: &ModelConfig) -> Self {
        Self {
            strategy: Box::new(ModelSegmenter::new(Arc::clone(&backend), config)),
            fallback: Some(HeuristicSegmenter::default()),
            backend: Some(backend),
        }
    }

    /// Engine around an arbitrary strategy, without fallback.
    pub fn from_model(model: Box<dyn SegmentationModel>) -> Self {
        Self {
            strategy: model,
            fallback: None,
            backend: None,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Segment, surfacing the reason when no usable matte could be produced.
    pub fn try_infer(&self, frame: &RasterBuffer) -> Result<AlphaMatte> {
        let _span = tracing::debug_span!("segment", strategy = self.strategy.name()).entered();

        let matte = match self.strategy.segment(frame) {
            Err(err) if err.is_inference_failure() => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(error = %err, "inference failed, using heuristic segmentation");
                    fallback.segment(frame)?
                }
                None => return Err(err),
            },
            other => other?,
        };

        if matte.dimensions() != frame.dimensions() {
            return Err(MatteError::PostprocessFailure(format!(
                "segmenter returned {:?} matte for {:?} frame",
                matte.dimensions(),
                frame.dimensions()
            )));
        }
        Ok(matte)
    }

    /// Segment without failing: any error yields a transparent matte of the
    /// frame's dimensions.
    pub fn infer(&self, frame: &RasterBuffer) -> AlphaMatte {
        self.try_infer(frame).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "segmentation failed, returning transparent matte");
            AlphaMatte::transparent(frame.width(), frame.height())
        })
    }

    /// Release the inference session, if any. Called once at shutdown.
    pub fn shutdown(&self) {
        if let Some(backend) = &self.backend {
            tracing::info!("Releasing inference session");
            backend.shutdown();
        }
    }
}

/// Build the engine for a model file, degrading to the heuristic segmenter
/// when the model cannot be loaded or ONNX support is not compiled in.
pub fn create_default_engine(model_path: Option<&Path>, config: &ModelConfig) -> SegmentationEngine {
    let Some(path) = model_path else {
        tracing::info!("No segmentation model configured, using heuristic segmentation");
        return SegmentationEngine::heuristic();
    };

    #[cfg(feature = "onnx")]
    {
        match OnnxBackend::load(path, config) {
            Ok(backend) => SegmentationEngine::with_backend(Arc::new(backend), config),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load segmentation model, using heuristic segmentation");
                SegmentationEngine::heuristic()
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = config;
        tracing::warn!(
            "Model {} ignored: built without the `onnx` feature, using heuristic segmentation",
            path.display()
        );
        SegmentationEngine::heuristic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelFormat;
    use ndarray::{Array4, ArrayD, IxDyn};

    struct FixedBackend {
        shape: Vec<usize>,
        value: f32,
    }

    impl InferenceBackend for FixedBackend {
        fn input_size(&self) -> u32 {
            8
        }

        fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
            assert_eq!(input.shape(), &[1, 3, 8, 8]);
            Ok(ArrayD::from_elem(IxDyn(&self.shape), self.value))
        }
    }

    struct BrokenBackend;

    impl InferenceBackend for BrokenBackend {
        fn input_size(&self) -> u32 {
            8
        }

        fn run(&self, _input: Array4<f32>) -> Result<ArrayD<f32>> {
            Err(MatteError::inference("backend offline"))
        }
    }

    fn frame(w: u32, h: u32) -> RasterBuffer {
        RasterBuffer::filled(w, h, PixelFormat::Rgb8, [90, 90, 90, 255])
    }

    #[test]
    fn model_output_is_resampled_to_frame() {
        let backend = Arc::new(FixedBackend {
            shape: vec![1, 2, 4, 4],
            value: 1.0,
        });
        let engine = SegmentationEngine::with_backend(backend, &ModelConfig::default());
        let matte = engine.try_infer(&frame(40, 30)).unwrap();
        assert_eq!(matte.dimensions(), (40, 30));
        assert!(matte.as_bytes().iter().all(|&v| v == 255));
    }

    #[test]
    fn flat_output_shape_is_accepted() {
        let backend = Arc::new(FixedBackend {
            shape: vec![4, 4],
            value: 0.0,
        });
        let engine = SegmentationEngine::with_backend(backend, &ModelConfig::default());
        let matte = engine.try_infer(&frame(20, 20)).unwrap();
        assert!(matte.as_bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn shape_mismatch_degrades_to_heuristic() {
        let backend = Arc::new(FixedBackend {
            shape: vec![3, 4, 4],
            value: 1.0,
        });
        let engine = SegmentationEngine::with_backend(backend, &ModelConfig::default());
        let matte = engine.try_infer(&frame(32, 32)).unwrap();
        assert_eq!(matte.dimensions(), (32, 32));
    }

    #[test]
    fn backend_error_without_fallback_is_transparent() {
        let model = ModelSegmenter::new(Arc::new(BrokenBackend), &ModelConfig::default());
        let engine = SegmentationEngine::from_model(Box::new(model));
        assert!(engine.try_infer(&frame(32, 32)).is_err());
        let matte = engine.infer(&frame(32, 32));
        assert_eq!(matte, AlphaMatte::transparent(32, 32));
    }

    #[test]
    fn empty_frame_yields_empty_matte() {
        let engine = SegmentationEngine::heuristic();
        let empty = RasterBuffer::new(0, 0, PixelFormat::Rgba8);
        let matte = engine.infer(&empty);
        assert!(matte.is_empty());
    }

    #[test]
    fn missing_model_path_selects_heuristic() {
        let engine = create_default_engine(None, &ModelConfig::default());
        assert_eq!(engine.strategy_name(), "heuristic");
    }
}
