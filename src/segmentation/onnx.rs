use super::model::ModelConfig;
use super::types::InferenceBackend;
use crate::error::{MatteError, Result};
use ndarray::{Array4, ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

/// ONNX Runtime inference backend
///
/// One session is loaded per process and shared by every worker; runs are
/// serialized through a mutex because the session needs exclusive access.
pub struct OnnxBackend {
    session: Mutex<Option<Session>>,
    input_size: u32,
}

fn ort_error(err: impl std::fmt::Display) -> MatteError {
    MatteError::inference(err.to_string())
}

impl OnnxBackend {
    /// Load a segmentation model from an ONNX file
    ///
    /// # Default Configuration
    /// - Graph optimization level 3
    /// - Intra-op threads from `config.intra_threads`
    pub fn load<P: AsRef<Path>>(model_path: P, config: &ModelConfig) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading segmentation model from {}", path.display());

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .with_intra_threads(config.intra_threads)
            .map_err(ort_error)?
            .commit_from_file(path)
            .map_err(|e| {
                MatteError::inference(format!("failed to load model from {}: {e}", path.display()))
            })?;

        tracing::info!(input_size = config.input_size, "Segmentation model loaded successfully");

        Ok(Self {
            session: Mutex::new(Some(session)),
            input_size: config.input_size,
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array(([n, c, h, w], data)).map_err(ort_error)?;

        let mut guard = self
            .session
            .lock()
            .map_err(|_| MatteError::inference("inference session lock poisoned"))?;
        let session = guard
            .as_mut()
            .ok_or_else(|| MatteError::inference("inference session has been released"))?;

        let outputs = session.run(ort::inputs![tensor]).map_err(ort_error)?;
        let (shape, values) = outputs[0].try_extract_tensor::<f32>().map_err(ort_error)?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), values.to_vec()).map_err(|_| {
            MatteError::InferenceShapeMismatch {
                shape: dims.clone(),
                expected: format!("{} values", values.len()),
            }
        })
    }

    fn shutdown(&self) {
        if let Ok(mut guard) = self.session.lock() {
            guard.take();
        }
    }
}
