use thiserror::Error;

/// Failure reasons inside the matting core.
///
/// Most of these never reach a caller of the pipeline: stages convert them
/// into a degraded matte or a zero-confidence result. `Cancelled` is the only
/// variant the orchestrator hands back.
#[derive(Debug, Error)]
pub enum MatteError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("inference output shape {shape:?} does not match {expected}")]
    InferenceShapeMismatch { shape: Vec<usize>, expected: String },

    #[error("postprocess failure: {0}")]
    PostprocessFailure(String),

    #[error("remote fallback failed: {0}")]
    RemoteFallbackFailure(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MatteError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::InferenceUnavailable(msg.into())
    }

    /// Whether the segmentation engine may retry this with the heuristic segmenter.
    pub fn is_inference_failure(&self) -> bool {
        matches!(
            self,
            Self::InferenceUnavailable(_) | Self::InferenceShapeMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MatteError>;
