use crate::error::Result;
use crate::raster::{AlphaMatte, RasterBuffer};
use ndarray::{Array4, ArrayD};

/// Capability: produce a continuous alpha matte from a frame.
/// Allows swapping between segmentation strategies (model-backed, heuristic, test doubles)
pub trait SegmentationModel: Send + Sync {
    /// Segment a frame
    ///
    /// # Returns
    /// * Alpha matte with the same dimensions as `frame`, values 0-255
    fn segment(&self, frame: &RasterBuffer) -> Result<AlphaMatte>;

    /// Short name used in log events
    fn name(&self) -> &'static str;
}

/// Pluggable inference runtime behind the model-backed segmenter.
///
/// Implementations are shared read-only across worker threads.
pub trait InferenceBackend: Send + Sync {
    /// Side length of the square input the model was exported with
    fn input_size(&self) -> u32;

    /// Run the model on a normalized `[1, 3, S, S]` tensor
    ///
    /// The returned tensor is expected to be `[1, C, H, W]` or `[H, W]`;
    /// callers validate the shape before indexing.
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>>;

    /// Release the underlying session. Later `run` calls fail with
    /// `InferenceUnavailable`.
    fn shutdown(&self) {}
}
