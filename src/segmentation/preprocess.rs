use crate::error::{MatteError, Result};
use crate::raster::{AlphaMatte, RasterBuffer};
use image::imageops;
use ndarray::{Array4, ArrayD, ArrayView2, Axis};

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Converts frames to model input tensors and model output back to mattes
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(target_size: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            target_size: target_size.max(1),
            mean,
            std,
        }
    }

    pub fn imagenet(target_size: u32) -> Self {
        Self::new(target_size, IMAGENET_MEAN, IMAGENET_STD)
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Preprocess a frame into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to the square model resolution
    /// 2. Scale each channel to [0, 1], then apply `(v - mean) / std` per channel
    /// 3. Transpose from HWC to NCHW
    ///
    /// Returns: Array4<f32> with shape [1, 3, size, size]
    pub fn preprocess(&self, frame: &RasterBuffer) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();

        if frame.is_empty() {
            return Err(MatteError::invalid_input("cannot preprocess an empty frame"));
        }

        let size = self.target_size;
        let rgb = frame.to_straight().to_rgb_image();
        let resized = if rgb.dimensions() != (size, size) {
            imageops::resize(&rgb, size, size, imageops::FilterType::Triangle)
        } else {
            rgb
        };

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let v = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (v - self.mean[c]) / self.std[c];
            }
        }

        Ok(tensor)
    }

    /// Select the subject plane from a model output tensor
    ///
    /// Accepts `[1, C, H, W]` (channel `subject_channel`, or the last channel
    /// when `None`) and `[H, W]`. Anything else is a shape mismatch.
    pub fn subject_plane(
        output: &ArrayD<f32>,
        subject_channel: Option<usize>,
    ) -> Result<ArrayView2<'_, f32>> {
        let shape = output.shape().to_vec();
        let mismatch = |expected: &str| MatteError::InferenceShapeMismatch {
            shape: shape.clone(),
            expected: expected.to_string(),
        };

        match shape.as_slice() {
            &[1, channels, h, w] if channels > 0 && h > 0 && w > 0 => {
                let channel = subject_channel.unwrap_or(channels - 1);
                if channel >= channels {
                    return Err(mismatch(&format!("subject channel {channel} within {channels} channels")));
                }
                output
                    .index_axis(Axis(0), 0)
                    .index_axis_move(Axis(0), channel)
                    .into_dimensionality()
                    .map_err(|_| mismatch("[1, C, H, W]"))
            }
            &[h, w] if h > 0 && w > 0 => output
                .view()
                .into_dimensionality()
                .map_err(|_| mismatch("[H, W]")),
            _ => Err(mismatch("[1, C, H, W] or [H, W]")),
        }
    }

    /// Reconstruct a full-resolution matte from the model's output grid
    ///
    /// Every destination pixel is interpolated bilinearly between its four
    /// nearest grid samples, clamped to [0, 1] and scaled to [0, 255].
    pub fn postprocess_matte(
        plane: ArrayView2<'_, f32>,
        target_width: u32,
        target_height: u32,
    ) -> AlphaMatte {
        let _span = tracing::debug_span!("postprocess").entered();

        let (src_h, src_w) = plane.dim();
        let scale_x = src_w as f32 / target_width.max(1) as f32;
        let scale_y = src_h as f32 / target_height.max(1) as f32;
        let max_x = (src_w - 1) as f32;
        let max_y = (src_h - 1) as f32;

        AlphaMatte::from_fn(target_width, target_height, |x, y| {
            let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
            let x0 = sx.floor() as usize;
            let y0 = sy.floor() as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let y1 = (y0 + 1).min(src_h - 1);
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let top = plane[[y0, x0]] * (1.0 - fx) + plane[[y0, x1]] * fx;
            let bottom = plane[[y1, x0]] * (1.0 - fx) + plane[[y1, x1]] * fx;
            let value = top * (1.0 - fy) + bottom * fy;
            let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
            (value * 255.0).round() as u8
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelFormat;
    use ndarray::{Array2, IxDyn};

    #[test]
    fn normalizes_each_channel_independently() {
        let frame = RasterBuffer::filled(4, 4, PixelFormat::Rgb8, [255, 0, 128, 255]);
        let tensor = Preprocessor::imagenet(4).preprocess(&frame).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);
        let r = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let g = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((tensor[[0, 0, 2, 2]] - r).abs() < 1e-5);
        assert!((tensor[[0, 1, 0, 3]] - g).abs() < 1e-5);
    }

    #[test]
    fn resizes_to_square_input() {
        let frame = RasterBuffer::new(64, 32, PixelFormat::Rgba8);
        let tensor = Preprocessor::imagenet(16).preprocess(&frame).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
    }

    #[test]
    fn selects_requested_channel() {
        let mut output = ArrayD::<f32>::zeros(IxDyn(&[1, 2, 3, 3]));
        output[[0, 1, 1, 1]] = 0.75;
        let plane = Preprocessor::subject_plane(&output, Some(1)).unwrap();
        assert_eq!(plane[[1, 1]], 0.75);
        let last = Preprocessor::subject_plane(&output, None).unwrap();
        assert_eq!(last[[1, 1]], 0.75);
    }

    #[test]
    fn rejects_unexpected_shapes() {
        let output = ArrayD::<f32>::zeros(IxDyn(&[2, 1, 3, 3]));
        assert!(matches!(
            Preprocessor::subject_plane(&output, None),
            Err(MatteError::InferenceShapeMismatch { .. })
        ));
        let output = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 3]));
        assert!(Preprocessor::subject_plane(&output, None).is_err());
        let output = ArrayD::<f32>::zeros(IxDyn(&[1, 2, 3, 3]));
        assert!(Preprocessor::subject_plane(&output, Some(2)).is_err());
    }

    #[test]
    fn bilinear_reconstruction_interpolates_and_clamps() {
        let plane = Array2::from_shape_vec((1, 2), vec![0.0f32, 2.0]).unwrap();
        let matte = Preprocessor::postprocess_matte(plane.view(), 4, 1);
        assert_eq!(matte.get(0, 0), 0);
        // Sample at x=1 sits a quarter of the way between the two grid points: 0.5
        assert_eq!(matte.get(1, 0), 128);
        // Anything past 1.0 saturates
        assert_eq!(matte.get(3, 0), 255);
    }

    #[test]
    fn uniform_output_stays_uniform() {
        let plane = Array2::from_elem((5, 5), 1.0f32);
        let matte = Preprocessor::postprocess_matte(plane.view(), 17, 9);
        assert_eq!(matte.dimensions(), (17, 9));
        assert!(matte.as_bytes().iter().all(|&v| v == 255));
    }
}
