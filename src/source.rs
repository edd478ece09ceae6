//! Frame sources feeding the pipeline.

use anyhow::{Context, Result};
use crate::raster::RasterBuffer;
use std::path::PathBuf;

/// Trait for frame sources
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<RasterBuffer>>;
}

/// Still images read from disk in order, standing in for a camera.
pub struct StillSequence {
    paths: std::vec::IntoIter<PathBuf>,
}

impl StillSequence {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        tracing::info!("Frame source: {} still image(s)", paths.len());
        Self {
            paths: paths.into_iter(),
        }
    }
}

impl FrameSource for StillSequence {
    fn next_frame(&mut self) -> Result<Option<RasterBuffer>> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("Failed to read frame from {}", path.display()))?;
        Ok(Some(RasterBuffer::from(image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn reads_frames_in_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.png");
        let second = dir.path().join("b.png");
        RgbImage::new(3, 2).save(&first).unwrap();
        RgbImage::new(5, 4).save(&second).unwrap();

        let mut source = StillSequence::new(vec![first, second]);
        assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (3, 2));
        assert_eq!(source.next_frame().unwrap().unwrap().dimensions(), (5, 4));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut source = StillSequence::new(vec![PathBuf::from("/nonexistent/frame.png")]);
        assert!(source.next_frame().is_err());
    }
}
