//! Result consumers: encode and persist what the pipeline produced.

use anyhow::{Context, Result};
use crate::pipeline::MattingResult;
use std::path::{Path, PathBuf};

/// Trait for result destinations
pub trait ResultSink {
    /// Persist one pipeline result
    fn write_result(&mut self, name: &str, result: &MattingResult) -> Result<()>;
}

/// Writes `<name>-cutout.png` and, when present, `<name>-composite.png` into
/// a directory. With `show_matte` the matte is also written as a grayscale
/// silhouette (`<name>-matte.png`).
pub struct PngDirectorySink {
    dir: PathBuf,
    show_matte: bool,
}

impl PngDirectorySink {
    pub fn new<P: AsRef<Path>>(dir: P, show_matte: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir, show_matte })
    }

    fn path(&self, name: &str, kind: &str) -> PathBuf {
        self.dir.join(format!("{name}-{kind}.png"))
    }
}

impl ResultSink for PngDirectorySink {
    fn write_result(&mut self, name: &str, result: &MattingResult) -> Result<()> {
        if let Some(foreground) = result.foreground() {
            let path = self.path(name, "cutout");
            foreground
                .to_rgba_image()
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        if let Some(matte) = result.matte().filter(|_| self.show_matte) {
            let path = self.path(name, "matte");
            matte
                .to_rgb_image()
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        if let Some(composite) = result.composite() {
            let path = self.path(name, "composite");
            composite
                .to_rgb_image()
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }
}
