//! Image matting and compositing core for a photo-booth kiosk.
//!
//! A captured frame flows through
//! `SegmentationEngine -> MattePostProcessor -> ConfidenceScorer -> Compositor`,
//! sequenced by [`pipeline::PipelineOrchestrator`] as either a fast preview
//! pipeline or a quality-oriented final pipeline with an optional remote
//! fallback when local confidence is low.
//!
//! Diagnostics are emitted through `tracing`; the library never installs a
//! subscriber.

pub mod compositor;
pub mod confidence;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod postprocess;
pub mod profile;
pub mod raster;
pub mod segmentation;
pub mod sink;
pub mod source;

pub use compositor::Compositor;
pub use confidence::{ConfidenceBreakdown, ConfidenceScorer};
pub use config::PipelineConfig;
pub use error::{MatteError, Result};
pub use pipeline::{CancellationToken, MattingResult, MattingWorker, PipelineOrchestrator};
pub use postprocess::MattePostProcessor;
pub use profile::{ProcessingProfile, ProfileKind};
pub use raster::{AlphaMatte, AlphaMode, PixelFormat, RasterBuffer};
pub use segmentation::SegmentationEngine;
