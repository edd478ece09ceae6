mod cancel;
mod orchestrator;
mod remote;
mod result;
mod throttle;
mod worker;

pub use cancel::CancellationToken;
pub use orchestrator::PipelineOrchestrator;
pub use remote::{decode_matte, encode_png, remote_matte, RemoteMatting};
pub use result::{MattingResult, Stage, StageTimings};
pub use throttle::{FrameSlot, PreviewThrottle, TimestampedFrame};
pub use worker::{MattingWorker, PreviewFrame, PreviewStream};
