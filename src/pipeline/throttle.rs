use crate::raster::RasterBuffer;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Rate limiter for the preview stream.
///
/// Frames arriving within `min_interval` of the last accepted frame are
/// rejected outright; nothing is queued.
#[derive(Debug)]
pub struct PreviewThrottle {
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl PreviewThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Accept a frame arriving at `now`, or reject it as too early.
    pub fn try_accept(&self, now: Instant) -> bool {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// A frame tagged with its arrival order and time.
#[derive(Debug)]
pub struct TimestampedFrame {
    pub sequence: u64,
    pub captured_at: Instant,
    pub frame: Arc<RasterBuffer>,
}

/// Single-slot cache of the most recent preview frame, used to capture a
/// still from the live stream. Replacing the slot swaps an `Arc`, so readers
/// keep a consistent frame even while the stream moves on.
#[derive(Debug, Default)]
pub struct FrameSlot {
    current: Mutex<Option<Arc<TimestampedFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame` unless the slot already holds a newer one.
    pub fn store(&self, frame: TimestampedFrame) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .map_or(true, |held| held.sequence < frame.sequence)
        {
            *current = Some(Arc::new(frame));
        }
    }

    pub fn latest(&self) -> Option<Arc<TimestampedFrame>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
