//! Worker pool that keeps pipeline work off the thread owning the frame stream.
//!
//! Jobs travel over a crossbeam channel to a fixed set of threads. Final
//! captures get a one-shot reply channel; preview frames share one result
//! channel on which a result is published only if no newer frame has been
//! published before it (stale results are discarded). A preview stream keeps
//! at most one frame queued or running; frames offered meanwhile are dropped.

use super::cancel::CancellationToken;
use super::orchestrator::PipelineOrchestrator;
use super::result::MattingResult;
use super::throttle::{FrameSlot, PreviewThrottle, TimestampedFrame};
use crate::error::Result;
use crate::raster::RasterBuffer;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

enum Job {
    Final {
        input: RasterBuffer,
        background: Option<RasterBuffer>,
        cancel: CancellationToken,
        reply: Sender<Result<MattingResult>>,
    },
    Preview {
        frame: Arc<TimestampedFrame>,
        background: Option<Arc<RasterBuffer>>,
        published: Arc<AtomicU64>,
        in_flight: Arc<AtomicBool>,
        reply: Sender<PreviewFrame>,
    },
}

/// A processed preview frame.
#[derive(Debug)]
pub struct PreviewFrame {
    pub sequence: u64,
    pub captured_at: Instant,
    pub result: MattingResult,
}

pub struct MattingWorker {
    jobs: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl MattingWorker {
    pub fn spawn(orchestrator: Arc<PipelineOrchestrator>, threads: usize) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let threads = threads.max(1);

        let handles = (0..threads)
            .map(|index| {
                let rx = rx.clone();
                let orchestrator = Arc::clone(&orchestrator);
                std::thread::Builder::new()
                    .name(format!("matting-worker-{index}"))
                    .spawn(move || worker_loop(&orchestrator, &rx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::error!(error = %err, "failed to spawn matting worker");
                    None
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(threads = handles.len(), "matting workers started");

        Self {
            jobs: Some(tx),
            handles,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    /// Queue a final capture. The receiver yields exactly one message; it
    /// disconnects without one only if the pool is shutting down.
    pub fn submit_final(
        &self,
        input: RasterBuffer,
        background: Option<RasterBuffer>,
        cancel: CancellationToken,
    ) -> Receiver<Result<MattingResult>> {
        let (reply, result) = bounded(1);
        let _ = self.send(Job::Final {
            input,
            background,
            cancel,
            reply,
        });
        result
    }

    /// Open a throttled preview stream feeding this pool.
    pub fn preview_stream(
        &self,
        background: Option<RasterBuffer>,
    ) -> (PreviewStream<'_>, Receiver<PreviewFrame>) {
        let (reply, results) = unbounded();
        let stream = PreviewStream {
            worker: self,
            throttle: PreviewThrottle::new(self.orchestrator.config().preview_interval),
            next_sequence: AtomicU64::new(1),
            published: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicBool::new(false)),
            last_frame: FrameSlot::new(),
            background: background.map(Arc::new),
            reply,
        };
        (stream, results)
    }

    fn send(&self, job: Job) -> bool {
        let delivered = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send(job).is_ok())
            .unwrap_or(false);
        if !delivered {
            tracing::warn!("matting workers unavailable, job dropped");
        }
        delivered
    }

    /// Stop accepting work and wait for queued jobs to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("matting worker panicked");
            }
        }
    }
}

impl Drop for MattingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(orchestrator: &PipelineOrchestrator, jobs: &Receiver<Job>) {
    for job in jobs.iter() {
        match job {
            Job::Final {
                input,
                background,
                cancel,
                reply,
            } => {
                let outcome = orchestrator.process_final(&input, background.as_ref(), &cancel);
                let _ = reply.send(outcome);
            }
            Job::Preview {
                frame,
                background,
                published,
                in_flight,
                reply,
            } => {
                let result = orchestrator.process_preview(&frame.frame, background.as_deref());
                in_flight.store(false, Ordering::SeqCst);
                let previous = published.fetch_max(frame.sequence, Ordering::SeqCst);
                if previous < frame.sequence {
                    let _ = reply.send(PreviewFrame {
                        sequence: frame.sequence,
                        captured_at: frame.captured_at,
                        result,
                    });
                } else {
                    tracing::debug!(
                        sequence = frame.sequence,
                        newest = previous,
                        "discarding stale preview result"
                    );
                }
            }
        }
    }
}

/// Producer side of a live preview: throttles incoming frames and dispatches
/// accepted ones to the worker pool.
pub struct PreviewStream<'a> {
    worker: &'a MattingWorker,
    throttle: PreviewThrottle,
    next_sequence: AtomicU64,
    published: Arc<AtomicU64>,
    /// Set while this stream's frame is queued or being processed.
    in_flight: Arc<AtomicBool>,
    last_frame: FrameSlot,
    background: Option<Arc<RasterBuffer>>,
    reply: Sender<PreviewFrame>,
}

impl PreviewStream<'_> {
    /// Offer a frame now. Returns its sequence number, or `None` when the
    /// frame was dropped by the throttle.
    pub fn submit(&self, frame: RasterBuffer) -> Option<u64> {
        self.submit_at(frame, Instant::now())
    }

    /// Offer a frame that arrived at `now`. Dropped when the previous frame
    /// is still being processed or arrived less than the throttle interval ago.
    pub fn submit_at(&self, frame: RasterBuffer, now: Instant) -> Option<u64> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::trace!("preview frame dropped, previous frame still processing");
            return None;
        }
        if !self.throttle.try_accept(now) {
            self.in_flight.store(false, Ordering::SeqCst);
            tracing::trace!("preview frame throttled");
            return None;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let frame = Arc::new(frame);
        self.last_frame.store(TimestampedFrame {
            sequence,
            captured_at: now,
            frame: Arc::clone(&frame),
        });

        let job = Job::Preview {
            frame: Arc::new(TimestampedFrame {
                sequence,
                captured_at: now,
                frame,
            }),
            background: self.background.clone(),
            published: Arc::clone(&self.published),
            in_flight: Arc::clone(&self.in_flight),
            reply: self.reply.clone(),
        };
        if self.worker.send(job) {
            Some(sequence)
        } else {
            self.in_flight.store(false, Ordering::SeqCst);
            None
        }
    }

    /// Most recent accepted frame, for capturing a still from the preview.
    pub fn last_frame(&self) -> Option<Arc<TimestampedFrame>> {
        self.last_frame.latest()
    }
}
