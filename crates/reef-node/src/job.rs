//! Per-job state: the immutable descriptor and the mutable execution state.

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bridge::protocol::StartJob;
use crate::buffer::LogBuffer;
use crate::executor::JobEvent;

/// A job as commanded by the coordinator. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    pub job_id: String,
    pub program_image: Vec<u8>,
    pub dataset_ref: String,
    /// Interpreter snapshot to resume from. Never empty.
    pub prior_state: Option<Vec<u8>>,
    /// Fraction in `[0, 1]`; nonzero only on resumption.
    pub initial_progress: f32,
}

impl JobDescriptor {
    pub fn is_resumption(&self) -> bool {
        self.prior_state.is_some()
    }
}

impl From<StartJob> for JobDescriptor {
    fn from(start: StartJob) -> Self {
        let initial_progress = if start.initial_progress.is_nan() {
            0.0
        } else {
            start.initial_progress.clamp(0.0, 1.0)
        };

        Self {
            job_id: start.job_id,
            program_image: start.program_image,
            dataset_ref: start.dataset_ref,
            prior_state: start.prior_state.filter(|state| !state.is_empty()),
            initial_progress,
        }
    }
}

/// Mutable state of the active job, owned by the engine.
#[derive(Debug)]
pub struct ExecutionState {
    buffer: LogBuffer,
    events: mpsc::UnboundedReceiver<JobEvent>,
    last_checkpoint_at: Instant,
}

impl ExecutionState {
    pub fn new(
        descriptor: &JobDescriptor,
        events: mpsc::UnboundedReceiver<JobEvent>,
        now: Instant,
    ) -> Self {
        let mut buffer = LogBuffer::with_progress(descriptor.initial_progress);
        if descriptor.is_resumption() {
            // Whole percent, never rounded up.
            let percent = (descriptor.initial_progress * 100.0).floor();
            buffer.push_line(format!("Resuming job at {percent:.0}% progress"));
        }

        Self {
            buffer,
            events,
            last_checkpoint_at: now,
        }
    }

    /// Move queued log/progress events from the execution module into the buffer.
    pub fn absorb_events(&mut self) -> usize {
        let mut absorbed = 0;
        while let Ok(event) = self.events.try_recv() {
            match event {
                JobEvent::Log(line) => self.buffer.push_line(line),
                JobEvent::Progress(done) => {
                    self.buffer.record_progress(done);
                }
            }
            absorbed += 1;
        }
        absorbed
    }

    pub fn progress(&self) -> f32 {
        self.buffer.progress()
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut LogBuffer {
        &mut self.buffer
    }

    pub fn last_checkpoint_at(&self) -> Instant {
        self.last_checkpoint_at
    }

    pub fn mark_checkpoint(&mut self, now: Instant) {
        self.last_checkpoint_at = now;
    }
}
