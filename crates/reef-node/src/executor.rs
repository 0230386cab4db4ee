//! Execution stepper - drives the sandboxed execution module in bounded slices.
//!
//! The execution module (bytecode interpreter) is an external collaborator,
//! abstracted by [`ExecutionModule`] and created per job by an [`ExecutorFactory`].
//! Each call to [`Stepper::step`] grants the module a fixed step budget, so no
//! single call can monopolize the host.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::bridge::protocol::{ContentType, JobOutput};
use crate::error::JobFailure;
use crate::job::JobDescriptor;

/// Errors raised by the execution module.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The program image could not be parsed or instantiated.
    #[error("failed to load program: {message}")]
    Load { message: String },

    /// The prior state could not be restored.
    #[error("failed to restore state: {message}")]
    Restore { message: String },

    #[error("runtime error: {message}")]
    Runtime { message: String },

    #[error("failed to snapshot state: {message}")]
    Snapshot { message: String },

    #[error("progress {0} is outside 0.0..=1.0")]
    InvalidProgress(f32),

    #[error("job event channel closed")]
    ChannelClosed,
}

impl ExecutionError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn restore(message: impl Into<String>) -> Self {
        Self::Restore {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }
}

/// Output as reported by the module, before the content type is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub content_type: u8,
    pub bytes: Vec<u8>,
}

/// What one slice of execution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Budget exhausted (or the program asked to sleep). `pause` is how long
    /// the module would like the node to yield before the next slice.
    Pending { pause: Option<Duration> },
    Done(RawOutput),
}

/// A job's sandboxed program, instantiated and ready to step.
pub trait ExecutionModule: Send {
    /// Run at most `budget` steps.
    fn step(&mut self, budget: u32) -> Result<StepOutcome, ExecutionError>;

    /// Full serialized interpreter state, suitable as a future `prior_state`.
    fn snapshot(&mut self) -> Result<Vec<u8>, ExecutionError>;
}

/// Creates an [`ExecutionModule`] for a job.
pub trait ExecutorFactory: Send + Sync {
    /// `job.prior_state` is set when the job resumes from a checkpoint.
    fn instantiate(
        &self,
        job: &JobDescriptor,
        dataset: Vec<u8>,
        sender: JobSender,
    ) -> Result<Box<dyn ExecutionModule>, ExecutionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Log(String),
    Progress(f32),
}

/// Handle the execution module uses to report logs and progress.
///
/// Events are queued and drained into the job's log buffer by the engine.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl JobSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn log(&self, line: impl Into<String>) -> Result<(), ExecutionError> {
        self.tx
            .send(JobEvent::Log(line.into()))
            .map_err(|_| ExecutionError::ChannelClosed)
    }

    pub fn progress(&self, done: f32) -> Result<(), ExecutionError> {
        if !(0.0..=1.0).contains(&done) {
            return Err(ExecutionError::InvalidProgress(done));
        }
        self.tx
            .send(JobEvent::Progress(done))
            .map_err(|_| ExecutionError::ChannelClosed)
    }
}

/// Validated result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Continue { pause: Duration },
    Finished(JobOutput),
}

pub struct Stepper {
    module: Box<dyn ExecutionModule>,
    budget: u32,
    default_pause: Duration,
    steps: u64,
}

impl Stepper {
    pub fn new(module: Box<dyn ExecutionModule>, budget: u32, default_pause: Duration) -> Self {
        Self {
            module,
            budget,
            default_pause,
            steps: 0,
        }
    }

    /// Run one bounded slice.
    ///
    /// Module errors and out-of-range content type tags become job failures.
    pub fn step(&mut self) -> Result<StepResult, JobFailure> {
        self.steps += 1;
        match self.module.step(self.budget)? {
            StepOutcome::Pending { pause } => Ok(StepResult::Continue {
                pause: pause.unwrap_or(self.default_pause),
            }),
            StepOutcome::Done(raw) => {
                let content_type = ContentType::try_from(raw.content_type)
                    .map_err(JobFailure::InvalidContentType)?;
                Ok(StepResult::Finished(JobOutput {
                    content_type,
                    bytes: raw.bytes,
                }))
            }
        }
    }

    pub fn snapshot(&mut self) -> Result<Vec<u8>, JobFailure> {
        Ok(self.module.snapshot()?)
    }

    /// Number of slices run so far.
    pub fn steps_taken(&self) -> u64 {
        self.steps
    }
}
