//! Job lifecycle engine - the node side of the coordinator protocol.
//!
//! One [`Engine`] owns one connection and at most one active job. It is a
//! cooperative state machine: each [`Engine::tick`] drains at most one inbound
//! command, runs exactly one bounded execution slice and possibly a checkpoint,
//! then reports how long the caller should yield before the next pass.
//!
//! States:
//! - `Idle`: waiting for a start command
//! - `Running`: a job is active; terminal outcomes (success, failure, abort)
//!   return to `Idle`
//!
//! Protocol violations (duplicate start, mismatched abort, undecodable frames)
//! are returned as [`EngineError`] and end the session. Job failures are
//! reported to the coordinator as results and the engine stays usable.

use std::time::Duration;

use tokio::time::Instant;

use crate::bridge::codec::MessageCodec;
use crate::bridge::protocol::{
    InboundMessage, JobOutput, JobResult, OutboundMessage, StartJob, StateSync,
};
use crate::bridge::session::Session;
use crate::bridge::transport::{Transport, TransportError};
use crate::checkpoint::{CheckpointManager, check_environment};
use crate::config::EngineConfig;
use crate::dataset::DatasetStore;
use crate::error::{EngineError, JobFailure, ProtocolViolation};
use crate::executor::{ExecutorFactory, JobSender, StepResult, Stepper};
use crate::handshake::{self, WorkerIdentity};
use crate::job::{ExecutionState, JobDescriptor};

struct ActiveJob {
    descriptor: JobDescriptor,
    state: ExecutionState,
    stepper: Stepper,
}

enum JobState {
    Idle,
    Running(Box<ActiveJob>),
}

/// What one execution slice led to, computed while the job is borrowed.
enum PassOutcome {
    Continue {
        pause: Duration,
        sync: Option<StateSync>,
    },
    Finished(JobOutput),
    Failed(JobFailure),
}

/// The node's protocol engine: one connection, at most one active job.
pub struct Engine<T, X, D> {
    session: Session<T>,
    executor: X,
    datasets: D,
    config: EngineConfig,
    checkpoints: CheckpointManager,
    identity: Option<WorkerIdentity>,
    job: JobState,
}

impl<T, X, D> Engine<T, X, D>
where
    T: Transport,
    X: ExecutorFactory,
    D: DatasetStore,
{
    /// Create an engine over an open transport.
    ///
    /// Fails with [`EngineError::Environment`] if the host cannot checkpoint.
    pub fn new(
        transport: T,
        executor: X,
        datasets: D,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        check_environment()?;

        Ok(Self {
            session: Session::new(transport),
            executor,
            datasets,
            checkpoints: CheckpointManager::new(config.checkpoint_interval),
            config,
            identity: None,
            job: JobState::Idle,
        })
    }

    /// Replace the default JSON codec.
    pub fn with_codec(mut self, codec: Box<dyn MessageCodec>) -> Self {
        self.session.set_codec(codec);
        self
    }

    /// Identity assigned by the coordinator, once the handshake completed.
    pub fn identity(&self) -> Option<&WorkerIdentity> {
        self.identity.as_ref()
    }

    /// Settings the engine was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True when no job is running.
    pub fn is_idle(&self) -> bool {
        matches!(self.job, JobState::Idle)
    }

    /// Id of the running job, `None` while idle.
    pub fn active_job_id(&self) -> Option<&str> {
        match &self.job {
            JobState::Running(job) => Some(&job.descriptor.job_id),
            JobState::Idle => None,
        }
    }

    /// The underlying connection.
    pub fn transport(&self) -> &T {
        self.session.transport()
    }

    /// Run the handshake. Must complete before any job traffic is processed.
    pub async fn handshake(&mut self) -> Result<WorkerIdentity, EngineError> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }
        let identity = handshake::perform(&mut self.session, &self.config.label).await?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Handshake (if not done yet), then process commands and run jobs until
    /// the connection closes or the protocol is violated.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        match self.run_inner().await {
            Err(EngineError::Transport(TransportError::Closed)) => {
                tracing::info!(
                    active_job = ?self.active_job_id(),
                    "Connection closed, engine stopping"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn run_inner(&mut self) -> Result<(), EngineError> {
        self.handshake().await?;

        loop {
            if self.is_idle() {
                let message = self.session.recv().await?;
                self.handle_message(message).await?;
                continue;
            }

            let pause = self.tick().await?;
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
        }
    }

    /// One loop pass. Returns how long to yield before the next one.
    pub async fn tick(&mut self) -> Result<Duration, EngineError> {
        if let Some(message) = self.session.try_recv()? {
            self.handle_message(message).await?;
        }
        self.advance().await
    }

    /// Tear down: drop any job state and close the transport.
    pub async fn close(&mut self) {
        if let JobState::Running(job) = std::mem::replace(&mut self.job, JobState::Idle) {
            tracing::warn!(job_id = %job.descriptor.job_id, "Dropping active job on close");
        }
        self.session.close().await;
        tracing::debug!("Engine closed");
    }

    async fn handle_message(&mut self, message: InboundMessage) -> Result<(), EngineError> {
        match message {
            InboundMessage::Ping => {
                tracing::trace!("Ping");
                Ok(())
            }
            InboundMessage::BeginHandshake | InboundMessage::IdentityAssigned { .. } => {
                tracing::warn!(
                    kind = message.kind(),
                    "Handshake message after handshake, ignoring"
                );
                Ok(())
            }
            InboundMessage::StartJob(start) => {
                if let JobState::Running(active) = &self.job {
                    return Err(ProtocolViolation::DuplicateStart {
                        active: active.descriptor.job_id.clone(),
                        requested: start.job_id,
                    }
                    .into());
                }
                self.start_job(start).await
            }
            InboundMessage::AbortJob { job_id } => {
                let active = self.active_job_id().map(str::to_string);
                if active.as_deref() != Some(job_id.as_str()) {
                    return Err(ProtocolViolation::AbortMismatch {
                        active,
                        requested: job_id,
                    }
                    .into());
                }
                tracing::info!(%job_id, "Abort requested");
                self.fail_active(JobFailure::Aborted).await
            }
        }
    }

    async fn start_job(&mut self, start: StartJob) -> Result<(), EngineError> {
        let descriptor = JobDescriptor::from(start);
        tracing::info!(
            job_id = %descriptor.job_id,
            dataset_ref = %descriptor.dataset_ref,
            program_bytes = descriptor.program_image.len(),
            resume = descriptor.is_resumption(),
            initial_progress = descriptor.initial_progress,
            checkpoint_interval = ?self.checkpoints.interval(),
            "Starting job"
        );

        let dataset = match self.datasets.fetch(&descriptor.dataset_ref).await {
            Ok(dataset) => dataset,
            Err(e) => return self.report_failure(&descriptor.job_id, e.into()).await,
        };

        let (sender, events) = JobSender::channel();
        let module = match self.executor.instantiate(&descriptor, dataset, sender) {
            Ok(module) => module,
            Err(e) => return self.report_failure(&descriptor.job_id, e.into()).await,
        };

        let state = ExecutionState::new(&descriptor, events, Instant::now());
        let stepper = Stepper::new(module, self.config.step_budget, self.config.default_pause);
        self.job = JobState::Running(Box::new(ActiveJob {
            descriptor,
            state,
            stepper,
        }));
        Ok(())
    }

    async fn advance(&mut self) -> Result<Duration, EngineError> {
        let outcome = {
            let JobState::Running(job) = &mut self.job else {
                return Ok(Duration::ZERO);
            };

            let step = job.stepper.step();
            job.state.absorb_events();
            match step {
                Ok(StepResult::Continue { pause }) => {
                    let checkpoint = self.checkpoints.maybe_checkpoint(
                        &job.descriptor.job_id,
                        &mut job.state,
                        &mut job.stepper,
                        Instant::now(),
                    );
                    match checkpoint {
                        Ok(sync) => PassOutcome::Continue { pause, sync },
                        Err(failure) => PassOutcome::Failed(failure),
                    }
                }
                Ok(StepResult::Finished(output)) => PassOutcome::Finished(output),
                Err(failure) => PassOutcome::Failed(failure),
            }
        };

        match outcome {
            PassOutcome::Continue { pause, sync } => {
                if let Some(sync) = sync {
                    self.session.send(&OutboundMessage::StateSync(sync)).await?;
                }
                Ok(pause)
            }
            PassOutcome::Finished(output) => {
                self.complete(output).await?;
                Ok(Duration::ZERO)
            }
            PassOutcome::Failed(failure) => {
                self.fail_active(failure).await?;
                Ok(Duration::ZERO)
            }
        }
    }

    async fn complete(&mut self, output: JobOutput) -> Result<(), EngineError> {
        let JobState::Running(mut job) = std::mem::replace(&mut self.job, JobState::Idle) else {
            return Ok(());
        };
        let job_id = job.descriptor.job_id.clone();

        let now = Instant::now();
        let sync = self.checkpoints.finalize(&job_id, &mut job.state, now);
        tracing::info!(
            %job_id,
            content_type = ?output.content_type,
            output_bytes = output.bytes.len(),
            steps = job.stepper.steps_taken(),
            "Job succeeded"
        );
        drop(job);

        self.session.send(&OutboundMessage::StateSync(sync)).await?;
        let result = JobResult::success(job_id, output);
        self.session.send(&OutboundMessage::JobResult(result)).await
    }

    async fn fail_active(&mut self, failure: JobFailure) -> Result<(), EngineError> {
        let JobState::Running(job) = std::mem::replace(&mut self.job, JobState::Idle) else {
            return Ok(());
        };
        self.report_failure(&job.descriptor.job_id, failure).await
    }

    async fn report_failure(
        &mut self,
        job_id: &str,
        failure: JobFailure,
    ) -> Result<(), EngineError> {
        match &failure {
            JobFailure::Aborted => tracing::info!(%job_id, "Job aborted"),
            other => tracing::warn!(%job_id, error = %other, "Job failed"),
        }
        let result = JobResult::failure(job_id, &failure);
        self.session.send(&OutboundMessage::JobResult(result)).await
    }
}
