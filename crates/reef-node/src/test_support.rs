//! Scripted execution modules for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::executor::{
    ExecutionError, ExecutionModule, ExecutorFactory, JobSender, RawOutput, StepOutcome, Stepper,
};
use crate::job::JobDescriptor;

pub(crate) struct ScriptStep {
    logs: Vec<String>,
    progress: Option<f32>,
    outcome: Result<StepOutcome, ExecutionError>,
}

impl ScriptStep {
    pub(crate) fn log(mut self, line: &str) -> Self {
        self.logs.push(line.to_string());
        self
    }

    pub(crate) fn progress(mut self, done: f32) -> Self {
        self.progress = Some(done);
        self
    }
}

pub(crate) fn pending(pause_ms: Option<u64>) -> ScriptStep {
    ScriptStep {
        logs: Vec::new(),
        progress: None,
        outcome: Ok(StepOutcome::Pending {
            pause: pause_ms.map(Duration::from_millis),
        }),
    }
}

pub(crate) fn done(content_type: u8, bytes: &[u8]) -> ScriptStep {
    ScriptStep {
        logs: Vec::new(),
        progress: None,
        outcome: Ok(StepOutcome::Done(RawOutput {
            content_type,
            bytes: bytes.to_vec(),
        })),
    }
}

pub(crate) fn crash(message: &str) -> ScriptStep {
    ScriptStep {
        logs: Vec::new(),
        progress: None,
        outcome: Err(ExecutionError::runtime(message)),
    }
}

pub(crate) fn descriptor(job_id: &str) -> JobDescriptor {
    JobDescriptor {
        job_id: job_id.to_string(),
        program_image: vec![0x00, 0x61, 0x73, 0x6d],
        dataset_ref: "dataset".to_string(),
        prior_state: None,
        initial_progress: 0.0,
    }
}

pub(crate) struct ScriptedModule {
    script: VecDeque<ScriptStep>,
    snapshot: Option<Vec<u8>>,
    budgets: Arc<Mutex<Vec<u32>>>,
    sender: Option<JobSender>,
    rejects_prior_state: bool,
}

impl ScriptedModule {
    pub(crate) fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script: script.into(),
            snapshot: Some(b"snapshot".to_vec()),
            budgets: Arc::new(Mutex::new(Vec::new())),
            sender: None,
            rejects_prior_state: false,
        }
    }

    pub(crate) fn with_snapshot(mut self, snapshot: Vec<u8>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub(crate) fn with_failing_snapshot(mut self) -> Self {
        self.snapshot = None;
        self
    }

    pub(crate) fn rejecting_prior_state(mut self) -> Self {
        self.rejects_prior_state = true;
        self
    }

    pub(crate) fn budgets(&self) -> Arc<Mutex<Vec<u32>>> {
        Arc::clone(&self.budgets)
    }

    pub(crate) fn into_stepper(self) -> Stepper {
        Stepper::new(Box::new(self), 100, Duration::from_millis(10))
    }
}

impl ExecutionModule for ScriptedModule {
    fn step(&mut self, budget: u32) -> Result<StepOutcome, ExecutionError> {
        self.budgets.lock().unwrap().push(budget);
        let step = self
            .script
            .pop_front()
            .ok_or_else(|| ExecutionError::runtime("script exhausted"))?;

        if let Some(sender) = &self.sender {
            for line in step.logs {
                sender.log(line)?;
            }
            if let Some(done) = step.progress {
                sender.progress(done)?;
            }
        }
        step.outcome
    }

    fn snapshot(&mut self) -> Result<Vec<u8>, ExecutionError> {
        self.snapshot
            .clone()
            .ok_or_else(|| ExecutionError::snapshot("snapshot unsupported"))
    }
}

/// Hands out one scripted module per `instantiate`, recording what it was given.
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    modules: Mutex<VecDeque<ScriptedModule>>,
    instantiated: Arc<Mutex<Vec<(JobDescriptor, Vec<u8>)>>>,
}

impl ScriptedFactory {
    pub(crate) fn new(modules: Vec<ScriptedModule>) -> Self {
        Self {
            modules: Mutex::new(modules.into()),
            instantiated: Arc::default(),
        }
    }

    pub(crate) fn instantiated(&self) -> Arc<Mutex<Vec<(JobDescriptor, Vec<u8>)>>> {
        Arc::clone(&self.instantiated)
    }
}

impl ExecutorFactory for ScriptedFactory {
    fn instantiate(
        &self,
        job: &JobDescriptor,
        dataset: Vec<u8>,
        sender: JobSender,
    ) -> Result<Box<dyn ExecutionModule>, ExecutionError> {
        self.instantiated
            .lock()
            .unwrap()
            .push((job.clone(), dataset));
        let mut module = self
            .modules
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ExecutionError::load("invalid program image"))?;
        if module.rejects_prior_state && job.prior_state.is_some() {
            return Err(ExecutionError::restore("snapshot does not match program"));
        }
        module.sender = Some(sender);
        Ok(Box::new(module))
    }
}
