//! Checkpointing - periodic state syncs that make long-running jobs resumable.
//!
//! Every `interval`, the active job's interpreter snapshot is gzip-compressed and
//! shipped together with the current progress and the log lines buffered since
//! the previous sync. The coordinator keeps the latest snapshot per job and can
//! hand it back as `prior_state` on a later start command.

use std::io::{self, Read, Write};
use std::time::Duration;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tokio::time::Instant;

use crate::bridge::protocol::StateSync;
use crate::error::{EngineError, JobFailure};
use crate::executor::Stepper;
use crate::job::ExecutionState;

pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_millis(1000);

pub fn compress(snapshot: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(snapshot.len() / 2), Compression::fast());
    encoder.write_all(snapshot)?;
    encoder.finish()
}

pub fn decompress(compressed: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut snapshot = Vec::new();
    decoder.read_to_end(&mut snapshot)?;
    Ok(snapshot)
}

/// Verify the compressor works on this host. Run once before connecting.
pub fn check_environment() -> Result<(), EngineError> {
    let sample = b"reef checkpoint sample".repeat(8);
    let compressed = compress(&sample)
        .map_err(|e| EngineError::environment(format!("gzip compression unavailable: {e}")))?;
    let restored = decompress(&compressed)
        .map_err(|e| EngineError::environment(format!("gzip decompression unavailable: {e}")))?;
    if restored != sample {
        return Err(EngineError::environment(
            "gzip round-trip produced different bytes",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    interval: Duration,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_INTERVAL)
    }
}

impl CheckpointManager {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, state: &ExecutionState, now: Instant) -> bool {
        now.saturating_duration_since(state.last_checkpoint_at()) >= self.interval
    }

    /// Build a state sync if the interval has elapsed.
    ///
    /// On success the log buffer is cleared and the timer reset.
    pub fn maybe_checkpoint(
        &self,
        job_id: &str,
        state: &mut ExecutionState,
        stepper: &mut Stepper,
        now: Instant,
    ) -> Result<Option<StateSync>, JobFailure> {
        if !self.is_due(state, now) {
            return Ok(None);
        }

        let snapshot = stepper.snapshot()?;
        let compressed_state = compress(&snapshot).map_err(JobFailure::Checkpoint)?;
        state.absorb_events();

        let sync = StateSync {
            job_id: job_id.to_string(),
            progress: state.progress(),
            compressed_state,
            log_lines: state.buffer_mut().take_lines(),
        };
        state.mark_checkpoint(now);

        tracing::debug!(
            job_id,
            progress = sync.progress,
            snapshot_bytes = snapshot.len(),
            compressed_bytes = sync.compressed_state.len(),
            log_lines = sync.log_lines.len(),
            "Checkpoint"
        );
        Ok(Some(sync))
    }

    /// The unconditional final sync sent right before a success result:
    /// full progress, empty snapshot, any remaining logs.
    ///
    /// Lines already flushed are never repeated, so calling this twice yields
    /// an empty log list the second time.
    pub fn finalize(&self, job_id: &str, state: &mut ExecutionState, now: Instant) -> StateSync {
        state.absorb_events();
        state.buffer_mut().record_progress(1.0);
        state.mark_checkpoint(now);

        StateSync {
            job_id: job_id.to_string(),
            progress: state.progress(),
            compressed_state: Vec::new(),
            log_lines: state.buffer_mut().take_lines(),
        }
    }
}
