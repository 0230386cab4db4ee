//! Log and progress accumulation between checkpoints.

/// Log lines produced since the last checkpoint, plus the job's progress.
///
/// Progress is a fraction in `[0, 1]` that never decreases.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: Vec<String>,
    progress: f32,
}

impl LogBuffer {
    pub fn with_progress(initial: f32) -> Self {
        let mut buffer = Self::default();
        buffer.record_progress(initial);
        buffer
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Record a progress report. Returns false if it was ignored.
    pub fn record_progress(&mut self, done: f32) -> bool {
        if done.is_nan() {
            return false;
        }
        let done = done.clamp(0.0, 1.0);
        if done < self.progress {
            tracing::debug!(
                reported = done,
                current = self.progress,
                "Ignoring regressing progress report"
            );
            return false;
        }
        self.progress = done;
        true
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Remove and return every buffered line.
    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}
