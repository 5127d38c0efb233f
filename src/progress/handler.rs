//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while an image definition is assembled and built
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Assembly started for a recipe
    Started { recipe: String, requirements: String },

    PhaseStarted { phase: String },

    PhaseComplete { phase: String, duration: Duration },

    /// Build state machine advanced
    StateChanged { from: String, to: String },

    ValidationStarted { rules: usize },

    ValidationComplete { rules: usize, failures: usize },

    /// One line of build tool output
    BuildOutput { line: String },

    Completed { total_time: Duration },

    Failed { error: String },
}

/// Trait for handling progress events during assembly
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
