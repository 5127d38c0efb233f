//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started {
                recipe,
                requirements,
            } => {
                info!(recipe = %recipe, requirements = %requirements, "Assembling image definition");
            }
            ProgressEvent::PhaseStarted { phase } => {
                info!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                debug!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::StateChanged { from, to } => {
                debug!(from = %from, to = %to, "Build state advanced");
            }
            ProgressEvent::ValidationStarted { rules } => {
                debug!(rules, "Starting validation");
            }
            ProgressEvent::ValidationComplete { rules, failures } => {
                if *failures > 0 {
                    warn!(rules, failures, "Validation complete with failures");
                } else {
                    info!(rules, "Validation passed");
                }
            }
            ProgressEvent::BuildOutput { line } => {
                info!(target: "reconpack::build", "{}", line);
            }
            ProgressEvent::Completed { total_time } => {
                info!(total_time_ms = total_time.as_millis(), "Image definition ready");
            }
            ProgressEvent::Failed { error } => {
                error!(error = %error, "Assembly failed");
            }
        }
    }
}
