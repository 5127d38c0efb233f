//! Two-stage assembly pipeline

pub mod builder;
pub mod context;
pub mod launch;
pub mod orchestrator;
pub mod runtime;
pub mod state;

pub use builder::{assemble_build_env, EnvironmentArtifact};
pub use context::{BuildContext, ContextReport, ContextWarning};
pub use launch::{LaunchMode, RunCommand};
pub use orchestrator::PipelineOrchestrator;
pub use runtime::{assemble_runtime_image, SourceTree};
pub use state::BuildState;
