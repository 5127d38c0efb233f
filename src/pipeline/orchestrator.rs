use super::builder::assemble_build_env;
use super::runtime::{assemble_runtime_image, SourceTree};
use super::state::BuildState;
use crate::image::ImageDefinition;
use crate::manifest::{ManifestVariant, RequirementsRef};
use crate::output::PackagingRecipe;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::validation::Validator;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Drives the two assembly functions through the build state machine and
/// validates the result
pub struct PipelineOrchestrator {
    progress_handler: Option<Arc<dyn ProgressHandler>>,
    validator: Validator,
}

impl PipelineOrchestrator {
    pub fn new(progress_handler: Option<Arc<dyn ProgressHandler>>) -> Self {
        Self {
            progress_handler,
            validator: Validator::new(),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }

    fn transition(&self, state: BuildState, to: BuildState) -> Result<BuildState> {
        let next = state.advance(to)?;
        self.emit(ProgressEvent::StateChanged {
            from: state.to_string(),
            to: next.to_string(),
        });
        Ok(next)
    }

    fn phase<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        debug!("Phase: {}", name);
        self.emit(ProgressEvent::PhaseStarted {
            phase: name.to_string(),
        });
        let start = Instant::now();
        let value = f().with_context(|| format!("Phase {} failed", name))?;
        self.emit(ProgressEvent::PhaseComplete {
            phase: name.to_string(),
            duration: start.elapsed(),
        });
        debug!("Phase {} complete", name);
        Ok(value)
    }

    pub fn execute(
        &self,
        recipe: &PackagingRecipe,
        variant: &ManifestVariant,
        source: &SourceTree,
    ) -> Result<ImageDefinition> {
        let result = self.run(recipe, variant, source);
        if let Err(ref e) = result {
            self.emit(ProgressEvent::Failed {
                error: format!("{:#}", e),
            });
        }
        result
    }

    fn run(
        &self,
        recipe: &PackagingRecipe,
        variant: &ManifestVariant,
        source: &SourceTree,
    ) -> Result<ImageDefinition> {
        let start = Instant::now();
        self.emit(ProgressEvent::Started {
            recipe: recipe.metadata.name.clone(),
            requirements: variant.to_string(),
        });

        let mut state = BuildState::Start;

        let env = self.phase("BuilderStage", || {
            let requirements = RequirementsRef::resolve(&recipe.builder.requirements, variant)?;
            Ok(assemble_build_env(recipe, &requirements)?)
        })?;
        state = self.transition(state, BuildState::BuilderStageComplete)?;

        state = self.transition(state, BuildState::RuntimeStageAssembling)?;
        let image = self.phase("RuntimeStage", || {
            Ok(assemble_runtime_image(&env, source, recipe)?)
        })?;

        self.phase("Validation", || {
            let rules = self.validator.rule_count();
            self.emit(ProgressEvent::ValidationStarted { rules });
            let result = self.validator.validate(recipe, &image);
            self.emit(ProgressEvent::ValidationComplete {
                rules,
                failures: usize::from(result.is_err()),
            });
            result
        })?;
        state = self.transition(state, BuildState::ImageFinalized)?;

        info!(
            state = %state,
            builder_instructions = image.builder.instructions.len(),
            runtime_instructions = image.runtime.instructions.len(),
            "Image definition finalized"
        );
        self.emit(ProgressEvent::Completed {
            total_time: start.elapsed(),
        });

        Ok(image)
    }
}
