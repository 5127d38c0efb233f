//! Builder stage assembly
//!
//! The builder installs the toolchain and the development half of every
//! native library, creates the virtual environment and installs the manifest
//! chosen by the single build argument. Its only product is the environment
//! directory; everything else is discarded with the stage.

use crate::error::PackagingError;
use crate::image::{Instruction, RunStep, Stage, StageRole};
use crate::manifest::RequirementsRef;
use crate::output::PackagingRecipe;
use crate::stack::python;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The self-contained virtual environment the runtime stage copies by reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentArtifact {
    pub stage: Stage,
    /// Alias the runtime uses in `COPY --from`
    pub stage_name: String,
    /// Absolute path, identical in both stages
    pub venv_path: String,
    pub requirements: RequirementsRef,
}

impl EnvironmentArtifact {
    pub fn bin_dir(&self) -> String {
        python::bin_dir(&self.venv_path)
    }

    pub fn interpreter(&self) -> String {
        python::interpreter(&self.venv_path)
    }
}

pub(crate) fn require_absolute(purpose: &str, path: &str) -> Result<(), PackagingError> {
    if path.starts_with('/') && !path.split('/').any(|c| c == "..") {
        Ok(())
    } else {
        Err(PackagingError::InvalidPath {
            purpose: purpose.to_string(),
            path: path.to_string(),
        })
    }
}

/// Assemble the builder stage for a resolved requirements argument
pub fn assemble_build_env(
    recipe: &PackagingRecipe,
    requirements: &RequirementsRef,
) -> Result<EnvironmentArtifact, PackagingError> {
    let spec = &recipe.builder;
    require_absolute("virtual environment", &spec.venv_path)?;
    require_absolute("builder workdir", &spec.workdir)?;
    if spec.base_image.trim().is_empty() {
        return Err(PackagingError::UnpinnedBaseImage(spec.base_image.clone()));
    }
    if spec.stage_name.trim().is_empty() {
        return Err(PackagingError::InvalidPath {
            purpose: "builder stage name".to_string(),
            path: spec.stage_name.clone(),
        });
    }

    let production = spec.requirements.production.trim_start_matches("./");
    let expansion = requirements.expansion();

    let mut stage = Stage::new(StageRole::Builder, Some(spec.stage_name.clone()));
    stage
        .push(Instruction::From {
            image: spec.base_image.clone(),
            alias: Some(spec.stage_name.clone()),
        })
        .push(Instruction::Arg {
            name: requirements.arg_name.clone(),
            default: Some(requirements.default_path.clone()),
        })
        .push(Instruction::Run {
            steps: vec![RunStep::Install {
                packages: recipe.builder_packages(),
                update: false,
            }],
        })
        .push(Instruction::Run {
            steps: vec![RunStep::Shell {
                command: python::create_venv(&spec.venv_path),
            }],
        })
        .push(Instruction::Env {
            vars: vec![("PATH".to_string(), python::path_binding(&spec.venv_path))],
        })
        .push(Instruction::Workdir {
            path: spec.workdir.clone(),
        })
        // the production manifest travels along so `-r ../requirements.txt` resolves
        .push(Instruction::Copy {
            from_stage: None,
            sources: vec![production.to_string()],
            destination: format!("./{}", production),
        })
        .push(Instruction::Copy {
            from_stage: None,
            sources: vec![expansion.clone()],
            destination: format!("./{}", expansion),
        });

    if spec.upgrade_pip {
        stage.push(Instruction::Run {
            steps: vec![RunStep::Shell {
                command: python::upgrade_pip(),
            }],
        });
    }
    stage.push(Instruction::Run {
        steps: vec![RunStep::Shell {
            command: python::install_requirements(&expansion),
        }],
    });

    debug!(
        instructions = stage.instructions.len(),
        requirements = %requirements.default_path,
        "Builder stage assembled"
    );

    Ok(EnvironmentArtifact {
        stage,
        stage_name: spec.stage_name.clone(),
        venv_path: spec.venv_path.clone(),
        requirements: requirements.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestVariant;

    fn build(variant: ManifestVariant) -> EnvironmentArtifact {
        let recipe = PackagingRecipe::default();
        let requirements = RequirementsRef::resolve(&recipe.builder.requirements, &variant).unwrap();
        assemble_build_env(&recipe, &requirements).unwrap()
    }

    #[test]
    fn test_stage_is_aliased_and_pinned() {
        let artifact = build(ManifestVariant::Production);
        assert_eq!(artifact.stage.base_image(), Some("alpine:3.12.4"));
        assert_eq!(artifact.stage.name.as_deref(), Some("build"));
        assert_eq!(artifact.stage_name, "build");
    }

    #[test]
    fn test_single_build_argument_with_default() {
        let artifact = build(ManifestVariant::Production);
        assert_eq!(artifact.stage.args(), vec!["REQUIREMENTS"]);
        assert!(artifact.stage.instructions.contains(&Instruction::Arg {
            name: "REQUIREMENTS".to_string(),
            default: Some("requirements.txt".to_string()),
        }));
    }

    #[test]
    fn test_path_rebinding() {
        let artifact = build(ManifestVariant::Production);
        assert_eq!(artifact.stage.env("PATH"), Some("/opt/venv/bin:$PATH"));
        assert_eq!(artifact.interpreter(), "/opt/venv/bin/python");
    }

    #[test]
    fn test_install_runs_after_manifest_copy() {
        let artifact = build(ManifestVariant::Test);
        let copy = artifact
            .stage
            .position(|i| matches!(i, Instruction::Copy { sources, .. } if sources == &vec!["$REQUIREMENTS".to_string()]))
            .unwrap();
        let install = artifact
            .stage
            .position(|i| match i {
                Instruction::Run { steps } => steps.iter().any(|s| {
                    matches!(s, RunStep::Shell { command } if command.contains("-r \"$REQUIREMENTS\""))
                }),
                _ => false,
            })
            .unwrap();
        assert!(copy < install);
    }

    #[test]
    fn test_variants_differ_only_in_arg_default() {
        let production = build(ManifestVariant::Production);
        let test = build(ManifestVariant::Test);

        let differing: Vec<_> = production
            .stage
            .instructions
            .iter()
            .zip(test.stage.instructions.iter())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(differing.len(), 1);
        assert!(matches!(differing[0].0, Instruction::Arg { .. }));
    }

    #[test]
    fn test_toolchain_installed() {
        let artifact = build(ManifestVariant::Production);
        let packages = artifact.stage.installed_packages();
        for expected in ["gcc", "musl-dev", "python3", "python3-dev", "libxslt-dev", "jpeg-dev"] {
            assert!(packages.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_relative_venv_rejected() {
        let mut recipe = PackagingRecipe::default();
        recipe.builder.venv_path = "venv".to_string();
        let requirements =
            RequirementsRef::resolve(&recipe.builder.requirements, &ManifestVariant::Production)
                .unwrap();
        let err = assemble_build_env(&recipe, &requirements).unwrap_err();
        assert!(matches!(err, PackagingError::InvalidPath { .. }));
    }

    #[test]
    fn test_pip_upgrade_optional() {
        let mut recipe = PackagingRecipe::default();
        recipe.builder.upgrade_pip = false;
        let requirements =
            RequirementsRef::resolve(&recipe.builder.requirements, &ManifestVariant::Production)
                .unwrap();
        let artifact = assemble_build_env(&recipe, &requirements).unwrap();
        let upgrades = artifact
            .stage
            .run_steps()
            .filter(|s| matches!(s, RunStep::Shell { command } if command.contains("-U pip")))
            .count();
        assert_eq!(upgrades, 0);
    }
}
