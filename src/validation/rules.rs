use crate::error::PackagingError;
use crate::image::{ImageDefinition, Instruction, RunStep};
use crate::output::PackagingRecipe;
use crate::stack::{native, python};
use anyhow::{bail, Result};

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()>;
}

/// True when an image reference names an exact tag or digest
pub fn is_pinned(image: &str) -> bool {
    if image.contains("@sha256:") {
        return true;
    }
    let name = image.rsplit('/').next().unwrap_or(image);
    match name.split_once(':') {
        Some((_, tag)) => !tag.is_empty() && tag != "latest",
        None => false,
    }
}

pub struct PinnedBaseImageRule;

impl ValidationRule for PinnedBaseImageRule {
    fn name(&self) -> &'static str {
        "PinnedBaseImage"
    }

    fn validate(&self, _recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        for stage in image.stages() {
            let base = stage.base_image().unwrap_or("");
            if !is_pinned(base) {
                return Err(PackagingError::UnpinnedBaseImage(base.to_string()).into());
            }
        }
        Ok(())
    }
}

pub struct MatchingBaseImageRule;

impl ValidationRule for MatchingBaseImageRule {
    fn name(&self) -> &'static str {
        "MatchingBaseImage"
    }

    fn validate(&self, _recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let builder = image.builder.base_image().unwrap_or("");
        let runtime = image.runtime.base_image().unwrap_or("");
        if builder != runtime {
            return Err(PackagingError::BaseImageMismatch {
                builder: builder.to_string(),
                runtime: runtime.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Every native development package compiled against in the builder has its
/// shared-library counterpart installed in the runtime
pub struct RuntimeLibraryMappingRule;

impl ValidationRule for RuntimeLibraryMappingRule {
    fn name(&self) -> &'static str {
        "RuntimeLibraryMapping"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let runtime_packages = image.runtime.installed_packages();
        for package in image.builder.installed_packages() {
            if !native::is_dev_package(package) || recipe.builder.toolchain.iter().any(|t| t == package) {
                continue;
            }
            match native::runtime_counterpart(&recipe.native_libraries, package) {
                Some(runtime) if runtime_packages.contains(&runtime) => {}
                Some(runtime) => bail!(
                    "Runtime package '{}' for '{}' is not installed in the runtime stage",
                    runtime,
                    package
                ),
                None => {
                    return Err(PackagingError::UnmappedNativeLibrary {
                        library: package.trim_end_matches("-dev").to_string(),
                        dev_package: package.to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }
}

pub struct NoToolchainInRuntimeRule;

impl ValidationRule for NoToolchainInRuntimeRule {
    fn name(&self) -> &'static str {
        "NoToolchainInRuntime"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let leaked: Vec<&str> = image
            .runtime
            .installed_packages()
            .into_iter()
            .filter(|p| {
                native::is_dev_package(p)
                    || recipe.builder.toolchain.iter().any(|t| t == p)
                    || recipe.builder.extra_packages.iter().any(|t| t == p)
            })
            .collect();
        if !leaked.is_empty() {
            bail!("Runtime stage installs build-only packages: {}", leaked.join(", "));
        }
        Ok(())
    }
}

pub struct NonRootUserRule;

impl ValidationRule for NonRootUserRule {
    fn name(&self) -> &'static str {
        "NonRootUser"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        match image.runtime.final_user() {
            None => bail!("Runtime stage never switches away from root"),
            Some("root") | Some("0") => bail!("Runtime stage runs as root"),
            Some(user) if user != recipe.runtime.identity.user => bail!(
                "Runtime stage switches to '{}', expected '{}'",
                user,
                recipe.runtime.identity.user
            ),
            Some(_) => {}
        }

        let created = image.runtime.run_steps().any(|s| {
            matches!(s, RunStep::AddUser { name, .. } if *name == recipe.runtime.identity.user)
        });
        if !created {
            bail!("Runtime user '{}' is never created", recipe.runtime.identity.user);
        }
        Ok(())
    }
}

/// Data and log directories are owned by the runtime user; the log
/// directory's ownership is fixed after the source tree is copied
pub struct RuntimeOwnershipRule;

impl ValidationRule for RuntimeOwnershipRule {
    fn name(&self) -> &'static str {
        "RuntimeOwnership"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let spec = &recipe.runtime;
        let user = &spec.identity.user;
        let stage = &image.runtime;

        let owns = |steps: &[RunStep], path: &str| {
            steps.iter().any(|s| {
                matches!(s, RunStep::Chown { user: u, paths, .. } if u == user && paths.iter().any(|p| p == path))
            })
        };
        let creates = |steps: &[RunStep], path: &str| {
            steps
                .iter()
                .any(|s| matches!(s, RunStep::MakeDirs { paths } if paths.iter().any(|p| p == path)))
        };

        let source_copy = stage
            .position(|i| matches!(i, Instruction::Copy { from_stage: None, .. }))
            .ok_or_else(|| anyhow::anyhow!("Runtime stage never copies the source tree"))?;

        let data = spec.data_dir.reference();
        let data_ok = stage.instructions.iter().any(|i| match i {
            Instruction::Run { steps } => creates(steps, &data) && owns(steps, &data),
            _ => false,
        });
        if !data_ok {
            bail!("Data directory {} is not created and owned by '{}'", data, user);
        }

        let mut owned_after_copy = vec![spec.log_dir.reference()];
        if let Some(ref cache) = spec.cache_dir {
            owned_after_copy.push(cache.reference());
        }
        for path in owned_after_copy {
            let fixed = stage.instructions[source_copy..].iter().any(|i| match i {
                Instruction::Run { steps } => owns(steps, &path),
                _ => false,
            });
            if !fixed {
                bail!("{} is not re-owned by '{}' after the source copy", path, user);
            }
        }
        Ok(())
    }
}

/// Executable search path resolves the environment first in both stages and
/// the environment is copied to the same absolute path
pub struct PathBindingRule;

impl ValidationRule for PathBindingRule {
    fn name(&self) -> &'static str {
        "PathBinding"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let venv = &recipe.builder.venv_path;
        let expected = python::path_binding(venv);
        for stage in image.stages() {
            if stage.env("PATH") != Some(expected.as_str()) {
                bail!(
                    "PATH in {:?} stage is {:?}, expected {:?}",
                    stage.role,
                    stage.env("PATH"),
                    expected
                );
            }
        }

        let alias = image.builder_alias().unwrap_or("");
        let copied = image.runtime.instructions.iter().any(|i| {
            matches!(i, Instruction::Copy { from_stage: Some(from), sources, destination }
                if from == alias && sources.len() == 1 && &sources[0] == venv && destination == venv)
        });
        if !copied {
            bail!("Virtual environment {} is not copied from stage '{}' to the same path", venv, alias);
        }
        Ok(())
    }
}

/// Default launch runs the environment's interpreter and binds all interfaces
/// on the exposed port
pub struct DefaultLaunchRule;

impl ValidationRule for DefaultLaunchRule {
    fn name(&self) -> &'static str {
        "DefaultLaunch"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let interpreter = python::interpreter(&recipe.builder.venv_path);
        match image.runtime.entrypoint() {
            Some([exec]) if *exec == interpreter => {}
            other => bail!("Entrypoint {:?} is not [{:?}]", other, interpreter),
        }

        let ports = image.runtime.exposed_ports();
        if !ports.contains(&recipe.launch.port) {
            bail!("Port {} is not exposed", recipe.launch.port);
        }

        let bind = format!("0.0.0.0:{}", recipe.launch.port);
        let cmd = image.runtime.cmd().unwrap_or_default();
        if !cmd.iter().any(|a| *a == bind) {
            bail!("Default command {:?} does not listen on {}", cmd, bind);
        }
        Ok(())
    }
}

/// `REQUIREMENTS` is the only build-time parameter and lives in the builder
pub struct SingleBuildArgRule;

impl ValidationRule for SingleBuildArgRule {
    fn name(&self) -> &'static str {
        "SingleBuildArg"
    }

    fn validate(&self, recipe: &PackagingRecipe, image: &ImageDefinition) -> Result<()> {
        let expected = recipe.builder.requirements.arg_name.as_str();
        let builder_args = image.builder.args();
        if builder_args != [expected] {
            bail!("Builder declares build arguments {:?}, expected only {}", builder_args, expected);
        }
        if !image.runtime.args().is_empty() {
            bail!("Runtime stage declares build arguments {:?}", image.runtime.args());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestVariant, RequirementsRef};
    use crate::pipeline::{assemble_build_env, assemble_runtime_image, SourceTree};
    use yare::parameterized;

    fn assembled(recipe: &PackagingRecipe) -> ImageDefinition {
        let requirements =
            RequirementsRef::resolve(&recipe.builder.requirements, &ManifestVariant::Production)
                .unwrap();
        let env = assemble_build_env(recipe, &requirements).unwrap();
        assemble_runtime_image(&env, &SourceTree::opaque(), recipe).unwrap()
    }

    fn all_rules() -> Vec<Box<dyn ValidationRule>> {
        vec![
            Box::new(PinnedBaseImageRule),
            Box::new(MatchingBaseImageRule),
            Box::new(RuntimeLibraryMappingRule),
            Box::new(NoToolchainInRuntimeRule),
            Box::new(NonRootUserRule),
            Box::new(RuntimeOwnershipRule),
            Box::new(PathBindingRule),
            Box::new(DefaultLaunchRule),
            Box::new(SingleBuildArgRule),
        ]
    }

    #[test]
    fn test_default_recipe_passes_every_rule() {
        let recipe = PackagingRecipe::default();
        let image = assembled(&recipe);
        for rule in all_rules() {
            assert!(rule.validate(&recipe, &image).is_ok(), "{} failed", rule.name());
        }
    }

    #[parameterized(
        tagged = { "alpine:3.12.4", true },
        registry_port = { "registry.local:5000/alpine:3.12.4", true },
        digest = { "alpine@sha256:abcdef", true },
        untagged = { "alpine", false },
        latest = { "alpine:latest", false },
        registry_port_untagged = { "registry.local:5000/alpine", false },
    )]
    fn test_is_pinned(image: &str, expected: bool) {
        assert_eq!(is_pinned(image), expected);
    }

    #[test]
    fn test_unpinned_base_rejected() {
        let mut recipe = PackagingRecipe::default();
        recipe.builder.base_image = "alpine:latest".to_string();
        let image = assembled(&recipe);
        let err = PinnedBaseImageRule.validate(&recipe, &image).unwrap_err();
        assert!(err.to_string().contains("alpine:latest"));
    }

    #[test]
    fn test_mismatched_base_rejected() {
        let recipe = PackagingRecipe::default();
        let mut image = assembled(&recipe);
        image.runtime.instructions[0] = Instruction::From {
            image: "alpine:3.13.2".to_string(),
            alias: None,
        };
        assert!(MatchingBaseImageRule.validate(&recipe, &image).is_err());
    }

    #[test]
    fn test_dev_package_without_counterpart_rejected() {
        let mut recipe = PackagingRecipe::default();
        recipe.builder.extra_packages.push("libyaml-dev".to_string());
        let image = assembled(&recipe);
        let err = RuntimeLibraryMappingRule.validate(&recipe, &image).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackagingError>(),
            Some(PackagingError::UnmappedNativeLibrary { .. })
        ));
    }

    #[test]
    fn test_missing_runtime_counterpart_rejected() {
        let recipe = PackagingRecipe::default();
        let mut image = assembled(&recipe);
        for instruction in image.runtime.instructions.iter_mut() {
            if let Instruction::Run { steps } = instruction {
                for step in steps.iter_mut() {
                    if let RunStep::Install { packages, .. } = step {
                        packages.retain(|p| p != "libxslt");
                    }
                }
            }
        }
        let err = RuntimeLibraryMappingRule.validate(&recipe, &image).unwrap_err();
        assert!(err.to_string().contains("libxslt"));
    }

    #[test]
    fn test_toolchain_leak_rejected() {
        let mut recipe = PackagingRecipe::default();
        recipe.runtime.extra_packages.push("gcc".to_string());
        let image = assembled(&recipe);
        let err = NoToolchainInRuntimeRule.validate(&recipe, &image).unwrap_err();
        assert!(err.to_string().contains("gcc"));
    }

    #[test]
    fn test_missing_user_switch_rejected() {
        let recipe = PackagingRecipe::default();
        let mut image = assembled(&recipe);
        image
            .runtime
            .instructions
            .retain(|i| !matches!(i, Instruction::User { .. }));
        assert!(NonRootUserRule.validate(&recipe, &image).is_err());
    }

    #[test]
    fn test_log_ownership_before_copy_rejected() {
        let recipe = PackagingRecipe::default();
        let mut image = assembled(&recipe);
        let copy = image
            .runtime
            .position(|i| matches!(i, Instruction::Copy { from_stage: None, .. }))
            .unwrap();
        // move the source copy after the post-copy ownership fix
        let instruction = image.runtime.instructions.remove(copy);
        image.runtime.instructions.insert(copy + 1, instruction);
        let err = RuntimeOwnershipRule.validate(&recipe, &image).unwrap_err();
        assert!(err.to_string().contains("$SPIDERFOOT_LOGS"));
    }

    #[test]
    fn test_wrong_bind_rejected() {
        let mut recipe = PackagingRecipe::default();
        recipe.launch.bind_host = "127.0.0.1".to_string();
        let image = assembled(&recipe);
        assert!(DefaultLaunchRule.validate(&recipe, &image).is_err());
    }

    #[test]
    fn test_extra_build_arg_rejected() {
        let recipe = PackagingRecipe::default();
        let mut image = assembled(&recipe);
        image.runtime.instructions.insert(
            1,
            Instruction::Arg {
                name: "VERSION".to_string(),
                default: None,
            },
        );
        assert!(SingleBuildArgRule.validate(&recipe, &image).is_err());
    }

    #[test]
    fn test_path_binding_requires_same_venv_path() {
        let recipe = PackagingRecipe::default();
        let mut image = assembled(&recipe);
        for instruction in image.runtime.instructions.iter_mut() {
            if let Instruction::Copy {
                from_stage: Some(_),
                destination,
                ..
            } = instruction
            {
                *destination = "/usr/local/venv".to_string();
            }
        }
        assert!(PathBindingRule.validate(&recipe, &image).is_err());
    }
}
