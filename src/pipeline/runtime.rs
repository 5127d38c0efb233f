//! Runtime stage assembly
//!
//! Starts again from the same pinned base, installs only the shared-library
//! half of the native mapping, creates the unprivileged identity and its
//! directories, copies the source tree and the finished environment, then
//! drops privileges before declaring the port and the default launch.

use super::builder::{require_absolute, EnvironmentArtifact};
use crate::error::PackagingError;
use crate::fs::{EntryKind, FileSystem};
use crate::image::{ImageDefinition, Instruction, RunStep, Stage, StageRole};
use crate::output::{DirectorySpec, PackagingRecipe};
use crate::stack::python;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// The application tree copied opaquely into the runtime workdir
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTree {
    /// Context root on the host; `None` when the tree was never inspected
    pub root: Option<PathBuf>,
    /// Files that reach the image after ignore rules, relative to the root
    pub files: Vec<PathBuf>,
    /// Directories that reach the image, including empty ones
    pub directories: Vec<PathBuf>,
}

impl SourceTree {
    /// A tree whose contents are unknown; assembly makes no assumptions about it
    pub fn opaque() -> Self {
        Self::default()
    }

    /// Walk a build context, honouring its `.dockerignore`
    pub fn scan(fs: &dyn FileSystem, root: &Path) -> Result<Self> {
        let ignore = fs.load_ignore(root)?;
        let mut tree = Self {
            root: Some(root.to_path_buf()),
            ..Self::default()
        };
        for entry in fs.walk(root, &ignore)? {
            match entry.kind {
                EntryKind::File => tree.files.push(entry.path),
                EntryKind::Directory => tree.directories.push(entry.path),
            }
        }
        debug!(
            root = %root.display(),
            files = tree.files.len(),
            directories = tree.directories.len(),
            "Scanned source tree"
        );
        Ok(tree)
    }

    pub fn is_scanned(&self) -> bool {
        self.root.is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.iter().any(|f| f == path)
    }

    /// True if `dir` itself is copied, even when empty
    pub fn has_directory(&self, dir: &Path) -> bool {
        self.directories.iter().any(|d| d == dir)
    }
}

fn identity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid regex"))
}

fn env_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// User and group must be creatable by busybox and must not be root
pub fn check_identity(user: &str, group: &str) -> Result<(), PackagingError> {
    for (kind, name) in [("user", user), ("group", group)] {
        if !identity_regex().is_match(name) {
            return Err(PackagingError::InvalidIdentity(format!(
                "{} name '{}' is not a valid account name",
                kind, name
            )));
        }
    }
    if user == "root" || group == "root" {
        return Err(PackagingError::InvalidIdentity(
            "the runtime identity must not be root".to_string(),
        ));
    }
    Ok(())
}

/// Path of `dir` relative to `workdir`, if it lives inside it
pub fn relative_to_workdir(dir: &str, workdir: &str) -> Option<PathBuf> {
    Path::new(dir)
        .strip_prefix(workdir)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn check_directory(purpose: &str, dir: &DirectorySpec) -> Result<(), PackagingError> {
    require_absolute(purpose, &dir.path)?;
    if !env_name_regex().is_match(&dir.env) {
        return Err(PackagingError::InvalidPath {
            purpose: format!("{} variable", purpose),
            path: dir.env.clone(),
        });
    }
    Ok(())
}

/// Assemble the final image from the builder's environment and the source tree
pub fn assemble_runtime_image(
    env: &EnvironmentArtifact,
    source: &SourceTree,
    recipe: &PackagingRecipe,
) -> Result<ImageDefinition, PackagingError> {
    let spec = &recipe.runtime;
    let identity = &spec.identity;
    let launch = &recipe.launch;

    require_absolute("runtime workdir", &spec.workdir)?;
    require_absolute("runtime user home", recipe.runtime_home())?;
    check_directory("data directory", &spec.data_dir)?;
    check_directory("log directory", &spec.log_dir)?;
    if let Some(ref cache) = spec.cache_dir {
        check_directory("cache directory", cache)?;
    }
    check_identity(&identity.user, &identity.group)?;
    if launch.port == 0 {
        return Err(PackagingError::InvalidPort(launch.port));
    }
    if source.is_scanned() && !source.contains(Path::new(&launch.server_script)) {
        return Err(PackagingError::MissingEntrypoint(launch.server_script.clone()));
    }

    let base = recipe.runtime_base_image().to_string();
    if base != recipe.builder.base_image {
        return Err(PackagingError::BaseImageMismatch {
            builder: recipe.builder.base_image.clone(),
            runtime: base,
        });
    }

    let mut env_vars = vec![
        (spec.data_dir.env.clone(), spec.data_dir.path.clone()),
        (spec.log_dir.env.clone(), spec.log_dir.path.clone()),
    ];
    if let Some(ref cache) = spec.cache_dir {
        env_vars.push((cache.env.clone(), cache.path.clone()));
    }

    let digest = recipe
        .digest()
        .map_err(|e| PackagingError::RecipeDigest(format!("{:#}", e)))?;
    let mut stage = Stage::new(StageRole::Runtime, None);
    stage
        .push(Instruction::From {
            image: base,
            alias: None,
        })
        .push(Instruction::Label {
            labels: vec![
                (
                    "org.opencontainers.image.title".to_string(),
                    recipe.metadata.name.clone(),
                ),
                (
                    "org.opencontainers.image.description".to_string(),
                    recipe.metadata.description.clone(),
                ),
                ("io.reconpack.recipe.sha256".to_string(), digest.clone()),
            ],
        })
        .push(Instruction::Workdir {
            path: spec.workdir.clone(),
        })
        .push(Instruction::Env { vars: env_vars })
        .push(Instruction::Run {
            steps: vec![
                RunStep::Install {
                    packages: recipe.runtime_packages(),
                    update: true,
                },
                RunStep::AddGroup {
                    name: identity.group.clone(),
                    system: identity.system,
                },
                RunStep::AddUser {
                    name: identity.user.clone(),
                    group: identity.group.clone(),
                    home: recipe.runtime_home().to_string(),
                    shell: identity.shell.clone(),
                    label: identity.label.clone(),
                    system: identity.system,
                },
                RunStep::Remove {
                    paths: spec.cleanup_paths.clone(),
                },
                RunStep::MakeDirs {
                    paths: vec![spec.data_dir.reference()],
                },
                RunStep::Chown {
                    user: identity.user.clone(),
                    group: identity.group.clone(),
                    paths: vec![spec.data_dir.reference()],
                    recursive: false,
                },
            ],
        })
        .push(Instruction::Copy {
            from_stage: None,
            sources: vec![".".to_string()],
            destination: ".".to_string(),
        })
        .push(Instruction::Run {
            steps: ownership_steps(recipe),
        })
        .push(Instruction::Copy {
            from_stage: Some(env.stage_name.clone()),
            sources: vec![env.venv_path.clone()],
            destination: env.venv_path.clone(),
        })
        .push(Instruction::Env {
            vars: vec![("PATH".to_string(), python::path_binding(&env.venv_path))],
        })
        .push(Instruction::User {
            name: identity.user.clone(),
        })
        .push(Instruction::Expose { port: launch.port })
        .push(Instruction::Entrypoint {
            exec: vec![env.interpreter()],
        })
        .push(Instruction::Cmd {
            args: super::launch::LaunchMode::Server.arguments(launch),
        });

    debug!(
        instructions = stage.instructions.len(),
        user = %identity.user,
        port = launch.port,
        "Runtime stage assembled"
    );

    Ok(ImageDefinition {
        builder: env.stage.clone(),
        runtime: stage,
        recipe_digest: digest,
    })
}

/// Post-copy ownership fix for the log and cache directories.
///
/// A log directory inside the workdir must ship with the source tree, so it
/// is not created here and the `chown` fails the build when it is missing.
/// Directories outside the tree, and the cache, are created first.
fn ownership_steps(recipe: &PackagingRecipe) -> Vec<RunStep> {
    let spec = &recipe.runtime;
    let mut create = Vec::new();
    let mut owned = vec![spec.log_dir.reference()];

    if relative_to_workdir(&spec.log_dir.path, &spec.workdir).is_none() {
        create.push(spec.log_dir.reference());
    }
    if let Some(ref cache) = spec.cache_dir {
        create.push(cache.reference());
        owned.push(cache.reference());
    }

    let mut steps = Vec::new();
    if !create.is_empty() {
        steps.push(RunStep::MakeDirs { paths: create });
    }
    steps.push(RunStep::Chown {
        user: spec.identity.user.clone(),
        group: spec.identity.group.clone(),
        paths: owned,
        recursive: true,
    });
    steps
}
