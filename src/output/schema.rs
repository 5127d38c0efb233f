//! Packaging recipe schema
//!
//! A `PackagingRecipe` is the declarative, immutable configuration of the
//! two-stage pipeline: which base image, which toolchain, where the virtual
//! environment lives, who the runtime user is, which directories must exist
//! with which owner, and how the process is launched. It is resolved once and
//! never mutated while an image is assembled.
//!
//! Every section carries `#[serde(default)]`, so a YAML recipe only needs to
//! name the fields it changes.

use crate::stack::{self, NativeLibrary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const RECIPE_VERSION: &str = "1.0";
pub const DEFAULT_BASE_IMAGE: &str = "alpine:3.12.4";
pub const DEFAULT_VENV: &str = "/opt/venv";
pub const DEFAULT_WORKDIR: &str = "/home/spiderfoot";
pub const DEFAULT_PORT: u16 = 5001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingRecipe {
    pub version: String,
    pub metadata: RecipeMetadata,
    pub builder: BuilderSpec,
    /// Dev/runtime package pairs shared by both stages
    pub native_libraries: Vec<NativeLibrary>,
    pub runtime: RuntimeSpec,
    pub launch: LaunchSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeMetadata {
    pub name: String,
    pub description: String,
}

/// Builder stage: toolchain plus isolated environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSpec {
    pub base_image: String,
    /// Alias used by `COPY --from`
    pub stage_name: String,
    /// Compilers and tools that must never reach the runtime image
    pub toolchain: Vec<String>,
    /// Additional build-only packages outside the library mapping
    pub extra_packages: Vec<String>,
    pub venv_path: String,
    /// Working directory holding the copied manifests
    pub workdir: String,
    pub upgrade_pip: bool,
    pub requirements: RequirementsSpec,
}

/// The single build-time parameter selecting the requirements manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementsSpec {
    pub arg_name: String,
    pub production: String,
    pub test: String,
}

/// Runtime stage: clean base, runtime libraries, identity, directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSpec {
    /// Empty means "same as the builder"
    pub base_image: String,
    pub workdir: String,
    /// Interpreter package installed in both stages
    pub interpreter_package: String,
    pub extra_packages: Vec<String>,
    pub identity: RuntimeIdentity,
    pub data_dir: DirectorySpec,
    pub log_dir: DirectorySpec,
    /// Application-managed cache directory, pre-created so the process can write to it
    pub cache_dir: Option<DirectorySpec>,
    pub cleanup_paths: Vec<String>,
}

/// Dedicated non-root user/group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeIdentity {
    pub user: String,
    pub group: String,
    /// Empty means "the runtime workdir"
    pub home: String,
    pub shell: String,
    pub label: String,
    pub system: bool,
}

/// A directory whose location is published through an environment variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySpec {
    pub env: String,
    pub path: String,
}

impl DirectorySpec {
    pub fn new(env: &str, path: &str) -> Self {
        Self {
            env: env.to_string(),
            path: path.to_string(),
        }
    }

    /// Shell expansion of the variable, used so operators can relocate the path
    pub fn reference(&self) -> String {
        format!("${}", self.env)
    }
}

/// Default executable and arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSpec {
    pub port: u16,
    pub bind_host: String,
    /// Web-server entrypoint script, relative to the workdir
    pub server_script: String,
    pub listen_flag: String,
    /// Remote command-line client script
    pub cli_script: String,
}

impl Default for PackagingRecipe {
    fn default() -> Self {
        Self {
            version: RECIPE_VERSION.to_string(),
            metadata: RecipeMetadata::default(),
            builder: BuilderSpec::default(),
            native_libraries: stack::default_libraries(),
            runtime: RuntimeSpec::default(),
            launch: LaunchSpec::default(),
        }
    }
}

impl Default for RecipeMetadata {
    fn default() -> Self {
        Self {
            name: "spiderfoot".to_string(),
            description: "Open source reconnaissance automation tool".to_string(),
        }
    }
}

impl Default for BuilderSpec {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            stage_name: "build".to_string(),
            toolchain: stack::default_toolchain(),
            extra_packages: Vec::new(),
            venv_path: DEFAULT_VENV.to_string(),
            workdir: "/build".to_string(),
            upgrade_pip: true,
            requirements: RequirementsSpec::default(),
        }
    }
}

impl Default for RequirementsSpec {
    fn default() -> Self {
        Self {
            arg_name: "REQUIREMENTS".to_string(),
            production: "requirements.txt".to_string(),
            test: "test/requirements.txt".to_string(),
        }
    }
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self {
            base_image: String::new(),
            workdir: DEFAULT_WORKDIR.to_string(),
            interpreter_package: "python3".to_string(),
            extra_packages: Vec::new(),
            identity: RuntimeIdentity::default(),
            data_dir: DirectorySpec::new("SPIDERFOOT_DATA", "/var/lib/spiderfoot"),
            log_dir: DirectorySpec::new("SPIDERFOOT_LOGS", "/home/spiderfoot/log"),
            cache_dir: Some(DirectorySpec::new(
                "SPIDERFOOT_CACHE",
                "/home/spiderfoot/cache",
            )),
            cleanup_paths: stack::alpine::cleanup_paths(),
        }
    }
}

impl Default for RuntimeIdentity {
    fn default() -> Self {
        Self {
            user: "spiderfoot".to_string(),
            group: "spiderfoot".to_string(),
            home: String::new(),
            shell: "/sbin/nologin".to_string(),
            label: "SpiderFoot User".to_string(),
            system: false,
        }
    }
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_host: "0.0.0.0".to_string(),
            server_script: "sf.py".to_string(),
            listen_flag: "-l".to_string(),
            cli_script: "sfcli.py".to_string(),
        }
    }
}

impl PackagingRecipe {
    /// Parse a YAML recipe; missing fields fall back to the defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse packaging recipe YAML")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize packaging recipe to YAML")
    }

    /// Runtime base, falling back to the builder base
    pub fn runtime_base_image(&self) -> &str {
        if self.runtime.base_image.is_empty() {
            &self.builder.base_image
        } else {
            &self.runtime.base_image
        }
    }

    /// Home directory of the runtime user, falling back to the workdir
    pub fn runtime_home(&self) -> &str {
        if self.runtime.identity.home.is_empty() {
            &self.runtime.workdir
        } else {
            &self.runtime.identity.home
        }
    }

    /// Packages installed in the builder: toolchain, interpreter, every dev package
    pub fn builder_packages(&self) -> Vec<String> {
        let mut packages = Vec::new();
        for package in self
            .builder
            .toolchain
            .iter()
            .chain(std::iter::once(&self.runtime.interpreter_package))
            .chain(self.native_libraries.iter().map(|lib| &lib.dev_package))
            .chain(self.builder.extra_packages.iter())
        {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        }
        packages
    }

    /// Packages installed in the runtime: interpreter and every runtime library
    pub fn runtime_packages(&self) -> Vec<String> {
        let mut packages = Vec::new();
        for package in std::iter::once(&self.runtime.interpreter_package)
            .chain(self.native_libraries.iter().map(|lib| &lib.runtime_package))
            .chain(self.runtime.extra_packages.iter())
        {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        }
        packages
    }

    /// Hex SHA-256 of the recipe's canonical JSON form
    pub fn digest(&self) -> Result<String> {
        let canonical =
            serde_json::to_vec(self).context("Failed to serialize packaging recipe for digest")?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

impl fmt::Display for PackagingRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Packaging Recipe: {}", self.metadata.name)?;
        writeln!(f, "==================")?;
        writeln!(f)?;
        writeln!(f, "Builder Stage ({}):", self.builder.stage_name)?;
        writeln!(f, "  Base Image:   {}", self.builder.base_image)?;
        writeln!(f, "  Environment:  {}", self.builder.venv_path)?;
        writeln!(
            f,
            "  Requirements: {} (default {}, test {})",
            self.builder.requirements.arg_name,
            self.builder.requirements.production,
            self.builder.requirements.test
        )?;
        writeln!(f, "  Packages:     {}", self.builder_packages().join(", "))?;
        writeln!(f)?;
        writeln!(f, "Runtime Stage:")?;
        writeln!(f, "  Base Image:   {}", self.runtime_base_image())?;
        writeln!(f, "  Workdir:      {}", self.runtime.workdir)?;
        writeln!(f, "  Packages:     {}", self.runtime_packages().join(", "))?;
        writeln!(
            f,
            "  User:         {}:{} (shell {})",
            self.runtime.identity.user, self.runtime.identity.group, self.runtime.identity.shell
        )?;
        writeln!(
            f,
            "  Data Dir:     {} = {}",
            self.runtime.data_dir.env, self.runtime.data_dir.path
        )?;
        writeln!(
            f,
            "  Log Dir:      {} = {}",
            self.runtime.log_dir.env, self.runtime.log_dir.path
        )?;
        if let Some(ref cache) = self.runtime.cache_dir {
            writeln!(f, "  Cache Dir:    {} = {}", cache.env, cache.path)?;
        }
        writeln!(f)?;
        writeln!(f, "Launch:")?;
        writeln!(
            f,
            "  {} {} {}:{}",
            self.launch.server_script, self.launch.listen_flag, self.launch.bind_host, self.launch.port
        )?;
        Ok(())
    }
}
