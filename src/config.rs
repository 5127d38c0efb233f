//! Configuration management for reconpack
//!
//! Settings are read from environment variables with defaults. The packaging
//! recipe itself lives in a YAML file (or the built-in defaults); this module
//! only decides where to find it and how to drive the build tool.
//!
//! # Environment Variables
//!
//! - `RECONPACK_RECIPE`: Path to a YAML packaging recipe - default: built-in recipe
//! - `RECONPACK_LOG_LEVEL`: Logging level - default: "info"
//! - `RECONPACK_BUILD_TOOL`: `daemon` (Docker Engine API) or a CLI program name
//!   such as `docker` or `podman` - default: "daemon"
//! - `RECONPACK_IMAGE_TAG`: Tag for built images - default: "spiderfoot:latest"
//!
//! # Example
//!
//! ```no_run
//! use reconpack::ReconpackConfig;
//!
//! let config = ReconpackConfig::default();
//! config.validate().expect("Invalid configuration");
//! let recipe = config.load_recipe().expect("Unreadable recipe");
//! println!("{}", recipe.metadata.name);
//! ```

use crate::output::PackagingRecipe;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_IMAGE_TAG: &str = "spiderfoot:latest";
const DAEMON_TOOL: &str = "daemon";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to read recipe {path}: {error}")]
    RecipeRead { path: String, error: String },

    #[error("Failed to parse recipe {path}: {error}")]
    RecipeParse { path: String, error: String },
}

/// How images get built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTool {
    /// Docker Engine API over the local socket
    Daemon,
    /// An external CLI with docker-compatible `build` arguments
    Cli(String),
}

impl BuildTool {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(DAEMON_TOOL) {
            Self::Daemon
        } else {
            Self::Cli(value.to_string())
        }
    }
}

impl fmt::Display for BuildTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daemon => f.write_str(DAEMON_TOOL),
            Self::Cli(program) => f.write_str(program),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconpackConfig {
    /// Recipe file; `None` means the built-in SpiderFoot recipe
    pub recipe_path: Option<PathBuf>,

    pub log_level: String,

    pub build_tool: BuildTool,

    pub image_tag: String,
}

impl Default for ReconpackConfig {
    fn default() -> Self {
        let recipe_path = env::var("RECONPACK_RECIPE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let log_level = env::var("RECONPACK_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        let build_tool = env::var("RECONPACK_BUILD_TOOL")
            .map(|v| BuildTool::parse(&v))
            .unwrap_or(BuildTool::Daemon);

        let image_tag = env::var("RECONPACK_IMAGE_TAG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_TAG.to_string());

        Self {
            recipe_path,
            log_level,
            build_tool,
            image_tag,
        }
    }
}

impl ReconpackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if self.image_tag.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(format!(
                "Image tag must not contain whitespace: {:?}",
                self.image_tag
            )));
        }

        if let BuildTool::Cli(ref program) = self.build_tool {
            if program.chars().any(char::is_whitespace) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Build tool must be a single program name, got {:?}",
                    program
                )));
            }
        }

        Ok(())
    }

    /// Override the recipe location (CLI flag wins over the environment)
    pub fn with_recipe_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.recipe_path = path;
        }
        self
    }

    pub fn load_recipe(&self) -> Result<PackagingRecipe, ConfigError> {
        match self.recipe_path {
            Some(ref path) => load_recipe_file(path),
            None => Ok(PackagingRecipe::default()),
        }
    }

    pub fn to_display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "recipe".to_string(),
            self.recipe_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string()),
        );
        map.insert("log_level".to_string(), self.log_level.clone());
        map.insert("build_tool".to_string(), self.build_tool.to_string());
        map.insert("image_tag".to_string(), self.image_tag.clone());
        map
    }
}

pub fn load_recipe_file(path: &Path) -> Result<PackagingRecipe, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RecipeRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    PackagingRecipe::from_yaml(&content).map_err(|e| ConfigError::RecipeParse {
        path: path.display().to_string(),
        error: format!("{:#}", e),
    })
}

impl fmt::Display for ReconpackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reconpack Configuration:")?;
        match self.recipe_path {
            Some(ref path) => writeln!(f, "  Recipe: {}", path.display())?,
            None => writeln!(f, "  Recipe: built-in")?,
        }
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Build Tool: {}", self.build_tool)?;
        writeln!(f, "  Image Tag: {}", self.image_tag)?;
        Ok(())
    }
}
