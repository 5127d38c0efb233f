//! reconpack - two-stage container packaging for SpiderFoot
//!
//! Builds an image definition in two stages. The builder stage installs a
//! compiler toolchain and the development headers of every native library,
//! creates an isolated Python environment and installs the requirements
//! manifest selected by the single `REQUIREMENTS` build argument. The runtime
//! stage starts again from the same base image with only the runtime
//! libraries, creates an unprivileged user, prepares the data, log and cache
//! directories with the right owner, copies the environment out of the
//! builder and launches the web server on `0.0.0.0:5001`.
//!
//! # Core Concepts
//!
//! - **Recipe**: [`PackagingRecipe`], the immutable configuration every stage
//!   is derived from (YAML with built-in defaults)
//! - **Assembly**: [`pipeline::assemble_build_env`] then
//!   [`pipeline::assemble_runtime_image`], composed by [`PipelineOrchestrator`]
//! - **Validation**: named rules checked against the assembled
//!   [`ImageDefinition`] before it is rendered or built
//!
//! # Example
//!
//! ```
//! use reconpack::manifest::ManifestVariant;
//! use reconpack::{PackagingRecipe, PipelineOrchestrator, SourceTree};
//!
//! let recipe = PackagingRecipe::default();
//! let image = PipelineOrchestrator::new(None)
//!     .execute(&recipe, &ManifestVariant::Test, &SourceTree::opaque())
//!     .unwrap();
//!
//! let dockerfile = image.to_dockerfile();
//! assert!(dockerfile.contains("ARG REQUIREMENTS=test/requirements.txt"));
//! assert!(dockerfile.contains("USER spiderfoot"));
//! ```

pub mod cli;
pub mod config;
pub mod docker;
pub mod error;
pub mod fs;
pub mod image;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stack;
pub mod util;
pub mod validation;

pub use config::{BuildTool, ConfigError, ReconpackConfig};
pub use docker::{BuildRequest, ImageBuilder};
pub use error::PackagingError;
pub use image::ImageDefinition;
pub use manifest::{ManifestVariant, RequirementsRef};
pub use output::PackagingRecipe;
pub use pipeline::{BuildContext, LaunchMode, PipelineOrchestrator, RunCommand, SourceTree};
pub use util::{init_from_env, init_logging, LoggingConfig};
pub use validation::Validator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_reconpack() {
        assert_eq!(NAME, "reconpack");
    }
}
