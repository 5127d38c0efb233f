//! Error taxonomy for the packaging pipeline
//!
//! Every variant is fatal at its point of occurrence. Nothing in the pipeline
//! retries or degrades; callers surface the error and stop.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackagingError {
    /// Requirements argument resolved to an empty string
    #[error("Requirements parameter is empty")]
    EmptyRequirementsRef,

    /// Requirements manifest absent from the build context
    #[error("Requirements manifest not found in build context: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// Manifest exists but declares no dependencies
    #[error("Requirements manifest declares no dependencies: {}", .0.display())]
    EmptyManifest(PathBuf),

    /// Manifest line could not be parsed as a requirement specifier
    #[error("Malformed requirement at {}:{line}: {content}", .path.display())]
    MalformedManifest {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// A manifest includes itself, directly or transitively
    #[error("Requirements include cycle through {}", .0.display())]
    IncludeCycle(PathBuf),

    /// A native library compiled in the builder has no runtime counterpart
    #[error("Native library '{library}' has no runtime package (dev package: {dev_package})")]
    UnmappedNativeLibrary {
        library: String,
        dev_package: String,
    },

    /// Base image reference without an exact version
    #[error("Base image '{0}' is not pinned to an exact version")]
    UnpinnedBaseImage(String),

    /// Builder and runtime stages use different base images
    #[error("Builder base '{builder}' differs from runtime base '{runtime}'")]
    BaseImageMismatch { builder: String, runtime: String },

    /// User or group definition cannot be created
    #[error("Invalid runtime identity: {0}")]
    InvalidIdentity(String),

    /// Path that must be absolute (or relative to the workdir) is not usable
    #[error("Invalid path for {purpose}: {path}")]
    InvalidPath { purpose: String, path: String },

    /// Listening port outside 1..=65535
    #[error("Invalid listening port {0}")]
    InvalidPort(u16),

    /// Pipeline state machine was driven out of order
    #[error("Stage order violation: cannot move from {from} to {to}")]
    StageOrder { from: String, to: String },

    /// Log directory missing from the source tree; the post-copy chown would fail
    #[error("Log directory '{0}' is not present in the source tree")]
    MissingLogDirectory(String),

    /// Entrypoint script missing from the source tree
    #[error("Entrypoint script '{0}' is not present in the source tree")]
    MissingEntrypoint(String),

    /// Recipe could not be serialized for its content digest
    #[error("Failed to compute recipe digest: {0}")]
    RecipeDigest(String),

    /// External build tool finished unsuccessfully
    #[error("Build tool failed{}: {message}", .code.map(|c| format!(" (exit code {})", c)).unwrap_or_default())]
    BuildToolFailed { code: Option<i64>, message: String },
}
