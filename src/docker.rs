//! Image build driver
//!
//! Writes the rendered Dockerfile into the build context and hands the
//! context to a build tool with `REQUIREMENTS` as the only build argument.
//! Two tools are supported: the Docker Engine API over the local socket
//! (context streamed as a tar archive) and any docker-compatible CLI.

use crate::config::BuildTool;
use crate::error::PackagingError;
use crate::fs::{EntryKind, FileSystem, RealFileSystem};
use crate::manifest::RequirementsRef;
use crate::progress::{ProgressEvent, ProgressHandler};
use anyhow::{Context, Result};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// File name of the generated Dockerfile inside the build context
pub const GENERATED_DOCKERFILE: &str = "Dockerfile.reconpack";

/// One image build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub context: PathBuf,
    pub dockerfile: String,
    pub tag: String,
    pub requirements: RequirementsRef,
    /// Report the command without writing the Dockerfile or building
    pub dry_run: bool,
}

impl BuildRequest {
    pub fn dockerfile_path(&self) -> PathBuf {
        self.context.join(GENERATED_DOCKERFILE)
    }

    fn build_arg(&self) -> String {
        format!(
            "{}={}",
            self.requirements.arg_name, self.requirements.default_path
        )
    }
}

pub struct ImageBuilder {
    tool: BuildTool,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl ImageBuilder {
    pub fn new(tool: BuildTool) -> Self {
        Self {
            tool,
            progress: None,
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref handler) = self.progress {
            handler.on_progress(&event);
        }
    }

    /// Command line equivalent of the build, for CLI tools and dry runs
    pub fn command_line(&self, request: &BuildRequest) -> Vec<String> {
        let program = match self.tool {
            BuildTool::Daemon => "docker".to_string(),
            BuildTool::Cli(ref program) => program.clone(),
        };
        vec![
            program,
            "build".to_string(),
            "-f".to_string(),
            request.dockerfile_path().display().to_string(),
            "--build-arg".to_string(),
            request.build_arg(),
            "-t".to_string(),
            request.tag.clone(),
            request.context.display().to_string(),
        ]
    }

    pub fn write_dockerfile(&self, request: &BuildRequest) -> Result<PathBuf> {
        let path = request.dockerfile_path();
        fs::write(&path, &request.dockerfile)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "Wrote Dockerfile");
        Ok(path)
    }

    pub async fn build(&self, request: &BuildRequest) -> Result<()> {
        if !request.context.is_dir() {
            anyhow::bail!(
                "Build context is not a directory: {}",
                request.context.display()
            );
        }
        if request.dry_run {
            info!(
                command = %self.command_line(request).join(" "),
                "Dry run, leaving the build context untouched"
            );
            return Ok(());
        }
        self.write_dockerfile(request)?;

        info!(tag = %request.tag, tool = %self.tool, "Building image");
        match self.tool {
            BuildTool::Daemon => self.build_with_daemon(request).await,
            BuildTool::Cli(ref program) => self.build_with_cli(program, request).await,
        }
    }

    async fn build_with_daemon(&self, request: &BuildRequest) -> Result<()> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to the Docker daemon")?;
        let version = docker
            .version()
            .await
            .context("Docker daemon is not reachable")?;
        debug!(
            api_version = %version.api_version.unwrap_or_else(|| "unknown".to_string()),
            "Connected to Docker daemon"
        );

        let archive = context_archive(&request.context, &request.dockerfile)?;
        debug!(bytes = archive.len(), "Packed build context");

        let mut buildargs = HashMap::new();
        buildargs.insert(
            request.requirements.arg_name.clone(),
            request.requirements.default_path.clone(),
        );
        let options = BuildImageOptions {
            dockerfile: GENERATED_DOCKERFILE.to_string(),
            t: request.tag.clone(),
            buildargs,
            rm: true,
            ..Default::default()
        };

        let mut stream = docker.build_image(options, None, Some(Bytes::from(archive)));
        while let Some(item) = stream.next().await {
            let info = item.map_err(|e| PackagingError::BuildToolFailed {
                code: None,
                message: e.to_string(),
            })?;

            if let Some(detail) = info.error_detail {
                return Err(PackagingError::BuildToolFailed {
                    code: detail.code,
                    message: detail
                        .message
                        .or(info.error)
                        .unwrap_or_else(|| "image build failed".to_string()),
                }
                .into());
            }
            if let Some(message) = info.error {
                return Err(PackagingError::BuildToolFailed {
                    code: None,
                    message,
                }
                .into());
            }
            if let Some(output) = info.stream {
                for line in output.lines().filter(|l| !l.trim().is_empty()) {
                    self.emit(ProgressEvent::BuildOutput {
                        line: line.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn build_with_cli(&self, program: &str, request: &BuildRequest) -> Result<()> {
        let argv = self.command_line(request);
        debug!(command = %argv.join(" "), "Spawning build tool");

        let mut child = Command::new(program)
            .args(&argv[1..])
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn build tool '{}'", program))?;

        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .context("Failed to read build tool output")?
            {
                self.emit(ProgressEvent::BuildOutput { line });
            }
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for build tool")?;
        if !status.success() {
            return Err(PackagingError::BuildToolFailed {
                code: status.code().map(i64::from),
                message: format!("{} build exited with {}", program, status),
            }
            .into());
        }
        Ok(())
    }
}

/// Tar the build context for the Engine API. Entries come from the same
/// ignore-aware walk that context inspection uses; the generated Dockerfile
/// is always included from memory
pub fn context_archive(root: &Path, dockerfile: &str) -> Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);

    let context = RealFileSystem::new();
    let ignore = context.load_ignore(root)?;
    for entry in context.walk(root, &ignore)? {
        let relative = entry.path.as_path();
        if relative == Path::new(GENERATED_DOCKERFILE) {
            continue;
        }
        let path = root.join(relative);
        let appended = match entry.kind {
            EntryKind::Directory => archive.append_dir(relative, &path),
            EntryKind::File => archive.append_path_with_name(&path, relative),
        };
        appended.with_context(|| format!("Failed to archive {}", relative.display()))?;
    }

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive
        .append_data(&mut header, GENERATED_DOCKERFILE, dockerfile.as_bytes())
        .context("Failed to archive generated Dockerfile")?;

    archive
        .into_inner()
        .context("Failed to finish build context archive")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl ProgressHandler for Collect {
        fn on_progress(&self, event: &ProgressEvent) {
            if let ProgressEvent::BuildOutput { line } = event {
                self.0.lock().unwrap().push(line.clone());
            }
        }
    }

    fn context() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("log")).unwrap();
        fs::create_dir_all(dir.path().join("venv/bin")).unwrap();
        fs::write(dir.path().join("sf.py"), "").unwrap();
        fs::write(dir.path().join("requirements.txt"), "six\n").unwrap();
        fs::write(dir.path().join("venv/bin/python"), "").unwrap();
        fs::write(dir.path().join(".dockerignore"), "venv\n").unwrap();
        dir
    }

    fn request(dir: &TempDir, dry_run: bool) -> BuildRequest {
        BuildRequest {
            context: dir.path().to_path_buf(),
            dockerfile: "FROM alpine:3.12.4\n".to_string(),
            tag: "spiderfoot:test".to_string(),
            requirements: RequirementsRef {
                arg_name: "REQUIREMENTS".to_string(),
                default_path: "test/requirements.txt".to_string(),
            },
            dry_run,
        }
    }

    fn archived_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches('/')
                    .to_string()
            })
            .collect()
    }

    #[test]
    fn test_context_archive_honours_dockerignore() {
        let dir = context();
        let bytes = context_archive(dir.path(), "FROM alpine:3.12.4\n").unwrap();
        let names = archived_names(&bytes);

        assert!(names.contains(&"sf.py".to_string()));
        assert!(names.contains(&"log".to_string()));
        assert!(names.contains(&GENERATED_DOCKERFILE.to_string()));
        assert!(!names.iter().any(|n| n.starts_with("venv")));
    }

    #[test]
    fn test_context_archive_anchors_patterns_at_root() {
        let dir = context();
        fs::create_dir_all(dir.path().join("modules/env")).unwrap();
        fs::write(dir.path().join("modules/env/helper.py"), "").unwrap();
        fs::create_dir_all(dir.path().join("modules/venv")).unwrap();
        fs::write(dir.path().join("modules/venv/sfp_venv.py"), "").unwrap();
        fs::write(dir.path().join(".dockerignore"), "env\nvenv\n").unwrap();

        let names = archived_names(&context_archive(dir.path(), "FROM alpine:3.12.4\n").unwrap());
        assert!(names.contains(&"modules/env/helper.py".to_string()));
        assert!(names.contains(&"modules/venv/sfp_venv.py".to_string()));
        assert!(!names.contains(&"venv/bin/python".to_string()));
    }

    #[test]
    fn test_context_archive_ignores_other_ignore_files() {
        let dir = context();
        fs::write(dir.path().join(".ignore"), "sf.py\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "requirements.txt\n").unwrap();

        let names = archived_names(&context_archive(dir.path(), "FROM alpine:3.12.4\n").unwrap());
        assert!(names.contains(&"sf.py".to_string()));
        assert!(names.contains(&"requirements.txt".to_string()));
    }

    #[test]
    fn test_command_line_passes_single_build_arg() {
        let dir = context();
        let builder = ImageBuilder::new(BuildTool::Cli("podman".to_string()));
        let argv = builder.command_line(&request(&dir, false));

        assert_eq!(argv[0], "podman");
        assert_eq!(argv.iter().filter(|a| *a == "--build-arg").count(), 1);
        assert!(argv.contains(&"REQUIREMENTS=test/requirements.txt".to_string()));
        assert!(argv.contains(&"spiderfoot:test".to_string()));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_context_untouched() {
        let dir = context();
        let builder = ImageBuilder::new(BuildTool::Cli("definitely-not-a-build-tool".to_string()));
        builder.build(&request(&dir, true)).await.unwrap();

        assert!(!dir.path().join(GENERATED_DOCKERFILE).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_build_writes_dockerfile() {
        let dir = context();
        let builder = ImageBuilder::new(BuildTool::Cli("true".to_string()));
        builder.build(&request(&dir, false)).await.unwrap();

        let written = fs::read_to_string(dir.path().join(GENERATED_DOCKERFILE)).unwrap();
        assert_eq!(written, "FROM alpine:3.12.4\n");
    }

    #[tokio::test]
    async fn test_missing_context_is_rejected() {
        let dir = context();
        let mut req = request(&dir, true);
        req.context = dir.path().join("missing");
        let builder = ImageBuilder::new(BuildTool::Daemon);
        assert!(builder.build(&req).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_exit_code_is_reported() {
        let dir = context();
        let builder = ImageBuilder::new(BuildTool::Cli("false".to_string()));
        let err = builder.build(&request(&dir, false)).await.unwrap_err();

        match err.downcast_ref::<PackagingError>() {
            Some(PackagingError::BuildToolFailed { code, .. }) => assert_eq!(*code, Some(1)),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_output_is_streamed() {
        let dir = context();
        let collect = Arc::new(Collect::default());
        let builder =
            ImageBuilder::new(BuildTool::Cli("true".to_string())).with_progress(collect.clone());
        builder.build(&request(&dir, false)).await.unwrap();
        assert!(collect.0.lock().unwrap().is_empty());
    }
}
