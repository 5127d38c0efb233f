//! Launch modes and `docker run` command lines
//!
//! Every mode runs the environment's interpreter (the image `ENTRYPOINT`);
//! overrides only replace `CMD`. Only the server mode binds the exposed port.

use crate::output::{LaunchSpec, PackagingRecipe};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Use case passed to batch scans when no explicit modules are chosen
pub const DEFAULT_BATCH_USE_CASE: &str = "passive";
pub const DEFAULT_BATCH_OUTPUT: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LaunchMode {
    /// Web UI listening on `<bind_host>:<port>`
    Server,
    /// Command-line client talking to a running server
    RemoteCli { server_url: String },
    /// One scan without the web server
    Batch {
        target: String,
        modules: Vec<String>,
        output: String,
    },
}

impl LaunchMode {
    pub fn remote_cli(server_url: Option<&str>, launch: &LaunchSpec) -> Self {
        let server_url = server_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", launch.port));
        Self::RemoteCli { server_url }
    }

    pub fn batch(target: &str, modules: &[String], output: Option<&str>) -> Result<Self> {
        let target = target.trim();
        if target.is_empty() {
            bail!("Batch mode requires a scan target");
        }
        Ok(Self::Batch {
            target: target.to_string(),
            modules: modules
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            output: output.unwrap_or(DEFAULT_BATCH_OUTPUT).to_string(),
        })
    }

    /// `CMD` for this mode
    pub fn arguments(&self, launch: &LaunchSpec) -> Vec<String> {
        match self {
            Self::Server => vec![
                launch.server_script.clone(),
                launch.listen_flag.clone(),
                format!("{}:{}", launch.bind_host, launch.port),
            ],
            Self::RemoteCli { server_url } => vec![
                launch.cli_script.clone(),
                "-s".to_string(),
                server_url.clone(),
            ],
            Self::Batch {
                target,
                modules,
                output,
            } => {
                let mut args = vec![launch.server_script.clone(), "-s".to_string(), target.clone()];
                if modules.is_empty() {
                    args.push("-u".to_string());
                    args.push(DEFAULT_BATCH_USE_CASE.to_string());
                } else {
                    args.push("-m".to_string());
                    args.push(modules.join(","));
                }
                args.push("-o".to_string());
                args.push(output.clone());
                args
            }
        }
    }

    pub fn binds_port(&self) -> bool {
        matches!(self, Self::Server)
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::RemoteCli { .. })
    }

    /// A loopback server URL is only reachable from the host's network
    /// namespace, where the server container publishes its port
    pub fn needs_host_network(&self) -> bool {
        match self {
            Self::RemoteCli { server_url } => is_loopback_url(server_url),
            _ => false,
        }
    }
}

fn is_loopback_url(url: &str) -> bool {
    let authority = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = authority.split('/').next().unwrap_or(authority);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = if let Some(bracketed) = host.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or(bracketed)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::RemoteCli { .. } => write!(f, "cli"),
            Self::Batch { .. } => write!(f, "batch"),
        }
    }
}

/// A `docker run` invocation for one launch mode
#[derive(Debug, Clone)]
pub struct RunCommand<'a> {
    recipe: &'a PackagingRecipe,
    image: String,
    mode: LaunchMode,
    data_volume: Option<String>,
}

impl<'a> RunCommand<'a> {
    pub fn new(recipe: &'a PackagingRecipe, image: impl Into<String>, mode: LaunchMode) -> Self {
        Self {
            recipe,
            image: image.into(),
            mode,
            data_volume: None,
        }
    }

    /// Mount a named volume (or host path) on the data directory
    pub fn with_data_volume(mut self, volume: impl Into<String>) -> Self {
        self.data_volume = Some(volume.into());
        self
    }

    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec!["docker".to_string(), "run".to_string()];
        if self.mode.binds_port() {
            argv.push("-d".to_string());
        } else {
            argv.push("--rm".to_string());
        }
        if self.mode.is_interactive() {
            argv.push("-it".to_string());
        }
        if self.mode.needs_host_network() {
            argv.push("--network".to_string());
            argv.push("host".to_string());
        }
        if self.mode.binds_port() {
            let port = self.recipe.launch.port;
            argv.push("-p".to_string());
            argv.push(format!("{}:{}", port, port));
        }
        if let Some(ref volume) = self.data_volume {
            argv.push("-v".to_string());
            argv.push(format!("{}:{}", volume, self.recipe.runtime.data_dir.path));
        }
        argv.push(self.image.clone());
        argv.extend(self.mode.arguments(&self.recipe.launch));
        argv
    }

    /// Shell-ready rendering with minimal quoting
    pub fn to_shell(&self) -> String {
        self.argv()
            .iter()
            .map(|arg| shell_word(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_word(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:,=@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
