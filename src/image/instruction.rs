//! Typed image definition
//!
//! Stages are ordered lists of instructions. Shell work inside `RUN` is kept
//! structured (`RunStep`) so validation can inspect installed packages and
//! ownership changes without re-parsing shell text.

use serde::{Deserialize, Serialize};

/// Which half of the two-stage pipeline a stage belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageRole {
    Builder,
    Runtime,
}

/// One unit of shell work inside a `RUN` instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RunStep {
    /// Install OS packages
    Install {
        packages: Vec<String>,
        /// Refresh the package index before installing
        update: bool,
    },
    /// Create a group
    AddGroup { name: String, system: bool },
    /// Create a user without password
    AddUser {
        name: String,
        group: String,
        home: String,
        shell: String,
        label: String,
        system: bool,
    },
    /// Remove paths (package caches, metadata)
    Remove { paths: Vec<String> },
    /// Create directories (parents included)
    MakeDirs { paths: Vec<String> },
    /// Change ownership of paths
    Chown {
        user: String,
        group: String,
        paths: Vec<String>,
        recursive: bool,
    },
    /// Arbitrary shell command
    Shell { command: String },
}

/// A single Dockerfile-level instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    From {
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Arg {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Label { labels: Vec<(String, String)> },
    Workdir { path: String },
    Env { vars: Vec<(String, String)> },
    Run { steps: Vec<RunStep> },
    Copy {
        #[serde(skip_serializing_if = "Option::is_none")]
        from_stage: Option<String>,
        sources: Vec<String>,
        destination: String,
    },
    User { name: String },
    Expose { port: u16 },
    Entrypoint { exec: Vec<String> },
    Cmd { args: Vec<String> },
}

/// One stage of a multi-stage image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub role: StageRole,
    /// Stage alias, referenced by `COPY --from`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub instructions: Vec<Instruction>,
}

impl Stage {
    pub fn new(role: StageRole, name: Option<String>) -> Self {
        Self {
            role,
            name,
            instructions: Vec::new(),
        }
    }

    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    /// Base image of the stage (first `FROM`)
    pub fn base_image(&self) -> Option<&str> {
        self.instructions.iter().find_map(|i| match i {
            Instruction::From { image, .. } => Some(image.as_str()),
            _ => None,
        })
    }

    /// All run steps in declaration order
    pub fn run_steps(&self) -> impl Iterator<Item = &RunStep> {
        self.instructions.iter().flat_map(|i| match i {
            Instruction::Run { steps } => steps.as_slice(),
            _ => &[][..],
        })
    }

    /// Every OS package installed by this stage
    pub fn installed_packages(&self) -> Vec<&str> {
        self.run_steps()
            .filter_map(|step| match step {
                RunStep::Install { packages, .. } => Some(packages),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Value of an environment variable as last set by this stage
    pub fn env(&self, key: &str) -> Option<&str> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Env { vars } => Some(vars),
                _ => None,
            })
            .flatten()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .last()
    }

    /// Build arguments declared in this stage
    pub fn args(&self) -> Vec<&str> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Arg { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Effective user at the end of the stage (`None` means the image default, root)
    pub fn final_user(&self) -> Option<&str> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::User { name } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Position of the first instruction matching a predicate
    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(&Instruction) -> bool,
    {
        self.instructions.iter().position(predicate)
    }

    pub fn exposed_ports(&self) -> Vec<u16> {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Expose { port } => Some(*port),
                _ => None,
            })
            .collect()
    }

    pub fn entrypoint(&self) -> Option<&[String]> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::Entrypoint { exec } => Some(exec.as_slice()),
            _ => None,
        })
    }

    pub fn cmd(&self) -> Option<&[String]> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::Cmd { args } => Some(args.as_slice()),
            _ => None,
        })
    }
}
