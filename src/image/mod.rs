//! Two-stage image definition and its text renderings

pub mod dockerfile;
pub mod ignore;
pub mod instruction;

pub use instruction::{Instruction, RunStep, Stage, StageRole};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Builder stage followed by the runtime stage that becomes the final image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDefinition {
    pub builder: Stage,
    pub runtime: Stage,
    /// SHA-256 of the recipe that produced this definition
    pub recipe_digest: String,
}

impl ImageDefinition {
    pub fn stages(&self) -> [&Stage; 2] {
        [&self.builder, &self.runtime]
    }

    /// Alias the runtime stage uses to reference the builder
    pub fn builder_alias(&self) -> Option<&str> {
        self.builder.name.as_deref()
    }

    /// `ENTRYPOINT` + `CMD` of the final image
    pub fn default_launch(&self) -> Vec<String> {
        let mut argv: Vec<String> = self.runtime.entrypoint().unwrap_or_default().to_vec();
        argv.extend(self.runtime.cmd().unwrap_or_default().iter().cloned());
        argv
    }

    pub fn to_dockerfile(&self) -> String {
        dockerfile::render(self)
    }
}

impl fmt::Display for ImageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image Definition")?;
        writeln!(f, "================")?;
        for stage in self.stages() {
            writeln!(f)?;
            let role = match stage.role {
                StageRole::Builder => "Builder",
                StageRole::Runtime => "Runtime",
            };
            match stage.name {
                Some(ref name) => writeln!(f, "{} stage ({}):", role, name)?,
                None => writeln!(f, "{} stage:", role)?,
            }
            writeln!(f, "  Base:         {}", stage.base_image().unwrap_or("-"))?;
            let packages = stage.installed_packages();
            if packages.len() > 8 {
                writeln!(
                    f,
                    "  Packages:     {}, ... ({} total)",
                    packages[..8].join(", "),
                    packages.len()
                )?;
            } else {
                writeln!(f, "  Packages:     {}", packages.join(", "))?;
            }
            let args = stage.args();
            if !args.is_empty() {
                writeln!(f, "  Build args:   {}", args.join(", "))?;
            }
            writeln!(f, "  Instructions: {}", stage.instructions.len())?;
        }

        writeln!(f)?;
        writeln!(f, "Final image:")?;
        writeln!(f, "  User:         {}", self.runtime.final_user().unwrap_or("root"))?;
        let ports: Vec<String> = self.runtime.exposed_ports().iter().map(|p| p.to_string()).collect();
        if !ports.is_empty() {
            writeln!(f, "  Ports:        {}", ports.join(", "))?;
        }
        writeln!(f, "  Launch:       {}", self.default_launch().join(" "))?;
        writeln!(f, "  Recipe:       sha256:{}", self.recipe_digest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> ImageDefinition {
        let mut builder = Stage::new(StageRole::Builder, Some("build".to_string()));
        builder.push(Instruction::From {
            image: "alpine:3.12.4".to_string(),
            alias: Some("build".to_string()),
        });
        let mut runtime = Stage::new(StageRole::Runtime, None);
        runtime
            .push(Instruction::From {
                image: "alpine:3.12.4".to_string(),
                alias: None,
            })
            .push(Instruction::User {
                name: "spiderfoot".to_string(),
            })
            .push(Instruction::Expose { port: 5001 })
            .push(Instruction::Entrypoint {
                exec: vec!["/opt/venv/bin/python".to_string()],
            })
            .push(Instruction::Cmd {
                args: vec!["sf.py".to_string(), "-l".to_string(), "0.0.0.0:5001".to_string()],
            });
        ImageDefinition {
            builder,
            runtime,
            recipe_digest: "abc123".to_string(),
        }
    }

    #[test]
    fn test_default_launch_joins_entrypoint_and_cmd() {
        assert_eq!(
            definition().default_launch(),
            vec!["/opt/venv/bin/python", "sf.py", "-l", "0.0.0.0:5001"]
        );
    }

    #[test]
    fn test_display_summarises_final_image() {
        let text = definition().to_string();
        assert!(text.contains("Builder stage (build):"));
        assert!(text.contains("User:         spiderfoot"));
        assert!(text.contains("Ports:        5001"));
        assert!(text.contains("sha256:abc123"));
    }

    #[test]
    fn test_builder_alias() {
        assert_eq!(definition().builder_alias(), Some("build"));
    }
}
