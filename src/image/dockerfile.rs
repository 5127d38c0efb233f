//! Dockerfile rendering
//!
//! Multi-step `RUN` instructions are joined with `&&` and line continuations,
//! one step per line. `ENTRYPOINT` and `CMD` always use the exec (JSON) form
//! so no shell sits between the container runtime and the interpreter.

use super::{ImageDefinition, Instruction, RunStep, Stage};
use crate::stack::alpine;

const RUN_JOINER: &str = " \\\n    && ";

pub fn render(definition: &ImageDefinition) -> String {
    let mut out = String::new();
    out.push_str(&render_stage(&definition.builder));
    out.push('\n');
    out.push_str(&render_stage(&definition.runtime));
    out
}

pub fn render_stage(stage: &Stage) -> String {
    let mut out = String::new();
    for instruction in &stage.instructions {
        out.push_str(&render_instruction(instruction));
        out.push('\n');
    }
    out
}

pub fn render_instruction(instruction: &Instruction) -> String {
    match instruction {
        Instruction::From { image, alias } => match alias {
            Some(alias) => format!("FROM {} AS {}", image, alias),
            None => format!("FROM {}", image),
        },
        Instruction::Arg { name, default } => match default {
            Some(value) => format!("ARG {}={}", name, value),
            None => format!("ARG {}", name),
        },
        Instruction::Label { labels } => {
            let pairs: Vec<String> = labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, alpine::quote(v)))
                .collect();
            format!("LABEL {}", pairs.join(" \\\n      "))
        }
        Instruction::Workdir { path } => format!("WORKDIR {}", path),
        Instruction::Env { vars } => {
            let pairs: Vec<String> = vars
                .iter()
                .map(|(k, v)| format!("{}={}", k, alpine::quote(v)))
                .collect();
            format!("ENV {}", pairs.join(" \\\n    "))
        }
        Instruction::Run { steps } => format!("RUN {}", render_steps(steps)),
        Instruction::Copy {
            from_stage,
            sources,
            destination,
        } => {
            let from = from_stage
                .as_ref()
                .map(|s| format!("--from={} ", s))
                .unwrap_or_default();
            format!("COPY {}{} {}", from, sources.join(" "), destination)
        }
        Instruction::User { name } => format!("USER {}", name),
        Instruction::Expose { port } => format!("EXPOSE {}", port),
        Instruction::Entrypoint { exec } => format!("ENTRYPOINT {}", exec_form(exec)),
        Instruction::Cmd { args } => format!("CMD {}", exec_form(args)),
    }
}

fn render_steps(steps: &[RunStep]) -> String {
    steps
        .iter()
        .map(alpine::render_step)
        .collect::<Vec<_>>()
        .join(RUN_JOINER)
}

fn exec_form(argv: &[String]) -> String {
    serde_json::to_string(argv).unwrap_or_else(|_| "[]".to_string())
}
