//! Post-build smoke test
//!
//! Commands run against the finished image: every compiled extension module
//! must import with only the runtime libraries present, the process must run
//! as the unprivileged user, and that user must be able to write the data,
//! log and cache directories.

use crate::output::PackagingRecipe;
use crate::stack::python;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeCheck {
    pub name: String,
    pub argv: Vec<String>,
    /// Expected trimmed stdout, when the exit status alone is not enough
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_stdout: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeTest {
    pub image: String,
    pub modules: Vec<String>,
    pub checks: Vec<SmokeCheck>,
}

impl SmokeTest {
    pub fn for_recipe(recipe: &PackagingRecipe, image: &str) -> Self {
        let modules = import_modules(recipe);
        let interpreter = python::interpreter(&recipe.builder.venv_path);

        let docker = |entrypoint: &str, args: &[&str]| -> Vec<String> {
            let mut argv: Vec<String> = ["docker", "run", "--rm", "--entrypoint", entrypoint, image]
                .iter()
                .map(|s| s.to_string())
                .collect();
            argv.extend(args.iter().map(|s| s.to_string()));
            argv
        };

        let script = python::import_check_script(&modules);
        let mut checks = vec![
            SmokeCheck {
                name: "native-imports".to_string(),
                argv: docker(&interpreter, &["-c", script.as_str()]),
                expect_stdout: None,
            },
            SmokeCheck {
                name: "runtime-user".to_string(),
                argv: docker("id", &["-un"]),
                expect_stdout: Some(recipe.runtime.identity.user.clone()),
            },
        ];

        let runtime = &recipe.runtime;
        let mut writable_dirs = vec![("data", &runtime.data_dir), ("log", &runtime.log_dir)];
        if let Some(ref cache) = runtime.cache_dir {
            writable_dirs.push(("cache", cache));
        }
        for (purpose, dir) in writable_dirs {
            let script = format!("touch \"{0}/.smoke\" && rm \"{0}/.smoke\"", dir.reference());
            checks.push(SmokeCheck {
                name: format!("{}-dir-writable", purpose),
                argv: docker("/bin/sh", &["-c", script.as_str()]),
                expect_stdout: None,
            });
        }

        Self {
            image: image.to_string(),
            modules,
            checks,
        }
    }

    /// One shell line per check
    pub fn to_script(&self) -> String {
        let mut out = String::from("#!/bin/sh\nset -e\n");
        for check in &self.checks {
            out.push_str(&format!("# {}\n", check.name));
            let line = check
                .argv
                .iter()
                .map(|a| shell_quote(a))
                .collect::<Vec<_>>()
                .join(" ");
            match check.expect_stdout {
                Some(ref expected) => out.push_str(&format!(
                    "test \"$({})\" = {}\n",
                    line,
                    shell_quote(expected)
                )),
                None => {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Modules to import, de-duplicated in catalogue order
pub fn import_modules(recipe: &PackagingRecipe) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for module in recipe.native_libraries.iter().flat_map(|lib| &lib.import_checks) {
        if !modules.contains(module) {
            modules.push(module.clone());
        }
    }
    modules
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}
