//! CLI integration tests
//!
//! Run the built binary against temporary build contexts and check output,
//! exit codes and error reporting.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Path to the reconpack binary next to the test executable
fn reconpack_bin() -> PathBuf {
    let mut path = env::current_exe()
        .expect("Failed to get current executable path")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No parent")
        .to_path_buf();

    if path.ends_with("deps") {
        path = path.parent().expect("No parent").to_path_buf();
    }

    path.join("reconpack")
}

fn reconpack(args: &[&str]) -> Output {
    Command::new(reconpack_bin())
        .args(args)
        .env_remove("RECONPACK_RECIPE")
        .env_remove("RECONPACK_LOG_LEVEL")
        .env_remove("RECONPACK_BUILD_TOOL")
        .env_remove("RECONPACK_IMAGE_TAG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute reconpack")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// A SpiderFoot-shaped source tree
fn create_context(dir: &TempDir) -> PathBuf {
    let root = dir.path().to_path_buf();
    fs::create_dir_all(root.join("log")).unwrap();
    fs::create_dir_all(root.join("test")).unwrap();
    fs::create_dir_all(root.join("modules")).unwrap();
    fs::write(root.join("sf.py"), "#!/usr/bin/env python3\n").unwrap();
    fs::write(root.join("sfcli.py"), "#!/usr/bin/env python3\n").unwrap();
    fs::write(root.join("modules/sfp_dnsresolve.py"), "").unwrap();
    fs::write(
        root.join("requirements.txt"),
        "cherrypy>=18.6.0,<19\nlxml>=4.6.2,<5\nnetaddr>=0.7.18\nPyYAML>=5.4.1\ncryptography>=3.4.6\n",
    )
    .unwrap();
    fs::write(
        root.join("test/requirements.txt"),
        "-r ../requirements.txt\npytest\npytest-cov\nflake8\n",
    )
    .unwrap();
    root
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

#[test]
fn test_cli_help() {
    let output = reconpack(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    for command in ["generate", "validate", "ignore-file", "smoke-test", "run-command", "build"] {
        assert!(out.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_cli_version() {
    let output = reconpack(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("reconpack"));
}

#[test]
fn test_generate_default_dockerfile() {
    let output = reconpack(&["-q", "generate"]);
    assert!(output.status.success());

    let dockerfile = stdout(&output);
    assert!(dockerfile.starts_with("FROM alpine:3.12.4 AS build"));
    assert!(dockerfile.contains("ARG REQUIREMENTS=requirements.txt"));
    assert!(dockerfile.contains("COPY --from=build /opt/venv /opt/venv"));
    assert!(dockerfile.contains("USER spiderfoot"));
    assert!(dockerfile.contains("EXPOSE 5001"));
    assert!(dockerfile.contains(r#"ENTRYPOINT ["/opt/venv/bin/python"]"#));
    assert!(dockerfile.contains(r#"CMD ["sf.py","-l","0.0.0.0:5001"]"#));
}

#[test]
fn test_generate_test_variant_only_changes_arg() {
    let production = stdout(&reconpack(&["-q", "generate"]));
    let test = stdout(&reconpack(&["-q", "generate", "--requirements", "test"]));

    let differing: Vec<(&str, &str)> = production
        .lines()
        .zip(test.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(
        differing,
        vec![(
            "ARG REQUIREMENTS=requirements.txt",
            "ARG REQUIREMENTS=test/requirements.txt"
        )]
    );
}

#[test]
fn test_generate_json_to_file() {
    let dir = TempDir::new().unwrap();
    let out_file = dir.path().join("image.json");
    let output = reconpack(&["-q", "generate", "--format", "json", "-o", path_arg(&out_file)]);
    assert!(output.status.success());

    let content = fs::read_to_string(&out_file).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(parsed["builder"]["instructions"].is_array());
    assert_eq!(parsed["recipe_digest"].as_str().map(str::len), Some(64));
}

#[test]
fn test_generate_with_recipe_file() {
    let dir = TempDir::new().unwrap();
    let recipe = dir.path().join("recipe.yaml");
    fs::write(&recipe, "launch:\n  port: 8080\n").unwrap();

    let output = reconpack(&["-q", "--recipe", path_arg(&recipe), "generate"]);
    assert!(output.status.success());
    let dockerfile = stdout(&output);
    assert!(dockerfile.contains("EXPOSE 8080"));
    assert!(dockerfile.contains("0.0.0.0:8080"));
}

#[test]
fn test_generate_rejects_unpinned_recipe() {
    let dir = TempDir::new().unwrap();
    let recipe = dir.path().join("recipe.yaml");
    fs::write(&recipe, "builder:\n  base_image: alpine:latest\n").unwrap();

    let output = reconpack(&["--recipe", path_arg(&recipe), "generate"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("PinnedBaseImage"), "stderr: {}", stderr);
}

#[test]
fn test_missing_recipe_file_fails() {
    let output = reconpack(&["--recipe", "/nonexistent/recipe.yaml", "generate"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_validate_without_context() {
    let output = reconpack(&["-q", "validate"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Validation Passed"));
}

#[test]
fn test_validate_context_passes() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);

    let output = reconpack(&["-q", "validate", "--context", path_arg(&root), "--requirements", "test"]);
    assert!(output.status.success(), "stdout: {}", stdout(&output));
    let out = stdout(&output);
    assert!(out.contains("Manifest:   test/requirements.txt"));
    assert!(out.contains("Includes:   requirements.txt"));
    assert!(out.contains("libxml2"));
}

#[test]
fn test_validate_context_json_reports_test_tooling() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);

    let output = reconpack(&[
        "-q",
        "validate",
        "--context",
        path_arg(&root),
        "--requirements",
        "test",
        "--format",
        "json",
    ]);
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let tooling = parsed["context"]["analysis"]["test_tooling"].as_array().unwrap();
    assert!(tooling.iter().any(|t| t == "pytest"));
    assert!(parsed["rules"].as_array().unwrap().iter().all(|r| r["passed"] == true));
}

#[test]
fn test_validate_missing_log_directory() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);
    fs::remove_dir_all(root.join("log")).unwrap();

    let output = reconpack(&["-q", "validate", "--context", path_arg(&root)]);
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Validation Failed"));
    assert!(out.contains("Log directory 'log'"));
}

#[test]
fn test_validate_missing_manifest() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);
    fs::remove_file(root.join("requirements.txt")).unwrap();

    let output = reconpack(&["-q", "validate", "--context", path_arg(&root)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("requirements.txt"));
}

#[test]
fn test_validate_empty_manifest() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);
    fs::write(root.join("requirements.txt"), "# nothing pinned yet\n").unwrap();

    let output = reconpack(&["-q", "validate", "--context", path_arg(&root)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("declares no dependencies"));
}

#[test]
fn test_validate_missing_entrypoint() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);
    fs::remove_file(root.join("sf.py")).unwrap();

    let output = reconpack(&["-q", "validate", "--context", path_arg(&root)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("sf.py"));
}

#[test]
fn test_ignore_file() {
    let output = reconpack(&["-q", "ignore-file", "--exclude", "docs"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("# Generated by reconpack"));
    assert!(out.lines().any(|l| l == ".git"));
    assert!(out.lines().any(|l| l == "docs"));
    assert!(out.lines().any(|l| l == "!requirements.txt"));
    assert!(out.lines().any(|l| l == "!log"));
}

#[test]
fn test_smoke_test_script() {
    let output = reconpack(&["-q", "smoke-test", "--image", "spiderfoot:ci"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("#!/bin/sh"));
    assert!(out.contains("spiderfoot:ci"));
    assert!(out.contains("lxml.etree"));
    assert!(out.contains("--entrypoint id spiderfoot:ci -un"));
}

#[test]
fn test_run_command_server() {
    let output = reconpack(&["-q", "run-command", "--data-volume", "sfdata"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("docker run -d -p 5001:5001"));
    assert!(out.contains("-v sfdata:/var/lib/spiderfoot"));
    assert!(out.contains("spiderfoot:latest sf.py -l 0.0.0.0:5001"));
}

#[test]
fn test_run_command_cli_reaches_published_server() {
    let output = reconpack(&["-q", "run-command", "--mode", "cli"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("docker run --rm -it --network host"));
    assert!(out.contains("sfcli.py -s http://127.0.0.1:5001"));

    let output = reconpack(&["-q", "run-command", "--mode", "cli", "--server-url", "http://sf:5001"]);
    assert!(output.status.success());
    assert!(!stdout(&output).contains("--network"));
}

#[test]
fn test_run_command_batch_has_no_port() {
    let output = reconpack(&[
        "-q",
        "run-command",
        "--mode",
        "batch",
        "--target",
        "example.com",
        "--modules",
        "sfp_dnsresolve",
    ]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(!out.contains("-p "));
    assert!(!out.contains("5001"));
    assert!(out.contains("example.com"));
}

#[test]
fn test_run_command_batch_requires_target() {
    let output = reconpack(&["run-command", "--mode", "batch"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_build_dry_run_leaves_context_untouched() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);

    let output = Command::new(reconpack_bin())
        .args(["-q", "build", "--context", path_arg(&root), "--test", "--dry-run"])
        .env("RECONPACK_BUILD_TOOL", "docker")
        .env("RECONPACK_IMAGE_TAG", "spiderfoot:dry")
        .output()
        .expect("Failed to execute reconpack");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let out = stdout(&output);
    assert!(out.contains("--build-arg REQUIREMENTS=test/requirements.txt"));
    assert!(out.contains("-t spiderfoot:dry"));

    assert!(!root.join("Dockerfile.reconpack").exists());
}

#[test]
fn test_build_rejects_broken_context() {
    let dir = TempDir::new().unwrap();
    let root = create_context(&dir);
    fs::remove_dir_all(root.join("log")).unwrap();

    let output = reconpack(&["-q", "build", "--context", path_arg(&root), "--dry-run"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!root.join("Dockerfile.reconpack").exists());
}
