//! Python virtual environment commands and paths

/// Directory holding the environment's executables
pub fn bin_dir(venv: &str) -> String {
    format!("{}/bin", venv.trim_end_matches('/'))
}

/// Interpreter inside the environment
pub fn interpreter(venv: &str) -> String {
    format!("{}/python", bin_dir(venv))
}

/// `PATH` value that resolves the environment's binaries first
pub fn path_binding(venv: &str) -> String {
    format!("{}:$PATH", bin_dir(venv))
}

pub fn create_venv(venv: &str) -> String {
    format!("python3 -m venv {}", venv)
}

pub fn upgrade_pip() -> String {
    "pip install --no-cache-dir -U pip".to_string()
}

/// Install from a manifest; `reference` may be a build-arg expansion
pub fn install_requirements(reference: &str) -> String {
    format!("pip install --no-cache-dir -r \"{}\"", reference)
}

/// One-liner that imports every module and fails on the first missing one
pub fn import_check_script(modules: &[String]) -> String {
    if modules.is_empty() {
        return "pass".to_string();
    }
    format!("import {}", modules.join(", "))
}
