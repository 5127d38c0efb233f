//! Requirements manifest parsing
//!
//! Understands the subset of pip's requirements format that affects the
//! builder stage: requirement specifiers (with extras, version constraints,
//! environment markers and direct references), bare archive paths, URLs and
//! VCS references, `-r`/`--requirement` includes, line continuations,
//! comments and global options. Anything else is reported
//! as malformed so the build configuration fails before the image build does.

use crate::error::PackagingError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// One dependency specifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
    /// Version constraint such as `>=1.2,<2`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifier: Option<String>,
    /// Direct reference (`name @ url`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Environment marker after `;`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
}

impl Requirement {
    /// True when pinned to a single version with `==` or `===`
    pub fn is_pinned(&self) -> bool {
        self.url.is_some()
            || self
                .specifier
                .as_deref()
                .map(|s| (s.starts_with("==") || s.starts_with("===")) && !s.contains(','))
                .unwrap_or(false)
    }
}

/// A parsed manifest file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsManifest {
    pub path: PathBuf,
    pub requirements: Vec<Requirement>,
    /// Included manifests, resolved relative to this manifest's directory
    pub includes: Vec<PathBuf>,
    /// Global options (`--index-url`, `--extra-index-url`, ...)
    pub options: Vec<String>,
}

impl RequirementsManifest {
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.includes.is_empty()
    }
}

fn requirement_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[(?P<extras>[^\]]*)\])?\s*(?P<rest>.*)$",
        )
        .expect("valid regex")
    })
}

fn specifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let clause = r"(?:===|==|~=|!=|>=|<=|<|>)\s*[A-Za-z0-9.*+!_-]+";
        Regex::new(&format!(r"^{clause}(?:\s*,\s*{clause})*$")).expect("valid regex")
    })
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid regex"))
}

const VCS_PREFIXES: &[&str] = &["git+", "hg+", "svn+", "bzr+"];

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".zip", ".whl", ".git"];

/// Local path, URL or VCS reference given without a `name @` prefix
fn is_direct_reference(line: &str) -> bool {
    line.starts_with('.')
        || line.starts_with('/')
        || url_regex().is_match(line)
        || VCS_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Distribution name of a bare reference: `#egg=` wins, otherwise the file
/// or directory name with archive suffix and version stripped
fn reference_name(reference: &str) -> String {
    if let Some((_, fragment)) = reference.split_once('#') {
        if let Some(egg) = fragment
            .split('&')
            .find_map(|part| part.strip_prefix("egg="))
            .filter(|egg| !egg.is_empty())
        {
            return egg.to_string();
        }
    }

    let location = reference.split(['#', '?']).next().unwrap_or(reference);
    let file = location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(location);
    // VCS revision: `repo.git@v1.0`
    let file = file.split('@').next().unwrap_or(file);
    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| file.strip_suffix(suffix))
        .unwrap_or(file);
    let name = stem
        .char_indices()
        .find(|(i, c)| *c == '-' && stem[i + 1..].starts_with(|d: char| d.is_ascii_digit()))
        .map(|(i, _)| &stem[..i])
        .unwrap_or(stem);

    if name.is_empty() || name == "." || name == ".." {
        reference.to_string()
    } else {
        name.to_string()
    }
}

fn parse_direct_reference(line: &str) -> Requirement {
    // pip only treats `; ` as a marker separator after a URL
    let (reference, marker) = match line.split_once("; ") {
        Some((reference, marker)) => (reference.trim(), Some(marker.trim().to_string())),
        None => (line.trim(), None),
    };
    Requirement {
        name: reference_name(reference),
        extras: Vec::new(),
        specifier: None,
        url: Some(reference.to_string()),
        marker,
    }
}

/// Join `\` continuations and strip comments, keeping original line numbers
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let (start, mut text) = match pending.take() {
            Some((start, mut acc)) => {
                acc.push(' ');
                acc.push_str(raw.trim());
                (start, acc)
            }
            None => (line_no, raw.trim().to_string()),
        };

        if text.ends_with('\\') {
            text.pop();
            pending = Some((start, text.trim_end().to_string()));
            continue;
        }

        let without_comment = strip_comment(&text);
        if !without_comment.is_empty() {
            lines.push((start, without_comment));
        }
    }

    if let Some((start, text)) = pending {
        let without_comment = strip_comment(&text);
        if !without_comment.is_empty() {
            lines.push((start, without_comment));
        }
    }

    lines
}

fn strip_comment(line: &str) -> String {
    if line.starts_with('#') {
        return String::new();
    }
    match line.find(" #") {
        Some(pos) => line[..pos].trim().to_string(),
        None => line.trim().to_string(),
    }
}

/// Drop per-requirement options such as `--hash=sha256:...`
fn strip_requirement_options(line: &str) -> &str {
    match line.find(" --") {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

fn parse_requirement(line: &str) -> Option<Requirement> {
    let line = strip_requirement_options(line);
    if is_direct_reference(line) {
        return Some(parse_direct_reference(line));
    }
    let (body, marker) = match line.split_once(';') {
        Some((body, marker)) => (body.trim(), Some(marker.trim().to_string())),
        None => (line.trim(), None),
    };

    let caps = requirement_regex().captures(body)?;
    let name = caps.name("name")?.as_str().to_string();
    let extras = caps
        .name("extras")
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let rest = caps.name("rest").map(|m| m.as_str().trim()).unwrap_or("");

    let (specifier, url) = if rest.is_empty() {
        (None, None)
    } else if let Some(url) = rest.strip_prefix('@') {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        (None, Some(url.to_string()))
    } else {
        let spec = rest.trim_start_matches('(').trim_end_matches(')').trim();
        if !specifier_regex().is_match(spec) {
            return None;
        }
        (Some(spec.replace(' ', "")), None)
    };

    Some(Requirement {
        name,
        extras,
        specifier,
        url,
        marker,
    })
}

/// Parse manifest text; `path` is used for include resolution and error reports
pub fn parse_manifest(path: &Path, content: &str) -> Result<RequirementsManifest, PackagingError> {
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut manifest = RequirementsManifest {
        path: path.to_path_buf(),
        requirements: Vec::new(),
        includes: Vec::new(),
        options: Vec::new(),
    };

    for (line_no, line) in logical_lines(content) {
        if let Some(include) = include_target(&line) {
            manifest.includes.push(normalize(&base.join(include)));
            continue;
        }

        if line.starts_with('-') {
            manifest.options.push(line);
            continue;
        }

        match parse_requirement(&line) {
            Some(requirement) => manifest.requirements.push(requirement),
            None => {
                return Err(PackagingError::MalformedManifest {
                    path: path.to_path_buf(),
                    line: line_no,
                    content: line,
                })
            }
        }
    }

    Ok(manifest)
}

fn include_target(line: &str) -> Option<&str> {
    for prefix in ["-r ", "--requirement ", "--requirement=", "-r"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            let target = rest.trim();
            if !target.is_empty() {
                return Some(target);
            }
        }
    }
    None
}

/// Lexically resolve `.` and `..` without touching the file system
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
