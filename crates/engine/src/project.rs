//! Name and namespace detection used when a save omits them.

use std::{fs, path::Path};

use serde::Serialize;
use serde_json::Value;

/// Fallback name for commands whose first word yields nothing usable.
pub const DEFAULT_COMMAND_NAME: &str = "command";

/// Fallback namespace when the directory has no usable name either.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Derives a short name from the command text.
///
/// Takes the first word, strips any leading path, and keeps the leading run of ASCII
/// letters, digits, `-` and `_`.
///
/// ```rust
/// use hiproc_engine::project::detect_name;
///
/// assert_eq!(detect_name("./scripts/build.sh --release"), "build");
/// assert_eq!(detect_name("python3.11 -m http.server"), "python3");
/// assert_eq!(detect_name("   "), "command");
/// ```
pub fn detect_name(command: &str) -> String {
    let first = command.split_whitespace().next().unwrap_or_default();
    let base = first.rsplit(['/', '\\']).next().unwrap_or(first);
    let name: String = base
        .chars()
        .take_while(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
        .collect();
    if name.is_empty() { DEFAULT_COMMAND_NAME.to_string() } else { name }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    Npm,
    Cargo,
    Python,
    Maven,
    Go,
    Docker,
    Git,
    Unknown,
}

impl ProjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Cargo => "cargo",
            Self::Python => "python",
            Self::Maven => "maven",
            Self::Go => "go",
            Self::Docker => "docker",
            Self::Git => "git",
            Self::Unknown => "unknown",
        }
    }
}

/// Marker files, checked in order. The first one present decides the project kind.
const MARKERS: &[(&str, ProjectKind)] = &[
    ("package.json", ProjectKind::Npm),
    ("Cargo.toml", ProjectKind::Cargo),
    ("pyproject.toml", ProjectKind::Python),
    ("setup.py", ProjectKind::Python),
    ("requirements.txt", ProjectKind::Python),
    ("pom.xml", ProjectKind::Maven),
    ("go.mod", ProjectKind::Go),
    ("Dockerfile", ProjectKind::Docker),
    (".git", ProjectKind::Git),
];

/// Outcome of inspecting a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub namespace: String,
    pub kind: ProjectKind,
    /// 0-100. 50 for a bare directory name, 80 for a recognised marker, 90 when the
    /// project manifest names the project.
    pub confidence: u8,
}

/// Detect the project that `directory` belongs to.
pub fn detect_project(directory: &Path) -> ProjectInfo {
    let directory_name = directory
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string();

    let Some((marker, kind)) = MARKERS.iter().find(|(marker, _)| directory.join(marker).exists()) else {
        return ProjectInfo {
            namespace: directory_name,
            kind: ProjectKind::Unknown,
            confidence: 50,
        };
    };

    let manifest = directory.join(marker);
    let declared = match kind {
        ProjectKind::Npm => package_json_name(&manifest),
        ProjectKind::Cargo => cargo_package_name(&manifest),
        ProjectKind::Go => go_module_name(&manifest),
        _ => None,
    };

    match declared {
        Some(namespace) => ProjectInfo {
            namespace,
            kind: *kind,
            confidence: 90,
        },
        None => ProjectInfo {
            namespace: directory_name,
            kind: *kind,
            confidence: 80,
        },
    }
}

fn package_json_name(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let document: Value = serde_json::from_str(&content).ok()?;
    let name = document.get("name")?.as_str()?.trim();
    // Scoped packages (`@org/app`) keep only the package part.
    let name = name.rsplit('/').next().unwrap_or(name);
    (!name.is_empty()).then(|| name.to_string())
}

fn cargo_package_name(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        (key.trim() == "name").then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

fn go_module_name(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let module = content.lines().find_map(|line| line.trim().strip_prefix("module "))?.trim();
    module.rsplit('/').next().filter(|name| !name.is_empty()).map(str::to_string)
}
