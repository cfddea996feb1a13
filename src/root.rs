//! Workspace root resolution
//!
//! Two strategies exist. The generic one walks upward to the nearest
//! directory holding any of the descriptor's root markers. The Go one is kept
//! separate because it encodes a precedence rule: a `go.work` multi-module
//! workspace root wins over the nearest `go.mod` module root.

use crate::servers::LanguageServerDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const GO_WORK_MARKER: &str = "go.work";
pub const GO_MOD_MARKER: &str = "go.mod";

/// Root resolution strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootStrategy {
    /// Nearest ancestor containing any root marker
    #[default]
    Markers,
    /// `go.work` first, then `go.mod`
    GoWorkspace,
}

/// Resolve the workspace root for `file`.
///
/// Falls back to the file's own directory when no marker is found.
pub fn resolve_root(descriptor: &LanguageServerDescriptor, file: &Path) -> PathBuf {
    let start = start_dir(file);
    let found = match descriptor.root_strategy {
        RootStrategy::Markers => find_marker_root(&start, &descriptor.root_markers),
        RootStrategy::GoWorkspace => find_go_root(&start),
    };
    found.unwrap_or(start)
}

/// Nearest ancestor of `start` (inclusive) containing any of `markers`.
pub fn find_marker_root(start: &Path, markers: &[String]) -> Option<PathBuf> {
    if markers.is_empty() {
        return None;
    }
    start
        .ancestors()
        .find(|dir| markers.iter().any(|marker| dir.join(marker).exists()))
        .map(Path::to_path_buf)
}

/// Go root: the `go.work` workspace if one encloses `start`, else the module.
pub fn find_go_root(start: &Path) -> Option<PathBuf> {
    find_upward(start, GO_WORK_MARKER).or_else(|| find_upward(start, GO_MOD_MARKER))
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_file())
        .map(Path::to_path_buf)
}

/// Absolute, canonical directory to start the search from.
fn start_dir(file: &Path) -> PathBuf {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(file))
            .unwrap_or_else(|_| file.to_path_buf())
    };
    let absolute = absolute.canonicalize().unwrap_or(absolute);
    if absolute.is_dir() {
        absolute
    } else {
        absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servers::builtin_servers;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_marker_root_nearest_ancestor() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        touch(&root.join("proj/pyproject.toml"));
        touch(&root.join("proj/pkg/sub/mod.py"));

        let servers = builtin_servers();
        let python = servers.get("python").unwrap();
        assert_eq!(
            resolve_root(python, &root.join("proj/pkg/sub/mod.py")),
            root.join("proj")
        );
    }

    #[test]
    fn test_marker_root_falls_back_to_file_dir() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        touch(&root.join("loose/script.py"));

        let servers = builtin_servers();
        let python = servers.get("python").unwrap();
        let resolved = resolve_root(python, &root.join("loose/script.py"));
        // nothing above the temp dir should carry a python marker
        assert!(resolved == root.join("loose") || !resolved.starts_with(&root));
    }

    #[test]
    fn test_go_work_takes_precedence_over_go_mod() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        touch(&root.join("ws/go.work"));
        touch(&root.join("ws/svc/go.mod"));
        touch(&root.join("ws/svc/cmd/main.go"));

        let servers = builtin_servers();
        let go = servers.get("go").unwrap();
        assert_eq!(
            resolve_root(go, &root.join("ws/svc/cmd/main.go")),
            root.join("ws")
        );
    }

    #[test]
    fn test_go_mod_without_workspace() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().canonicalize().unwrap();
        touch(&root.join("mod/go.mod"));
        touch(&root.join("mod/internal/x/x.go"));

        assert_eq!(
            find_go_root(&root.join("mod/internal/x")),
            Some(root.join("mod"))
        );
    }

    #[test]
    fn test_find_marker_root_empty_markers() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(find_marker_root(temp.path(), &[]), None);
    }
}
