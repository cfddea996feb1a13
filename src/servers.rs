//! Language Server Descriptors
//!
//! Built-in descriptors for common language servers. Entries from the
//! configuration file are merged over these, so new languages need no code
//! changes.

use crate::actions::ActionKind;
use crate::root::RootStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// How to install, start and scope one language server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageServerDescriptor {
    /// Language key (e.g. "go"); filled from the table key when loaded from config
    #[serde(default)]
    pub language: String,
    /// Server binary to start
    pub command: String,
    /// Start arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides merged over the inherited environment
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Command that succeeds when the server is installed (default: `<command> --version`)
    #[serde(default)]
    pub version_check: Vec<String>,
    /// Command that installs the server, if one exists
    #[serde(default)]
    pub install: Option<Vec<String>>,
    /// Filenames marking a project root
    #[serde(default)]
    pub root_markers: Vec<String>,
    /// Root resolution strategy
    #[serde(default)]
    pub root_strategy: RootStrategy,
    /// Actions the server is known to support
    #[serde(default = "ActionKind::all")]
    pub actions: Vec<ActionKind>,
    /// File extensions this server handles
    pub extensions: Vec<String>,
    /// Default LSP languageId
    pub language_id: String,
    /// Initialization options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<serde_json::Value>,
}

impl LanguageServerDescriptor {
    /// Whether `path` has one of this server's extensions.
    pub fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn supports(&self, action: ActionKind) -> bool {
        self.actions.contains(&action)
    }

    /// Comma-separated list of supported action names.
    pub fn supported_actions(&self) -> String {
        self.actions
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn version_check_argv(&self) -> Vec<String> {
        if self.version_check.is_empty() {
            vec![self.command.clone(), "--version".to_string()]
        } else {
            self.version_check.clone()
        }
    }

    /// Human-readable manual install instruction.
    pub fn install_hint(&self) -> String {
        match &self.install {
            Some(argv) if !argv.is_empty() => argv.join(" "),
            _ => format!("install '{}' and make sure it is on PATH", self.command),
        }
    }

    /// LSP languageId for a file, refining the default by extension.
    pub fn language_id_for(&self, path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(language_id_for_extension)
            .map(|id| id.to_string())
            .unwrap_or_else(|| self.language_id.clone())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Get built-in language server descriptors keyed by language
pub fn builtin_servers() -> HashMap<String, LanguageServerDescriptor> {
    use ActionKind::*;

    let mut servers = HashMap::new();

    // Go - gopls
    servers.insert(
        "go".to_string(),
        LanguageServerDescriptor {
            language: "go".to_string(),
            command: "gopls".to_string(),
            args: vec![],
            env: HashMap::from([("GO111MODULE".to_string(), "on".to_string())]),
            version_check: strings(&["gopls", "version"]),
            install: Some(strings(&["go", "install", "golang.org/x/tools/gopls@latest"])),
            root_markers: strings(&["go.work", "go.mod"]),
            root_strategy: RootStrategy::GoWorkspace,
            actions: ActionKind::all(),
            extensions: strings(&["go"]),
            language_id: "go".to_string(),
            initialization_options: None,
        },
    );

    // Python - pyright
    servers.insert(
        "python".to_string(),
        LanguageServerDescriptor {
            language: "python".to_string(),
            command: "pyright-langserver".to_string(),
            args: strings(&["--stdio"]),
            env: HashMap::new(),
            version_check: strings(&["pyright", "--version"]),
            install: Some(strings(&["npm", "install", "-g", "pyright"])),
            root_markers: strings(&[
                "pyproject.toml",
                "pyrightconfig.json",
                "setup.py",
                "setup.cfg",
                "requirements.txt",
            ]),
            root_strategy: RootStrategy::Markers,
            actions: vec![
                Definition,
                References,
                Rename,
                Hover,
                Completion,
                CodeAction,
                OrganizeImports,
                Symbols,
            ],
            extensions: strings(&["py", "pyi"]),
            language_id: "python".to_string(),
            initialization_options: None,
        },
    );

    // Rust - rust-analyzer
    servers.insert(
        "rust".to_string(),
        LanguageServerDescriptor {
            language: "rust".to_string(),
            command: "rust-analyzer".to_string(),
            args: vec![],
            env: HashMap::new(),
            version_check: vec![],
            install: Some(strings(&["rustup", "component", "add", "rust-analyzer"])),
            root_markers: strings(&["Cargo.toml"]),
            root_strategy: RootStrategy::Markers,
            actions: vec![
                Definition,
                References,
                Rename,
                Hover,
                Completion,
                CodeAction,
                Symbols,
            ],
            extensions: strings(&["rs"]),
            language_id: "rust".to_string(),
            initialization_options: None,
        },
    );

    // TypeScript/JavaScript - typescript-language-server
    servers.insert(
        "typescript".to_string(),
        LanguageServerDescriptor {
            language: "typescript".to_string(),
            command: "typescript-language-server".to_string(),
            args: strings(&["--stdio"]),
            env: HashMap::new(),
            version_check: vec![],
            install: Some(strings(&[
                "npm",
                "install",
                "-g",
                "typescript-language-server",
                "typescript",
            ])),
            root_markers: strings(&["tsconfig.json", "jsconfig.json", "package.json"]),
            root_strategy: RootStrategy::Markers,
            actions: ActionKind::all(),
            extensions: strings(&["ts", "tsx", "js", "jsx", "mjs", "cjs"]),
            language_id: "typescript".to_string(),
            initialization_options: None,
        },
    );

    // C/C++ - clangd
    servers.insert(
        "cpp".to_string(),
        LanguageServerDescriptor {
            language: "cpp".to_string(),
            command: "clangd".to_string(),
            args: vec![],
            env: HashMap::new(),
            version_check: vec![],
            install: None,
            root_markers: strings(&[
                "compile_commands.json",
                "compile_flags.txt",
                ".clangd",
                "CMakeLists.txt",
            ]),
            root_strategy: RootStrategy::Markers,
            actions: vec![
                Definition,
                References,
                Rename,
                Hover,
                Completion,
                CodeAction,
                Symbols,
            ],
            extensions: strings(&["c", "h", "cpp", "cc", "cxx", "hpp", "hh"]),
            language_id: "cpp".to_string(),
            initialization_options: None,
        },
    );

    servers
}

/// Find the descriptor handling `path`, if any.
pub fn descriptor_for_path<'a>(
    servers: &'a HashMap<String, LanguageServerDescriptor>,
    path: &Path,
) -> Option<&'a LanguageServerDescriptor> {
    // Sorted so overlapping extension claims resolve the same way every run
    let mut languages: Vec<&String> = servers.keys().collect();
    languages.sort();
    languages
        .into_iter()
        .filter_map(|language| servers.get(language))
        .find(|descriptor| descriptor.handles(path))
}

/// Get language ID for LSP from file extension
pub fn language_id_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "rs" => Some("rust"),
        "go" => Some("go"),
        "ts" => Some("typescript"),
        "tsx" => Some("typescriptreact"),
        "js" | "mjs" | "cjs" => Some("javascript"),
        "jsx" => Some("javascriptreact"),
        "py" | "pyi" => Some("python"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => Some("cpp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_builtin_servers() {
        let servers = builtin_servers();
        for language in ["go", "python", "rust", "typescript", "cpp"] {
            let descriptor = servers.get(language).unwrap();
            assert_eq!(descriptor.language, language);
        }
    }

    #[test]
    fn test_descriptor_for_path() {
        let servers = builtin_servers();
        let lang = |p: &str| descriptor_for_path(&servers, Path::new(p)).map(|d| d.language.as_str());
        assert_eq!(lang("main.go"), Some("go"));
        assert_eq!(lang("src/lib.rs"), Some("rust"));
        assert_eq!(lang("app/index.TSX"), Some("typescript"));
        assert_eq!(lang("pkg/mod.py"), Some("python"));
        assert_eq!(lang("a/b.hpp"), Some("cpp"));
        assert_eq!(lang("README.md"), None);
        assert_eq!(lang("Makefile"), None);
    }

    #[test]
    fn test_language_id_for() {
        let servers = builtin_servers();
        let ts = servers.get("typescript").unwrap();
        assert_eq!(ts.language_id_for(&PathBuf::from("a.tsx")), "typescriptreact");
        assert_eq!(ts.language_id_for(&PathBuf::from("a.js")), "javascript");
        let cpp = servers.get("cpp").unwrap();
        assert_eq!(cpp.language_id_for(&PathBuf::from("x.h")), "c");
    }

    #[test]
    fn test_supported_actions() {
        let servers = builtin_servers();
        let rust = servers.get("rust").unwrap();
        assert!(rust.supports(ActionKind::Rename));
        assert!(!rust.supports(ActionKind::OrganizeImports));
        assert!(rust.supported_actions().contains("rename"));
    }

    #[test]
    fn test_version_check_and_install_hint() {
        let servers = builtin_servers();
        let go = servers.get("go").unwrap();
        assert_eq!(go.version_check_argv(), vec!["gopls", "version"]);
        assert_eq!(
            go.install_hint(),
            "go install golang.org/x/tools/gopls@latest"
        );

        let cpp = servers.get("cpp").unwrap();
        assert_eq!(cpp.version_check_argv(), vec!["clangd", "--version"]);
        assert!(cpp.install_hint().contains("clangd"));
    }

    #[test]
    fn test_descriptor_from_toml_defaults() {
        let descriptor: LanguageServerDescriptor = toml::from_str(
            r#"
            command = "zls"
            extensions = ["zig"]
            language_id = "zig"
            root_markers = ["build.zig"]
            "#,
        )
        .unwrap();
        assert_eq!(descriptor.command, "zls");
        assert_eq!(descriptor.root_strategy, RootStrategy::Markers);
        assert_eq!(descriptor.actions, ActionKind::all());
        assert!(descriptor.install.is_none());
    }
}
