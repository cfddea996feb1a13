//! Bridge configuration
//!
//! Loaded from TOML: `$A3S_LSP_CONFIG` when set, otherwise
//! `~/.a3s/lsp.toml`. A missing file yields the defaults.
//!
//! ```toml
//! request_timeout_secs = 30
//! initialize_timeout_secs = 60
//!
//! [servers.zig]
//! command = "zls"
//! extensions = ["zig"]
//! language_id = "zig"
//! root_markers = ["build.zig"]
//! ```

use crate::error::{BridgeError, Result};
use crate::servers::LanguageServerDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "A3S_LSP_CONFIG";

/// User-configurable settings for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Deadline for one request/response round trip
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Deadline for the `initialize` handshake (servers index on startup)
    #[serde(default = "default_initialize_timeout_secs")]
    pub initialize_timeout_secs: u64,

    /// Grace period for `shutdown`/`exit` before the process is killed
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Deadline for version checks and installer runs
    #[serde(default = "default_install_timeout_secs")]
    pub install_timeout_secs: u64,

    /// Additional or overriding server descriptors keyed by language
    #[serde(default)]
    pub servers: HashMap<String, LanguageServerDescriptor>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_initialize_timeout_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_install_timeout_secs() -> u64 {
    300
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            initialize_timeout_secs: default_initialize_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            install_timeout_secs: default_install_timeout_secs(),
            servers: HashMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Default config file path (`~/.a3s/lsp.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".a3s").join("lsp.toml"))
    }

    /// Load from `$A3S_LSP_CONFIG` or the default path.
    /// Returns default config if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);

        match path {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML and fill descriptor language keys.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: BridgeConfig = toml::from_str(content)?;
        for (language, descriptor) in config.servers.iter_mut() {
            if descriptor.language.is_empty() {
                descriptor.language = language.clone();
            }
            if descriptor.command.is_empty() {
                return Err(BridgeError::Config(format!(
                    "server '{}' has an empty command",
                    language
                )));
            }
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_secs(self.initialize_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root::RootStrategy;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.initialize_timeout(), Duration::from_secs(60));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.install_timeout(), Duration::from_secs(300));
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_config_deserialize() {
        let config = BridgeConfig::from_toml(
            r#"
            request_timeout_secs = 10

            [servers.zig]
            command = "zls"
            extensions = ["zig"]
            language_id = "zig"
            root_markers = ["build.zig"]

            [servers.go]
            command = "gopls"
            args = ["-remote=auto"]
            extensions = ["go"]
            language_id = "go"
            root_strategy = "go_workspace"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.initialize_timeout_secs, 60);
        let zig = config.servers.get("zig").unwrap();
        assert_eq!(zig.language, "zig");
        assert_eq!(zig.root_markers, vec!["build.zig"]);
        let go = config.servers.get("go").unwrap();
        assert_eq!(go.root_strategy, RootStrategy::GoWorkspace);
        assert_eq!(go.args, vec!["-remote=auto"]);
    }

    #[test]
    fn test_config_rejects_empty_command() {
        let result = BridgeConfig::from_toml(
            r#"
            [servers.bad]
            command = ""
            extensions = ["x"]
            language_id = "x"
            "#,
        );
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("lsp.toml");
        std::fs::write(&path, "shutdown_timeout_secs = 1\n").unwrap();
        let config = BridgeConfig::load_from(&path).unwrap();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = BridgeConfig::load_from(Path::new("/nonexistent/a3s/lsp.toml"));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
