//! LSP Manager
//!
//! Owns one language server session per (language, workspace root). The
//! registry map sits behind a `RwLock`; a separate start mutex serializes
//! launches so concurrent first use of a key starts exactly one process.

use crate::client::LspClient;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::servers::{builtin_servers, descriptor_for_path, LanguageServerDescriptor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};

/// Registry key: language and resolved workspace root
pub type SessionKey = (String, PathBuf);

/// Starts a language server transport for a descriptor and root.
///
/// The returned client must not be initialized yet; the manager performs the
/// handshake.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(
        &self,
        descriptor: &LanguageServerDescriptor,
        root: &Path,
    ) -> Result<LspClient>;
}

/// Launches language servers as local subprocesses, installing them first
/// when the version check fails.
pub struct ProcessLauncher {
    install_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(install_timeout: Duration) -> Self {
        Self { install_timeout }
    }

    /// Verify the server is installed, running its installer if not.
    pub async fn ensure_installed(&self, descriptor: &LanguageServerDescriptor) -> Result<()> {
        let check = descriptor.version_check_argv();
        if matches!(run_command(&check, self.install_timeout).await, Ok(true)) {
            return Ok(());
        }

        let install_error = |reason: String| BridgeError::Install {
            language: descriptor.language.clone(),
            reason,
            install_hint: descriptor.install_hint(),
        };

        let install = match &descriptor.install {
            Some(argv) if !argv.is_empty() => argv,
            _ => {
                return Err(install_error(format!(
                    "'{}' is not installed and no installer is configured",
                    descriptor.command
                )))
            }
        };

        tracing::info!(
            "Installing {} language server: {}",
            descriptor.language,
            install.join(" ")
        );
        match run_command(install, self.install_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(install_error(format!(
                    "installer '{}' exited with failure",
                    install.join(" ")
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(install_error(format!(
                    "installer '{}' not found",
                    install[0]
                )))
            }
            Err(e) => {
                return Err(install_error(format!(
                    "installer '{}' failed: {}",
                    install.join(" "),
                    e
                )))
            }
        }

        if matches!(run_command(&check, self.install_timeout).await, Ok(true)) {
            Ok(())
        } else {
            Err(install_error(format!(
                "'{}' is still unavailable after installing",
                descriptor.command
            )))
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(BridgeConfig::default().install_timeout())
    }
}

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        descriptor: &LanguageServerDescriptor,
        root: &Path,
    ) -> Result<LspClient> {
        self.ensure_installed(descriptor).await?;
        LspClient::spawn(descriptor, root)
    }
}

/// Run `argv` to completion with output discarded; `Ok(true)` on success.
async fn run_command(argv: &[String], timeout: Duration) -> std::io::Result<bool> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, status).await {
        Ok(status) => Ok(status?.success()),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("'{}' timed out after {:?}", argv.join(" "), timeout),
        )),
    }
}

/// LSP server status
#[derive(Debug, Clone, serde::Serialize)]
pub struct LspServerStatus {
    pub language: String,
    pub root: Option<PathBuf>,
    pub connected: bool,
    pub initialized: bool,
    pub command: String,
    pub pid: Option<u32>,
}

/// LSP Manager for managing multiple language servers
pub struct LspManager {
    /// Running sessions
    sessions: RwLock<HashMap<SessionKey, Arc<LspClient>>>,
    /// Held while a session is being started
    start_lock: Mutex<()>,
    /// Server descriptors keyed by language
    descriptors: RwLock<HashMap<String, LanguageServerDescriptor>>,
    launcher: Arc<dyn ServerLauncher>,
    config: BridgeConfig,
}

impl LspManager {
    /// Create a new LSP manager with default settings
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a manager launching real processes with `config`.
    pub fn with_config(config: BridgeConfig) -> Self {
        let launcher = Arc::new(ProcessLauncher::new(config.install_timeout()));
        Self::with_launcher(config, launcher)
    }

    /// Create a manager with a custom launcher.
    pub fn with_launcher(config: BridgeConfig, launcher: Arc<dyn ServerLauncher>) -> Self {
        let mut descriptors = builtin_servers();
        for (language, descriptor) in &config.servers {
            descriptors.insert(language.clone(), descriptor.clone());
        }

        Self {
            sessions: RwLock::new(HashMap::new()),
            start_lock: Mutex::new(()),
            descriptors: RwLock::new(descriptors),
            launcher,
            config,
        }
    }

    /// Process-wide manager, configured from the default config file.
    pub fn global() -> &'static LspManager {
        static GLOBAL: OnceLock<LspManager> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = BridgeConfig::load().unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid LSP bridge config: {}", e);
                BridgeConfig::default()
            });
            LspManager::with_config(config)
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Register or replace a server descriptor
    pub async fn register_server(&self, descriptor: LanguageServerDescriptor) {
        let mut descriptors = self.descriptors.write().await;
        descriptors.insert(descriptor.language.clone(), descriptor);
    }

    pub async fn descriptor(&self, language: &str) -> Option<LanguageServerDescriptor> {
        self.descriptors.read().await.get(language).cloned()
    }

    /// All descriptors, sorted by language.
    pub async fn descriptors(&self) -> Vec<LanguageServerDescriptor> {
        let descriptors = self.descriptors.read().await;
        let mut list: Vec<_> = descriptors.values().cloned().collect();
        list.sort_by(|a, b| a.language.cmp(&b.language));
        list
    }

    /// Descriptor handling `path`, or an error naming supported languages.
    pub async fn descriptor_for_path(&self, path: &Path) -> Result<LanguageServerDescriptor> {
        let descriptors = self.descriptors.read().await;
        if let Some(descriptor) = descriptor_for_path(&descriptors, path) {
            return Ok(descriptor.clone());
        }

        let mut supported: Vec<&str> = descriptors.keys().map(String::as_str).collect();
        supported.sort_unstable();
        Err(BridgeError::UnsupportedTarget {
            file: path.display().to_string(),
            supported: supported.join(", "),
        })
    }

    async fn live_session(&self, key: &SessionKey) -> Option<Arc<LspClient>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(key)
            .filter(|client| client.is_alive())
            .cloned()
    }

    /// Return the live session for (`language`, `root`), starting one if
    /// needed.
    pub async fn ensure_running(&self, language: &str, root: &Path) -> Result<Arc<LspClient>> {
        let key: SessionKey = (language.to_string(), root.to_path_buf());
        if let Some(client) = self.live_session(&key).await {
            return Ok(client);
        }

        let _guard = self.start_lock.lock().await;
        if let Some(client) = self.live_session(&key).await {
            return Ok(client);
        }

        let dead = self.sessions.write().await.remove(&key);
        if let Some(dead) = dead {
            tracing::info!(
                "Evicting dead {} language server for {}",
                language,
                root.display()
            );
            dead.kill();
        }

        let descriptor = self.descriptor(language).await.ok_or_else(|| {
            BridgeError::Config(format!("No language server configured for '{}'", language))
        })?;

        let client = self
            .launcher
            .launch(&descriptor, root)
            .await?
            .with_request_timeout(self.config.request_timeout());

        if let Err(e) = client
            .initialize(
                descriptor.initialization_options.clone(),
                self.config.initialize_timeout(),
            )
            .await
        {
            client.kill();
            return Err(BridgeError::Install {
                language: language.to_string(),
                reason: format!("initialize handshake failed: {}", e),
                install_hint: descriptor.install_hint(),
            });
        }

        let client = Arc::new(client);
        self.sessions.write().await.insert(key, client.clone());
        tracing::info!(
            "Started {} language server for {}",
            language,
            root.display()
        );
        Ok(client)
    }

    /// Get the registered session, live or not.
    pub async fn get_client(&self, language: &str, root: &Path) -> Option<Arc<LspClient>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&(language.to_string(), root.to_path_buf()))
            .cloned()
    }

    /// Drop a session from the registry and kill it.
    pub async fn evict(&self, language: &str, root: &Path) {
        let removed = self
            .sessions
            .write()
            .await
            .remove(&(language.to_string(), root.to_path_buf()));
        if let Some(client) = removed {
            tracing::info!(
                "Evicted {} language server for {}",
                language,
                root.display()
            );
            client.kill();
        }
    }

    /// Gracefully stop one session. Returns whether it was registered.
    pub async fn stop_server(&self, language: &str, root: &Path) -> bool {
        let removed = self
            .sessions
            .write()
            .await
            .remove(&(language.to_string(), root.to_path_buf()));

        match removed {
            Some(client) => {
                client.shutdown(self.config.shutdown_timeout()).await;
                tracing::info!(
                    "Stopped {} language server for {}",
                    language,
                    root.display()
                );
                true
            }
            None => false,
        }
    }

    /// Get status of all servers
    pub async fn get_status(&self) -> Vec<LspServerStatus> {
        let sessions = self.sessions.read().await;
        let descriptors = self.descriptors.read().await;

        let mut status = Vec::new();
        for ((language, root), client) in sessions.iter() {
            status.push(LspServerStatus {
                language: language.clone(),
                root: Some(root.clone()),
                connected: client.is_connected(),
                initialized: client.is_initialized(),
                command: descriptors
                    .get(language)
                    .map(|d| d.command.clone())
                    .unwrap_or_default(),
                pid: client.pid(),
            });
        }

        for (language, descriptor) in descriptors.iter() {
            if !sessions.keys().any(|(running, _)| running == language) {
                status.push(LspServerStatus {
                    language: language.clone(),
                    root: None,
                    connected: false,
                    initialized: false,
                    command: descriptor.command.clone(),
                    pid: None,
                });
            }
        }

        status.sort_by(|a, b| (&a.language, &a.root).cmp(&(&b.language, &b.root)));
        status
    }

    /// List running servers
    pub async fn list_running(&self) -> Vec<SessionKey> {
        let sessions = self.sessions.read().await;
        let mut keys: Vec<SessionKey> = sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Gracefully stop every session, killing any that outlive the shutdown
    /// timeout.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<(SessionKey, Arc<LspClient>)> =
            self.sessions.write().await.drain().collect();
        if sessions.is_empty() {
            return;
        }

        let timeout = self.config.shutdown_timeout();
        futures::future::join_all(sessions.iter().map(|(_, client)| client.shutdown(timeout)))
            .await;
        tracing::info!("Stopped {} language server(s)", sessions.len());
    }

    /// Synchronous best-effort kill for process-exit paths.
    pub fn kill_all(&self) {
        if let Ok(sessions) = self.sessions.try_read() {
            for client in sessions.values() {
                client.kill();
            }
        }
    }
}

impl Default for LspManager {
    fn default() -> Self {
        Self::new()
    }
}
