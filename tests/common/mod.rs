//! Shared fixtures: an in-memory language server and a launcher for it.

#![allow(dead_code)]

use a3s_lsp::framing;
use a3s_lsp::protocol::path_to_uri;
use a3s_lsp::{BridgeConfig, LanguageServerDescriptor, LspClient, LspManager, Result, ServerLauncher};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;

/// Produces the `result` for one request: (method, params) -> result
pub type Handler = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// Launches scripted servers over `tokio::io::duplex`.
pub struct FakeLauncher {
    handler: Handler,
    /// Request method that makes the server hang up instead of answering
    die_on: Option<String>,
    pub launches: AtomicUsize,
    /// Every method received, requests and notifications alike
    pub received: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeLauncher {
    pub fn new(handler: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            die_on: None,
            launches: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dying_on(mut self, method: &str) -> Self {
        self.die_on = Some(method.to_string());
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn launch(&self, descriptor: &LanguageServerDescriptor, root: &Path) -> Result<LspClient> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);

        let handler = self.handler.clone();
        let die_on = self.die_on.clone();
        let received = self.received.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            while let Ok(Some(message)) = framing::read_message(&mut reader).await {
                let method = message["method"].as_str().unwrap_or_default().to_string();
                let params = message.get("params").cloned().unwrap_or(Value::Null);
                received.lock().unwrap().push((method.clone(), params.clone()));

                let Some(id) = message.get("id").cloned() else {
                    if method == "exit" {
                        break;
                    }
                    continue;
                };
                if die_on.as_deref() == Some(method.as_str()) {
                    break;
                }

                let result = match method.as_str() {
                    "initialize" => json!({"capabilities": {}, "serverInfo": {"name": "fake"}}),
                    "shutdown" => Value::Null,
                    _ => handler(&method, &params),
                };
                let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
                if framing::write_message(&mut server_write, &reply).await.is_err() {
                    break;
                }
            }
        });

        Ok(LspClient::from_transport(
            descriptor.language.clone(),
            root.to_path_buf(),
            client_read,
            client_write,
        ))
    }
}

pub fn manager_with(launcher: Arc<FakeLauncher>) -> LspManager {
    LspManager::with_launcher(BridgeConfig::default(), launcher)
}

/// A Go module in a temp dir, canonicalized so URIs match what the bridge sends.
pub struct GoWorkspace {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl GoWorkspace {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("go.mod"), "module example.com/app\n\ngo 1.22\n").unwrap();
        for (name, content) in files {
            std::fs::write(root.join(name), content).unwrap();
        }
        Self { _dir: dir, root }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn uri(&self, name: &str) -> String {
        path_to_uri(&self.path(name)).unwrap()
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap()
    }
}

/// JSON for a range on one line.
pub fn range(line: u32, start: u32, end: u32) -> Value {
    json!({
        "start": {"line": line, "character": start},
        "end": {"line": line, "character": end}
    })
}

pub fn text_edit(line: u32, start: u32, end: u32, new_text: &str) -> Value {
    json!({"range": range(line, start, end), "newText": new_text})
}
