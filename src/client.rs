//! LSP Client
//!
//! One live JSON-RPC session with a language server. Requests may be issued
//! concurrently: writes are serialized by a per-session mutex, and a single
//! read task demultiplexes responses to their waiters by request id, so
//! replies can arrive in any order.

use crate::error::{BridgeError, Result};
use crate::framing;
use crate::protocol::*;
use crate::servers::LanguageServerDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Default per-request deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type PendingMap = Arc<Mutex<HashMap<u64, PendingRequest>>>;

/// In-flight request waiting for its response
struct PendingRequest {
    method: String,
    created: Instant,
    tx: oneshot::Sender<JsonRpcResponse>,
}

/// LSP client for communicating with a language server
pub struct LspClient {
    /// Language name
    pub language: String,
    /// Workspace root the server was started for
    root: PathBuf,
    /// Child process (absent for in-memory transports)
    child: Mutex<Option<Child>>,
    pid: Option<u32>,
    /// Stdin writer; holding the lock is the right to send one frame
    writer: Mutex<BoxedWriter>,
    /// Pending requests
    pending: PendingMap,
    /// Request ID counter
    next_id: AtomicU64,
    /// Cleared by the read loop on EOF or protocol error
    connected: Arc<AtomicBool>,
    initialized: AtomicBool,
    /// Server capabilities from `initialize`
    capabilities: RwLock<serde_json::Value>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl LspClient {
    /// Spawn the language server process described by `descriptor` in `root`.
    pub fn spawn(descriptor: &LanguageServerDescriptor, root: &Path) -> Result<Self> {
        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &descriptor.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| BridgeError::Install {
            language: descriptor.language.clone(),
            reason: format!(
                "failed to spawn '{} {}': {}",
                descriptor.command,
                descriptor.args.join(" "),
                e
            ),
            install_hint: descriptor.install_hint(),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Transport("language server has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Transport("language server has no stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let language = descriptor.language.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(language = %language, "stderr: {}", line);
                }
            });
        }

        let pid = child.id();
        tracing::debug!(
            language = %descriptor.language,
            pid = ?pid,
            "Spawned LSP server: {} {:?}",
            descriptor.command,
            descriptor.args
        );

        Ok(Self::start(
            descriptor.language.clone(),
            root.to_path_buf(),
            stdout,
            stdin,
            Some(child),
            pid,
        ))
    }

    /// Build a session over an arbitrary byte transport (no child process).
    pub fn from_transport<R, W>(language: impl Into<String>, root: PathBuf, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::start(language.into(), root, reader, writer, None, None)
    }

    fn start<R, W>(
        language: String,
        root: PathBuf,
        reader: R,
        writer: W,
        child: Option<Child>,
        pid: Option<u32>,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader_task = tokio::spawn(read_loop(
            language.clone(),
            BufReader::new(reader),
            pending.clone(),
            connected.clone(),
        ));

        Self {
            language,
            root,
            child: Mutex::new(child),
            pid,
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            connected,
            initialized: AtomicBool::new(false),
            capabilities: RwLock::new(serde_json::Value::Null),
            reader_task: Mutex::new(Some(reader_task)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the deadline used by the typed request helpers.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Get next request ID
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn write<T: Serialize>(&self, message: &T) -> Result<()> {
        let mut writer = self.writer.lock().await;
        framing::write_message(&mut *writer, message).await
    }

    fn not_running(&self) -> BridgeError {
        BridgeError::Transport(format!("{} language server is not running", self.language))
    }

    /// Send a request and wait for its response.
    ///
    /// A response carrying a JSON-RPC `error` is returned as `Ok`; `Err` is
    /// reserved for transport failures, protocol errors and timeouts.
    pub async fn send_request(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        if !self.is_connected() {
            return Err(self.not_running());
        }

        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id,
                PendingRequest {
                    method: method.to_string(),
                    created: Instant::now(),
                    tx,
                },
            );
        }

        // The read loop clears `connected` before draining pending slots, so
        // re-checking here means no slot can be left behind by a dead session.
        if !self.is_connected() {
            self.pending.lock().await.remove(&id);
            return Err(self.not_running());
        }

        let params = (!params.is_null()).then_some(params);
        let request = JsonRpcRequest::new(id, method, params);
        if let Err(e) = self.write(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        tracing::trace!(language = %self.language, id, method, "Sent LSP request");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BridgeError::Transport(format!(
                "{} language server exited before answering '{}'",
                self.language, method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(BridgeError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Send a notification (no response expected)
    pub async fn send_notification(&self, method: &str, params: serde_json::Value) -> Result<()> {
        if !self.is_connected() {
            return Err(self.not_running());
        }

        let params = (!params.is_null()).then_some(params);
        let notification = JsonRpcNotification::new(method, params);
        self.write(&notification).await
    }

    /// Request with the session deadline, mapping a JSON-RPC error to
    /// [`BridgeError::Server`].
    async fn call<P: Serialize>(&self, method: &str, params: P) -> Result<serde_json::Value> {
        let params = serde_json::to_value(params)?;
        let response = self
            .send_request(method, params, self.request_timeout)
            .await?;

        response.into_result().map_err(|error| BridgeError::Server {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        })
    }

    /// Initialize the LSP connection
    pub async fn initialize(
        &self,
        initialization_options: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<InitializeResult> {
        let root_uri = path_to_uri(&self.root).ok_or_else(|| {
            BridgeError::InvalidRequest(format!(
                "workspace root is not an absolute path: {}",
                self.root.display()
            ))
        })?;
        let folder_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.display().to_string());

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            root_path: Some(self.root.display().to_string()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: folder_name,
            }]),
            capabilities: client_capabilities(),
            initialization_options,
        };

        let response = self
            .send_request("initialize", serde_json::to_value(&params)?, timeout)
            .await?;

        let result = response.into_result().map_err(|error| BridgeError::Server {
            method: "initialize".to_string(),
            code: error.code,
            message: error.message,
        })?;
        if result.is_null() {
            return Err(BridgeError::Protocol(
                "initialize returned no result".to_string(),
            ));
        }
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| BridgeError::Protocol(format!("invalid initialize result: {}", e)))?;

        // Store capabilities
        {
            let mut caps = self.capabilities.write().await;
            *caps = result.capabilities.clone();
        }

        // Send initialized notification
        self.send_notification("initialized", serde_json::json!({}))
            .await?;
        self.initialized.store(true, Ordering::SeqCst);

        tracing::info!(
            "LSP {} initialized for {}: {:?}",
            self.language,
            self.root.display(),
            result.server_info.as_ref().map(|info| &info.name)
        );

        Ok(result)
    }

    /// Notify document opened
    pub async fn did_open(&self, uri: &str, language_id: &str, text: &str) -> Result<()> {
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.to_string(),
                language_id: language_id.to_string(),
                version: 1,
                text: text.to_string(),
            },
        };

        self.send_notification("textDocument/didOpen", serde_json::to_value(&params)?)
            .await
    }

    /// Get hover information
    pub async fn hover(&self, uri: &str, position: Position) -> Result<Option<Hover>> {
        let result = self
            .call(
                "textDocument/hover",
                TextDocumentPositionParams::new(uri, position),
            )
            .await?;
        parse_optional("textDocument/hover", result)
    }

    /// Go to definition
    pub async fn goto_definition(
        &self,
        uri: &str,
        position: Position,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let result = self
            .call(
                "textDocument/definition",
                TextDocumentPositionParams::new(uri, position),
            )
            .await?;
        parse_optional("textDocument/definition", result)
    }

    /// Find references
    pub async fn find_references(
        &self,
        uri: &str,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<Location>> {
        let params = ReferenceParams {
            text_document: TextDocumentIdentifier {
                uri: uri.to_string(),
            },
            position,
            context: ReferenceContext {
                include_declaration,
            },
        };

        let result = self.call("textDocument/references", params).await?;
        Ok(parse_optional("textDocument/references", result)?.unwrap_or_default())
    }

    /// Rename a symbol. `None` means the server cannot rename at `position`.
    pub async fn rename(
        &self,
        uri: &str,
        position: Position,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>> {
        let params = RenameParams {
            text_document: TextDocumentIdentifier {
                uri: uri.to_string(),
            },
            position,
            new_name: new_name.to_string(),
        };

        let result = self.call("textDocument/rename", params).await?;
        parse_optional("textDocument/rename", result)
    }

    /// Get completion candidates
    pub async fn completion(
        &self,
        uri: &str,
        position: Position,
    ) -> Result<Option<CompletionResponse>> {
        let result = self
            .call(
                "textDocument/completion",
                TextDocumentPositionParams::new(uri, position),
            )
            .await?;
        parse_optional("textDocument/completion", result)
    }

    /// Request code actions over `range`, optionally filtered by kind.
    pub async fn code_action(
        &self,
        uri: &str,
        range: Range,
        only: &[String],
    ) -> Result<Vec<CodeActionOrCommand>> {
        let params = CodeActionParams {
            text_document: TextDocumentIdentifier {
                uri: uri.to_string(),
            },
            range,
            context: CodeActionContext {
                diagnostics: vec![],
                only: (!only.is_empty()).then(|| only.to_vec()),
            },
        };

        let result = self.call("textDocument/codeAction", params).await?;
        Ok(parse_optional("textDocument/codeAction", result)?.unwrap_or_default())
    }

    /// Get document symbols
    pub async fn document_symbols(&self, uri: &str) -> Result<Option<DocumentSymbolResponse>> {
        let params = serde_json::json!({
            "textDocument": { "uri": uri }
        });

        let result = self.call("textDocument/documentSymbol", params).await?;
        parse_optional("textDocument/documentSymbol", result)
    }

    /// Get server capabilities
    pub async fn capabilities(&self) -> serde_json::Value {
        self.capabilities.read().await.clone()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Connected, and the child process (if any) has not exited.
    pub fn is_alive(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        if let Ok(mut child) = self.child.try_lock() {
            if let Some(child) = child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    tracing::debug!(language = %self.language, "LSP server exited: {}", status);
                    self.connected.store(false, Ordering::SeqCst);
                    return false;
                }
            }
        }
        true
    }

    /// Number of requests still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Graceful shutdown: `shutdown` request, `exit` notification, wait for
    /// the process up to `timeout`, then kill it.
    pub async fn shutdown(&self, timeout: Duration) {
        if self.is_connected() {
            if let Err(e) = self
                .send_request("shutdown", serde_json::Value::Null, timeout)
                .await
            {
                tracing::debug!(language = %self.language, "LSP shutdown request failed: {}", e);
            }
            let _ = self
                .send_notification("exit", serde_json::Value::Null)
                .await;
        }
        self.connected.store(false, Ordering::SeqCst);

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(language = %self.language, "LSP server exited: {}", status);
                }
                _ => {
                    tracing::warn!(
                        language = %self.language,
                        "LSP server did not exit within {:?}, killing",
                        timeout
                    );
                    let _ = child.kill().await;
                }
            }
        }

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        self.pending.lock().await.clear();
    }

    /// Best-effort synchronous termination for process-exit paths.
    pub fn kill(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut child) = self.child.try_lock() {
            if let Some(child) = child.as_mut() {
                let _ = child.start_kill();
            }
        }
        if let Ok(mut task) = self.reader_task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// Decode a result payload, treating `null` as absent.
fn parse_optional<T: DeserializeOwned>(method: &str, value: serde_json::Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| BridgeError::Protocol(format!("unexpected '{}' result: {}", method, e)))
}

/// Decode frames until EOF or a protocol error, resolving pending requests.
async fn read_loop<R>(
    language: String,
    mut reader: BufReader<R>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match framing::read_message(&mut reader).await {
            Ok(Some(message)) => dispatch_inbound(&language, message, &pending).await,
            Ok(None) => {
                tracing::debug!("LSP {} stdout closed", language);
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read from LSP {}: {}", language, e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let mut pending = pending.lock().await;
    if !pending.is_empty() {
        tracing::warn!(
            "LSP {} session ended with {} pending request(s)",
            language,
            pending.len()
        );
    }
    // Dropping the senders fails every waiter immediately
    pending.clear();
}

async fn dispatch_inbound(language: &str, message: serde_json::Value, pending: &PendingMap) {
    match InboundMessage::classify(message) {
        Some(InboundMessage::Response(response)) => {
            let Some(id) = response.id else {
                tracing::warn!("LSP {} response without id: {:?}", language, response.error);
                return;
            };
            let slot = pending.lock().await.remove(&id);
            match slot {
                Some(slot) => {
                    tracing::trace!(
                        language,
                        id,
                        method = %slot.method,
                        elapsed = ?slot.created.elapsed(),
                        "Received LSP response"
                    );
                    let _ = slot.tx.send(response);
                }
                None => {
                    tracing::debug!("Discarding orphan LSP {} response for id {}", language, id);
                }
            }
        }
        Some(InboundMessage::Notification { method }) => {
            tracing::trace!(language, method = %method, "Ignoring LSP notification");
        }
        Some(InboundMessage::Request { method }) => {
            tracing::trace!(language, method = %method, "Ignoring LSP server request");
        }
        None => {
            tracing::warn!("Unknown LSP {} message", language);
        }
    }
}
