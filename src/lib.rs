//! # a3s-lsp
//!
//! Language Server Protocol client bridge for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-lsp` drives external language servers (gopls, pyright,
//! rust-analyzer, typescript-language-server, clangd) over stdio and turns
//! their answers into plain, serializable results. Semantic actions such as
//! go-to-definition, rename, and organize-imports run against one shared
//! session per (language, workspace root).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_lsp::{run_action, Action, ActionRequest, CursorPosition, LspManager};
//!
//! # async fn example() -> a3s_lsp::Result<()> {
//! let manager = LspManager::new();
//! let result = run_action(
//!     &manager,
//!     ActionRequest {
//!         file: "src/main.go".into(),
//!         action: Action::Hover {
//!             at: CursorPosition::new(10, 4)?,
//!         },
//!     },
//! )
//! .await;
//!
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! manager.shutdown_all().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **framing** / **protocol**: Content-Length codec and JSON-RPC/LSP types
//! - **position**: UTF-16 ↔ byte offset translation
//! - **LspClient**: one server process with request/response correlation
//! - **LspManager**: session registry keyed by (language, root)
//! - **actions**: typed semantic actions and their results
//! - **edit**: transactional workspace edit application with rollback

pub mod actions;
pub mod cli;
pub mod client;
pub mod config;
pub mod edit;
pub mod error;
pub mod framing;
pub mod manager;
pub mod position;
pub mod protocol;
pub mod root;
pub mod servers;

// Re-export core types
pub use actions::{
    run_action, Action, ActionInvocation, ActionKind, ActionOutcome, ActionRequest, ActionResult,
    CursorPosition, SelectionRange,
};
pub use client::LspClient;
pub use config::BridgeConfig;
pub use edit::{ApplyReport, WorkspaceEditApplier, WorkspaceEditPlan};
pub use error::{BridgeError, Result};
pub use manager::{LspManager, LspServerStatus, ProcessLauncher, ServerLauncher};
pub use servers::LanguageServerDescriptor;
