//! LSP Actions
//!
//! Typed semantic actions run against a language server session and their
//! serializable results. Each action re-announces the target document with
//! `textDocument/didOpen` before issuing its single request.

use crate::client::LspClient;
use crate::edit::{ApplyReport, FileOperation, WorkspaceEditApplier, WorkspaceEditPlan};
use crate::error::{BridgeError, Result};
use crate::manager::LspManager;
use crate::position::full_document_range;
use crate::protocol::*;
use crate::root::resolve_root;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Maximum number of completion items returned
pub const COMPLETION_LIMIT: usize = 50;

/// Returned for `diagnostics`; servers push diagnostics rather than answer
/// requests for them.
pub const DIAGNOSTICS_MESSAGE: &str = "Diagnostics are push-based in LSP and are not collected by this bridge; run the language's native build or lint tools instead";

/// Action names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Definition,
    References,
    Rename,
    Hover,
    Completion,
    CodeAction,
    OrganizeImports,
    Symbols,
    Diagnostics,
}

impl ActionKind {
    pub fn all() -> Vec<ActionKind> {
        vec![
            Self::Definition,
            Self::References,
            Self::Rename,
            Self::Hover,
            Self::Completion,
            Self::CodeAction,
            Self::OrganizeImports,
            Self::Symbols,
            Self::Diagnostics,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::References => "references",
            Self::Rename => "rename",
            Self::Hover => "hover",
            Self::Completion => "completion",
            Self::CodeAction => "code_action",
            Self::OrganizeImports => "organize_imports",
            Self::Symbols => "symbols",
            Self::Diagnostics => "diagnostics",
        }
    }

    /// Attempted for every language regardless of declared support.
    pub fn is_universal(&self) -> bool {
        matches!(self, Self::Hover | Self::Definition | Self::Diagnostics)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('-', "_").to_lowercase();
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::all().iter().map(|k| k.as_str()).collect();
                BridgeError::InvalidRequest(format!(
                    "unknown action '{}' (expected one of: {})",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// Cursor position: 1-based line, 0-based UTF-16 character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u32,
    pub character: u32,
}

impl CursorPosition {
    pub fn new(line: u32, character: u32) -> Result<Self> {
        if line == 0 {
            return Err(BridgeError::InvalidRequest(
                "line numbers start at 1".to_string(),
            ));
        }
        Ok(Self { line, character })
    }

    pub fn to_lsp(self) -> Position {
        Position::new(self.line.saturating_sub(1), self.character)
    }
}

/// Selection for code actions, in cursor coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

impl SelectionRange {
    pub fn to_lsp(self) -> Range {
        Range::new(self.start.to_lsp(), self.end.to_lsp())
    }
}

/// Parses `LINE:CHAR-LINE:CHAR`.
impl FromStr for SelectionRange {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            BridgeError::InvalidRequest(format!(
                "invalid range '{}' (expected LINE:CHAR-LINE:CHAR)",
                s
            ))
        };
        let parse_point = |point: &str| -> Result<CursorPosition> {
            let (line, character) = point.trim().split_once(':').ok_or_else(invalid)?;
            let line = line.parse().map_err(|_| invalid())?;
            let character = character.parse().map_err(|_| invalid())?;
            CursorPosition::new(line, character)
        };

        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let range = Self {
            start: parse_point(start)?,
            end: parse_point(end)?,
        };
        if (range.end.line, range.end.character) < (range.start.line, range.start.character) {
            return Err(invalid());
        }
        Ok(range)
    }
}

/// A semantic action with its own parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Definition {
        at: CursorPosition,
    },
    References {
        at: CursorPosition,
    },
    Rename {
        at: CursorPosition,
        new_name: String,
        apply_edits: bool,
    },
    Hover {
        at: CursorPosition,
    },
    Completion {
        at: CursorPosition,
    },
    CodeAction {
        range: Option<SelectionRange>,
        only: Vec<String>,
        apply_edits: bool,
    },
    OrganizeImports {
        apply_edits: bool,
    },
    Symbols,
    Diagnostics,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Definition { .. } => ActionKind::Definition,
            Self::References { .. } => ActionKind::References,
            Self::Rename { .. } => ActionKind::Rename,
            Self::Hover { .. } => ActionKind::Hover,
            Self::Completion { .. } => ActionKind::Completion,
            Self::CodeAction { .. } => ActionKind::CodeAction,
            Self::OrganizeImports { .. } => ActionKind::OrganizeImports,
            Self::Symbols => ActionKind::Symbols,
            Self::Diagnostics => ActionKind::Diagnostics,
        }
    }
}

/// A typed action against one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub file: PathBuf,
    pub action: Action,
}

/// Flat inbound action call, as received from a dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub action: ActionKind,
    pub file: PathBuf,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub character: Option<u32>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub apply_edits: bool,
    #[serde(default)]
    pub range: Option<SelectionRange>,
    #[serde(default)]
    pub only: Vec<String>,
}

impl TryFrom<ActionInvocation> for ActionRequest {
    type Error = BridgeError;

    fn try_from(call: ActionInvocation) -> Result<Self> {
        let cursor = || -> Result<CursorPosition> {
            let line = call.line.ok_or_else(|| {
                BridgeError::InvalidRequest(format!("'{}' requires a line", call.action))
            })?;
            CursorPosition::new(line, call.character.unwrap_or(0))
        };

        let action = match call.action {
            ActionKind::Definition => Action::Definition { at: cursor()? },
            ActionKind::References => Action::References { at: cursor()? },
            ActionKind::Rename => {
                let new_name = call
                    .new_name
                    .clone()
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| {
                        BridgeError::InvalidRequest("'rename' requires new_name".to_string())
                    })?;
                Action::Rename {
                    at: cursor()?,
                    new_name,
                    apply_edits: call.apply_edits,
                }
            }
            ActionKind::Hover => Action::Hover { at: cursor()? },
            ActionKind::Completion => Action::Completion { at: cursor()? },
            ActionKind::CodeAction => Action::CodeAction {
                range: call.range,
                only: call.only.clone(),
                apply_edits: call.apply_edits,
            },
            ActionKind::OrganizeImports => Action::OrganizeImports {
                apply_edits: call.apply_edits,
            },
            ActionKind::Symbols => Action::Symbols,
            ActionKind::Diagnostics => Action::Diagnostics,
        };

        Ok(ActionRequest {
            file: call.file,
            action,
        })
    }
}

/// Source location in cursor coordinates (1-based lines)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub file: String,
    pub line: u32,
    pub character: u32,
    pub end_line: u32,
    pub end_character: u32,
}

impl LocationEntry {
    fn new(uri: &str, range: &Range) -> Self {
        Self {
            file: display_uri(uri),
            line: range.start.line + 1,
            character: range.start.character,
            end_line: range.end.line + 1,
            end_character: range.end.character,
        }
    }
}

impl From<&Location> for LocationEntry {
    fn from(location: &Location) -> Self {
        Self::new(&location.uri, &location.range)
    }
}

/// Definition outcome; the three LSP shapes and "none" stay distinct
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefinitionResult {
    None,
    Single { location: LocationEntry },
    Multiple { locations: Vec<LocationEntry> },
    Links { locations: Vec<LocationEntry> },
}

impl From<Option<GotoDefinitionResponse>> for DefinitionResult {
    fn from(response: Option<GotoDefinitionResponse>) -> Self {
        match response {
            None => Self::None,
            Some(GotoDefinitionResponse::Scalar(location)) => Self::Single {
                location: LocationEntry::from(&location),
            },
            Some(GotoDefinitionResponse::Array(locations)) => Self::Multiple {
                locations: locations.iter().map(LocationEntry::from).collect(),
            },
            Some(GotoDefinitionResponse::Link(links)) => Self::Links {
                locations: links
                    .iter()
                    .map(|link| LocationEntry::new(&link.target_uri, &link.target_selection_range))
                    .collect(),
            },
        }
    }
}

/// One text replacement, in cursor coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditEntry {
    pub file: String,
    pub line: u32,
    pub character: u32,
    pub end_line: u32,
    pub end_character: u32,
    pub new_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameOutcome {
    pub new_name: String,
    pub files: Vec<String>,
    pub edits: Vec<EditEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_operations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplyReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeActionEntry {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub has_edit: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeActionsOutcome {
    pub count: usize,
    pub actions: Vec<CodeActionEntry>,
    /// Command ids referenced by the actions; never executed here
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplyReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub line: u32,
    pub character: u32,
}

/// Action-specific result fields
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ActionOutcome {
    Definition {
        definition: DefinitionResult,
    },
    References {
        count: usize,
        references: Vec<LocationEntry>,
    },
    Rename(RenameOutcome),
    Hover {
        contents: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Completion {
        total: usize,
        is_incomplete: bool,
        items: Vec<CompletionItem>,
    },
    CodeActions(CodeActionsOutcome),
    Symbols {
        count: usize,
        symbols: Vec<SymbolEntry>,
    },
    /// Successful exchange with nothing to act on
    Info {
        message: String,
    },
    Failed {
        error: String,
    },
}

/// Result of one action, always echoing the action and file
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub action: ActionKind,
    pub file: String,
    #[serde(flatten)]
    pub outcome: ActionOutcome,
}

impl ActionResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Failed { .. })
    }
}

/// Run `request`, converting any failure into the result's `error` field.
///
/// A session found disconnected afterwards is evicted so the next call
/// starts a fresh server.
pub async fn run_action(manager: &LspManager, request: ActionRequest) -> ActionResult {
    let kind = request.action.kind();
    let file = request.file.display().to_string();

    let outcome = match execute(manager, &request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::debug!(action = %kind, file = %file, "Action failed: {}", e);
            ActionOutcome::Failed {
                error: e.to_string(),
            }
        }
    };

    ActionResult {
        action: kind,
        file,
        outcome,
    }
}

async fn execute(manager: &LspManager, request: &ActionRequest) -> Result<ActionOutcome> {
    let kind = request.action.kind();
    if kind == ActionKind::Diagnostics {
        return Ok(ActionOutcome::Info {
            message: DIAGNOSTICS_MESSAGE.to_string(),
        });
    }

    let path = absolute_file(&request.file)?;
    let descriptor = manager.descriptor_for_path(&path).await?;
    if !kind.is_universal() && !descriptor.supports(kind) {
        return Err(BridgeError::CapabilityGap {
            action: kind.to_string(),
            language: descriptor.language.clone(),
            supported: descriptor.supported_actions(),
        });
    }

    let root = resolve_root(&descriptor, &path);
    let client = manager.ensure_running(&descriptor.language, &root).await?;

    let text = tokio::fs::read_to_string(&path).await?;
    let uri = path_to_uri(&path).ok_or_else(|| {
        BridgeError::InvalidRequest(format!("cannot build a URI for {}", path.display()))
    })?;

    let document = Document {
        client: &client,
        root: &root,
        uri: &uri,
        text: &text,
    };

    let result = async {
        client
            .did_open(&uri, &descriptor.language_id_for(&path), &text)
            .await?;
        document.dispatch(&request.action).await
    }
    .await;

    if result.as_ref().is_err_and(|e| e.is_transport()) || !client.is_alive() {
        manager.evict(&descriptor.language, &root).await;
    }
    result
}

fn absolute_file(file: &Path) -> Result<PathBuf> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        std::env::current_dir()?.join(file)
    };
    if !absolute.is_file() {
        return Err(BridgeError::InvalidRequest(format!(
            "file not found: {}",
            file.display()
        )));
    }
    Ok(absolute.canonicalize()?)
}

/// One open document on one session
struct Document<'a> {
    client: &'a LspClient,
    root: &'a Path,
    uri: &'a str,
    text: &'a str,
}

impl Document<'_> {
    async fn dispatch(&self, action: &Action) -> Result<ActionOutcome> {
        match action {
            Action::Definition { at } => self.definition(*at).await,
            Action::References { at } => self.references(*at).await,
            Action::Rename {
                at,
                new_name,
                apply_edits,
            } => self.rename(*at, new_name, *apply_edits).await,
            Action::Hover { at } => self.hover(*at).await,
            Action::Completion { at } => self.completion(*at).await,
            Action::CodeAction {
                range,
                only,
                apply_edits,
            } => self.code_actions(*range, only, *apply_edits, false).await,
            Action::OrganizeImports { apply_edits } => {
                let only = vec![ORGANIZE_IMPORTS_KIND.to_string()];
                self.code_actions(None, &only, *apply_edits, true).await
            }
            Action::Symbols => self.symbols().await,
            Action::Diagnostics => Ok(ActionOutcome::Info {
                message: DIAGNOSTICS_MESSAGE.to_string(),
            }),
        }
    }

    async fn definition(&self, at: CursorPosition) -> Result<ActionOutcome> {
        let response = self.client.goto_definition(self.uri, at.to_lsp()).await?;
        Ok(ActionOutcome::Definition {
            definition: response.into(),
        })
    }

    async fn references(&self, at: CursorPosition) -> Result<ActionOutcome> {
        let locations = self
            .client
            .find_references(self.uri, at.to_lsp(), true)
            .await?;
        Ok(ActionOutcome::References {
            count: locations.len(),
            references: locations.iter().map(LocationEntry::from).collect(),
        })
    }

    async fn rename(
        &self,
        at: CursorPosition,
        new_name: &str,
        apply_edits: bool,
    ) -> Result<ActionOutcome> {
        let Some(edit) = self.client.rename(self.uri, at.to_lsp(), new_name).await? else {
            return Ok(ActionOutcome::Info {
                message: "Rename is not possible at this position".to_string(),
            });
        };

        let plan = WorkspaceEditPlan::from_workspace_edit(&edit)?;
        let applied = if apply_edits && !plan.is_empty() {
            Some(apply_plan(self.root, plan.clone()).await?)
        } else {
            None
        };

        Ok(ActionOutcome::Rename(RenameOutcome {
            new_name: new_name.to_string(),
            files: plan
                .touched_files()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            edits: edit_entries(&plan),
            file_operations: plan
                .operations
                .iter()
                .filter(|op| !matches!(op, FileOperation::Edit { .. }))
                .map(|op| op.describe())
                .collect(),
            applied,
        }))
    }

    async fn hover(&self, at: CursorPosition) -> Result<ActionOutcome> {
        let contents = self
            .client
            .hover(self.uri, at.to_lsp())
            .await?
            .map(|hover| format_hover_contents(&hover.contents))
            .filter(|text| !text.trim().is_empty());

        let message = contents
            .is_none()
            .then(|| "No hover information at this position".to_string());
        Ok(ActionOutcome::Hover { contents, message })
    }

    async fn completion(&self, at: CursorPosition) -> Result<ActionOutcome> {
        let (mut items, is_incomplete) = match self.client.completion(self.uri, at.to_lsp()).await? {
            None => (vec![], false),
            Some(CompletionResponse::Array(items)) => (items, false),
            Some(CompletionResponse::List(list)) => (list.items, list.is_incomplete),
        };

        let total = items.len();
        items.truncate(COMPLETION_LIMIT);
        Ok(ActionOutcome::Completion {
            total,
            is_incomplete,
            items,
        })
    }

    async fn code_actions(
        &self,
        range: Option<SelectionRange>,
        only: &[String],
        apply_edits: bool,
        organize_imports: bool,
    ) -> Result<ActionOutcome> {
        let range = range
            .map(SelectionRange::to_lsp)
            .unwrap_or_else(|| full_document_range(self.text));

        let mut actions = self.client.code_action(self.uri, range, only).await?;
        if organize_imports {
            actions.retain(|action| {
                action
                    .kind()
                    .map_or(true, |kind| kind == ORGANIZE_IMPORTS_KIND)
            });
        }

        let mut entries = Vec::with_capacity(actions.len());
        let mut commands = Vec::new();
        let mut plans = Vec::new();
        for action in &actions {
            let (command, edit, preferred) = match action {
                CodeActionOrCommand::Command(command) => (Some(command), None, false),
                CodeActionOrCommand::CodeAction(action) => (
                    action.command.as_ref(),
                    action.edit.as_ref(),
                    action.is_preferred.unwrap_or(false),
                ),
            };

            let plan = edit
                .map(WorkspaceEditPlan::from_workspace_edit)
                .transpose()?;
            if let Some(command) = command {
                if !commands.contains(&command.command) {
                    commands.push(command.command.clone());
                }
            }

            entries.push(CodeActionEntry {
                title: action.title().to_string(),
                kind: action.kind().map(str::to_string),
                command: command.map(|c| c.command.clone()),
                has_edit: plan.is_some(),
                files: plan
                    .as_ref()
                    .map(|p| {
                        p.touched_files()
                            .iter()
                            .map(|f| f.display().to_string())
                            .collect()
                    })
                    .unwrap_or_default(),
            });
            if let Some(plan) = plan {
                plans.push((preferred, plan));
            }
        }

        let applied = if apply_edits {
            // One transaction, so a late failure rolls back every earlier edit
            let mut combined = WorkspaceEditPlan::default();
            for plan in select_plans(plans, organize_imports) {
                combined.extend(plan);
            }
            if combined.is_empty() {
                None
            } else {
                Some(apply_plan(self.root, combined).await?)
            }
        } else {
            None
        };

        Ok(ActionOutcome::CodeActions(CodeActionsOutcome {
            count: entries.len(),
            actions: entries,
            commands,
            applied,
        }))
    }

    async fn symbols(&self) -> Result<ActionOutcome> {
        let mut symbols = Vec::new();
        match self.client.document_symbols(self.uri).await? {
            None => {}
            Some(DocumentSymbolResponse::Nested(nested)) => {
                flatten_symbols(&nested, None, &mut symbols)
            }
            Some(DocumentSymbolResponse::Flat(flat)) => {
                symbols.extend(flat.into_iter().map(|symbol| SymbolEntry {
                    name: symbol.name,
                    kind: symbol.kind,
                    detail: None,
                    container: symbol.container_name,
                    line: symbol.location.range.start.line + 1,
                    character: symbol.location.range.start.character,
                }))
            }
        }

        Ok(ActionOutcome::Symbols {
            count: symbols.len(),
            symbols,
        })
    }
}

/// Plans to apply: every organize-imports edit, otherwise the preferred
/// code action's edit or the first one offered.
fn select_plans(
    plans: Vec<(bool, WorkspaceEditPlan)>,
    organize_imports: bool,
) -> Vec<WorkspaceEditPlan> {
    if organize_imports {
        return plans.into_iter().map(|(_, plan)| plan).collect();
    }
    let index = plans
        .iter()
        .position(|(preferred, _)| *preferred)
        .unwrap_or(0);
    plans.into_iter().nth(index).map(|(_, plan)| plan).into_iter().collect()
}

async fn apply_plan(root: &Path, plan: WorkspaceEditPlan) -> Result<ApplyReport> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        WorkspaceEditApplier::new(&root).map(|applier| applier.apply(&plan))
    })
    .await
    .map_err(|e| BridgeError::InvalidEdit(format!("edit task failed: {}", e)))?
}

fn edit_entries(plan: &WorkspaceEditPlan) -> Vec<EditEntry> {
    plan.operations
        .iter()
        .filter_map(|op| match op {
            FileOperation::Edit { path, edits } => Some((path, edits)),
            _ => None,
        })
        .flat_map(|(path, edits)| {
            edits.iter().map(move |edit| EditEntry {
                file: path.display().to_string(),
                line: edit.range.start.line + 1,
                character: edit.range.start.character,
                end_line: edit.range.end.line + 1,
                end_character: edit.range.end.character,
                new_text: edit.new_text.clone(),
            })
        })
        .collect()
}

fn flatten_symbols(symbols: &[DocumentSymbol], container: Option<&str>, out: &mut Vec<SymbolEntry>) {
    for symbol in symbols {
        out.push(SymbolEntry {
            name: symbol.name.clone(),
            kind: symbol.kind,
            detail: symbol.detail.clone(),
            container: container.map(str::to_string),
            line: symbol.selection_range.start.line + 1,
            character: symbol.selection_range.start.character,
        });
        if let Some(children) = &symbol.children {
            flatten_symbols(children, Some(&symbol.name), out);
        }
    }
}

// ============================================================================
// Formatting Helpers
// ============================================================================

/// Flatten hover contents to one display string.
pub fn format_hover_contents(contents: &HoverContents) -> String {
    match contents {
        HoverContents::Scalar(marked) => format_marked_string(marked),
        HoverContents::Array(items) => items
            .iter()
            .map(format_marked_string)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value.clone(),
    }
}

pub fn format_marked_string(marked: &MarkedString) -> String {
    match marked {
        MarkedString::String(s) => s.clone(),
        MarkedString::LanguageString { language, value } => {
            format!("```{}\n{}\n```", language, value)
        }
    }
}

/// Local path for `file:` URIs, the URI itself otherwise.
fn display_uri(uri: &str) -> String {
    uri_to_path(uri)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| uri.to_string())
}
