//! Workspace edit plans
//!
//! Flattens an LSP `WorkspaceEdit` into an ordered list of file operations
//! with local paths. `documentChanges` wins over `changes` when a server
//! sends both.

use crate::error::{BridgeError, Result};
use crate::protocol::{
    uri_to_path, CreateFileOptions, DeleteFileOptions, DocumentChange, RenameFileOptions,
    ResourceOperation, TextEdit, WorkspaceEdit,
};
use std::path::{Path, PathBuf};

/// One step of a workspace edit
#[derive(Debug, Clone)]
pub enum FileOperation {
    /// Text edits against one existing file
    Edit { path: PathBuf, edits: Vec<TextEdit> },
    Create {
        path: PathBuf,
        options: CreateFileOptions,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        options: RenameFileOptions,
    },
    Delete {
        path: PathBuf,
        options: DeleteFileOptions,
    },
}

impl FileOperation {
    /// Paths this operation reads or writes.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Edit { path, .. } | Self::Create { path, .. } | Self::Delete { path, .. } => {
                vec![path.as_path()]
            }
            Self::Rename { from, to, .. } => vec![from.as_path(), to.as_path()],
        }
    }

    /// Short human-readable description.
    pub fn describe(&self) -> String {
        match self {
            Self::Edit { path, edits } => {
                format!("edit {} ({} change(s))", path.display(), edits.len())
            }
            Self::Create { path, .. } => format!("create {}", path.display()),
            Self::Rename { from, to, .. } => {
                format!("rename {} -> {}", from.display(), to.display())
            }
            Self::Delete { path, .. } => format!("delete {}", path.display()),
        }
    }
}

/// Ordered file operations derived from a `WorkspaceEdit`
#[derive(Debug, Clone, Default)]
pub struct WorkspaceEditPlan {
    pub operations: Vec<FileOperation>,
}

impl WorkspaceEditPlan {
    pub fn new(operations: Vec<FileOperation>) -> Self {
        Self { operations }
    }

    /// Build a plan from a server `WorkspaceEdit`.
    ///
    /// Entries of `changes` are taken in URI order. Non-`file:` URIs are
    /// rejected.
    pub fn from_workspace_edit(edit: &WorkspaceEdit) -> Result<Self> {
        let mut operations = Vec::new();

        if let Some(document_changes) = &edit.document_changes {
            for change in document_changes {
                match change {
                    DocumentChange::Edit(text_edit) => {
                        if text_edit.edits.is_empty() {
                            continue;
                        }
                        operations.push(FileOperation::Edit {
                            path: local_path(&text_edit.text_document.uri)?,
                            edits: text_edit.edits.clone(),
                        });
                    }
                    DocumentChange::Operation(ResourceOperation::Create { uri, options }) => {
                        operations.push(FileOperation::Create {
                            path: local_path(uri)?,
                            options: options.unwrap_or_default(),
                        });
                    }
                    DocumentChange::Operation(ResourceOperation::Rename {
                        old_uri,
                        new_uri,
                        options,
                    }) => {
                        operations.push(FileOperation::Rename {
                            from: local_path(old_uri)?,
                            to: local_path(new_uri)?,
                            options: options.unwrap_or_default(),
                        });
                    }
                    DocumentChange::Operation(ResourceOperation::Delete { uri, options }) => {
                        operations.push(FileOperation::Delete {
                            path: local_path(uri)?,
                            options: options.unwrap_or_default(),
                        });
                    }
                }
            }
        } else if let Some(changes) = &edit.changes {
            for (uri, edits) in changes {
                if edits.is_empty() {
                    continue;
                }
                operations.push(FileOperation::Edit {
                    path: local_path(uri)?,
                    edits: edits.clone(),
                });
            }
        }

        Ok(Self { operations })
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Every path the plan touches, in order of first appearance.
    pub fn touched_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for path in self.operations.iter().flat_map(|op| op.paths()) {
            if !files.iter().any(|known| known == path) {
                files.push(path.to_path_buf());
            }
        }
        files
    }

    /// Total number of text edits across all files.
    pub fn edit_count(&self) -> usize {
        self.operations
            .iter()
            .map(|op| match op {
                FileOperation::Edit { edits, .. } => edits.len(),
                _ => 0,
            })
            .sum()
    }

    /// Append another plan's operations.
    pub fn extend(&mut self, other: WorkspaceEditPlan) {
        self.operations.extend(other.operations);
    }
}

fn local_path(uri: &str) -> Result<PathBuf> {
    uri_to_path(uri)
        .ok_or_else(|| BridgeError::InvalidEdit(format!("unsupported document URI '{}'", uri)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workspace_edit(value: serde_json::Value) -> WorkspaceEdit {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plan_from_changes_is_uri_ordered() {
        let edit = workspace_edit(json!({
            "changes": {
                "file:///ws/b.go": [{"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}}, "newText": "bar"}],
                "file:///ws/a.go": [
                    {"range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 3}}, "newText": "bar"},
                    {"range": {"start": {"line": 4, "character": 2}, "end": {"line": 4, "character": 5}}, "newText": "bar"}
                ],
                "file:///ws/empty.go": []
            }
        }));

        let plan = WorkspaceEditPlan::from_workspace_edit(&edit).unwrap();
        assert_eq!(
            plan.touched_files(),
            vec![PathBuf::from("/ws/a.go"), PathBuf::from("/ws/b.go")]
        );
        assert_eq!(plan.edit_count(), 3);
    }

    #[test]
    fn test_document_changes_preferred() {
        let edit = workspace_edit(json!({
            "changes": {
                "file:///ws/ignored.go": [{"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 0}}, "newText": "x"}]
            },
            "documentChanges": [
                {"kind": "create", "uri": "file:///ws/new.go", "options": {"ignoreIfExists": true}},
                {"textDocument": {"uri": "file:///ws/new.go", "version": null},
                 "edits": [{"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 0}}, "newText": "package ws\n"}]},
                {"kind": "rename", "oldUri": "file:///ws/old.go", "newUri": "file:///ws/renamed.go"},
                {"kind": "delete", "uri": "file:///ws/gone", "options": {"recursive": true}}
            ]
        }));

        let plan = WorkspaceEditPlan::from_workspace_edit(&edit).unwrap();
        assert_eq!(plan.operations.len(), 4);
        assert!(matches!(
            &plan.operations[0],
            FileOperation::Create { options, .. } if options.ignore_if_exists && !options.overwrite
        ));
        assert!(matches!(&plan.operations[1], FileOperation::Edit { .. }));
        assert!(matches!(&plan.operations[2], FileOperation::Rename { .. }));
        assert!(matches!(
            &plan.operations[3],
            FileOperation::Delete { options, .. } if options.recursive
        ));
        assert_eq!(
            plan.touched_files(),
            vec![
                PathBuf::from("/ws/new.go"),
                PathBuf::from("/ws/old.go"),
                PathBuf::from("/ws/renamed.go"),
                PathBuf::from("/ws/gone"),
            ]
        );
    }

    #[test]
    fn test_non_file_uri_rejected() {
        let edit = workspace_edit(json!({
            "changes": {
                "untitled:Untitled-1": [{"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 0}}, "newText": "x"}]
            }
        }));
        assert!(matches!(
            WorkspaceEditPlan::from_workspace_edit(&edit),
            Err(BridgeError::InvalidEdit(_))
        ));
    }

    #[test]
    fn test_empty_edit() {
        let plan = WorkspaceEditPlan::from_workspace_edit(&WorkspaceEdit::default()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.touched_files().is_empty());
    }
}
