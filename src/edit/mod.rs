//! Workspace edits
//!
//! [`WorkspaceEditPlan`] turns a server `WorkspaceEdit` into ordered file
//! operations; [`WorkspaceEditApplier`] applies a plan inside one workspace
//! root with backup and rollback.

pub mod applier;
pub mod plan;

pub use applier::{apply_text_edits, ApplyReport, ApplyState, WorkspaceEditApplier};
pub use plan::{FileOperation, WorkspaceEditPlan};
