//! Transactional workspace edit application
//!
//! `Validating -> BackingUp -> Applying -> Committed`, or
//! `-> RollingBack -> Failed` from the backup and apply stages. Nothing is
//! written until every path and option check has passed. Every existing path
//! the plan mutates is copied into a temporary backup set first, and a
//! failure at any later point restores those copies and removes whatever the
//! plan created. Modification times captured at backup guard text edits
//! against concurrent external writes.

use super::plan::{FileOperation, WorkspaceEditPlan};
use crate::error::{BridgeError, Result};
use crate::position::{lines_with_endings, offset_from_line_character};
use crate::protocol::TextEdit;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Validating,
    BackingUp,
    Applying,
    Committed,
    RollingBack,
    Failed,
}

/// Outcome of applying a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub success: bool,
    /// Files changed; always empty when `success` is false
    pub applied: Vec<String>,
    /// Aggregate message first, then per-file issues
    pub errors: Vec<String>,
}

impl ApplyReport {
    fn committed(applied: Vec<PathBuf>) -> Self {
        Self {
            success: true,
            applied: applied
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            errors: vec![],
        }
    }

    fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            applied: vec![],
            errors,
        }
    }
}

/// Applies workspace edit plans inside one workspace root
pub struct WorkspaceEditApplier {
    root: PathBuf,
    #[cfg(test)]
    fault: Option<Fault>,
}

#[cfg(test)]
#[derive(Debug, Clone)]
enum Fault {
    /// Fail at the n-th unit of work in a stage
    Fail(ApplyState, usize),
    /// Rewind a file's mtime just before the first operation
    Touch(PathBuf),
}

impl WorkspaceEditApplier {
    /// Create an applier for `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            BridgeError::InvalidEdit(format!(
                "workspace root {} is not accessible: {}",
                root.as_ref().display(),
                e
            ))
        })?;
        Ok(Self {
            root,
            #[cfg(test)]
            fault: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply `plan` all-or-nothing.
    pub fn apply(&self, plan: &WorkspaceEditPlan) -> ApplyReport {
        let mut tx = Transaction::new();
        tracing::debug!(
            root = %self.root.display(),
            operations = plan.operations.len(),
            "Applying workspace edit"
        );

        let steps = match self.validate(plan) {
            Ok(steps) => steps,
            Err(problems) => {
                tx.transition(ApplyState::Failed);
                let mut errors = vec![format!(
                    "Workspace edit rejected with {} problem(s); nothing was changed",
                    problems.len()
                )];
                errors.extend(problems.iter().map(|e| e.to_string()));
                return ApplyReport::failed(errors);
            }
        };

        tx.transition(ApplyState::BackingUp);
        if let Err(e) = self.back_up(&mut tx, &steps) {
            return tx.roll_back(e);
        }

        tx.transition(ApplyState::Applying);
        for (index, step) in steps.iter().enumerate() {
            if let Err(e) = self
                .inject(ApplyState::Applying, index)
                .and_then(|_| tx.apply_step(step))
            {
                return tx.roll_back(e);
            }
        }

        tx.transition(ApplyState::Committed);
        tx.commit()
    }

    /// Check every path and option against a simulated view of the tree.
    fn validate<'p>(
        &self,
        plan: &'p WorkspaceEditPlan,
    ) -> std::result::Result<Vec<Step<'p>>, Vec<BridgeError>> {
        let mut problems = Vec::new();
        let mut steps = Vec::new();
        let mut view = SimulatedTree::default();

        for operation in &plan.operations {
            match operation {
                FileOperation::Edit { path, edits } => {
                    let Some(path) = self.check_path(path, &mut problems) else {
                        continue;
                    };
                    match view.lookup(&path) {
                        Some(Entry::File) => steps.push(Step::Edit { path, edits }),
                        Some(Entry::Dir) => problems.push(BridgeError::InvalidEdit(format!(
                            "cannot apply text edits to directory {}",
                            path.display()
                        ))),
                        None => problems.push(BridgeError::InvalidEdit(format!(
                            "cannot apply text edits to missing file {}",
                            path.display()
                        ))),
                    }
                }
                FileOperation::Create { path, options } => {
                    let Some(path) = self.check_path(path, &mut problems) else {
                        continue;
                    };
                    match view.lookup(&path) {
                        Some(Entry::Dir) if options.overwrite => {
                            problems.push(BridgeError::InvalidEdit(format!(
                                "cannot overwrite directory {} with a file",
                                path.display()
                            )))
                        }
                        Some(_) if options.overwrite => {
                            view.set(&path, Overlay::Present(Entry::File));
                            steps.push(Step::Create {
                                path,
                                replace: true,
                            });
                        }
                        Some(_) if options.ignore_if_exists => steps.push(Step::Skip(format!(
                            "create {}: already exists",
                            path.display()
                        ))),
                        Some(_) => problems.push(BridgeError::InvalidEdit(format!(
                            "cannot create {}: already exists",
                            path.display()
                        ))),
                        None => {
                            view.set(&path, Overlay::Present(Entry::File));
                            steps.push(Step::Create {
                                path,
                                replace: false,
                            });
                        }
                    }
                }
                FileOperation::Rename { from, to, options } => {
                    let from = self.check_path(from, &mut problems);
                    let to = self.check_path(to, &mut problems);
                    let (Some(from), Some(to)) = (from, to) else {
                        continue;
                    };
                    let Some(kind) = view.lookup(&from) else {
                        problems.push(BridgeError::InvalidEdit(format!(
                            "cannot rename {}: it does not exist",
                            from.display()
                        )));
                        continue;
                    };
                    let replace = match view.lookup(&to) {
                        Some(_) if options.overwrite => true,
                        Some(_) if options.ignore_if_exists => {
                            steps.push(Step::Skip(format!(
                                "rename to {}: target already exists",
                                to.display()
                            )));
                            continue;
                        }
                        Some(_) => {
                            problems.push(BridgeError::InvalidEdit(format!(
                                "cannot rename {} to {}: target already exists",
                                from.display(),
                                to.display()
                            )));
                            continue;
                        }
                        None => false,
                    };
                    let origin = view.origin(&from);
                    view.set(&from, Overlay::Absent);
                    view.set(&to, Overlay::MovedFrom(origin, kind));
                    steps.push(Step::Rename { from, to, replace });
                }
                FileOperation::Delete { path, options } => {
                    let Some(path) = self.check_path(path, &mut problems) else {
                        continue;
                    };
                    match view.lookup(&path) {
                        None if options.ignore_if_not_exists => steps.push(Step::Skip(format!(
                            "delete {}: does not exist",
                            path.display()
                        ))),
                        None => problems.push(BridgeError::InvalidEdit(format!(
                            "cannot delete {}: it does not exist",
                            path.display()
                        ))),
                        Some(Entry::Dir) if !options.recursive => {
                            problems.push(BridgeError::InvalidEdit(format!(
                                "cannot delete directory {} without the recursive option",
                                path.display()
                            )))
                        }
                        Some(_) => {
                            view.set(&path, Overlay::Absent);
                            steps.push(Step::Delete { path });
                        }
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(steps)
        } else {
            Err(problems)
        }
    }

    fn check_path(&self, path: &Path, problems: &mut Vec<BridgeError>) -> Option<PathBuf> {
        match resolve_in_root(&self.root, path) {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                problems.push(e);
                None
            }
        }
    }

    fn back_up(&self, tx: &mut Transaction, steps: &[Step<'_>]) -> Result<()> {
        let dir = tempfile::Builder::new()
            .prefix("a3s-lsp-backup-")
            .tempdir()?;

        let mut index = 0;
        for path in steps.iter().flat_map(Step::mutated_paths) {
            if tx.backed_up.contains(path) {
                continue;
            }
            let metadata = match fs::symlink_metadata(path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            self.inject(ApplyState::BackingUp, index)?;
            let stored = dir.path().join(index.to_string());
            if metadata.is_dir() {
                copy_tree(path, &stored)?;
            } else {
                fs::copy(path, &stored)?;
            }

            let modified = metadata.modified().ok();
            if metadata.is_file() {
                if let Some(modified) = modified {
                    tx.expected_mtime.insert(path.clone(), modified);
                }
            }
            tracing::trace!("Backed up {} to {}", path.display(), stored.display());
            tx.backed_up.insert(path.clone());
            tx.backups.push(Backup {
                original: path.clone(),
                stored,
                is_dir: metadata.is_dir(),
                modified,
            });
            index += 1;
        }

        tx.backup_dir = Some(dir);
        Ok(())
    }

    #[cfg(test)]
    fn inject(&self, stage: ApplyState, index: usize) -> Result<()> {
        match &self.fault {
            Some(Fault::Fail(at, n)) if *at == stage && *n == index => Err(BridgeError::Io(
                io::Error::new(io::ErrorKind::Other, "injected failure"),
            )),
            Some(Fault::Touch(path)) if stage == ApplyState::Applying && index == 0 => {
                let file = fs::File::options().write(true).open(path)?;
                file.set_modified(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn inject(&self, _stage: ApplyState, _index: usize) -> Result<()> {
        Ok(())
    }
}

/// Validated operation with resolved paths
#[derive(Debug)]
enum Step<'p> {
    Edit { path: PathBuf, edits: &'p [TextEdit] },
    Create { path: PathBuf, replace: bool },
    Rename { from: PathBuf, to: PathBuf, replace: bool },
    Delete { path: PathBuf },
    Skip(String),
}

impl Step<'_> {
    /// Paths whose current content must be backed up.
    fn mutated_paths(&self) -> Vec<&PathBuf> {
        match self {
            Step::Edit { path, .. } | Step::Delete { path } => vec![path],
            Step::Create { path, replace } => {
                if *replace {
                    vec![path]
                } else {
                    vec![]
                }
            }
            Step::Rename { from, to, replace } => {
                if *replace {
                    vec![from, to]
                } else {
                    vec![from]
                }
            }
            Step::Skip(_) => vec![],
        }
    }
}

#[derive(Debug)]
struct Backup {
    original: PathBuf,
    stored: PathBuf,
    is_dir: bool,
    modified: Option<SystemTime>,
}

/// Mutable state of one apply run
struct Transaction {
    state: ApplyState,
    backup_dir: Option<TempDir>,
    backups: Vec<Backup>,
    backed_up: HashSet<PathBuf>,
    expected_mtime: HashMap<PathBuf, SystemTime>,
    /// Paths that did not exist before this plan, in creation order
    created: Vec<PathBuf>,
    applied: Vec<PathBuf>,
}

impl Transaction {
    fn new() -> Self {
        Self {
            state: ApplyState::Validating,
            backup_dir: None,
            backups: vec![],
            backed_up: HashSet::new(),
            expected_mtime: HashMap::new(),
            created: vec![],
            applied: vec![],
        }
    }

    fn transition(&mut self, next: ApplyState) {
        tracing::debug!("Workspace edit: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn apply_step(&mut self, step: &Step<'_>) -> Result<()> {
        match step {
            Step::Skip(reason) => {
                tracing::debug!("Skipping {}", reason);
            }
            Step::Edit { path, edits } => {
                self.check_unchanged(path)?;
                let content = fs::read_to_string(path).map_err(|e| match e.kind() {
                    io::ErrorKind::InvalidData => BridgeError::InvalidEdit(format!(
                        "{} is not valid UTF-8",
                        path.display()
                    )),
                    _ => BridgeError::Io(e),
                })?;
                let updated = apply_text_edits(&content, edits).map_err(|e| match e {
                    BridgeError::InvalidEdit(reason) => {
                        BridgeError::InvalidEdit(format!("{}: {}", path.display(), reason))
                    }
                    other => other,
                })?;
                write_atomic(path, updated.as_bytes())?;
                self.refresh_mtime(path);
                self.record_applied(path);
            }
            Step::Create { path, .. } => {
                self.ensure_parent(path)?;
                let existed = fs::symlink_metadata(path).is_ok();
                write_atomic(path, b"")?;
                if !existed && !self.backed_up.contains(path) {
                    self.created.push(path.clone());
                }
                self.refresh_mtime(path);
                self.record_applied(path);
            }
            Step::Rename { from, to, replace } => {
                self.ensure_parent(to)?;
                if *replace && fs::symlink_metadata(to).is_ok() {
                    remove_path(to)?;
                }
                fs::rename(from, to)?;
                if !self.backed_up.contains(to) {
                    self.created.push(to.clone());
                }
                if let Some(modified) = self.expected_mtime.remove(from) {
                    self.expected_mtime.insert(to.clone(), modified);
                }
                self.record_applied(from);
                self.record_applied(to);
            }
            Step::Delete { path } => {
                remove_path(path)?;
                self.expected_mtime.remove(path);
                self.record_applied(path);
            }
        }
        Ok(())
    }

    /// Abort with a conflict if `path` changed since it was backed up.
    fn check_unchanged(&self, path: &Path) -> Result<()> {
        let Some(expected) = self.expected_mtime.get(path) else {
            return Ok(());
        };
        let current = fs::metadata(path)?.modified()?;
        if current != *expected {
            return Err(BridgeError::Conflict(format!(
                "{} was modified by another process during the edit",
                path.display()
            )));
        }
        Ok(())
    }

    fn refresh_mtime(&mut self, path: &Path) {
        if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
            self.expected_mtime.insert(path.to_path_buf(), modified);
        }
    }

    fn record_applied(&mut self, path: &Path) {
        if !self.applied.iter().any(|p| p == path) {
            self.applied.push(path.to_path_buf());
        }
    }

    /// Create missing parent directories, remembering them for rollback.
    fn ensure_parent(&mut self, path: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let missing: Vec<PathBuf> = parent
            .ancestors()
            .take_while(|dir| fs::symlink_metadata(dir).is_err())
            .map(Path::to_path_buf)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(parent)?;
        self.created.extend(missing.into_iter().rev());
        Ok(())
    }

    /// Best-effort restore. Individual failures are logged and reported but
    /// never stop the remaining restores.
    fn roll_back(mut self, cause: BridgeError) -> ApplyReport {
        tracing::warn!("Workspace edit failed, rolling back: {}", cause);
        self.transition(ApplyState::RollingBack);
        let mut errors = vec![format!("Workspace edit failed and was rolled back: {}", cause)];

        for path in self.created.iter().rev() {
            if let Err(e) = remove_path(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Rollback could not remove {}: {}", path.display(), e);
                    errors.push(format!("could not remove {}: {}", path.display(), e));
                }
            }
        }

        for backup in &self.backups {
            if let Err(e) = restore(backup) {
                tracing::warn!(
                    "Rollback could not restore {}: {}",
                    backup.original.display(),
                    e
                );
                errors.push(format!(
                    "could not restore {}: {}",
                    backup.original.display(),
                    e
                ));
            }
        }

        self.transition(ApplyState::Failed);
        self.discard_backups();
        ApplyReport::failed(errors)
    }

    fn commit(mut self) -> ApplyReport {
        self.discard_backups();
        ApplyReport::committed(std::mem::take(&mut self.applied))
    }

    fn discard_backups(&mut self) {
        if let Some(dir) = self.backup_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("Failed to remove backup dir {}: {}", path.display(), e);
            }
        }
    }
}

/// Apply LSP text edits to `content`.
///
/// Ranges are translated against the original content and applied last to
/// first. Edits at the same position keep their array order. Overlapping
/// ranges are rejected.
pub fn apply_text_edits(content: &str, edits: &[TextEdit]) -> Result<String> {
    let lines = lines_with_endings(content);
    let mut spans = Vec::with_capacity(edits.len());

    for (index, edit) in edits.iter().enumerate() {
        let start = offset_from_line_character(
            &lines,
            edit.range.start.line as usize,
            edit.range.start.character as usize,
        );
        let end = offset_from_line_character(
            &lines,
            edit.range.end.line as usize,
            edit.range.end.character as usize,
        );
        if end < start {
            return Err(BridgeError::InvalidEdit(format!(
                "edit {} ends before it starts",
                index
            )));
        }
        spans.push((start, end, index, edit.new_text.as_str()));
    }

    spans.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
    for pair in spans.windows(2) {
        if pair[0].1 > pair[1].0 {
            return Err(BridgeError::InvalidEdit(format!(
                "edits {} and {} overlap",
                pair[0].2, pair[1].2
            )));
        }
    }

    let mut result = content.to_string();
    for (start, end, _, text) in spans.iter().rev() {
        result.replace_range(*start..*end, text);
    }
    Ok(result)
}

/// Write via a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        BridgeError::InvalidEdit(format!("{} has no parent directory", path.display()))
    })?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }
    temp.persist(path).map_err(|e| BridgeError::Io(e.error))?;
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn restore(backup: &Backup) -> io::Result<()> {
    let path = &backup.original;
    if fs::symlink_metadata(path).is_ok() {
        remove_path(path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if backup.is_dir {
        copy_tree(&backup.stored, path)
    } else {
        fs::copy(&backup.stored, path)?;
        if let Some(modified) = backup.modified {
            fs::File::options()
                .write(true)
                .open(path)?
                .set_modified(modified)?;
        }
        Ok(())
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Resolve `path` against `root` and require it to stay inside.
///
/// `..` is folded lexically, then the nearest existing ancestor is
/// canonicalized so symlinks cannot smuggle a target out of the root.
fn resolve_in_root(root: &Path, path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    for name in rest.iter().rev() {
        resolved.push(name);
    }

    if resolved.starts_with(root) && resolved != root {
        Ok(resolved)
    } else {
        Err(BridgeError::PathPolicy {
            path: path.display().to_string(),
            root: root.display().to_string(),
        })
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    File,
    Dir,
}

#[derive(Debug, Clone)]
enum Overlay {
    Absent,
    Present(Entry),
    /// Renamed here from a path on disk
    MovedFrom(PathBuf, Entry),
}

/// The tree as it will look after the operations validated so far
#[derive(Default)]
struct SimulatedTree {
    overlay: HashMap<PathBuf, Overlay>,
}

impl SimulatedTree {
    fn lookup(&self, path: &Path) -> Option<Entry> {
        if let Some(state) = self.overlay.get(path) {
            return match state {
                Overlay::Absent => None,
                Overlay::Present(entry) | Overlay::MovedFrom(_, entry) => Some(*entry),
            };
        }
        for ancestor in path.ancestors().skip(1) {
            match self.overlay.get(ancestor) {
                None => continue,
                Some(Overlay::MovedFrom(origin, _)) => {
                    let relative = path.strip_prefix(ancestor).ok()?;
                    return disk_entry(&origin.join(relative));
                }
                // removed or freshly created subtree holds only overlaid paths
                Some(_) => return None,
            }
        }
        disk_entry(path)
    }

    /// On-disk location currently backing `path`.
    fn origin(&self, path: &Path) -> PathBuf {
        if let Some(Overlay::MovedFrom(origin, _)) = self.overlay.get(path) {
            return origin.clone();
        }
        for ancestor in path.ancestors().skip(1) {
            if let Some(Overlay::MovedFrom(origin, _)) = self.overlay.get(ancestor) {
                if let Ok(relative) = path.strip_prefix(ancestor) {
                    return origin.join(relative);
                }
            }
        }
        path.to_path_buf()
    }

    fn set(&mut self, path: &Path, state: Overlay) {
        self.overlay.insert(path.to_path_buf(), state);
    }
}

fn disk_entry(path: &Path) -> Option<Entry> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Some(Entry::Dir),
        Ok(_) => Some(Entry::File),
        Err(_) => None,
    }
}
