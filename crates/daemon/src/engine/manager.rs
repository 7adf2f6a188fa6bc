// Working copy manager: owns the overlay store and reconciles editor events.
//
// Every read-modify-write on a path runs under that path's `PathLocks` guard.
// Store access never overlaps backing-store I/O with the map lock held.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use draftsync_common::path::normalize::{normalize_path, project_of};
use draftsync_common::types::{
    EditorChanges, FileTrackingOperation, ServerError, WorkingCopyUpdated,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use super::codec::{bytes_to_text, OffsetUnit};
use super::divergence::{contents_differ, DivergenceDetector};
use super::error::WorkingCopyError;
use super::overlay::{OverlayStore, PathLocks};
use super::working_copy::WorkingCopy;
use crate::fs::ProjectFs;
use crate::store::backing::{flatten_path, BackingStore, DEFAULT_BACKING_DIR};
use crate::transmit::Transmitter;

pub type Result<T> = std::result::Result<T, WorkingCopyError>;

/// Prefix of every error message sent to an endpoint.
pub const FAILURE_PREFIX: &str = "Can not handle file operation: ";

const DEFAULT_UPDATE_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Backing directory, relative to each project's base folder.
    pub backing_dir: String,
    pub offset_unit: OffsetUnit,
    /// Capacity of the `WorkingCopyUpdated` broadcast channel.
    pub update_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            backing_dir: DEFAULT_BACKING_DIR.to_string(),
            offset_unit: OffsetUnit::default(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

/// Outcome of a persistence sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub persisted: usize,
    pub failed: usize,
}

pub struct WorkingCopyManager {
    store: Arc<OverlayStore>,
    locks: PathLocks,
    fs: Arc<dyn ProjectFs>,
    backing: BackingStore,
    divergence: DivergenceDetector,
    transmitter: Arc<dyn Transmitter>,
    updates: broadcast::Sender<WorkingCopyUpdated>,
    offset_unit: OffsetUnit,
}

impl WorkingCopyManager {
    pub fn new(
        fs: Arc<dyn ProjectFs>,
        transmitter: Arc<dyn Transmitter>,
        options: ManagerOptions,
    ) -> Self {
        let store = Arc::new(OverlayStore::new());
        let (updates, _) = broadcast::channel(options.update_capacity.max(1));
        Self {
            backing: BackingStore::new(Arc::clone(&fs), options.backing_dir),
            divergence: DivergenceDetector::new(Arc::clone(&fs), Arc::clone(&store)),
            store,
            locks: PathLocks::new(),
            fs,
            transmitter,
            updates,
            offset_unit: options.offset_unit,
        }
    }

    /// Receive a `WorkingCopyUpdated` for every delta that changed content.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<WorkingCopyUpdated> {
        self.updates.subscribe()
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        normalize_path(path).map(|path| self.store.contains(&path)).unwrap_or(false)
    }

    pub fn tracked_paths(&self) -> Vec<String> {
        self.store.tracked_paths()
    }

    /// Absolute location of the backing file for `path`.
    ///
    /// A tracked file is flushed first, so the returned file holds the
    /// current overlay. For an untracked file the existing backing file (if
    /// any) is returned as-is.
    pub async fn get_persistent_working_copy(&self, path: &str) -> Result<Option<PathBuf>> {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;

        if let Some(copy) = self.store.get(&path) {
            return self.flush(&path, copy).map(Some);
        }

        let Some(file) = self.fs.as_file(&path)? else {
            return Ok(None);
        };
        let Some(root) = self.backing.resolve_backing_root(&file.project)? else {
            return Ok(None);
        };
        let flat = flatten_path(&path);
        if self.backing.contains(&root, &flat)? {
            Ok(Some(self.backing.backing_file_path(&root, &flat)))
        } else {
            Ok(None)
        }
    }

    /// Overlay text when tracked, else the original file's text.
    pub async fn get_content_for(&self, path: &str) -> Result<String> {
        let path = normalize_path(path)?;
        if let Some(copy) = self.store.get(&path) {
            return Ok(copy.content_as_text());
        }
        if self.fs.as_file(&path)?.is_none() {
            return Err(WorkingCopyError::not_found(&path));
        }
        Ok(bytes_to_text(&self.fs.read(&path)?))
    }

    /// Apply one edit delta, creating the working copy on first use.
    ///
    /// Returns whether content changed. Deltas that can't change anything
    /// (empty insert, non-positive remove count) return `Ok(false)` and
    /// publish nothing.
    pub async fn on_editor_content_updated(
        &self,
        endpoint_id: &str,
        changes: &EditorChanges,
    ) -> Result<bool> {
        let path = normalize_path(&changes.file_location)?;
        let _guard = self.locks.lock(&path).await;

        let mut copy = match self.store.get(&path) {
            Some(copy) => copy,
            None => self.create_working_copy(&path)?,
        };
        if !copy.apply(&changes.delta, self.offset_unit)? {
            trace!(path = %path, "ignoring delta that changes nothing");
            return Ok(false);
        }
        debug!(
            path = %path,
            offset = changes.delta.offset(),
            bytes = copy.content().len(),
            "applied editor delta"
        );
        self.store.put(path, copy);

        let _ = self.updates.send(WorkingCopyUpdated {
            endpoint_id: endpoint_id.to_string(),
            changes: changes.clone(),
            applied_at: Utc::now(),
        });
        Ok(true)
    }

    /// Handle a lifecycle event. Failures are logged and reported to `endpoint_id`.
    pub async fn on_file_operation(&self, endpoint_id: &str, operation: &FileTrackingOperation) {
        if let Err(err) = self.handle_file_operation(operation).await {
            error!(
                endpoint_id,
                operation = operation.kind(),
                kind = err.kind().as_str(),
                error = %err,
                "file operation failed"
            );
            self.report_failure(endpoint_id, &err);
        }
    }

    /// Send `error` to `endpoint_id` as a `track:editor-working-copy-error` notification.
    pub fn report_failure(&self, endpoint_id: &str, error: &WorkingCopyError) {
        self.transmitter.transmit_error(
            endpoint_id,
            &ServerError { code: error.status_code(), message: format!("{FAILURE_PREFIX}{error}") },
        );
    }

    async fn handle_file_operation(&self, operation: &FileTrackingOperation) -> Result<()> {
        match operation {
            FileTrackingOperation::Start { path } => self.start(path).await,
            FileTrackingOperation::Stop { path } => self.stop(path).await,
            FileTrackingOperation::Move { old_path, path } => self.move_to(old_path, path).await,
            FileTrackingOperation::Suspend { .. } | FileTrackingOperation::Resume { .. } => {
                trace!(operation = operation.kind(), "no working copy change for lifecycle event");
                Ok(())
            }
        }
    }

    async fn start(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;
        if self.store.contains(&path) {
            trace!(path = %path, "already tracked");
            return Ok(());
        }
        self.create_working_copy(&path)?;
        Ok(())
    }

    async fn stop(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;
        let Some(copy) = self.store.get(&path) else {
            trace!(path = %path, "stop for untracked file");
            return Ok(());
        };

        if self.divergence.has_unsaved_data(&path) {
            self.persist(&copy)?;
            info!(path = %path, "stopped tracking; kept backing copy with unsaved data");
        } else {
            if let Some(root) = self.backing.resolve_backing_root(copy.project_path())? {
                self.backing.delete_backing_file(&root, copy.path())?;
            }
            info!(path = %path, "stopped tracking");
        }
        self.store.remove(&path);
        Ok(())
    }

    async fn move_to(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;
        if old_path == new_path {
            trace!(path = %new_path, "move onto itself");
            return Ok(());
        }
        let _guards = self.locks.lock_pair(&old_path, &new_path).await;

        if !self.store.contains(&old_path) {
            trace!(old_path = %old_path, "move of untracked file");
            return Ok(());
        }
        if self.store.contains(&new_path) {
            return Err(WorkingCopyError::Conflict(format!(
                "Item '{new_path}' is already tracked"
            )));
        }
        let Some(mut copy) = self.store.remove(&old_path) else {
            return Ok(());
        };

        let old_flat = copy.path().to_string();
        let old_project = copy.project_path().to_string();
        copy.set_path(flatten_path(&new_path));
        copy.set_project_path(project_of(&new_path).unwrap_or(old_project.as_str()).to_string());
        self.store.put(new_path.clone(), copy.clone());

        if let Some(root) = self.backing.resolve_backing_root(&old_project)? {
            self.backing.delete_backing_file(&root, &old_flat)?;
        }
        self.flush(&new_path, copy)?;
        info!(old_path = %old_path, path = %new_path, "moved working copy");
        Ok(())
    }

    /// Seed a working copy from the original file and start tracking it.
    ///
    /// An existing backing file is left untouched: it may hold edits kept by
    /// an earlier stop. The caller holds the path guard.
    fn create_working_copy(&self, path: &str) -> Result<WorkingCopy> {
        let file = self.fs.as_file(path)?.ok_or_else(|| WorkingCopyError::not_found(path))?;
        let content = self.fs.read(path)?;
        let copy = WorkingCopy::new(flatten_path(path), file.project, content);

        let root = self.backing.ensure_backing_root(copy.project_path())?;
        if !self.backing.contains(&root, copy.path())? {
            self.backing.write_backing_file(&root, copy.path(), copy.content())?;
        }
        self.store.put(path, copy.clone());
        info!(path = %path, backing = %copy.path(), "started tracking");
        Ok(copy)
    }

    /// Retained backing copy text for an untracked file, when it differs from
    /// the original.
    pub async fn recoverable_content(&self, path: &str) -> Result<Option<String>> {
        let path = normalize_path(path)?;
        let _guard = self.locks.lock(&path).await;
        if self.store.contains(&path) {
            return Ok(None);
        }

        let Some(file) = self.fs.as_file(&path)? else {
            return Ok(None);
        };
        let Some(root) = self.backing.resolve_backing_root(&file.project)? else {
            return Ok(None);
        };
        let Some(backup) = self.backing.read_backing_file(&root, &flatten_path(&path))? else {
            return Ok(None);
        };
        let original = self.fs.read(&path)?;
        Ok(contents_differ(&backup, &original).then(|| bytes_to_text(&backup)))
    }

    /// Flush every dirty overlay to its backing file.
    ///
    /// Copies with no edits since their last flush are skipped, so a backing
    /// file kept by an earlier session survives until the file is edited.
    pub async fn persist_all(&self) -> PersistReport {
        let mut report = PersistReport::default();
        for path in self.store.tracked_paths() {
            let _guard = self.locks.lock(&path).await;
            let Some(copy) = self.store.get(&path).filter(WorkingCopy::is_dirty) else {
                continue;
            };
            match self.flush(&path, copy) {
                Ok(_) => report.persisted += 1,
                Err(err) => {
                    warn!(path = %path, error = %err, "failed to persist working copy");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Persist `copy` and store it back as clean. The caller holds the path guard.
    fn flush(&self, path: &str, mut copy: WorkingCopy) -> Result<PathBuf> {
        let backing_file = self.persist(&copy)?;
        copy.mark_clean();
        self.store.put(path, copy);
        Ok(backing_file)
    }

    fn persist(&self, copy: &WorkingCopy) -> Result<PathBuf> {
        let root = self.backing.ensure_backing_root(copy.project_path())?;
        self.backing.write_backing_file(&root, copy.path(), copy.content())?;
        Ok(self.backing.backing_file_path(&root, copy.path()))
    }
}
