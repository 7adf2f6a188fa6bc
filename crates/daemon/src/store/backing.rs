// Backing files: the durable mirror of each working copy.
//
// Layout: `<project base>/<backing dir>/<flattened original path>`, where the
// backing dir defaults to `.draftsync/working_copies`. The directory is
// created lazily, and every directory it names is restricted to the owner.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::fs::{join_path, FsError, ProjectFs};

pub const DEFAULT_BACKING_DIR: &str = ".draftsync/working_copies";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("base folder of project '{0}' is unavailable")]
    ProjectUnavailable(String),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// The hidden per-project directory holding backing files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingRoot {
    pub project: String,
    pub path: String,
}

/// Flatten an original path into a single backing file name.
///
/// Strips one leading `/` and turns every other `/` into `.`, so
/// `/proj/src/App.java` becomes `proj.src.App.java`. Paths that differ only
/// in where a `/` versus a `.` sits (`/a/b.c` and `/a.b/c`) collide; that is
/// an accepted limitation of the layout.
pub fn flatten_path(path: &str) -> String {
    path.strip_prefix('/').unwrap_or(path).replace('/', ".")
}

pub struct BackingStore {
    fs: Arc<dyn ProjectFs>,
    backing_dir: String,
}

impl BackingStore {
    pub fn new(fs: Arc<dyn ProjectFs>, backing_dir: impl Into<String>) -> Self {
        Self { fs, backing_dir: backing_dir.into() }
    }

    /// Locate the backing directory of `project`.
    ///
    /// `None` when the project has no base folder or the directory hasn't been created yet.
    pub fn resolve_backing_root(&self, project: &str) -> Result<Option<BackingRoot>, StorageError> {
        let Some(base) = self.fs.project_base_folder(project)? else {
            return Ok(None);
        };
        let path = join_path(&base.path, &self.backing_dir);
        Ok(self
            .fs
            .as_folder(&path)?
            .map(|folder| BackingRoot { project: project.to_string(), path: folder.path }))
    }

    pub fn create_backing_root(&self, project: &str) -> Result<BackingRoot, StorageError> {
        let base = self
            .fs
            .project_base_folder(project)?
            .ok_or_else(|| StorageError::ProjectUnavailable(project.to_string()))?;
        let folder = self.fs.create_folder(&join_path(&base.path, &self.backing_dir))?;

        let mut dir = base.path;
        for component in self.backing_dir.split('/').filter(|c| !c.is_empty()) {
            dir = join_path(&dir, component);
            self.fs.restrict_to_owner(&dir)?;
        }
        Ok(BackingRoot { project: project.to_string(), path: folder.path })
    }

    pub fn ensure_backing_root(&self, project: &str) -> Result<BackingRoot, StorageError> {
        match self.resolve_backing_root(project)? {
            Some(root) => Ok(root),
            None => self.create_backing_root(project),
        }
    }

    pub fn contains(&self, root: &BackingRoot, flat: &str) -> Result<bool, StorageError> {
        Ok(self.fs.as_file(&join_path(&root.path, flat))?.is_some())
    }

    pub fn read_backing_file(
        &self,
        root: &BackingRoot,
        flat: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        match self.fs.read(&join_path(&root.path, flat)) {
            Ok(content) => Ok(Some(content)),
            Err(FsError::NotFound(_)) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Create or overwrite the backing file. Writing the same bytes twice is harmless.
    pub fn write_backing_file(
        &self,
        root: &BackingRoot,
        flat: &str,
        content: &[u8],
    ) -> Result<(), StorageError> {
        let path = join_path(&root.path, flat);
        self.fs.write(&path, content)?;
        self.fs.restrict_to_owner(&path)?;
        Ok(())
    }

    pub fn delete_backing_file(&self, root: &BackingRoot, flat: &str) -> Result<(), StorageError> {
        self.fs.remove(&join_path(&root.path, flat))?;
        Ok(())
    }

    pub fn backing_file_path(&self, root: &BackingRoot, flat: &str) -> PathBuf {
        self.fs.disk_path(&join_path(&root.path, flat))
    }
}
