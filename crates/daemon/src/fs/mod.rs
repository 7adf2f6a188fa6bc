// Project/file resolution: the storage collaborator working copies are mirrored through.
//
// Paths here are workspace paths (`/proj/src/App.java`), never host paths.
// `LocalProjectFs` maps them onto a directory on disk.

pub mod local;

use std::path::PathBuf;

use draftsync_common::path::normalize::PathError;
use thiserror::Error;

pub use local::LocalProjectFs;

/// Failure reported by a `ProjectFs` implementation.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Item '{0}' isn't found")]
    NotFound(String),

    #[error("Item '{0}' isn't a {1}")]
    WrongKind(String, &'static str),

    #[error("invalid path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },

    #[error("Item '{0}' already exists")]
    Conflict(String),

    #[error("i/o failure on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A regular file inside a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    /// The owning project, e.g. `/proj`.
    pub project: String,
}

/// A folder inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub path: String,
}

/// How the working copy layer reaches project storage.
pub trait ProjectFs: Send + Sync {
    /// Resolve `path` to a file. `Ok(None)` when nothing exists there,
    /// `Err(WrongKind)` when it's a folder.
    fn as_file(&self, path: &str) -> Result<Option<FileEntry>, FsError>;

    /// Resolve `path` to a folder. `Ok(None)` when nothing exists there,
    /// `Err(WrongKind)` when it's a file.
    fn as_folder(&self, path: &str) -> Result<Option<FolderEntry>, FsError>;

    /// Base folder of `project`, or `None` when no such project exists.
    fn project_base_folder(&self, project: &str) -> Result<Option<FolderEntry>, FsError>;

    /// Create `path` and any missing parents. Succeeds if it already exists.
    fn create_folder(&self, path: &str) -> Result<FolderEntry, FsError>;

    fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Create or overwrite a file. The parent folder must exist.
    fn write(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    /// Remove a file. Succeeds if it doesn't exist.
    fn remove(&self, path: &str) -> Result<(), FsError>;

    /// Absolute location of `path` for consumers outside this process.
    fn disk_path(&self, path: &str) -> PathBuf;

    /// Restrict `path` to the current user. Storage without permissions may ignore it.
    fn restrict_to_owner(&self, path: &str) -> Result<(), FsError> {
        let _ = path;
        Ok(())
    }
}

/// Join workspace path segments with single separators.
pub fn join_path(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return base.to_string();
    }
    format!("{base}/{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_avoids_double_separators() {
        assert_eq!(
            join_path("/proj", ".draftsync/working_copies"),
            "/proj/.draftsync/working_copies"
        );
        assert_eq!(join_path("/proj/", "/a.txt"), "/proj/a.txt");
        assert_eq!(join_path("/proj", ""), "/proj");
    }

    #[test]
    fn not_found_message_names_the_item() {
        let error = FsError::NotFound("/proj/a.txt".to_string());
        assert_eq!(error.to_string(), "Item '/proj/a.txt' isn't found");
    }
}
