// Local-disk `ProjectFs`: every top-level folder of the workspace root is a project.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use draftsync_common::path::normalize::{normalize_path, project_of};

use super::{FileEntry, FolderEntry, FsError, ProjectFs};
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

#[derive(Debug, Clone)]
pub struct LocalProjectFs {
    root: PathBuf,
}

impl LocalProjectFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf), FsError> {
        let normalized = normalize_path(path)
            .map_err(|source| FsError::InvalidPath { path: path.to_string(), source })?;
        let disk = self.root.join(normalized.trim_start_matches('/'));
        Ok((normalized, disk))
    }
}

fn map_io(path: &str, error: std::io::Error) -> FsError {
    if error.kind() == ErrorKind::NotFound {
        FsError::NotFound(path.to_string())
    } else {
        FsError::io(path, error)
    }
}

impl ProjectFs for LocalProjectFs {
    fn as_file(&self, path: &str) -> Result<Option<FileEntry>, FsError> {
        let (path, disk) = self.resolve(path)?;
        match fs::metadata(&disk) {
            Ok(metadata) if metadata.is_file() => {
                let project = project_of(&path).unwrap_or("/").to_string();
                Ok(Some(FileEntry { path, project }))
            }
            Ok(_) => Err(FsError::WrongKind(path, "file")),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(FsError::io(path, error)),
        }
    }

    fn as_folder(&self, path: &str) -> Result<Option<FolderEntry>, FsError> {
        let (path, disk) = self.resolve(path)?;
        match fs::metadata(&disk) {
            Ok(metadata) if metadata.is_dir() => Ok(Some(FolderEntry { path })),
            Ok(_) => Err(FsError::WrongKind(path, "folder")),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(FsError::io(path, error)),
        }
    }

    fn project_base_folder(&self, project: &str) -> Result<Option<FolderEntry>, FsError> {
        let (path, disk) = self.resolve(project)?;
        match fs::metadata(&disk) {
            Ok(metadata) if metadata.is_dir() => Ok(Some(FolderEntry { path })),
            Ok(_) => Ok(None),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(FsError::io(path, error)),
        }
    }

    fn create_folder(&self, path: &str) -> Result<FolderEntry, FsError> {
        let (path, disk) = self.resolve(path)?;
        fs::create_dir_all(&disk).map_err(|error| FsError::io(path.clone(), error))?;
        Ok(FolderEntry { path })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let (path, disk) = self.resolve(path)?;
        fs::read(&disk).map_err(|error| map_io(&path, error))
    }

    fn write(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let (path, disk) = self.resolve(path)?;
        fs::write(&disk, content).map_err(|error| map_io(&path, error))
    }

    fn remove(&self, path: &str) -> Result<(), FsError> {
        let (path, disk) = self.resolve(path)?;
        match fs::remove_file(&disk) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(FsError::io(path, error)),
        }
    }

    fn disk_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn restrict_to_owner(&self, path: &str) -> Result<(), FsError> {
        let (path, disk) = self.resolve(path)?;
        let result = if disk.is_dir() {
            ensure_owner_only_dir(&disk)
        } else {
            ensure_owner_only_file(&disk)
        };
        result.map_err(|error| FsError::io(path, std::io::Error::other(error.to_string())))
    }
}
