// Owner-only permissions for backing files, their directories and the config
// file. Unsaved edits are private user data.

use std::path::Path;

use anyhow::Result;

const OWNER_ONLY_FILE: u32 = 0o600;
const OWNER_ONLY_DIR: u32 = 0o700;

/// Restrict an existing file to `0600`. Missing paths are left alone.
pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    restrict_mode(path, OWNER_ONLY_FILE)
}

/// Restrict an existing directory to `0700`. Missing paths are left alone.
pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    restrict_mode(path, OWNER_ONLY_DIR)
}

#[cfg(unix)]
fn restrict_mode(path: &Path, mode: u32) -> Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use anyhow::Context;

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to stat `{}`", path.display()))
        }
    };
    if metadata.permissions().mode() & 0o777 != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to set mode {mode:o} on `{}`", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
