//! Filesystem helpers.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Makes `path` absolute against the current directory.
///
/// External tools may change directory before touching their arguments, so
/// every path handed to them goes through this first.
#[must_use]
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
}

/// Adds the execute bits to a script, logging instead of failing.
///
/// Returns true when the file is executable afterwards.
pub async fn ensure_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read permissions");
                return false;
            }
        };
        let mut permissions = metadata.permissions();
        let mode = permissions.mode();
        if mode & 0o111 == 0o111 {
            return true;
        }
        permissions.set_mode(mode | 0o111);
        if let Err(e) = tokio::fs::set_permissions(path, permissions).await {
            warn!(path = %path.display(), error = %e, "Could not set execute permissions");
            return false;
        }
        true
    }
    #[cfg(not(unix))]
    {
        tokio::fs::metadata(path).await.is_ok()
    }
}

/// Returns true if `path` is a non-empty regular file that can be opened.
pub async fn is_readable_volume(path: &Path) -> bool {
    match tokio::fs::File::open(path).await {
        Ok(file) => file
            .metadata()
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false),
        Err(_) => false,
    }
}
