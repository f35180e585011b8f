//! On-disk locations and owner-only file writes.

// ============================================================================
// Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// Functions
// ============================================================================

/// Directory holding the executable, falling back to the working directory.
///
/// Identity and settings files live here by default.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Writes `contents` to `path`, readable and writable by the owner only.
///
/// Existing files are truncated and their permissions tightened.
///
/// # Errors
///
/// Returns the underlying IO error.
pub fn write_owner_only(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.flush()?;

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_owner_only_truncates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secret.txt");

        write_owner_only(&path, b"first contents").expect("write");
        write_owner_only(&path, b"second").expect("rewrite");

        assert_eq!(std::fs::read(&path).expect("read"), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("key.pem");
        std::fs::write(&path, b"loose").expect("seed");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        write_owner_only(&path, b"tight").expect("write");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_default_data_dir_exists() {
        assert!(default_data_dir().is_dir());
    }
}
