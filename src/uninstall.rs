//! Removes a previously-installed toolchain tree (spec 4.8).

use std::path::Path;

use crate::error::UpdaterError;
use crate::fs::FileSystem;

/// Refuses an empty path outright rather than letting `remove_dir_all`
/// interpret it as the current directory. Idempotent: removing a
/// directory that doesn't exist is success, not failure.
pub fn uninstall(fs: &dyn FileSystem, install_dir: &Path) -> Result<(), UpdaterError> {
    if install_dir.as_os_str().is_empty() {
        return Err(UpdaterError::InternalInvariant(
            "refusing to uninstall an empty install directory".into(),
        ));
    }
    fs.remove_dir_all(install_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFs;

    #[test]
    fn removes_an_existing_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        let install_dir = dir.path().join("go");
        std::fs::create_dir_all(install_dir.join("bin")).unwrap();
        std::fs::write(install_dir.join("bin/go"), b"binary").unwrap();

        uninstall(&RealFs, &install_dir).unwrap();
        assert!(!install_dir.exists());
    }

    #[test]
    fn is_idempotent_on_a_missing_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        let install_dir = dir.path().join("does-not-exist");
        uninstall(&RealFs, &install_dir).unwrap();
    }

    #[test]
    fn rejects_an_empty_path() {
        let result = uninstall(&RealFs, Path::new(""));
        assert!(result.is_err());
    }
}
