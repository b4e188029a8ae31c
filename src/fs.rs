//! The narrow filesystem/process capability set the core depends on.
//!
//! Extraction and orchestration never call `std::fs` directly; they go
//! through [`FileSystem`] so tests can substitute [`MemFs`] without
//! touching the host disk. The production binary wires [`RealFs`].

use std::path::{Path, PathBuf};

use crate::error::UpdaterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
    Symlink,
    Other,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub file_type: FileType,
    pub len: u64,
    pub mode: u32,
}

/// Capability set covering stat/lstat, read/write, directory and link
/// management, and temp-directory creation. One error kind for all of
/// it, carrying the failing path and operation (spec 4.1).
pub trait FileSystem: Send + Sync {
    fn stat(&self, path: &Path) -> Result<Metadata, UpdaterError>;
    fn lstat(&self, path: &Path) -> Result<Metadata, UpdaterError>;
    fn is_not_found(&self, err: &UpdaterError) -> bool;

    fn create_dir_all(&self, path: &Path) -> Result<(), UpdaterError>;
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), UpdaterError>;
    fn remove_dir_all(&self, path: &Path) -> Result<(), UpdaterError>;
    fn make_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf, UpdaterError>;

    fn read_to_string(&self, path: &Path) -> Result<String, UpdaterError>;
    fn write_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), UpdaterError>;

    /// Opens `path` for streamed writes, truncating any existing file.
    /// The extractor's worker pool and large-file path write through
    /// this instead of `std::fs` directly, so both are exercisable
    /// against an in-memory filesystem in tests.
    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>, UpdaterError>;

    fn symlink(&self, target: &Path, link: &Path) -> Result<(), UpdaterError>;
    fn hardlink(&self, target: &Path, link: &Path) -> Result<(), UpdaterError>;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, UpdaterError>;

    fn home_dir(&self) -> Option<PathBuf>;
}

/// The real, OS-backed implementation. Production wiring uses this;
/// everything else (extractor, uninstaller, verifier) is generic over
/// `dyn FileSystem` so it never has to be rewritten for tests.
pub struct RealFs;

fn fail(op: &'static str, path: &Path, source: std::io::Error) -> UpdaterError {
    UpdaterError::FilesystemFailure {
        op,
        path: path.to_path_buf(),
        source,
    }
}

fn metadata_of(meta: std::fs::Metadata) -> Metadata {
    let file_type = if meta.is_dir() {
        FileType::Dir
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else if meta.is_file() {
        FileType::File
    } else {
        FileType::Other
    };

    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o777
    };
    #[cfg(not(unix))]
    let mode = 0o644;

    Metadata {
        file_type,
        len: meta.len(),
        mode,
    }
}

impl FileSystem for RealFs {
    fn stat(&self, path: &Path) -> Result<Metadata, UpdaterError> {
        std::fs::metadata(path)
            .map(metadata_of)
            .map_err(|e| fail("stat", path, e))
    }

    fn lstat(&self, path: &Path) -> Result<Metadata, UpdaterError> {
        std::fs::symlink_metadata(path)
            .map(metadata_of)
            .map_err(|e| fail("lstat", path, e))
    }

    fn is_not_found(&self, err: &UpdaterError) -> bool {
        matches!(err, UpdaterError::FilesystemFailure { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), UpdaterError> {
        std::fs::create_dir_all(path).map_err(|e| fail("create_dir_all", path, e))
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<(), UpdaterError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                .map_err(|e| fail("set_permissions", path, e))
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            Ok(())
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), UpdaterError> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fail("remove_dir_all", path, e)),
        }
    }

    fn make_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf, UpdaterError> {
        self.create_dir_all(parent)?;
        for attempt in 0..64u32 {
            let candidate = parent.join(format!("{prefix}{}-{attempt}", std::process::id()));
            match std::fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(fail("make_temp_dir", &candidate, e)),
            }
        }
        Err(UpdaterError::InternalInvariant(
            "exhausted temp directory name attempts".into(),
        ))
    }

    fn read_to_string(&self, path: &Path) -> Result<String, UpdaterError> {
        std::fs::read_to_string(path).map_err(|e| fail("read_to_string", path, e))
    }

    fn write_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), UpdaterError> {
        std::fs::write(path, contents).map_err(|e| fail("write_file", path, e))?;
        self.set_permissions(path, mode)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>, UpdaterError> {
        let file = std::fs::File::create(path).map_err(|e| fail("create", path, e))?;
        Ok(Box::new(file))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<(), UpdaterError> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link).map_err(|e| fail("symlink", link, e))
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::symlink_file(target, link).map_err(|e| fail("symlink", link, e))
        }
    }

    fn hardlink(&self, target: &Path, link: &Path) -> Result<(), UpdaterError> {
        std::fs::hard_link(target, link).map_err(|e| fail("hardlink", link, e))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, UpdaterError> {
        std::fs::canonicalize(path).map_err(|e| fail("canonicalize", path, e))
    }

    fn home_dir(&self) -> Option<PathBuf> {
        directories::UserDirs::new().map(|d| d.home_dir().to_path_buf())
    }
}

#[cfg(test)]
pub mod test_support {
    //! A minimal in-memory stand-in, used only by unit tests that need
    //! to exercise `FileSystem`-consuming code without touching disk.
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct MemFs {
        dirs: Mutex<HashMap<PathBuf, ()>>,
        files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    }

    impl MemFs {
        pub fn new() -> Self {
            Self::default()
        }

        /// Returns the bytes written to `path` via [`FileSystem::create_file`]
        /// or [`FileSystem::write_file`], if any.
        pub fn file_contents(&self, path: &Path) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }
    }

    struct MemFileHandle {
        path: PathBuf,
        store: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    }

    impl std::io::Write for MemFileHandle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.store.lock().unwrap().entry(self.path.clone()).or_default().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl FileSystem for MemFs {
        fn stat(&self, path: &Path) -> Result<Metadata, UpdaterError> {
            self.lstat(path)
        }
        fn lstat(&self, path: &Path) -> Result<Metadata, UpdaterError> {
            if self.dirs.lock().unwrap().contains_key(path) {
                Ok(Metadata {
                    file_type: FileType::Dir,
                    len: 0,
                    mode: 0o755,
                })
            } else if let Some(contents) = self.files.lock().unwrap().get(path) {
                Ok(Metadata {
                    file_type: FileType::File,
                    len: contents.len() as u64,
                    mode: 0o644,
                })
            } else {
                Err(fail(
                    "lstat",
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                ))
            }
        }
        fn is_not_found(&self, err: &UpdaterError) -> bool {
            matches!(err, UpdaterError::FilesystemFailure { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
        }
        fn create_dir_all(&self, path: &Path) -> Result<(), UpdaterError> {
            self.dirs.lock().unwrap().insert(path.to_path_buf(), ());
            Ok(())
        }
        fn set_permissions(&self, _path: &Path, _mode: u32) -> Result<(), UpdaterError> {
            Ok(())
        }
        fn remove_dir_all(&self, path: &Path) -> Result<(), UpdaterError> {
            self.dirs.lock().unwrap().remove(path);
            Ok(())
        }
        fn make_temp_dir(&self, parent: &Path, prefix: &str) -> Result<PathBuf, UpdaterError> {
            let p = parent.join(format!("{prefix}0"));
            self.create_dir_all(&p)?;
            Ok(p)
        }
        fn read_to_string(&self, _path: &Path) -> Result<String, UpdaterError> {
            Err(UpdaterError::InternalInvariant("MemFs has no files".into()))
        }
        fn write_file(&self, path: &Path, _mode: u32, contents: &[u8]) -> Result<(), UpdaterError> {
            self.files.lock().unwrap().insert(path.to_path_buf(), contents.to_vec());
            Ok(())
        }

        fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>, UpdaterError> {
            self.files.lock().unwrap().insert(path.to_path_buf(), Vec::new());
            Ok(Box::new(MemFileHandle {
                path: path.to_path_buf(),
                store: self.files.clone(),
            }))
        }
        fn symlink(&self, _target: &Path, _link: &Path) -> Result<(), UpdaterError> {
            Ok(())
        }
        fn hardlink(&self, _target: &Path, _link: &Path) -> Result<(), UpdaterError> {
            Ok(())
        }
        fn canonicalize(&self, path: &Path) -> Result<PathBuf, UpdaterError> {
            Ok(path.to_path_buf())
        }
        fn home_dir(&self) -> Option<PathBuf> {
            None
        }
    }
}
