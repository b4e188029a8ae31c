//! Archive extraction (spec 4.6): reads a `.tar.gz`, validates every
//! entry against the invariants in [`security`], enforces the resource
//! caps from [`crate::config::AppConfig`], and fans regular-file bodies
//! out to a small worker pool while directories, symlinks, and hard
//! links are applied directly by the reading thread.

mod security;
mod worker;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::read::GzDecoder;
use tar::EntryType;

use crate::config::AppConfig;
use crate::error::UpdaterError;
use crate::fs::FileSystem;

use worker::{CancelToken, WorkItem, WorkerPool};

/// Counts of what actually landed on disk, returned to the orchestrator
/// for its log line after a successful extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractionStats {
    pub files: u64,
    pub dirs: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
    pub skipped: u64,
    pub bytes_written: u64,
}

/// Extracts `archive_path` into `dest`, which must already exist (the
/// orchestrator creates it). Fails closed: any invariant violation or
/// resource-limit breach aborts the whole extraction, leaving a
/// partially-populated `dest` for the caller to clean up.
pub fn extract(
    fs: &dyn FileSystem,
    config: &AppConfig,
    archive_path: &Path,
    dest: &Path,
) -> Result<ExtractionStats, UpdaterError> {
    let file = File::open(archive_path).map_err(|e| UpdaterError::FilesystemFailure {
        op: "open",
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    let entries = archive.entries().map_err(|e| UpdaterError::ArchiveInvalid {
        path: archive_path.to_path_buf(),
        reason: format!("failed to read tar entries: {e}"),
    })?;

    let errors: Mutex<Vec<UpdaterError>> = Mutex::new(Vec::new());
    let mut stats = ExtractionStats::default();
    let mut file_count: u64 = 0;
    let mut total_bytes: u64 = 0;
    let buffer_bytes = config.extractor_buffer_bytes();
    let large_file_threshold = buffer_bytes as u64 * 2;

    let result = std::thread::scope(|scope| -> Result<(), UpdaterError> {
        let (pool, done_rx) = WorkerPool::spawn(
            scope,
            fs,
            config.extractor_workers,
            config.chmod_timeout_hard_fail,
            &errors,
        );
        let cancel = pool.cancel_token();

        let outcome = drive_entries(
            scope,
            fs,
            config,
            dest,
            entries,
            &pool,
            &cancel,
            buffer_bytes,
            large_file_threshold,
            &mut file_count,
            &mut total_bytes,
            &mut stats,
        );

        pool.finish();
        for _ in 0..config.extractor_workers.max(1) {
            let _ = done_rx.recv();
        }

        if let Some(worker_err) = errors.lock().unwrap().pop() {
            return Err(worker_err);
        }
        outcome
    });

    result?;
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn drive_entries<'scope, 'env, R: Read>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    fs: &'env dyn FileSystem,
    config: &AppConfig,
    dest: &Path,
    entries: tar::Entries<'_, R>,
    pool: &WorkerPool,
    cancel: &CancelToken,
    buffer_bytes: usize,
    large_file_threshold: u64,
    file_count: &mut u64,
    total_bytes: &mut u64,
    stats: &mut ExtractionStats,
) -> Result<(), UpdaterError>
where
    'env: 'scope,
{
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(UpdaterError::InternalInvariant(
                "extraction cancelled by a worker failure".into(),
            ));
        }

        let mut entry = entry.map_err(|e| UpdaterError::ArchiveInvalid {
            path: dest.to_path_buf(),
            reason: format!("failed to read next tar entry: {e}"),
        })?;

        let header_name = entry
            .path()
            .map_err(|e| UpdaterError::ArchiveInvalid {
                path: dest.to_path_buf(),
                reason: format!("entry has an unreadable path: {e}"),
            })?
            .to_string_lossy()
            .into_owned();

        *file_count += 1;
        if *file_count > config.max_files {
            return Err(UpdaterError::ResourceLimit {
                reason: format!("archive contains more than {} entries", config.max_files),
            });
        }

        let size = entry.header().size().unwrap_or(0);
        if size > config.max_file_size_bytes() {
            return Err(UpdaterError::ResourceLimit {
                reason: format!("entry '{header_name}' of {size} bytes exceeds the per-file cap"),
            });
        }
        *total_bytes += size;
        if *total_bytes > config.max_total_size_bytes() {
            return Err(UpdaterError::ResourceLimit {
                reason: "cumulative extracted size exceeds the configured cap".into(),
            });
        }

        let target = security::validated_target(dest, &header_name)?;
        security::check_no_escape_through_existing_symlink(fs, dest, &target, &header_name)?;

        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().unwrap_or(0o644);

        match entry_type {
            EntryType::Directory => {
                fs.create_dir_all(&target)?;
                fs.set_permissions(&target, mode)?;
                stats.dirs += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs.create_dir_all(parent)?;
                }
                if size > large_file_threshold {
                    stream_large_file(
                        scope,
                        fs,
                        &mut entry,
                        &target,
                        mode,
                        buffer_bytes,
                        config.chmod_timeout_hard_fail,
                    )?;
                } else {
                    stream_through_pool(&mut entry, &target, mode, size, pool, buffer_bytes)?;
                }
                stats.files += 1;
                stats.bytes_written += size;
            }
            EntryType::Symlink => {
                let linkname = entry
                    .link_name()
                    .map_err(|e| UpdaterError::ArchiveInvalid {
                        path: dest.to_path_buf(),
                        reason: format!("symlink entry '{header_name}' has an unreadable link name: {e}"),
                    })?
                    .ok_or_else(|| UpdaterError::ArchiveInvalid {
                        path: dest.to_path_buf(),
                        reason: format!("symlink entry '{header_name}' carries no link name"),
                    })?
                    .to_string_lossy()
                    .into_owned();

                let entry_dir = target.parent().unwrap_or(dest).to_path_buf();
                security::validated_link_target(fs, dest, &entry_dir, &target, &header_name, &linkname)?;
                if let Some(parent) = target.parent() {
                    fs.create_dir_all(parent)?;
                }
                fs.symlink(&PathBuf::from(linkname), &target)?;
                stats.symlinks += 1;
            }
            EntryType::Link => {
                let linkname = entry
                    .link_name()
                    .map_err(|e| UpdaterError::ArchiveInvalid {
                        path: dest.to_path_buf(),
                        reason: format!("hard link entry '{header_name}' has an unreadable link name: {e}"),
                    })?
                    .ok_or_else(|| UpdaterError::ArchiveInvalid {
                        path: dest.to_path_buf(),
                        reason: format!("hard link entry '{header_name}' carries no link name"),
                    })?
                    .to_string_lossy()
                    .into_owned();

                let entry_dir = target.parent().unwrap_or(dest).to_path_buf();
                let link_target =
                    security::validated_link_target(fs, dest, &entry_dir, &target, &header_name, &linkname)?;
                if let Some(parent) = target.parent() {
                    fs.create_dir_all(parent)?;
                }
                fs.hardlink(&link_target, &target)?;
                stats.hardlinks += 1;
            }
            _ => {
                // Device nodes, FIFOs, and anything else the spec has no
                // use for are silently skipped rather than rejected,
                // since real Go archives never contain them.
                stats.skipped += 1;
            }
        }
    }

    Ok(())
}

/// Streams a file whose size exceeds twice the configured buffer
/// directly from the producer thread, bypassing the worker pool: the
/// pool's per-chunk dispatch overhead isn't worth it once a single
/// entry would dominate every worker's queue anyway. Goes through `fs`
/// and the same deadline-guarded chmod the pool path uses, so a stuck
/// chmod on an oversized file (the `go` binary itself routinely lands
/// here) fails per policy instead of hanging extraction.
#[allow(clippy::too_many_arguments)]
fn stream_large_file<'scope, 'env, R: Read>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    fs: &'env dyn FileSystem,
    entry: &mut tar::Entry<'_, R>,
    target: &Path,
    mode: u32,
    buffer_bytes: usize,
    chmod_timeout_hard_fail: bool,
) -> Result<(), UpdaterError>
where
    'env: 'scope,
{
    let mut out = fs.create_file(target)?;
    let mut buf = vec![0u8; buffer_bytes.max(8192)];
    loop {
        let n = entry.read(&mut buf).map_err(|e| UpdaterError::FilesystemFailure {
            op: "read",
            path: target.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(|e| UpdaterError::FilesystemFailure {
            op: "write",
            path: target.to_path_buf(),
            source: e,
        })?;
    }
    out.flush().map_err(|e| UpdaterError::FilesystemFailure {
        op: "write",
        path: target.to_path_buf(),
        source: e,
    })?;
    drop(out);

    worker::apply_chmod_with_deadline(scope, fs, target, mode, chmod_timeout_hard_fail)
}

/// Chunks a regular file's body into `buffer_bytes`-sized [`WorkItem`]s
/// and sends them to the pool. `size` is the header's declared length,
/// used to tell the final chunk apart from an in-progress one without
/// having to peek past a full read — reading exactly one buffer's worth
/// is a common case and must not be mistaken for end-of-entry.
fn stream_through_pool<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    target: &Path,
    mode: u32,
    size: u64,
    pool: &WorkerPool,
    buffer_bytes: usize,
) -> Result<(), UpdaterError> {
    let mut buf = vec![0u8; buffer_bytes.max(8192)];
    let mut read_so_far: u64 = 0;

    if size == 0 {
        return pool.send(WorkItem {
            target: target.to_path_buf(),
            bytes: Vec::new(),
            mode,
            eof: true,
        });
    }

    loop {
        let n = entry.read(&mut buf).map_err(|e| UpdaterError::FilesystemFailure {
            op: "read",
            path: target.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        read_so_far += n as u64;
        let eof = read_so_far >= size;
        pool.send(WorkItem {
            target: target.to_path_buf(),
            bytes: buf[..n].to_vec(),
            mode,
            eof,
        })?;
        if eof {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RealFs;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &[u8], u32, EntryType, Option<&str>)]) -> Vec<u8> {
        let gz = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(gz);
        for &(name, data, mode, kind, link) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_mode(mode);
            header.set_size(data.len() as u64);
            header.set_entry_type(kind);
            if let Some(link) = link {
                header.set_link_name(link).unwrap();
            }
            header.set_cksum();
            builder.append(&header, data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extracts_regular_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("go.tar.gz");
        let bytes = build_archive(&[
            ("go/bin/", &[], 0o755, EntryType::Directory, None),
            ("go/bin/go", b"binary-contents", 0o755, EntryType::Regular, None),
            ("go/VERSION", b"go1.22.3\n", 0o644, EntryType::Regular, None),
        ]);
        std::fs::write(&archive_path, bytes).unwrap();

        let fs = RealFs;
        let config = AppConfig::default();
        let dest = dir.path().join("install");
        fs.create_dir_all(&dest).unwrap();

        let stats = extract(&fs, &config, &archive_path, &dest).unwrap();
        assert_eq!(stats.dirs, 1);
        assert_eq!(stats.files, 2);

        let go_bin = std::fs::read(dest.join("go/bin/go")).unwrap();
        assert_eq!(go_bin, b"binary-contents");
        let version = std::fs::read_to_string(dest.join("go/VERSION")).unwrap();
        assert_eq!(version, "go1.22.3\n");
    }

    #[test]
    fn rejects_archive_with_path_traversal_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("evil.tar.gz");
        let bytes = build_archive(&[("../../etc/passwd", b"pwned", 0o644, EntryType::Regular, None)]);
        std::fs::write(&archive_path, bytes).unwrap();

        let fs = RealFs;
        let config = AppConfig::default();
        let dest = dir.path().join("install");
        fs.create_dir_all(&dest).unwrap();

        let result = extract(&fs, &config, &archive_path, &dest);
        assert!(result.is_err());
    }

    #[test]
    fn large_file_bypasses_the_worker_pool_but_still_lands_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("go.tar.gz");
        let mut config = AppConfig::default();
        config.extractor_buffer_mib = 1;
        let payload = vec![7u8; (config.extractor_buffer_bytes() * 3)];
        let bytes = build_archive(&[("go/pkg/big.a", &payload, 0o644, EntryType::Regular, None)]);
        std::fs::write(&archive_path, bytes).unwrap();

        let fs = RealFs;
        let dest = dir.path().join("install");
        fs.create_dir_all(&dest).unwrap();

        let stats = extract(&fs, &config, &archive_path, &dest).unwrap();
        assert_eq!(stats.files, 1);
        let written = std::fs::read(dest.join("go/pkg/big.a")).unwrap();
        assert_eq!(written.len(), payload.len());
    }

    #[test]
    fn extracts_against_an_in_memory_filesystem() {
        use crate::fs::test_support::MemFs;

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("go.tar.gz");
        let bytes = build_archive(&[
            ("go/bin/", &[], 0o755, EntryType::Directory, None),
            ("go/bin/go", b"binary-contents", 0o755, EntryType::Regular, None),
        ]);
        std::fs::write(&archive_path, bytes).unwrap();

        let fs = MemFs::new();
        let config = AppConfig::default();
        let dest = PathBuf::from("/opt/go");
        fs.create_dir_all(&dest).unwrap();

        let stats = extract(&fs, &config, &archive_path, &dest).unwrap();
        assert_eq!(stats.dirs, 1);
        assert_eq!(stats.files, 1);
        assert_eq!(
            fs.file_contents(&dest.join("go/bin/go")).unwrap(),
            b"binary-contents"
        );
    }
}
