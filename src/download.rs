//! Streams the selected archive to a throwaway temp directory while
//! hashing it, then verifies the digest (spec 4.5).

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::UpdaterError;
use crate::fs::FileSystem;
use crate::HttpClient;

/// Owns a temp directory and removes it on drop unless explicitly
/// released — the scoped-resource idiom spec 4.5/9 requires for
/// "cleanup on every exit path".
pub struct TempDirGuard<'a> {
    fs: &'a dyn FileSystem,
    path: Option<PathBuf>,
}

impl<'a> TempDirGuard<'a> {
    pub fn new(fs: &'a dyn FileSystem, path: PathBuf) -> Self {
        TempDirGuard { fs, path: Some(path) }
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().expect("TempDirGuard used after release")
    }

    /// Consumes the guard without removing the directory: used once the
    /// archive has been successfully consumed by extraction and the
    /// caller takes over cleanup, or to hand the directory to a
    /// privilege-elevated child process that outlives this guard.
    pub fn release(mut self) -> PathBuf {
        self.path.take().expect("TempDirGuard used after release")
    }
}

impl Drop for TempDirGuard<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = self.fs.remove_dir_all(&path) {
                log::warn!("failed to remove temp directory {}: {e}", path.display());
            }
        }
    }
}

pub struct DownloadOutcome {
    pub archive_path: PathBuf,
}

/// Downloads `url` into a fresh temp directory under `tmp_parent`,
/// verifying the running SHA-256 against `expected_sha256`.
///
/// On any failure the temp directory is removed before returning; on
/// success the caller owns the returned guard and is responsible for
/// removing it once extraction has consumed the archive.
pub async fn download_and_verify<'a>(
    client: &HttpClient,
    fs: &'a dyn FileSystem,
    url: &str,
    filename: &str,
    expected_sha256: &str,
    tmp_parent: &Path,
) -> Result<(TempDirGuard<'a>, DownloadOutcome), UpdaterError> {
    let tmp_dir = fs.make_temp_dir(tmp_parent, ".goup-download-")?;
    let guard = TempDirGuard::new(fs, tmp_dir.clone());

    let result = download_and_verify_into(client, &tmp_dir, url, filename, expected_sha256).await;
    match result {
        Ok(outcome) => Ok((guard, outcome)),
        Err(e) => {
            // `guard` drops here, removing the temp directory.
            Err(e)
        }
    }
}

async fn download_and_verify_into(
    client: &HttpClient,
    tmp_dir: &Path,
    url: &str,
    filename: &str,
    expected_sha256: &str,
) -> Result<DownloadOutcome, UpdaterError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| UpdaterError::NetworkFailure {
            url: url.to_string(),
            attempts: 1,
            source: e.into(),
        })?;

    if !response.status().is_success() {
        return Err(UpdaterError::NetworkFailure {
            url: url.to_string(),
            attempts: 1,
            source: anyhow::anyhow!("HTTP {}", response.status()),
        });
    }

    let archive_path = tmp_dir.join(filename);
    let mut file = std::fs::File::create(&archive_path).map_err(|e| UpdaterError::FilesystemFailure {
        op: "create",
        path: archive_path.clone(),
        source: e,
    })?;

    let progress = response
        .content_length()
        .map(indicatif::ProgressBar::new)
        .unwrap_or_else(indicatif::ProgressBar::new_spinner);
    progress.set_style(
        indicatif::ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    progress.set_message(filename.to_string());

    let mut hasher = Sha256::new();
    let mut response = response;
    loop {
        let chunk = response.chunk().await.map_err(|e| UpdaterError::NetworkFailure {
            url: url.to_string(),
            attempts: 1,
            source: e.into(),
        })?;
        let Some(chunk) = chunk else { break };
        hasher.update(&chunk);
        file.write_all(&chunk).map_err(|e| UpdaterError::FilesystemFailure {
            op: "write",
            path: archive_path.clone(),
            source: e,
        })?;
        progress.inc(chunk.len() as u64);
    }
    progress.finish_and_clear();
    drop(file);

    let actual = hex::encode(hasher.finalize());
    if !constant_time_eq(actual.as_bytes(), expected_sha256.as_bytes()) {
        return Err(UpdaterError::DigestMismatch {
            path: archive_path,
            expected: expected_sha256.to_string(),
            actual,
        });
    }

    Ok(DownloadOutcome { archive_path })
}

/// Compares two byte strings without early-exiting on the first
/// mismatch, per spec 4.5's "constant time" requirement.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
