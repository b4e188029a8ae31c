//! Fetches the JSON index of Go releases and selects the archive file
//! matching the running OS/architecture (spec 4.4).

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::UpdaterError;
use crate::{platform, version::GoVersion, HttpClient};

pub const INDEX_URL: &str = "https://go.dev/dl/?mode=json&include=all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseKind {
    Archive,
    Installer,
    Source,
}

impl ReleaseKind {
    fn from_dto(s: &str) -> ReleaseKind {
        match s {
            "installer" => ReleaseKind::Installer,
            "source" => ReleaseKind::Source,
            _ => ReleaseKind::Archive,
        }
    }
}

/// Immutable descriptor of one downloadable artifact (spec 3, Release
/// Record).
#[derive(Debug, Clone)]
pub struct ReleaseRecord {
    pub version: SmolStr,
    pub os: SmolStr,
    pub arch: SmolStr,
    pub filename: SmolStr,
    pub size: u64,
    pub sha256: SmolStr,
    pub kind: ReleaseKind,
}

#[derive(Debug, Deserialize)]
struct ReleaseDto {
    version: SmolStr,
    stable: bool,
    files: Vec<ReleaseFileDto>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFileDto {
    filename: SmolStr,
    os: SmolStr,
    arch: SmolStr,
    sha256: SmolStr,
    size: u64,
    kind: SmolStr,
}

/// The outcome of selecting an upgrade target: a canonical version, the
/// expected digest, byte length, and the URL to fetch it from.
pub struct SelectedRelease {
    pub version: GoVersion,
    pub url: String,
    pub sha256: SmolStr,
    pub size: u64,
}

async fn fetch_index_once(client: &HttpClient) -> Result<Vec<ReleaseDto>, anyhow::Error> {
    let response = client.get(INDEX_URL).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("index request returned HTTP {}", response.status());
    }
    let releases: Vec<ReleaseDto> = response.json().await?;
    Ok(releases)
}

/// Retries transient (network/5xx-shaped) failures with exponential
/// backoff; never retries on a successful-but-malformed response, since
/// that's a permanent error the spec says must fail immediately.
async fn fetch_index_with_retry(
    client: &HttpClient,
    max_retries: u32,
) -> Result<Vec<ReleaseDto>, UpdaterError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match fetch_index_once(client).await {
            Ok(dto) => return Ok(dto),
            Err(e) if attempt > max_retries => {
                return Err(UpdaterError::NetworkFailure {
                    url: INDEX_URL.to_string(),
                    attempts: attempt,
                    source: e,
                })
            }
            Err(_) => {
                let backoff = std::time::Duration::from_millis(200 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Fetches the index and returns the first `stable` release's archive
/// file matching the running OS/architecture.
pub async fn fetch_latest(client: &HttpClient, max_retries: u32) -> Result<SelectedRelease, UpdaterError> {
    let os = platform::current_os().ok_or_else(|| UpdaterError::InternalInvariant(
        "current OS has no known Go platform mapping".into(),
    ))?;
    let arch = platform::current_arch().ok_or_else(|| UpdaterError::InternalInvariant(
        "current architecture has no known Go platform mapping".into(),
    ))?;

    let releases = fetch_index_with_retry(client, max_retries).await?;

    let release = releases
        .iter()
        .find(|r| r.stable)
        .ok_or_else(|| UpdaterError::ArchiveInvalid {
            path: std::path::PathBuf::from(INDEX_URL),
            reason: "index contains no stable release".into(),
        })?;

    let file = release
        .files
        .iter()
        .find(|f| f.os == os && f.arch == arch && ReleaseKind::from_dto(&f.kind) == ReleaseKind::Archive)
        .ok_or_else(|| UpdaterError::ArchiveInvalid {
            path: std::path::PathBuf::from(INDEX_URL),
            reason: format!("no archive file for {os}/{arch} in release {}", release.version),
        })?;

    crate::validate::validate_archive_filename(&file.filename)?;

    let version = crate::version::parse(&release.version)?;

    Ok(SelectedRelease {
        version,
        url: format!("https://go.dev/dl/{}", file.filename),
        sha256: file.sha256.clone(),
        size: file.size,
    })
}
