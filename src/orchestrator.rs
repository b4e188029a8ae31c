//! Drives the end-to-end update state machine (spec 4.10): probe, fetch,
//! compare, download, elevate+uninstall, elevate+extract, verify.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{OrchestratorError, Phase, UpdaterError};
use crate::fs::FileSystem;
use crate::prompt::Confirm;
use crate::version::GoVersion;
use crate::HttpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoOp,
    FreshInstall,
    Upgrade,
}

pub struct UpdateOptions {
    pub install_dir: PathBuf,
    pub auto_install: bool,
    pub assume_yes: bool,
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub decision: Decision,
    pub installed: Option<GoVersion>,
    pub latest: GoVersion,
}

/// Probes `install_dir`, consulting the Index Client and Version
/// Arithmetic to decide whether an update is needed, then executes it.
/// Every failing step is wrapped in an [`OrchestratorError`] carrying
/// the phase it happened in.
pub async fn run_update(
    fs: &dyn FileSystem,
    client: &HttpClient,
    config: &AppConfig,
    prompt: &dyn Confirm,
    options: &UpdateOptions,
) -> Result<UpdateOutcome, OrchestratorError> {
    let installed = probe_installed(&options.install_dir)
        .await
        .map_err(|e| OrchestratorError::new(Phase::Check, "probe install directory", e))?;

    if installed.is_none() && !options.auto_install {
        return Err(OrchestratorError::new(
            Phase::Check,
            "probe install directory",
            UpdaterError::NotInstalled {
                path: options.install_dir.clone(),
            },
        ));
    }

    let selected = crate::index::fetch_latest(client, config.http_retries)
        .await
        .map_err(|e| OrchestratorError::new(Phase::Check, "fetch latest release", e))?;
    let latest = selected.version.clone();

    let decision = decide(installed.as_ref(), &latest);

    if decision == Decision::NoOp {
        return Ok(UpdateOutcome {
            decision,
            installed,
            latest,
        });
    }

    // Any decision reaching this point (fresh install or upgrade) needs
    // confirmation unless the caller already opted in, including the
    // auto-install fresh-install case that would otherwise start an
    // installation the user never explicitly asked for.
    if !options.assume_yes {
        let message = match decision {
            Decision::Upgrade => format!(
                "Replace installed Go {} with {}?",
                installed.as_ref().unwrap(),
                latest
            ),
            _ => format!("Install Go {latest}?"),
        };
        if !prompt.confirm(&message) {
            return Ok(UpdateOutcome {
                decision: Decision::NoOp,
                installed,
                latest,
            });
        }
    }

    // Elevate before downloading anything: on a non-root process `exec`
    // replaces the process image and never returns on success, which
    // would otherwise skip the downloaded archive's `TempDirGuard::drop`
    // and leak its temp directory on every elevation-requiring run.
    let exe_args = std::env::args().collect::<Vec<_>>();
    if installed.is_some() {
        crate::privilege::elevate_for_operation("uninstall", &exe_args)
            .map_err(|e| OrchestratorError::new(Phase::Uninstall, "elevate for uninstall", e))?;
    }
    crate::privilege::elevate_for_operation("extract", &exe_args)
        .map_err(|e| OrchestratorError::new(Phase::Install, "elevate for extract", e))?;

    let tmp_parent = std::env::temp_dir();
    let (guard, download) = crate::download::download_and_verify(
        client,
        fs,
        &selected.url,
        &archive_filename(&selected.url),
        &selected.sha256,
        &tmp_parent,
    )
    .await
    .map_err(|e| OrchestratorError::new(Phase::Download, "download and verify archive", e))?;

    if installed.is_some() {
        crate::uninstall::uninstall(fs, &options.install_dir)
            .map_err(|e| OrchestratorError::new(Phase::Uninstall, "remove existing install directory", e))?;
    }

    fs.create_dir_all(&options.install_dir)
        .map_err(|e| OrchestratorError::new(Phase::Install, "create install directory", e))?;
    let archive_path = download.archive_path.clone();
    let install_dir = options.install_dir.clone();
    let config_owned = config.clone();
    crate::spawn_blocking(move || {
        let fs = crate::fs::RealFs;
        crate::extract::extract(&fs, &config_owned, &archive_path, &install_dir)
            .map(|_stats| ())
            .map_err(anyhow::Error::from)
    })
    .await
    .map_err(|e| {
        OrchestratorError::new(
            Phase::Install,
            "extract archive",
            UpdaterError::InternalInvariant(e.to_string()),
        )
    })?;

    crate::verify::verify(&options.install_dir, &latest)
        .await
        .map_err(|e| OrchestratorError::new(Phase::Verify, "verify installed version", e))?;

    drop(guard);

    Ok(UpdateOutcome {
        decision,
        installed,
        latest,
    })
}

fn decide(installed: Option<&GoVersion>, latest: &GoVersion) -> Decision {
    match installed {
        None => Decision::FreshInstall,
        Some(v) if v >= latest => Decision::NoOp,
        Some(_) => Decision::Upgrade,
    }
}

/// Installation State (spec 3): `<dir>/bin/go` exists and its `go
/// version` output parses, or the state is absent.
async fn probe_installed(install_dir: &Path) -> Result<Option<GoVersion>, UpdaterError> {
    let go_bin = install_dir.join("bin").join(crate::platform::exe_name("go"));
    if !go_bin.exists() {
        return Ok(None);
    }

    let output = tokio::process::Command::new(&go_bin)
        .arg("version")
        .output()
        .await
        .map_err(|e| UpdaterError::VerificationFailure {
            reason: format!("failed to run '{}': {e}", go_bin.display()),
        })?;
    if !output.status.success() {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let token = stdout
        .split_whitespace()
        .nth(2)
        .ok_or_else(|| UpdaterError::VerificationFailure {
            reason: format!("could not parse version from output: '{}'", stdout.trim()),
        })?;
    Ok(Some(crate::version::parse(token)?))
}

fn archive_filename(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}
