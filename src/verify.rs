//! Confirms an installed toolchain reports the version we just put
//! there (spec 4.9), by actually running `go version` rather than
//! trusting the archive's own metadata.

use std::path::Path;

use crate::error::UpdaterError;
use crate::platform;
use crate::version::GoVersion;

/// Runs `<install_dir>/bin/go version` and checks the reported version
/// against `expected`. Distinguishes four ways this can fail: the
/// binary isn't there, it couldn't be executed, its output doesn't
/// parse, or it parses to the wrong version.
pub async fn verify(install_dir: &Path, expected: &GoVersion) -> Result<(), UpdaterError> {
    let go_bin = install_dir.join("bin").join(platform::exe_name("go"));

    if !go_bin.exists() {
        return Err(UpdaterError::VerificationFailure {
            reason: format!("'{}' does not exist", go_bin.display()),
        });
    }

    let output = tokio::process::Command::new(&go_bin)
        .arg("version")
        .output()
        .await
        .map_err(|e| UpdaterError::VerificationFailure {
            reason: format!("failed to run '{}': {e}", go_bin.display()),
        })?;

    if !output.status.success() {
        return Err(UpdaterError::VerificationFailure {
            reason: format!("'{}' exited with {}", go_bin.display(), output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let reported = parse_go_version_output(&stdout).ok_or_else(|| UpdaterError::VerificationFailure {
        reason: format!("could not parse version from output: '{}'", stdout.trim()),
    })?;

    let reported = crate::version::parse(&reported)?;
    if reported.canonical() != expected.canonical() {
        return Err(UpdaterError::VerificationFailure {
            reason: format!(
                "installed toolchain reports {} but {} was expected",
                reported.canonical(),
                expected.canonical()
            ),
        });
    }

    Ok(())
}

/// `go version` prints `go version goX.Y.Z os/arch`; the version token
/// is always the third whitespace-separated field.
fn parse_go_version_output(output: &str) -> Option<String> {
    output.split_whitespace().nth(2).map(str::to_string)
}
