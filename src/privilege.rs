//! Privilege elevation (spec 4.7): re-execs the current binary under
//! `sudo` when a write to the install directory needs root, restricted
//! to a whitelist of operations that are actually allowed to ask for it.

use crate::error::UpdaterError;

/// Operations allowed to request elevation. Anything else asking for
/// root is a programming error, not a missing permission.
const ALLOWED_OPERATIONS: &[&str] = &["uninstall", "extract"];

#[must_use]
pub fn is_root() -> bool {
    rustix::process::geteuid().is_root()
}

/// Re-execs the current binary under `sudo -n` with `args`, after
/// checking `operation` against the whitelist. Idempotent: a no-op
/// returning `Ok(())` when already root.
///
/// On success this never returns — `exec` replaces the process image.
/// On failure it returns the reason instead of exiting, so the caller
/// can report it through the normal error path.
pub fn elevate_for_operation(operation: &str, args: &[String]) -> Result<(), UpdaterError> {
    if !ALLOWED_OPERATIONS.contains(&operation) {
        return Err(UpdaterError::PrivilegeFailure {
            reason: format!("operation '{operation}' is not whitelisted for elevation"),
        });
    }

    if is_root() {
        return Ok(());
    }

    elevate(args)
}

#[cfg(not(test))]
fn elevate(args: &[String]) -> Result<(), UpdaterError> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().map_err(|e| UpdaterError::PrivilegeFailure {
        reason: format!("failed to locate own executable: {e}"),
    })?;

    // `args` is the full argv including argv[0] (the program name), which
    // must not be re-passed as the first real argument to the re-exec'd
    // binary — clap would see it where it expects the first subcommand.
    let err = std::process::Command::new("sudo")
        .arg("-n")
        .arg("--")
        .arg(&exe)
        .args(args.get(1..).unwrap_or_default())
        .exec();

    // `exec` only returns on failure.
    Err(UpdaterError::PrivilegeFailure {
        reason: format!("failed to exec under sudo: {err}"),
    })
}

#[cfg(test)]
fn elevate(_args: &[String]) -> Result<(), UpdaterError> {
    // Never actually execs in tests; whitelist logic is what's under
    // test here, not the real re-exec.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_whitelisted_operations() {
        assert!(elevate_for_operation("uninstall", &[]).is_ok());
        assert!(elevate_for_operation("extract", &[]).is_ok());
    }

    #[test]
    fn rejects_non_whitelisted_operations() {
        let err = elevate_for_operation("download", &[]).unwrap_err();
        assert!(matches!(err, UpdaterError::PrivilegeFailure { .. }));
    }

    #[test]
    fn rejects_operation_with_injected_shell_metacharacters() {
        assert!(elevate_for_operation("uninstall; rm -rf /", &[]).is_err());
    }

    #[test]
    fn is_root_does_not_panic() {
        let _ = is_root();
    }
}
