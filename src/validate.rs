//! Pure, side-effect-free input checks. Inputs are rejected, never
//! sanitized — callers must not try to repair what fails here.

use crate::error::UpdaterError;

const MAX_VERSION_LEN: usize = 256;
const MAX_PATH_LEN: usize = 4096;

fn fail(input: impl Into<String>, reason: impl Into<String>) -> UpdaterError {
    UpdaterError::VersionParseFailure {
        input: input.into(),
        reason: reason.into(),
    }
}

/// Checks a raw version string against spec 4.2: non-empty, length bound,
/// no control characters, `go` prefix, and a semver-shaped remainder.
pub fn validate_version_string(s: &str) -> Result<(), UpdaterError> {
    if s.is_empty() {
        return Err(fail(s, "empty version string"));
    }
    if s.len() > MAX_VERSION_LEN {
        return Err(fail(s, "version string too long"));
    }
    if s.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
        return Err(fail(s, "version string contains control characters"));
    }
    let Some(rest) = s.strip_prefix("go") else {
        return Err(fail(s, "version string must begin with 'go'"));
    };
    if rest.is_empty() {
        return Err(fail(s, "version string has no numeric body"));
    }
    let semver_form = format!("v{rest}");
    crate::version::parse_semver(&semver_form)
        .map(|_| ())
        .map_err(|reason| fail(s, reason))
}

/// Checks a path component against spec 4.2: non-empty, length bound,
/// no `..`, NUL, or backslash, and (when `must_be_relative`) not absolute.
pub fn validate_file_path(path: &str, must_be_relative: bool) -> Result<(), UpdaterError> {
    if path.is_empty() {
        return Err(fail(path, "empty path"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(fail(path, "path too long"));
    }
    if path.contains('\0') {
        return Err(fail(path, "path contains NUL"));
    }
    if path.contains('\\') {
        return Err(fail(path, "path contains backslash"));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(fail(path, "path contains '..' segment"));
    }
    if must_be_relative && path.starts_with('/') {
        return Err(fail(path, "path must not be absolute"));
    }
    Ok(())
}

/// Checks an archive filename against spec 4.2: `go` prefix, `.tar.gz`
/// suffix, and a `-` separating the version from the platform tokens.
pub fn validate_archive_filename(name: &str) -> Result<(), UpdaterError> {
    if !name.starts_with("go") {
        return Err(fail(name, "archive filename must start with 'go'"));
    }
    let Some(body) = name.strip_suffix(".tar.gz") else {
        return Err(fail(name, "archive filename must end with '.tar.gz'"));
    };
    if !body.contains('-') {
        return Err(fail(
            name,
            "archive filename must separate version and platform with '-'",
        ));
    }
    Ok(())
}

/// Applies the same restrictions as [`validate_file_path`] to a tar
/// header name, before the name is used for any I/O.
pub fn validate_tar_header_name(name: &str) -> Result<(), UpdaterError> {
    validate_file_path(name, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_version() {
        assert!(validate_version_string("go1.22.3").is_ok());
        assert!(validate_version_string("go1.22.3-beta1").is_ok());
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(validate_version_string("1.22.3").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_version_string("go1.22.3\n").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate_version_string("").is_err());
    }

    #[test]
    fn path_rejects_traversal() {
        assert!(validate_file_path("a/../b", true).is_err());
        assert!(validate_file_path("..", true).is_err());
    }

    #[test]
    fn path_rejects_backslash_and_nul() {
        assert!(validate_file_path("a\\b", true).is_err());
        assert!(validate_file_path("a\0b", true).is_err());
    }

    #[test]
    fn path_rejects_absolute_when_required_relative() {
        assert!(validate_file_path("/etc/passwd", true).is_err());
        assert!(validate_file_path("/etc/passwd", false).is_ok());
    }

    #[test]
    fn archive_filename_rules() {
        assert!(validate_archive_filename("go1.22.3.linux-amd64.tar.gz").is_ok());
        assert!(validate_archive_filename("node1.22.3.linux-amd64.tar.gz").is_err());
        assert!(validate_archive_filename("go1.22.3.linux-amd64.zip").is_err());
        assert!(validate_archive_filename("go.tar.gz").is_err());
    }
}
