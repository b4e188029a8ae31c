//! The five per-entry security invariants from spec 4.6, checked before
//! any byte of the entry is written.

use std::path::{Component, Path, PathBuf};

use crate::error::UpdaterError;
use crate::fs::FileSystem;
use crate::validate;

/// Absolute-path prefixes a symlink/hardlink target must never resolve
/// into, even after joining with the entry's base directory. Unix-only
/// by construction (spec's Open Question): harmless on Windows, where
/// none of these prefixes exist.
const SENSITIVE_PREFIXES: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/dev", "/proc", "/sys", "/root", "/home",
];

/// Lexically normalizes a path: resolves `.` and collapses repeated
/// separators without touching the filesystem. Callers have already
/// rejected `..` segments via [`validate::validate_tar_header_name`],
/// so this never needs to pop a component.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::RootDir => out.push(component.as_os_str()),
            Component::Prefix(_) => out.push(component.as_os_str()),
            Component::ParentDir => {
                // Unreachable given upstream validation, but handled
                // defensively rather than panicking on malformed input.
                out.pop();
            }
        }
    }
    out
}

fn traversal(entry: &str, reason: impl Into<String>) -> UpdaterError {
    UpdaterError::PathTraversal {
        entry: entry.to_string(),
        reason: reason.into(),
    }
}

/// Invariants 1-3: the header name validates as a path, and the cleaned
/// join of `dest` and the header name stays within `dest`.
pub fn validated_target(dest: &Path, header_name: &str) -> Result<PathBuf, UpdaterError> {
    validate::validate_tar_header_name(header_name)
        .map_err(|_| traversal(header_name, "header name fails path validation"))?;

    let dest_clean = clean(dest);
    let target = clean(&dest_clean.join(header_name));

    if target != dest_clean && !target.starts_with(&dest_clean) {
        return Err(traversal(header_name, "resolved path escapes destination"));
    }

    let rel = target
        .strip_prefix(&dest_clean)
        .map_err(|_| traversal(header_name, "failed to compute relative path"))?;
    if rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(traversal(header_name, "relative path begins with '..'"));
    }

    Ok(target)
}

/// Invariant 4: if `target` already exists, its resolved (symlink-
/// followed) real path must still lie within `dest`. Defends against an
/// archive that plants `a -> /etc` and then writes through `a/passwd`.
pub fn check_no_escape_through_existing_symlink(
    fs: &dyn FileSystem,
    dest: &Path,
    target: &Path,
    header_name: &str,
) -> Result<(), UpdaterError> {
    match fs.canonicalize(target) {
        Ok(resolved) => {
            let dest_resolved = fs.canonicalize(dest).unwrap_or_else(|_| dest.to_path_buf());
            if resolved != dest_resolved && !resolved.starts_with(&dest_resolved) {
                return Err(traversal(
                    header_name,
                    "existing path resolves outside destination through a symlink",
                ));
            }
            Ok(())
        }
        Err(e) if fs.is_not_found(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Invariant 5: validates a symlink/hardlink's `linkname`.
///
/// `entry_dir` is the already-validated parent directory of the entry
/// itself (so a relative linkname is resolved the way the archive
/// author intended it).
pub fn validated_link_target(
    fs: &dyn FileSystem,
    dest: &Path,
    entry_dir: &Path,
    entry_target: &Path,
    header_name: &str,
    linkname: &str,
) -> Result<PathBuf, UpdaterError> {
    if linkname.is_empty() {
        return Err(traversal(header_name, "empty link target"));
    }
    if linkname.starts_with('/') {
        return Err(traversal(header_name, "link target must be relative"));
    }
    if linkname.contains('\\') || linkname.contains('\0') {
        return Err(traversal(header_name, "link target contains backslash or NUL"));
    }
    if linkname.split('/').any(|seg| seg == "..") {
        return Err(traversal(header_name, "link target contains '..' segment"));
    }

    let dest_clean = clean(dest);
    let joined = clean(&entry_dir.join(linkname));
    if joined != dest_clean && !joined.starts_with(&dest_clean) {
        return Err(traversal(header_name, "link target escapes destination"));
    }

    // A link whose target resolves to its own not-yet-created path (e.g.
    // `a -> a`) can't be caught by the existing-symlink chain check below
    // since `lstat` on it returns `NotFound` before the entry is written.
    // Reject it directly instead.
    if joined == clean(entry_target) {
        return Err(traversal(header_name, "link target resolves to itself"));
    }

    let joined_str = joined.to_string_lossy();
    for prefix in SENSITIVE_PREFIXES {
        if joined_str.as_ref() == *prefix || joined_str.starts_with(&format!("{prefix}/")) {
            return Err(traversal(
                header_name,
                format!("link target falls under sensitive path '{prefix}'"),
            ));
        }
    }

    // If the joined path already exists as a symlink, follow the chain
    // and require the final target still lie within `dest`.
    if let Ok(meta) = fs.lstat(&joined) {
        if matches!(meta.file_type, crate::fs::FileType::Symlink) {
            check_no_escape_through_existing_symlink(fs, dest, &joined, header_name)?;
        }
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::test_support::MemFs;

    #[test]
    fn rejects_absolute_header_name() {
        let dest = Path::new("/opt/go");
        assert!(validated_target(dest, "/etc/passwd").is_err());
    }

    #[test]
    fn rejects_dotdot_header_name() {
        let dest = Path::new("/opt/go");
        assert!(validated_target(dest, "../../etc/passwd").is_err());
    }

    #[test]
    fn accepts_well_formed_relative_entry() {
        let dest = Path::new("/opt/go");
        let target = validated_target(dest, "bin/go").unwrap();
        assert_eq!(target, PathBuf::from("/opt/go/bin/go"));
    }

    #[test]
    fn self_referential_symlink_is_rejected_by_link_rules() {
        // `a -> a`: the link's own not-yet-created path and its resolved
        // target are the same path.
        let fs = MemFs::new();
        let dest = Path::new("/opt/go");
        let entry_target = dest.join("a");
        let err = validated_link_target(&fs, dest, dest, &entry_target, "a", "a").unwrap_err();
        assert!(matches!(err, UpdaterError::PathTraversal { .. }));
    }

    #[test]
    fn rejects_link_target_under_sensitive_prefix() {
        let fs = MemFs::new();
        let dest = Path::new("/opt/go");
        let entry_target = dest.join("a");
        assert!(validated_link_target(&fs, dest, dest, &entry_target, "a", "../../../etc/shadow").is_err());
    }

    #[test]
    fn rejects_absolute_link_target() {
        let fs = MemFs::new();
        let dest = Path::new("/opt/go");
        let entry_target = dest.join("a");
        assert!(validated_link_target(&fs, dest, dest, &entry_target, "a", "/etc/passwd").is_err());
    }
}
