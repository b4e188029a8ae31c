//! Version arithmetic: parsing Go version tags across the three accepted
//! input shapes (`goX.Y.Z`, `vX.Y.Z`, `X.Y.Z`) and comparing them.
//!
//! Go doesn't publish strict semver (`go1.22` has no patch component,
//! and pre-releases read `go1.23rc1` rather than `go1.23.0-rc.1`), so
//! normalization happens before handing the string to [`semver::Version`].

use std::cmp::Ordering;

use smol_str::SmolStr;

use crate::error::UpdaterError;

/// A parsed, comparable Go version. Total order: antisymmetric,
/// transitive, reflexive, by construction of `semver::Version`'s `Ord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoVersion {
    raw: SmolStr,
    semver: semver::Version,
}

impl GoVersion {
    /// Canonical `goX.Y.Z[-pre][+build]` form.
    pub fn canonical(&self) -> SmolStr {
        if self.raw.starts_with("go") {
            self.raw.clone()
        } else {
            SmolStr::from(format!("go{}", self.raw))
        }
    }

    pub fn as_semver(&self) -> &semver::Version {
        &self.semver
    }
}

impl std::fmt::Display for GoVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl PartialOrd for GoVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GoVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.semver.cmp(&other.semver)
    }
}

/// Strips an optional `go`/`v` prefix, normalizes Go's non-standard
/// `X.Y` (no patch) and `rcN`/`betaN` (no separator) pre-release forms,
/// then parses with `semver`. Shared by [`parse`] and by the validator
/// that only needs a yes/no answer.
pub fn parse_semver(input: &str) -> Result<semver::Version, String> {
    let body = input.strip_prefix('v').unwrap_or(input);
    if body.is_empty() {
        return Err("empty version body".into());
    }

    // Split the dotted numeric prefix from any trailing pre-release tag.
    // Go writes `1.23rc1` / `1.23beta1`; semver wants `1.23.0-rc.1`.
    let split_at = body
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(body.len());
    let (numeric, tag) = body.split_at(split_at);

    let mut parts = numeric.split('.');
    let major = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or("missing major version component")?
        .parse::<u64>()
        .map_err(|e| format!("invalid major version: {e}"))?;
    let minor = match parts.next() {
        Some(s) if !s.is_empty() => s.parse::<u64>().map_err(|e| format!("invalid minor version: {e}"))?,
        _ => 0,
    };
    let patch = match parts.next() {
        Some(s) if !s.is_empty() => s.parse::<u64>().map_err(|e| format!("invalid patch version: {e}"))?,
        _ => 0,
    };
    if parts.next().is_some() {
        return Err("too many dotted version components".into());
    }

    let pre = if tag.is_empty() {
        String::new()
    } else {
        normalize_prerelease(tag)?
    };

    let mut rendered = format!("{major}.{minor}.{patch}");
    if !pre.is_empty() {
        rendered.push('-');
        rendered.push_str(&pre);
    }

    semver::Version::parse(&rendered).map_err(|e| format!("not valid semver ({rendered}): {e}"))
}

/// Turns Go's `beta1` / `rc2` (and semver's own `-beta.1` / `+build`)
/// into semver pre-release identifiers.
fn normalize_prerelease(tag: &str) -> Result<String, String> {
    if let Some(rest) = tag.strip_prefix('-') {
        // Already semver-shaped (`-beta.1`, `-rc.2+build`).
        return Ok(rest.to_string());
    }
    for kind in ["beta", "rc"] {
        if let Some(num) = tag.strip_prefix(kind) {
            if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("missing or invalid number after '{kind}' in '{tag}'"));
            }
            return Ok(format!("{kind}.{num}"));
        }
    }
    Err(format!("unrecognized pre-release tag '{tag}'"))
}

/// Parses any of `goX.Y.Z`, `vX.Y.Z`, `X.Y.Z` into a [`GoVersion`].
pub fn parse(input: &str) -> Result<GoVersion, UpdaterError> {
    let body = input.strip_prefix("go").unwrap_or(input);
    let semver_input = if body.starts_with('v') {
        body.to_string()
    } else {
        format!("v{body}")
    };
    let semver = parse_semver(&semver_input).map_err(|reason| UpdaterError::VersionParseFailure {
        input: input.to_string(),
        reason,
    })?;
    Ok(GoVersion {
        raw: SmolStr::from(input),
        semver,
    })
}

/// Three-way comparison per spec 4.3: `<`, `=`, `>`. A parse failure on
/// either side is fatal for the caller's update decision, never a
/// silent upgrade.
pub fn compare(a: &str, b: &str) -> Result<Ordering, UpdaterError> {
    Ok(parse(a)?.cmp(&parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_shapes() {
        assert_eq!(parse("go1.22.3").unwrap().canonical(), "go1.22.3");
        assert_eq!(parse("v1.22.3").unwrap().canonical(), "go1.22.3");
        assert_eq!(parse("1.22.3").unwrap().canonical(), "go1.22.3");
    }

    #[test]
    fn missing_trailing_components_are_zero() {
        let a = parse("go1.22").unwrap();
        let b = parse("go1.22.0").unwrap();
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn prerelease_orders_before_release() {
        let beta = parse("go1.23beta1").unwrap();
        let rc = parse("go1.23rc1").unwrap();
        let release = parse("go1.23.0").unwrap();
        assert!(beta < rc);
        assert!(rc < release);
    }

    #[test]
    fn comparator_is_total_order() {
        let versions = ["go1.20.0", "go1.21.5", "go1.22.0", "go1.22.1"];
        for w in versions.windows(2) {
            assert_eq!(compare(w[0], w[1]).unwrap(), Ordering::Less);
            assert_eq!(compare(w[1], w[0]).unwrap(), Ordering::Greater);
        }
        assert_eq!(compare("go1.22.0", "go1.22.0").unwrap(), Ordering::Equal);
    }

    #[test]
    fn unparseable_input_is_a_fatal_error_not_a_silent_upgrade() {
        assert!(compare("go1.22.0", "not-a-version").is_err());
        assert!(compare("garbage", "go1.22.0").is_err());
    }
}
