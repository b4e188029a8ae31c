//! Process-wide build identity, initialized once and read thereafter
//! (the "Global State" design note made concrete). `commit`/`build_date`/
//! `target` are populated at compile time by `build.rs`; the
//! `option_env!` fallbacks below only apply to a build invoked without
//! it (e.g. `rustc` directly).

use std::sync::OnceLock;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_date: &'static str,
    pub target: &'static str,
}

static BUILD_INFO: OnceLock<BuildInfo> = OnceLock::new();

/// Returns the process-wide build record, constructing it on first call.
/// Every subsequent call returns the same value; nothing mutates it
/// after startup.
pub fn get() -> &'static BuildInfo {
    BUILD_INFO.get_or_init(|| BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GOUP_BUILD_COMMIT").unwrap_or("unknown"),
        build_date: option_env!("GOUP_BUILD_DATE").unwrap_or("unknown"),
        target: option_env!("TARGET").unwrap_or(std::env::consts::ARCH),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_stable_across_calls() {
        let a = get() as *const BuildInfo;
        let b = get() as *const BuildInfo;
        assert_eq!(a, b);
    }

    #[test]
    fn version_matches_cargo_package() {
        assert_eq!(get().version, env!("CARGO_PKG_VERSION"));
    }
}
