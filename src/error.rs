use std::path::PathBuf;

use thiserror::Error;

/// One of the ten failure classes a caller can match on. Every subsystem
/// returns one of these instead of an ad-hoc string.
#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("Go is not installed at '{path}' and auto-install is disabled")]
    NotInstalled { path: PathBuf },

    #[error("failed to parse version '{input}': {reason}")]
    VersionParseFailure { input: String, reason: String },

    #[error("network request to '{url}' failed after {attempts} attempt(s): {source}")]
    NetworkFailure {
        url: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("digest mismatch for '{path}': expected {expected}, got {actual}")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("archive '{path}' is invalid: {reason}")]
    ArchiveInvalid { path: PathBuf, reason: String },

    #[error("path traversal blocked in entry '{entry}': {reason}")]
    PathTraversal { entry: String, reason: String },

    #[error("resource limit exceeded during extraction: {reason}")]
    ResourceLimit { reason: String },

    #[error("filesystem operation '{op}' on '{path}' failed: {source}")]
    FilesystemFailure {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("privilege elevation failed: {reason}")]
    PrivilegeFailure { reason: String },

    #[error("verification failed: {reason}")]
    VerificationFailure { reason: String },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

/// The five phases of the update state machine, used to tag every
/// orchestrator-level failure with where it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Download,
    Uninstall,
    Install,
    Verify,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Check => "check",
            Phase::Download => "download",
            Phase::Uninstall => "uninstall",
            Phase::Install => "install",
            Phase::Verify => "verify",
        };
        f.write_str(s)
    }
}

/// An [`UpdaterError`] wrapped with the phase/step context the orchestrator
/// adds before handing it back to the CLI layer.
#[derive(Debug, Error)]
#[error("phase={phase} step={step}: {source}")]
pub struct OrchestratorError {
    pub phase: Phase,
    pub step: &'static str,
    #[source]
    pub source: UpdaterError,
}

impl OrchestratorError {
    pub fn new(phase: Phase, step: &'static str, source: UpdaterError) -> Self {
        Self { phase, step, source }
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
