//! Build pipeline error taxonomy.
//!
//! Each pipeline stage owns exactly one variant and returns it unchanged up
//! to the orchestrator, so a caller can always tell which stage failed.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the implant build pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The requested (os, arch) pair is not in the supported-target table.
    #[error("invalid compiler target: {os}/{arch}")]
    InvalidTarget { os: String, arch: String },

    /// The certificate authority failed to mint a leaf identity.
    #[error("certificate issuance failed for '{name}': {reason}")]
    CertificateIssuance { name: String, reason: String },

    /// Workspace staging or layout failure.
    #[error("workspace error at {path}: {reason}")]
    Workspace { path: PathBuf, reason: String },

    /// Placeholder substitution failed for a staged template.
    #[error("failed to render {asset}: {reason}")]
    Render { asset: String, reason: String },

    /// The key-seeded rename transform failed.
    #[error("obfuscation failed: {0}")]
    Obfuscation(String),

    /// The external compiler returned a non-zero outcome, reported verbatim.
    #[error("compile failed (exit code {code}): {stderr}")]
    Compile { code: i32, stderr: String },

    /// The in-flight compile was terminated by a timeout or cancel signal.
    #[error("build cancelled")]
    Cancelled,

    /// Artifact kinds the pipeline does not produce (stager, shared library).
    #[error("unsupported artifact kind: {0}")]
    Unsupported(&'static str),
}

impl BuildError {
    /// Wrap an I/O failure under a workspace path.
    pub fn workspace(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        BuildError::Workspace {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
