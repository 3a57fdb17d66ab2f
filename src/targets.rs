//! Supported cross-compilation targets.
//!
//! The table is fixed and enumerable; requests outside it are rejected before
//! any filesystem or network side effect.

use std::fmt;

use crate::error::BuildError;

pub const WINDOWS: &str = "windows";
pub const DARWIN: &str = "darwin";
pub const LINUX: &str = "linux";

/// Every (os, arch) pair the external toolchain can produce.
pub const SUPPORTED_TARGETS: &[(&str, &str)] = &[
    (DARWIN, "386"),
    (DARWIN, "amd64"),
    (LINUX, "386"),
    (LINUX, "amd64"),
    (WINDOWS, "386"),
    (WINDOWS, "amd64"),
];

/// A validated (os, arch) pair identifying a cross-compilation destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompilerTarget {
    os: String,
    arch: String,
}

impl CompilerTarget {
    /// Validate a pair against the supported-target table.
    pub fn new(os: &str, arch: &str) -> Result<Self, BuildError> {
        if !Self::is_supported(os, arch) {
            return Err(BuildError::InvalidTarget {
                os: os.to_string(),
                arch: arch.to_string(),
            });
        }
        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
        })
    }

    pub fn is_supported(os: &str, arch: &str) -> bool {
        SUPPORTED_TARGETS.iter().any(|&(o, a)| o == os && a == arch)
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Required executable suffix on the target platform.
    pub fn exe_suffix(&self) -> &'static str {
        if self.os == WINDOWS {
            ".exe"
        } else {
            ""
        }
    }
}

impl fmt::Display for CompilerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
