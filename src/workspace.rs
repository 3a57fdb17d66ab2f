//! Per-build workspace staging.
//!
//! Each build gets an isolated directory tree keyed by (os, arch, name):
//!
//! ```text
//! implants/{os}/{arch}/{name}/
//!   bin/         compiled output
//!   src/implant/ rendered sources (the toolchain's source root)
//! ```
//!
//! Workspaces are never reclaimed automatically; failed builds stay on disk
//! for postmortem inspection unless the caller opted into cleanup.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ImplantConfig;
use crate::error::{BuildError, Result};
use crate::templates::{self, SourceAsset};

/// Root package name of the staged tree; also its import-path root.
pub const PACKAGE_NAME: &str = "implant";

/// An isolated per-build directory tree.
#[derive(Debug, Clone)]
pub struct BuildWorkspace {
    /// `implants/{os}/{arch}/{name}`
    pub root: PathBuf,
    /// Binary output directory.
    pub bin_dir: PathBuf,
    /// Rendered-source root (acts as the toolchain workspace).
    pub src_dir: PathBuf,
    /// Main package directory, `src/implant`.
    pub package_dir: PathBuf,
}

impl BuildWorkspace {
    /// Subdirectory an obfuscated tree is rooted at, when one exists.
    pub fn obfuscated_dir(&self) -> PathBuf {
        self.root.join("obfuscated")
    }
}

/// Materialize the workspace tree and extract every bundle asset into it.
///
/// Directory creation is idempotent. Partial writes are not rolled back.
pub fn stage(implants_root: &Path, config: &ImplantConfig) -> Result<BuildWorkspace> {
    let root = implants_root
        .join(config.target.os())
        .join(config.target.arch())
        .join(&config.name);
    let bin_dir = root.join("bin");
    let src_dir = root.join("src");
    let package_dir = src_dir.join(PACKAGE_NAME);

    for dir in [&bin_dir, &package_dir] {
        fs::create_dir_all(dir).map_err(|e| BuildError::workspace(dir, e))?;
    }

    for asset in templates::SOURCE_ASSETS {
        let dest = staged_path(&package_dir, asset);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::workspace(parent, e))?;
        }
        fs::write(&dest, asset.text).map_err(|e| BuildError::workspace(&dest, e))?;
    }

    Ok(BuildWorkspace {
        root,
        bin_dir,
        src_dir,
        package_dir,
    })
}

/// Destination of one asset inside the staged package.
///
/// Top-level assets land directly in the package directory. Assets nested
/// under a sub-directory are re-rooted one level deeper
/// (`src/implant/implant/<dir>/<file>`): sub-packages are imported as
/// `implant/implant/<dir>`, so the tree must fake that extra path component
/// inside the per-build source root.
fn staged_path(package_dir: &Path, asset: &SourceAsset) -> PathBuf {
    match asset.path.rsplit_once('/') {
        Some((dir, file)) => package_dir.join(PACKAGE_NAME).join(dir).join(file),
        None => package_dir.join(asset.path),
    }
}
