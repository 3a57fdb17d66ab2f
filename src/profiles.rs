//! Named build profiles.
//!
//! Profiles are saved request presets, persisted as one JSON document in the
//! application root. This is a collaborator of the pipeline, not part of it:
//! a profile only supplies request defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::BuildRequest;

fn profiles_path(app_root: &Path) -> PathBuf {
    app_root.join("profiles.json")
}

/// All saved profiles, sorted by name.
pub fn list(app_root: &Path) -> Result<BTreeMap<String, BuildRequest>> {
    let path = profiles_path(app_root);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Save or replace one profile.
pub fn save(app_root: &Path, name: &str, request: &BuildRequest) -> Result<()> {
    let mut profiles = list(app_root)?;
    profiles.insert(name.to_string(), request.clone());

    fs::create_dir_all(app_root)
        .with_context(|| format!("creating {}", app_root.display()))?;
    let path = profiles_path(app_root);
    let text = serde_json::to_string_pretty(&profiles).context("encoding profiles")?;
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}
