//! Template placeholder rendering.
//!
//! Rendering is a pure function of (template text, frozen config): the same
//! inputs always produce byte-identical output. Files are rewritten in place;
//! the first failure aborts the build and may leave a partially rendered tree
//! behind.

use std::fs;

use walkdir::WalkDir;

use crate::config::ImplantConfig;
use crate::error::{BuildError, Result};
use crate::workspace::BuildWorkspace;

/// Render every staged source file in place.
pub fn render_all(workspace: &BuildWorkspace, config: &ImplantConfig) -> Result<()> {
    let placeholders = config.placeholders();

    for entry in WalkDir::new(&workspace.src_dir) {
        let entry = entry.map_err(|e| BuildError::Render {
            asset: workspace.src_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let asset = entry.path().display().to_string();
        let text = fs::read_to_string(entry.path()).map_err(|e| BuildError::Render {
            asset: asset.clone(),
            reason: e.to_string(),
        })?;
        let rendered = render(&text, &placeholders).map_err(|reason| BuildError::Render {
            asset: asset.clone(),
            reason,
        })?;
        fs::write(entry.path(), rendered).map_err(|e| BuildError::Render {
            asset,
            reason: e.to_string(),
        })?;
    }

    Ok(())
}

/// Substitute `{{Key}}` placeholders. A placeholder left unresolved after
/// substitution is an error, never silently shipped in a binary.
pub fn render(text: &str, placeholders: &[(&'static str, String)]) -> std::result::Result<String, String> {
    let mut out = text.to_string();
    for (key, value) in placeholders {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }

    if let Some(leftover) = unresolved_placeholder(&out) {
        return Err(format!("unresolved placeholder '{{{{{leftover}}}}}'"));
    }
    Ok(out)
}

/// Find a `{{Ident}}` pattern that survived substitution.
fn unresolved_placeholder(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let tail = &rest[start + 2..];
        if let Some(end) = tail.find("}}") {
            let inner = &tail[..end];
            if !inner.is_empty()
                && inner
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Some(inner);
            }
            rest = &tail[end + 2..];
        } else {
            break;
        }
    }
    None
}
