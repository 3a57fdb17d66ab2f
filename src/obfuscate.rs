//! Key-seeded source tree obfuscation.
//!
//! Release builds never compile the rendered tree directly: a fresh key seeds
//! a deterministic rename of the root package path, directory components,
//! import paths, and top-level declared identifiers, and the transformed tree
//! is written under `{workspace}/obfuscated`. Identical key, identical
//! renaming; different keys diverge with overwhelming probability.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{BuildError, Result};
use crate::workspace::BuildWorkspace;

/// Key size after truncating the digest, in bytes.
pub const KEY_SIZE: usize = 16;

/// Ephemeral key material scoped to one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscationKey([u8; KEY_SIZE]);

impl ObfuscationKey {
    /// Derive a key by hashing 64 bytes of OS randomness and truncating.
    pub fn generate() -> Self {
        let mut seed = [0u8; 64];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let digest = Sha256::digest(seed);
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest[..KEY_SIZE]);
        Self(key)
    }

    /// Fixed key material, for deterministic callers.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Deterministic rename of one identifier or path component.
    fn mangle(&self, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        // Leading letters keep the result a valid identifier.
        format!("ob{}", &hex::encode(digest)[..10])
    }
}

/// Transform the rendered tree into a renamed copy.
///
/// Returns the new main package directory,
/// `{workspace}/obfuscated/src/<mangled>`. The rendered tree is left intact;
/// compilation consumes exactly one of the two.
pub fn obfuscate(
    workspace: &BuildWorkspace,
    key: &ObfuscationKey,
    package_name: &str,
) -> Result<PathBuf> {
    let obf_src = workspace.obfuscated_dir().join("src");
    let mangled_package = key.mangle(package_name);

    let renames = rename_map(&workspace.package_dir, key, package_name)?;

    for entry in WalkDir::new(&workspace.package_dir) {
        let entry = entry.map_err(|e| BuildError::Obfuscation(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(&workspace.package_dir)
            .map_err(|e| BuildError::Obfuscation(e.to_string()))?;
        let mut dest = obf_src.join(&mangled_package);
        for component in rel.iter() {
            let part = component.to_string_lossy();
            dest.push(renames.get(part.as_ref()).cloned().unwrap_or_else(|| part.into_owned()));
        }

        let text = fs::read_to_string(entry.path())
            .map_err(|e| BuildError::Obfuscation(format!("{}: {e}", entry.path().display())))?;
        let renamed = replace_identifiers(&text, &renames);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::Obfuscation(e.to_string()))?;
        }
        fs::write(&dest, renamed)
            .map_err(|e| BuildError::Obfuscation(format!("{}: {e}", dest.display())))?;
    }

    Ok(obf_src.join(&mangled_package))
}

/// Deterministic rename table: the root package name, every directory
/// component under the tree, and every top-level declared identifier.
/// `main` and `init` keep their language-mandated names.
fn rename_map(
    package_dir: &Path,
    key: &ObfuscationKey,
    package_name: &str,
) -> Result<BTreeMap<String, String>> {
    let mut names: Vec<String> = vec![package_name.to_string()];

    for entry in WalkDir::new(package_dir) {
        let entry = entry.map_err(|e| BuildError::Obfuscation(e.to_string()))?;
        if entry.file_type().is_dir() && entry.path() != package_dir {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        if entry.file_type().is_file() {
            let text = fs::read_to_string(entry.path())
                .map_err(|e| BuildError::Obfuscation(format!("{}: {e}", entry.path().display())))?;
            names.extend(top_level_decls(&text));
        }
    }

    let mut map = BTreeMap::new();
    for name in names {
        if name == "main" || name == "init" {
            continue;
        }
        let mangled = key.mangle(&name);
        map.insert(name, mangled);
    }
    Ok(map)
}

/// Names declared at the top level: `func X`, `type X`, `var X`, `const X`,
/// plus every name inside grouped `const (` / `var (` / `type (` blocks.
/// Methods (`func (r T) X`) are skipped; receiver types are caught by their
/// own `type` declaration.
fn top_level_decls(source: &str) -> Vec<String> {
    let mut decls = Vec::new();
    let mut in_group = false;
    for line in source.lines() {
        if in_group {
            let trimmed = line.trim_start();
            if trimmed.starts_with(')') {
                in_group = false;
            } else if !trimmed.starts_with("//") {
                push_leading_ident(trimmed, &mut decls);
            }
            continue;
        }
        for keyword in ["func ", "type ", "var ", "const "] {
            if let Some(rest) = line.strip_prefix(keyword) {
                if keyword != "func " && rest.trim_start().starts_with('(') {
                    in_group = true;
                } else {
                    push_leading_ident(rest, &mut decls);
                }
            }
        }
    }
    decls
}

/// Append the identifier a declaration line starts with, if any.
fn push_leading_ident(rest: &str, decls: &mut Vec<String>) {
    let mut chars = rest.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
        return;
    }
    let ident: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    decls.push(ident);
}

/// Token-level identifier replacement. Identifier runs are matched whole, so
/// renames never corrupt partial matches inside longer names.
fn replace_identifiers(source: &str, renames: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(source.len());
    let mut token = String::new();

    let flush = |token: &mut String, out: &mut String| {
        if !token.is_empty() {
            match renames.get(token.as_str()) {
                Some(renamed) => out.push_str(renamed),
                None => out.push_str(token),
            }
            token.clear();
        }
    };

    for c in source.chars() {
        let ident_char = c.is_ascii_alphanumeric() || c == '_';
        let ident_start = c.is_ascii_alphabetic() || c == '_';
        if ident_char && (!token.is_empty() || ident_start) {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);
    out
}
