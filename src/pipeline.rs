//! Build orchestration.
//!
//! One `generate_implant` call runs the strict forward-only sequence
//! Resolve → Provision → Stage → Render → [Obfuscate] → Compile. The first
//! failing stage short-circuits with its own error kind; there are no retries
//! and a resubmission allocates an entirely new workspace. The only state
//! shared across invocations is the embedded template bundle, the
//! supported-target table, and the claimed-triple set below.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::certs::CertificateAuthority;
use crate::config::{self, BuildRequest, ImplantConfig};
use crate::error::{BuildError, Result};
use crate::obfuscate::{self, ObfuscationKey};
use crate::render;
use crate::toolchain::{self, CompileOptions, Toolchain};
use crate::workspace::{self, BuildWorkspace, PACKAGE_NAME};

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Absolute path of the output binary.
    pub path: PathBuf,
    /// Resolved implant name (generated when the request supplied none).
    pub name: String,
}

/// The effective compile input: exactly one of the two trees, never a mix.
#[derive(Debug)]
pub enum SourceSet {
    /// Rendered tree, compiled directly (debug builds).
    Plain(PathBuf),
    /// Key-renamed tree under `obfuscated/` (release builds).
    Obfuscated(PathBuf),
}

impl SourceSet {
    pub fn root(&self) -> &Path {
        match self {
            SourceSet::Plain(root) | SourceSet::Obfuscated(root) => root,
        }
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Bound on the external compile; elapsing reports `Cancelled`.
    pub timeout: Option<Duration>,
    /// External cancellation signal; raising it reports `Cancelled`.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Delete the workspace when a build fails. Off by default: failed trees
    /// stay on disk for postmortem inspection.
    pub cleanup_on_failure: bool,
}

/// Sequences the pipeline stages over injected collaborators.
pub struct ImplantBuilder {
    implants_root: PathBuf,
    ca: Arc<dyn CertificateAuthority>,
    toolchain: Arc<dyn Toolchain>,
    /// (os, arch, name) triples with a build in flight. Two concurrent
    /// requests sharing a triple would race on one workspace directory; the
    /// second claim fails fast instead.
    active: Mutex<HashSet<(String, String, String)>>,
}

impl ImplantBuilder {
    pub fn new(
        implants_root: impl AsRef<Path>,
        ca: Arc<dyn CertificateAuthority>,
        toolchain: Arc<dyn Toolchain>,
    ) -> Self {
        Self {
            implants_root: implants_root.as_ref().to_path_buf(),
            ca,
            toolchain,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn implants_root(&self) -> &Path {
        &self.implants_root
    }

    /// Generate an implant executable for a partial request.
    pub fn generate_implant(
        &self,
        request: &BuildRequest,
        options: &BuildOptions,
    ) -> Result<BuildResult> {
        // Resolve. Everything before the claim is side-effect free.
        let mut config = config::resolve(request)?;
        println!(
            "Generating implant '{}' for {}",
            config.name, config.target
        );

        let _claim = self.claim(&config)?;

        // Provision.
        let identity = self
            .ca
            .issue_leaf(&config.name)
            .map_err(|e| BuildError::CertificateIssuance {
                name: config.name.clone(),
                reason: format!("{e:#}"),
            })?;
        config.ca_cert = identity.ca_cert;
        config.cert = identity.cert;
        config.key = identity.key;
        let config = config; // frozen from here on

        // Stage.
        let ws = workspace::stage(&self.implants_root, &config)?;

        let result = self.build_in(&ws, &config, options);
        if result.is_err() && options.cleanup_on_failure {
            let _ = fs::remove_dir_all(&ws.root);
        }
        result
    }

    /// Render → [Obfuscate] → Compile inside an already-staged workspace.
    fn build_in(
        &self,
        ws: &BuildWorkspace,
        config: &ImplantConfig,
        options: &BuildOptions,
    ) -> Result<BuildResult> {
        render::render_all(ws, config)?;

        // Debug builds compile the rendered tree directly for faster,
        // inspectable iteration.
        let sources = if config.debug {
            SourceSet::Plain(ws.package_dir.clone())
        } else {
            println!("  Obfuscating source tree...");
            let key = ObfuscationKey::generate();
            SourceSet::Obfuscated(obfuscate::obfuscate(ws, &key, PACKAGE_NAME)?)
        };

        let dest = ws
            .bin_dir
            .join(format!("{}{}", config.name, config.target.exe_suffix()));
        let tags = toolchain::build_tags();
        let ldflags = toolchain::link_flags(&config.target, config.debug);
        let compile_options = CompileOptions {
            timeout: options.timeout,
            cancel: options.cancel.clone(),
        };

        println!("  Compiling {} -> {}", sources.root().display(), dest.display());
        let path = self.toolchain.compile(
            &config.target,
            sources.root(),
            &dest,
            &tags,
            &ldflags,
            &compile_options,
        )?;

        Ok(BuildResult {
            path,
            name: config.name.clone(),
        })
    }

    /// Stager binaries are a stub in this pipeline.
    pub fn generate_stager(&self, _request: &BuildRequest) -> Result<BuildResult> {
        Err(BuildError::Unsupported("stager"))
    }

    /// Shared-library artifacts (DLL/dylib/so) are a stub in this pipeline.
    pub fn generate_shared_library(&self, _request: &BuildRequest) -> Result<BuildResult> {
        Err(BuildError::Unsupported("shared library"))
    }

    fn claim(&self, config: &ImplantConfig) -> Result<TripleClaim<'_>> {
        let triple = (
            config.target.os().to_string(),
            config.target.arch().to_string(),
            config.name.clone(),
        );
        let mut active = self.active.lock().expect("claim set poisoned");
        if !active.insert(triple.clone()) {
            return Err(BuildError::Workspace {
                path: self
                    .implants_root
                    .join(&triple.0)
                    .join(&triple.1)
                    .join(&triple.2),
                reason: "a build for this (os, arch, name) is already in progress".to_string(),
            });
        }
        Ok(TripleClaim {
            builder: self,
            triple,
        })
    }
}

/// RAII claim on one (os, arch, name) triple.
struct TripleClaim<'a> {
    builder: &'a ImplantBuilder,
    triple: (String, String, String),
}

impl Drop for TripleClaim<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.builder.active.lock() {
            active.remove(&self.triple);
        }
    }
}
