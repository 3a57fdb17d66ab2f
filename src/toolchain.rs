//! External compiler invocation.
//!
//! The toolchain is an injected capability: the production implementation
//! drives the Go cross-compiler, tests substitute a recording fake. The
//! driver never hands back a partial artifact; a missing or empty output
//! binary after a zero exit is still a compile failure.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::error::{BuildError, Result};
use crate::process::{Cmd, CmdError};
use crate::targets::{CompilerTarget, WINDOWS};

/// Limits applied to one compile invocation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Contract between the orchestrator and the external compiler.
pub trait Toolchain: Send + Sync {
    fn compile(
        &self,
        target: &CompilerTarget,
        source_root: &Path,
        dest: &Path,
        tags: &[String],
        ldflags: &[String],
        opts: &CompileOptions,
    ) -> Result<PathBuf>;
}

/// Build selectors avoiding host-resident DNS resolution: the implant carries
/// a pure in-process network stack.
pub fn build_tags() -> Vec<String> {
    vec!["netgo".to_string()]
}

/// Linker flags. Debug symbols are stripped by default; release builds on
/// windows additionally suppress the console subsystem.
pub fn link_flags(target: &CompilerTarget, debug: bool) -> Vec<String> {
    let mut flags = vec!["-s".to_string(), "-w".to_string()];
    if !debug && target.os() == WINDOWS {
        flags.push("-H=windowsgui".to_string());
    }
    flags
}

/// Go toolchain located on the host.
pub struct GoToolchain {
    go: PathBuf,
}

impl GoToolchain {
    /// Locate `go` on PATH.
    pub fn discover() -> anyhow::Result<Self> {
        let go = which::which("go").context("go toolchain not found on PATH")?;
        Ok(Self { go })
    }

    pub fn at(go: impl AsRef<Path>) -> Self {
        Self {
            go: go.as_ref().to_path_buf(),
        }
    }

    /// The GOPATH for a staged tree rooted at `<gopath>/src/<package>`.
    fn gopath_of(source_root: &Path) -> Result<&Path> {
        source_root
            .parent()
            .and_then(|src| src.parent())
            .ok_or_else(|| BuildError::Compile {
                code: -1,
                stderr: format!("source root {} has no workspace parent", source_root.display()),
            })
    }
}

impl Toolchain for GoToolchain {
    fn compile(
        &self,
        target: &CompilerTarget,
        source_root: &Path,
        dest: &Path,
        tags: &[String],
        ldflags: &[String],
        opts: &CompileOptions,
    ) -> Result<PathBuf> {
        let gopath = Self::gopath_of(source_root)?;

        let mut cmd = Cmd::new(self.go.to_string_lossy())
            .arg("build")
            .arg("-o")
            .arg_path(dest)
            .args(["-tags", &tags.join(",")])
            .args(["-ldflags", &ldflags.join(" ")])
            .arg(".")
            .dir(source_root)
            .env("GOOS", target.os())
            .env("GOARCH", target.arch())
            .env("GOPATH", gopath.to_string_lossy())
            .env("GO111MODULE", "off")
            .env("CGO_ENABLED", "0")
            .error_msg(format!("go build for {target} failed"));
        if let Some(timeout) = opts.timeout {
            cmd = cmd.deadline(timeout);
        }
        if let Some(ref cancel) = opts.cancel {
            cmd = cmd.cancel_flag(Arc::clone(cancel));
        }

        match cmd.run() {
            Ok(_) => {}
            Err(CmdError::Cancelled { .. }) => return Err(BuildError::Cancelled),
            Err(CmdError::Failed { code, stderr, .. }) => {
                return Err(BuildError::Compile { code, stderr })
            }
            Err(err @ CmdError::Spawn { .. }) => {
                return Err(BuildError::Compile {
                    code: -1,
                    stderr: err.to_string(),
                })
            }
        }

        // A zero exit with no usable artifact must never be treated as success.
        let len = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(BuildError::Compile {
                code: 0,
                stderr: format!("compiler produced no binary at {}", dest.display()),
            });
        }
        Ok(dest.to_path_buf())
    }
}
