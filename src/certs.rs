//! Per-implant certificate provisioning.
//!
//! The certificate authority is an injected capability so tests can swap in
//! a deterministic fake. The production implementation drives the `openssl`
//! binary: one EC root per application root, one freshly minted leaf per
//! implant name. Leaves are never interchangeable across names; the subject
//! CN is the implant name.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::process::Cmd;

/// A signed identity for one implant.
#[derive(Debug, Clone)]
pub struct IssuedIdentity {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

/// Narrow CA contract consumed by the build pipeline. Implementations must
/// tolerate concurrent issuance calls.
pub trait CertificateAuthority: Send + Sync {
    fn issue_leaf(&self, name: &str) -> Result<IssuedIdentity>;
}

/// openssl-backed authority rooted at a directory under the application root.
pub struct OpensslAuthority {
    ca_dir: PathBuf,
}

impl OpensslAuthority {
    pub fn new(ca_dir: impl AsRef<Path>) -> Self {
        Self {
            ca_dir: ca_dir.as_ref().to_path_buf(),
        }
    }

    fn ca_cert_path(&self) -> PathBuf {
        self.ca_dir.join("ca.pem")
    }

    fn ca_key_path(&self) -> PathBuf {
        self.ca_dir.join("ca-key.pem")
    }

    /// Create the root CA on first use. Re-running against an existing root
    /// is a no-op.
    fn ensure_root(&self) -> Result<()> {
        if self.ca_cert_path().is_file() && self.ca_key_path().is_file() {
            return Ok(());
        }
        fs::create_dir_all(&self.ca_dir)
            .with_context(|| format!("creating CA directory {}", self.ca_dir.display()))?;

        Cmd::new("openssl")
            .args(["req", "-x509", "-newkey", "ec", "-pkeyopt"])
            .arg("ec_paramgen_curve:prime256v1")
            .arg("-keyout")
            .arg_path(&self.ca_key_path())
            .arg("-out")
            .arg_path(&self.ca_cert_path())
            .args(["-nodes", "-days", "3650", "-subj", "/CN=implants"])
            .error_msg("CA root generation failed")
            .run()?;
        Ok(())
    }
}

impl CertificateAuthority for OpensslAuthority {
    fn issue_leaf(&self, name: &str) -> Result<IssuedIdentity> {
        self.ensure_root()?;

        let leaf_dir = self.ca_dir.join("leaves").join(name);
        fs::create_dir_all(&leaf_dir)
            .with_context(|| format!("creating leaf directory {}", leaf_dir.display()))?;
        let key_path = leaf_dir.join("key.pem");
        let csr_path = leaf_dir.join("leaf.csr");
        let cert_path = leaf_dir.join("cert.pem");

        Cmd::new("openssl")
            .args(["ecparam", "-name", "prime256v1", "-genkey", "-noout", "-out"])
            .arg_path(&key_path)
            .error_msg("leaf key generation failed")
            .run()?;

        Cmd::new("openssl")
            .args(["req", "-new", "-key"])
            .arg_path(&key_path)
            .args(["-subj", &format!("/CN={name}"), "-out"])
            .arg_path(&csr_path)
            .error_msg("leaf CSR generation failed")
            .run()?;

        Cmd::new("openssl")
            .args(["x509", "-req", "-in"])
            .arg_path(&csr_path)
            .arg("-CA")
            .arg_path(&self.ca_cert_path())
            .arg("-CAkey")
            .arg_path(&self.ca_key_path())
            .args(["-CAcreateserial", "-days", "365", "-out"])
            .arg_path(&cert_path)
            .error_msg("leaf signing failed")
            .run()?;

        Ok(IssuedIdentity {
            ca_cert: fs::read_to_string(self.ca_cert_path()).context("reading CA cert")?,
            cert: fs::read_to_string(&cert_path).context("reading leaf cert")?,
            key: fs::read_to_string(&key_path).context("reading leaf key")?,
        })
    }
}
