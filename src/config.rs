//! Build request resolution.
//!
//! A partial [`BuildRequest`] is validated and defaulted into a frozen
//! [`ImplantConfig`] before any filesystem or network side effect happens.

use serde::{Deserialize, Serialize};

use crate::codename;
use crate::error::Result;
use crate::targets::CompilerTarget;

/// Default reconnect interval, in seconds.
pub const DEFAULT_RECONNECT_INTERVAL: u64 = 60;
/// Default mTLS listen port.
pub const DEFAULT_MTLS_PORT: u16 = 8888;

/// Inbound partial build request. Zero/absent fields take the documented
/// defaults during resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildRequest {
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub name: Option<String>,
    /// mTLS listen host the implant phones home to.
    #[serde(default)]
    pub mtls_server: String,
    #[serde(default)]
    pub mtls_port: u16,
    /// Parent domain for the DNS transport.
    #[serde(default)]
    pub dns_parent: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub reconnect_interval: u64,
}

/// Frozen per-build configuration. Mutable only during resolution and
/// certificate provisioning; every later stage takes it by shared reference.
#[derive(Debug, Clone)]
pub struct ImplantConfig {
    pub target: CompilerTarget,
    pub name: String,
    pub debug: bool,
    pub reconnect_interval: u64,

    pub mtls_server: String,
    pub mtls_port: u16,
    pub dns_parent: String,

    // PEM blobs, filled in by the provisioning stage.
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

/// Validate and default a partial request.
///
/// Pure aside from codename randomness when no name was supplied.
pub fn resolve(req: &BuildRequest) -> Result<ImplantConfig> {
    let target = CompilerTarget::new(&req.os, &req.arch)?;

    let name = match req.name.as_deref() {
        Some(name) if !name.is_empty() => codename::sanitize(name),
        _ => codename::generate(),
    };

    let reconnect_interval = if req.reconnect_interval == 0 {
        DEFAULT_RECONNECT_INTERVAL
    } else {
        req.reconnect_interval
    };
    let mtls_port = if req.mtls_port == 0 {
        DEFAULT_MTLS_PORT
    } else {
        req.mtls_port
    };

    Ok(ImplantConfig {
        target,
        name,
        debug: req.debug,
        reconnect_interval,
        mtls_server: req.mtls_server.clone(),
        mtls_port,
        dns_parent: req.dns_parent.clone(),
        ca_cert: String::new(),
        cert: String::new(),
        key: String::new(),
    })
}

impl ImplantConfig {
    /// Named placeholder bindings consumed by the renderer.
    pub fn placeholders(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("MTLSServer", self.mtls_server.clone()),
            ("MTLSPort", self.mtls_port.to_string()),
            ("DNSParent", self.dns_parent.clone()),
            ("ReconnectInterval", self.reconnect_interval.to_string()),
            ("Debug", self.debug.to_string()),
            ("CACert", self.ca_cert.clone()),
            ("Cert", self.cert.clone()),
            ("Key", self.key.clone()),
        ]
    }
}
