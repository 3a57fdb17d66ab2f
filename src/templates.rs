//! Read-only embedded implant source bundle.
//!
//! Templates are compiled into the server binary with `include_str!`, so the
//! bundle is immutable and freely shared across concurrent builds.

/// One (relative path, template text) pair from the bundle.
#[derive(Debug, Clone, Copy)]
pub struct SourceAsset {
    /// Path relative to the bundle root, `/`-separated.
    pub path: &'static str,
    pub text: &'static str,
}

macro_rules! asset {
    ($path:literal) => {
        SourceAsset {
            path: $path,
            text: include_str!(concat!("../templates/", $path)),
        }
    };
}

/// Every source file staged into a build workspace.
pub const SOURCE_ASSETS: &[SourceAsset] = &[
    asset!("implant.go"),
    asset!("crypto.go"),
    asset!("handlers.go"),
    asset!("handlers_windows.go"),
    asset!("handlers_linux.go"),
    asset!("handlers_darwin.go"),
    asset!("tcp_mtls.go"),
    asset!("udp_dns.go"),
    asset!("limits/limits.go"),
    asset!("limits/limits_windows.go"),
    asset!("limits/limits_linux.go"),
    asset!("limits/limits_darwin.go"),
];

/// Look up a template by its bundle-relative path.
pub fn load(relative: &str) -> Option<&'static str> {
    SOURCE_ASSETS
        .iter()
        .find(|asset| asset.path == relative)
        .map(|asset| asset.text)
}
