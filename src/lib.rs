//! implant-forge - per-request implant build pipeline.
//!
//! Given a partial build request, the pipeline resolves and freezes a
//! configuration, provisions a unique leaf certificate, stages an isolated
//! workspace from the embedded template bundle, renders configuration into
//! the sources, optionally applies a key-seeded rename transform, and drives
//! the external cross-compiler to a single output binary.

pub mod certs;
pub mod codename;
pub mod config;
pub mod error;
pub mod obfuscate;
pub mod paths;
pub mod pipeline;
pub mod process;
pub mod profiles;
pub mod render;
pub mod targets;
pub mod templates;
pub mod toolchain;
pub mod workspace;

pub use config::{BuildRequest, ImplantConfig};
pub use error::BuildError;
pub use pipeline::{BuildOptions, BuildResult, ImplantBuilder};
pub use targets::CompilerTarget;
