//! Application directory layout.
//!
//! ```text
//! <app root>/
//!   implants/   per-build workspaces (workspace.rs layout)
//!   ca/         CA root and issued leaves
//!   profiles.json
//! ```

use std::path::{Path, PathBuf};

/// Environment override for the application root.
pub const ROOT_ENV: &str = "IMPLANT_FORGE_ROOT";

/// Resolve the application root: `IMPLANT_FORGE_ROOT` if set, else the
/// platform data directory, else the current directory.
pub fn app_root() -> PathBuf {
    if let Ok(root) = std::env::var(ROOT_ENV) {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }
    dirs::data_dir()
        .map(|dir| dir.join("implant-forge"))
        .unwrap_or_else(|| PathBuf::from(".implant-forge"))
}

pub fn implants_dir(app_root: &Path) -> PathBuf {
    app_root.join("implants")
}

pub fn ca_dir(app_root: &Path) -> PathBuf {
    app_root.join("ca")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_override_wins() {
        std::env::set_var(ROOT_ENV, "/tmp/forge-test-root");
        assert_eq!(app_root(), PathBuf::from("/tmp/forge-test-root"));
        std::env::remove_var(ROOT_ENV);
    }

    #[test]
    #[serial]
    fn falls_back_to_platform_data_dir() {
        std::env::remove_var(ROOT_ENV);
        let root = app_root();
        assert!(root.to_string_lossy().contains("implant-forge"));
    }

    #[test]
    fn layout_is_fixed() {
        let root = Path::new("/srv/forge");
        assert_eq!(implants_dir(root), PathBuf::from("/srv/forge/implants"));
        assert_eq!(ca_dir(root), PathBuf::from("/srv/forge/ca"));
    }
}
