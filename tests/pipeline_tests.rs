//! End-to-end pipeline tests over the injected fake CA and fake toolchain.

mod helpers;

use std::fs;
use std::sync::Arc;

use regex::Regex;

use helpers::{RefusingAuthority, TestEnv};
use implant_forge::pipeline::{BuildOptions, ImplantBuilder};
use implant_forge::targets::SUPPORTED_TARGETS;
use implant_forge::toolchain::Toolchain;
use implant_forge::{BuildError, BuildRequest};

fn request(os: &str, arch: &str) -> BuildRequest {
    BuildRequest {
        os: os.to_string(),
        arch: arch.to_string(),
        mtls_server: "203.0.113.7".to_string(),
        dns_parent: "c2.example.com".to_string(),
        ..Default::default()
    }
}

#[test]
fn every_supported_target_builds_a_nonempty_binary() {
    let env = TestEnv::new();
    for &(os, arch) in SUPPORTED_TARGETS {
        let result = env
            .builder
            .generate_implant(&request(os, arch), &BuildOptions::default())
            .unwrap_or_else(|e| panic!("{os}/{arch} failed: {e}"));

        let bytes = fs::read(&result.path).unwrap();
        assert!(!bytes.is_empty(), "{os}/{arch} produced an empty binary");
        assert!(!result.name.is_empty());
    }
}

#[test]
fn nameless_requests_get_generated_distinct_names() {
    let env = TestEnv::new();
    let pattern = Regex::new(r"^[A-Z]+_[A-Z]+_[0-9]{5}$").unwrap();

    let a = env
        .builder
        .generate_implant(&request("linux", "amd64"), &BuildOptions::default())
        .unwrap();
    let b = env
        .builder
        .generate_implant(&request("linux", "amd64"), &BuildOptions::default())
        .unwrap();

    assert!(pattern.is_match(&a.name), "unexpected codename: {}", a.name);
    assert!(pattern.is_match(&b.name), "unexpected codename: {}", b.name);
    assert_ne!(a.name, b.name);
}

#[test]
fn unsupported_target_is_rejected_before_any_write() {
    let env = TestEnv::new();
    let err = env
        .builder
        .generate_implant(&request("plan9", "amd64"), &BuildOptions::default())
        .unwrap_err();

    assert!(matches!(err, BuildError::InvalidTarget { .. }));
    // Nothing may exist under the implants root, not even the root itself.
    assert!(!env.implants_root.exists());
    assert!(env.toolchain.calls.lock().unwrap().is_empty());
}

#[test]
fn windows_debug_build_has_exe_suffix_and_no_gui_flag() {
    let env = TestEnv::new();
    let mut req = request("windows", "amd64");
    req.debug = true;
    req.name = Some("WIN_DEBUG".to_string());

    let result = env
        .builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();

    assert!(result.path.to_string_lossy().ends_with(".exe"));
    let call = env.toolchain.last_call();
    assert_eq!(call.target, "windows/amd64");
    assert!(call.dest.to_string_lossy().ends_with("WIN_DEBUG.exe"));
    assert!(!call.ldflags.iter().any(|f| f.contains("windowsgui")));
    assert!(call.tags.contains(&"netgo".to_string()));
}

#[test]
fn windows_release_build_suppresses_the_console() {
    let env = TestEnv::new();
    let mut req = request("windows", "amd64");
    req.name = Some("WIN_RELEASE".to_string());

    env.builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();

    let call = env.toolchain.last_call();
    assert!(call.ldflags.contains(&"-H=windowsgui".to_string()));
}

#[test]
fn debug_builds_compile_the_rendered_tree_directly() {
    let env = TestEnv::new();
    let mut req = request("linux", "amd64");
    req.debug = true;
    req.name = Some("DEBUG_TREE".to_string());

    env.builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();

    let ws_root = env.workspace_root("linux", "amd64", "DEBUG_TREE");
    let call = env.toolchain.last_call();
    assert_eq!(call.source_root, ws_root.join("src/implant"));
    assert!(!ws_root.join("obfuscated").exists());
}

#[test]
fn release_builds_compile_an_obfuscated_tree() {
    let env = TestEnv::new();
    let mut req = request("linux", "amd64");
    req.name = Some("RELEASE_TREE".to_string());

    env.builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();

    let ws_root = env.workspace_root("linux", "amd64", "RELEASE_TREE");
    let call = env.toolchain.last_call();
    assert!(call.source_root.starts_with(ws_root.join("obfuscated")));
    assert_ne!(call.source_root, ws_root.join("src/implant"));
    // The rendered tree is still on disk; compile input is one tree, never a mix.
    assert!(ws_root.join("src/implant/implant.go").is_file());
}

#[test]
fn rendered_sources_carry_the_frozen_configuration() {
    let env = TestEnv::new();
    let mut req = request("linux", "amd64");
    req.debug = true;
    req.name = Some("RENDERED".to_string());
    req.mtls_port = 4443;

    env.builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();

    let ws_root = env.workspace_root("linux", "amd64", "RENDERED");
    let main_src = fs::read_to_string(ws_root.join("src/implant/implant.go")).unwrap();
    assert!(main_src.contains("\"RENDERED\""));
    assert!(main_src.contains("203.0.113.7"));
    assert!(main_src.contains("4443"));
    assert!(!main_src.contains("{{"));

    let crypto_src = fs::read_to_string(ws_root.join("src/implant/crypto.go")).unwrap();
    assert!(crypto_src.contains("FAKE-LEAF-RENDERED"));
    assert!(crypto_src.contains("FAKE-CA"));
}

#[test]
fn certificate_refusal_fails_the_build_before_staging() {
    let tmp = tempfile::tempdir().unwrap();
    let implants_root = tmp.path().join("implants");
    let toolchain = Arc::new(helpers::RecordingToolchain::default());
    let builder = ImplantBuilder::new(
        &implants_root,
        Arc::new(RefusingAuthority),
        Arc::clone(&toolchain) as Arc<dyn Toolchain>,
    );

    let mut req = request("linux", "amd64");
    req.name = Some("REFUSED".to_string());
    let err = builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap_err();

    match err {
        BuildError::CertificateIssuance { name, reason } => {
            assert_eq!(name, "REFUSED");
            assert!(reason.contains("refusing"));
        }
        other => panic!("expected CertificateIssuance, got {other:?}"),
    }
    assert!(!implants_root.join("linux/amd64/REFUSED").exists());
    assert!(toolchain.calls.lock().unwrap().is_empty());
}

#[test]
fn rendering_is_identical_across_isolated_workspaces() {
    // Two separate environments, same explicit configuration.
    let env_a = TestEnv::new();
    let env_b = TestEnv::new();
    let mut req = request("linux", "amd64");
    req.debug = true;
    req.name = Some("SAME_CONFIG".to_string());

    env_a
        .builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();
    env_b
        .builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();

    for file in ["implant.go", "crypto.go", "tcp_mtls.go"] {
        let a = fs::read(env_a.workspace_root("linux", "amd64", "SAME_CONFIG")
            .join("src/implant")
            .join(file))
        .unwrap();
        let b = fs::read(env_b.workspace_root("linux", "amd64", "SAME_CONFIG")
            .join("src/implant")
            .join(file))
        .unwrap();
        assert_eq!(a, b, "{file} rendered differently across workspaces");
    }
}

#[test]
fn a_finished_triple_can_be_rebuilt() {
    let env = TestEnv::new();
    let mut req = request("linux", "amd64");
    req.name = Some("REBUILD".to_string());

    env.builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();
    // The claim was released; a resubmission allocates the workspace again.
    env.builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap();
}

#[test]
fn stub_artifact_kinds_are_reported_as_unsupported() {
    let env = TestEnv::new();
    let req = request("linux", "amd64");
    assert!(matches!(
        env.builder.generate_stager(&req).unwrap_err(),
        BuildError::Unsupported("stager")
    ));
    assert!(matches!(
        env.builder.generate_shared_library(&req).unwrap_err(),
        BuildError::Unsupported("shared library")
    ));
}

#[test]
fn failed_builds_keep_the_workspace_by_default() {
    struct FailingToolchain;
    impl Toolchain for FailingToolchain {
        fn compile(
            &self,
            _target: &implant_forge::CompilerTarget,
            _source_root: &std::path::Path,
            _dest: &std::path::Path,
            _tags: &[String],
            _ldflags: &[String],
            _opts: &implant_forge::toolchain::CompileOptions,
        ) -> Result<std::path::PathBuf, BuildError> {
            Err(BuildError::Compile {
                code: 2,
                stderr: "synthetic failure".to_string(),
            })
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let implants_root = tmp.path().join("implants");
    let builder = ImplantBuilder::new(
        &implants_root,
        Arc::new(helpers::FakeAuthority),
        Arc::new(FailingToolchain),
    );

    let mut req = request("linux", "amd64");
    req.name = Some("POSTMORTEM".to_string());

    // Default: the partially built workspace stays for inspection.
    let err = builder
        .generate_implant(&req, &BuildOptions::default())
        .unwrap_err();
    assert!(matches!(err, BuildError::Compile { code: 2, .. }));
    assert!(implants_root.join("linux/amd64/POSTMORTEM/src").is_dir());

    // Opt-in cleanup removes it.
    let options = BuildOptions {
        cleanup_on_failure: true,
        ..Default::default()
    };
    builder.generate_implant(&req, &options).unwrap_err();
    assert!(!implants_root.join("linux/amd64/POSTMORTEM").exists());
}

#[test]
fn concurrent_same_triple_requests_fail_fast() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Toolchain that parks until released, holding the triple claim open.
    struct BlockingToolchain {
        entered: AtomicBool,
        release: AtomicBool,
    }
    impl Toolchain for BlockingToolchain {
        fn compile(
            &self,
            _target: &implant_forge::CompilerTarget,
            _source_root: &std::path::Path,
            dest: &std::path::Path,
            _tags: &[String],
            _ldflags: &[String],
            _opts: &implant_forge::toolchain::CompileOptions,
        ) -> Result<std::path::PathBuf, BuildError> {
            self.entered.store(true, Ordering::SeqCst);
            while !self.release.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(10));
            }
            std::fs::write(dest, b"BLOCKED-THEN-DONE").unwrap();
            Ok(dest.to_path_buf())
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let toolchain = Arc::new(BlockingToolchain {
        entered: AtomicBool::new(false),
        release: AtomicBool::new(false),
    });
    let builder = Arc::new(ImplantBuilder::new(
        tmp.path().join("implants"),
        Arc::new(helpers::FakeAuthority),
        Arc::clone(&toolchain) as Arc<dyn Toolchain>,
    ));

    let mut req = request("linux", "amd64");
    req.name = Some("CONTESTED".to_string());

    let first = {
        let builder = Arc::clone(&builder);
        let req = req.clone();
        std::thread::spawn(move || builder.generate_implant(&req, &BuildOptions::default()))
    };

    // Wait until the first build is parked in compile, claim held.
    while !toolchain.entered.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(5));
    }

    match builder.generate_implant(&req, &BuildOptions::default()) {
        Err(BuildError::Workspace { reason, .. }) => {
            assert!(reason.contains("already in progress"));
        }
        Ok(_) => panic!("second build succeeded while first held the claim"),
        Err(other) => panic!("unexpected error: {other:?}"),
    }

    toolchain.release.store(true, Ordering::SeqCst);
    first.join().unwrap().unwrap();
}
