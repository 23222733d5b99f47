//! End-to-end tests of the `pour` binary. Nothing here touches the network.
#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FALLBACKS: &str = "lib/node_modules/httpyac/node_modules/clipboardy/fallbacks";

/// Test context with a private pour home
struct TestContext {
    temp_dir: TempDir,
    pour_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let pour_home = temp_dir.path().join(".pour");
        Self {
            temp_dir,
            pour_home,
        }
    }

    fn pour_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pour"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("POUR_HOME", &self.pour_home);
        cmd.env_remove("RUST_LOG");
        cmd.env_remove("POUR_HOST_OS");
        cmd.env_remove("POUR_HOST_ARCH");
        cmd
    }

    fn run_as(&self, os: &str, arch: &str, args: &[&str]) -> Output {
        self.pour_cmd()
            .env("POUR_HOST_OS", os)
            .env("POUR_HOST_ARCH", arch)
            .args(args)
            .output()
            .expect("failed to run pour")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// A two-slice (x86_64 + arm64) universal binary; slices are filled with
/// 0x86 and 0xa6 respectively after a thin 64-bit Mach-O magic.
fn universal_binary() -> (Vec<u8>, Vec<u8>) {
    let slice = |cpu: u32, fill: u8| {
        let mut s = vec![0xcf, 0xfa, 0xed, 0xfe];
        s.extend_from_slice(&cpu.to_le_bytes());
        s.resize(64, fill);
        s
    };
    let x86 = slice(0x0100_0007, 0x86);
    let arm = slice(0x0100_000c, 0xa6);

    let mut out = Vec::new();
    out.extend_from_slice(&0xcafe_babe_u32.to_be_bytes());
    out.extend_from_slice(&2u32.to_be_bytes());
    for (cpu, sub, offset) in [(0x0100_0007_u32, 3u32, 64u32), (0x0100_000c, 0, 128)] {
        for word in [cpu, sub, offset, 64, 4] {
            out.extend_from_slice(&word.to_be_bytes());
        }
    }
    out.resize(64, 0);
    out.extend_from_slice(&x86);
    out.extend_from_slice(&arm);
    (out, arm)
}

fn npm_prefix(root: &Path) -> PathBuf {
    let libexec = root.join("libexec");
    let fallbacks = libexec.join(FALLBACKS);
    std::fs::create_dir_all(fallbacks.join("linux")).unwrap();
    std::fs::create_dir_all(fallbacks.join("windows")).unwrap();
    std::fs::write(fallbacks.join("linux/xsel"), b"\x7fELF").unwrap();
    std::fs::write(fallbacks.join("windows/clipboard_x86_64.exe"), b"MZ").unwrap();
    libexec
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.pour_cmd().arg("--help").output().unwrap();
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Usage:"));
    assert!(out.contains("adapt"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.pour_cmd().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("pour "));
}

#[test]
fn test_host_override() {
    let ctx = TestContext::new();
    let output = ctx.run_as("darwin", "aarch64", &["host"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("macos-arm64"));
    assert!(out.contains("emptied"));

    let output = ctx.run_as("linux", "x86_64", &["host"]);
    assert!(stdout(&output).contains("replaced by 'xsel'"));
}

#[test]
fn test_invalid_arch_override_fails() {
    let ctx = TestContext::new();
    let output = ctx.run_as("linux", "sparc64", &["host"]);
    assert!(!output.status.success());
}

#[test]
fn test_list_empty() {
    let ctx = TestContext::new();
    let output = ctx.pour_cmd().arg("list").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("No packages installed."));
}

#[test]
fn test_adapt_on_macos_host() {
    let ctx = TestContext::new();
    let libexec = npm_prefix(ctx.temp_dir.path());
    let addon = libexec.join("lib/node_modules/httpyac/node_modules/fsevents/fsevents.node");
    std::fs::create_dir_all(addon.parent().unwrap()).unwrap();
    let (fat, arm) = universal_binary();
    std::fs::write(&addon, fat).unwrap();

    let output = ctx.run_as("macos", "arm64", &["adapt", libexec.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("removed 2 file(s)"));
    assert!(out.contains("thinned:"));

    assert_eq!(std::fs::read_dir(libexec.join(FALLBACKS)).unwrap().count(), 0);
    assert_eq!(std::fs::read(&addon).unwrap(), arm);
}

#[test]
fn test_adapt_linux_without_sibling_fails() {
    let ctx = TestContext::new();
    let libexec = npm_prefix(ctx.temp_dir.path());

    let output = ctx.run_as("linux", "x86_64", &["adapt", libexec.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("xsel"));
    // The vendored tree is left as it was.
    assert!(libexec.join(FALLBACKS).join("linux/xsel").exists());
}

#[test]
fn test_adapt_missing_fallbacks_fails() {
    let ctx = TestContext::new();
    let libexec = ctx.temp_dir.path().join("empty");
    std::fs::create_dir_all(&libexec).unwrap();

    let output = ctx.run_as("macos", "arm64", &["adapt", libexec.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Expected path not found"));
}

#[test]
fn test_install_dry_run() {
    let ctx = TestContext::new();
    let output = ctx.run_as("linux", "x86_64", &["install", "--dry-run"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Would install httpyac 6.3.4 for linux-x86_64"));
    assert!(out.contains("cellar/httpyac/6.3.4"));
    assert!(!ctx.pour_home.join("cellar").exists());
}

#[test]
fn test_uninstall_not_installed() {
    let ctx = TestContext::new();
    let output = ctx.pour_cmd().arg("uninstall").output().unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("httpyac is not installed"));
}

#[test]
fn test_smoke_test_requires_install() {
    let ctx = TestContext::new();
    let output = ctx.pour_cmd().arg("test").output().unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not installed"));
}
