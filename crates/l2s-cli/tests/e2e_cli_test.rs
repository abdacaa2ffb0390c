//! E2E tests for the l2s binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn l2s(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_l2s"))
        .current_dir(dir)
        .env_remove("L2S_DISABLE")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute l2s")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ========== E2E: Link Workflow ==========

#[test]
fn e2e_link_stat_unlink() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    std::fs::write(dir.join("a"), "x").unwrap();

    assert!(l2s(dir, &["link", "a", "b"]).status.success());

    let stat = l2s(dir, &["stat", "b"]);
    assert!(stat.status.success());
    assert!(stdout(&stat).contains("Links: 2"), "{}", stdout(&stat));

    let cat = l2s(dir, &["cat", "b"]);
    assert_eq!(stdout(&cat), "x");

    assert!(l2s(dir, &["unlink", "a"]).status.success());
    let inspect = l2s(dir, &["inspect", "b"]);
    let out = stdout(&inspect);
    assert!(out.contains("chain alias"), "{out}");
    assert!(out.contains("links: 1"), "{out}");

    assert!(l2s(dir, &["unlink", "b"]).status.success());
    assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
}

#[test]
fn e2e_link_directory_fails() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("d")).unwrap();

    let output = l2s(temp.path(), &["link", "d", "e"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not permitted"));
    assert!(!temp.path().join("e").exists());
}

// ========== E2E: Config ==========

#[test]
fn e2e_config_prints_valid_toml() {
    let temp = TempDir::new().unwrap();
    let output = l2s(temp.path(), &["config"]);
    assert!(output.status.success());

    let parsed: Result<l2s_config::Config, _> = toml::from_str(&stdout(&output));
    assert_eq!(parsed.unwrap(), l2s_config::Config::default());
}
