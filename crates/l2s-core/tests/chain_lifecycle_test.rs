//! End-to-end chain lifecycle through the in-process host.

use l2s_config::testing::TestEnvironment;
use l2s_core::{ChainError, DirectHost};
use nix::errno::Errno;

fn setup() -> (TestEnvironment, DirectHost) {
    (TestEnvironment::new().unwrap(), DirectHost::default())
}

// ========== Layout ==========

#[test]
fn test_first_link_layout() {
    let (env, host) = setup();
    let a = env.create_file("a", b"hello").unwrap();
    let b = env.path("b");

    host.link(&a, &b).unwrap();

    assert_eq!(
        env.entries(&env.root).unwrap(),
        vec![".l2s.a0001", ".l2s.a0001.0002", "a", "b"]
    );
    let intermediate = env.path(".l2s.a0001");
    assert_eq!(env.link_target(&a), Some(intermediate.clone()));
    assert_eq!(env.link_target(&b), Some(intermediate.clone()));
    assert_eq!(
        env.link_target(&intermediate),
        Some(env.path(".l2s.a0001.0002"))
    );
    assert_eq!(
        std::fs::read(env.path(".l2s.a0001.0002")).unwrap(),
        b"hello"
    );
}

#[test]
fn test_link_count_tracks_aliases() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();

    let mut aliases = vec![a.clone()];
    for name in ["b", "c", "d", "e"] {
        let alias = env.path(name);
        // Link from the newest alias; every alias is equivalent.
        host.link(aliases.last().unwrap(), &alias).unwrap();
        aliases.push(alias);

        for path in &aliases {
            assert_eq!(host.stat(path).unwrap().nlink, aliases.len() as u64);
        }
    }
    assert!(env.node_exists(&env.path(".l2s.a0001.0005")));

    let ino = host.stat(&a).unwrap().ino;
    for path in &aliases {
        let record = host.lstat(path).unwrap();
        assert_eq!(record.ino, ino);
        assert!(!record.is_symlink());
    }
}

#[test]
fn test_plain_files_report_real_count() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    assert_eq!(host.stat(&a).unwrap().nlink, 1);
}

// ========== Removal ==========

#[test]
fn test_unlink_decrements_then_dissolves() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    let b = env.path("b");
    let c = env.path("c");
    host.link(&a, &b).unwrap();
    host.link(&a, &c).unwrap();
    assert_eq!(host.stat(&c).unwrap().nlink, 3);

    host.unlink(&a).unwrap();
    assert_eq!(host.stat(&b).unwrap().nlink, 2);
    assert_eq!(host.stat(&c).unwrap().nlink, 2);
    assert!(env.node_exists(&env.path(".l2s.a0001.0002")));

    host.unlink(&b).unwrap();
    assert_eq!(host.stat(&c).unwrap().nlink, 1);
    assert_eq!(
        env.entries(&env.root).unwrap(),
        vec![".l2s.a0001", ".l2s.a0001.0001", "c"]
    );

    host.unlink(&c).unwrap();
    assert!(env.entries(&env.root).unwrap().is_empty());
    assert_eq!(host.stat(&c).unwrap_err().errno(), Errno::ENOENT);
}

#[test]
fn test_rename_over_alias_drops_it() {
    let (env, host) = setup();
    let a = env.create_file("a", b"chained").unwrap();
    let b = env.path("b");
    host.link(&a, &b).unwrap();
    let other = env.create_file("other", b"replacement").unwrap();

    host.rename(&other, &b).unwrap();

    assert_eq!(host.stat(&a).unwrap().nlink, 1);
    assert!(env.node_exists(&env.path(".l2s.a0001.0001")));
    assert_eq!(host.read(&b).unwrap(), b"replacement");
    assert_eq!(host.read(&a).unwrap(), b"chained");
}

#[test]
fn test_rename_onto_itself_keeps_count() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    host.link(&a, &env.path("b")).unwrap();

    host.rename(&a, &a).unwrap();

    assert_eq!(host.stat(&a).unwrap().nlink, 2);
    assert!(env.node_exists(&env.path(".l2s.a0001.0002")));
}

#[test]
fn test_failed_rename_keeps_destination_counted() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    let b = env.path("b");
    host.link(&a, &b).unwrap();

    let err = host.rename(&env.path("missing"), &b).unwrap_err();

    assert_eq!(err.errno(), Errno::ENOENT);
    assert_eq!(
        env.entries(&env.root).unwrap(),
        vec![".l2s.a0001", ".l2s.a0001.0002", "a", "b"]
    );
    assert_eq!(host.stat(&b).unwrap().nlink, 2);

    // The surviving alias still owns the content after the other goes.
    host.unlink(&a).unwrap();
    assert_eq!(host.stat(&b).unwrap().nlink, 1);
    assert_eq!(host.read(&b).unwrap(), b"x");
}

#[test]
fn test_directory_cannot_replace_alias() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    let b = env.path("b");
    host.link(&a, &b).unwrap();
    let d = env.create_dir("d").unwrap();

    let err = host.rename(&d, &b).unwrap_err();

    assert_eq!(err.errno(), Errno::ENOTDIR);
    assert_eq!(host.stat(&a).unwrap().nlink, 2);
    assert_eq!(env.link_target(&b), Some(env.path(".l2s.a0001")));
}

#[test]
fn test_unlink_plain_file_passes_through() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    host.unlink(&a).unwrap();
    assert!(!env.node_exists(&a));
    assert_eq!(host.unlink(&a).unwrap_err().errno(), Errno::ENOENT);
}

// ========== Content ==========

#[test]
fn test_aliases_share_content() {
    let (env, host) = setup();
    let a = env.create_file("a", b"before").unwrap();
    let b = env.path("b");
    host.link(&a, &b).unwrap();

    host.write(&b, b"after").unwrap();

    assert_eq!(host.read(&a).unwrap(), b"after");
    assert_eq!(host.stat(&a).unwrap().size, 5);
    // Writing through an alias must not replace the alias itself.
    assert_eq!(env.link_target(&b), Some(env.path(".l2s.a0001")));
}

#[cfg(target_os = "linux")]
#[test]
fn test_fstat_through_alias() {
    use std::fs::OpenOptions;

    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    let b = env.path("b");
    host.link(&a, &b).unwrap();

    let file = host.open(&b, OpenOptions::new().read(true)).unwrap();
    let record = host.fstat(&file).unwrap();
    assert_eq!(record.nlink, 2);
    assert_eq!(record.ino, host.stat(&a).unwrap().ino);
}

// ========== Failures ==========

#[test]
fn test_directory_link_not_permitted() {
    let (env, host) = setup();
    let d = env.create_dir("d").unwrap();

    let err = host.link(&d, &env.path("e")).unwrap_err();

    assert!(matches!(err, ChainError::NotPermitted { .. }));
    assert_eq!(err.errno(), Errno::EPERM);
    assert_eq!(env.entries(&env.root).unwrap(), vec!["d"]);
}

#[test]
fn test_missing_source() {
    let (env, host) = setup();
    let err = host.link(&env.path("a"), &env.path("b")).unwrap_err();
    assert_eq!(err.errno(), Errno::ENOENT);
    assert!(env.entries(&env.root).unwrap().is_empty());
}

#[test]
fn test_existing_destination_leaves_source_alone() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    let b = env.create_file("b", b"y").unwrap();

    let err = host.link(&a, &b).unwrap_err();

    assert_eq!(err.errno(), Errno::EEXIST);
    assert_eq!(env.entries(&env.root).unwrap(), vec!["a", "b"]);
    assert_eq!(host.stat(&a).unwrap().nlink, 1);
}

#[test]
fn test_exhausted_namespace() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    for n in 1..=999 {
        let name = env.path(&format!(".l2s.a{:04}", n));
        std::os::unix::fs::symlink("/nonexistent", name).unwrap();
    }

    let err = host.link(&a, &env.path("b")).unwrap_err();

    assert!(matches!(err, ChainError::ExhaustedNamespace { .. }));
    assert_eq!(err.errno(), Errno::EEXIST);
    assert_eq!(std::fs::read(&a).unwrap(), b"x");
    assert!(!env.node_exists(&env.path("b")));
}

#[test]
fn test_malformed_final_fails_stat() {
    let (env, host) = setup();
    let bogus = env.create_file(".l2s.a0001.12x4", b"x").unwrap();

    let err = host.stat(&bogus).unwrap_err();

    assert!(matches!(err, ChainError::Malformed { .. }));
    assert_eq!(err.errno(), Errno::EIO);
}

#[test]
fn test_reserved_prefix_file_is_treated_as_chain_node() {
    let (env, host) = setup();
    let conf = env.create_file(".l2s.conf", b"x").unwrap();

    let err = host.stat(&conf).unwrap_err();
    assert!(matches!(err, ChainError::Malformed { .. }));
    assert_eq!(err.errno(), Errno::EIO);

    // Content access does not consult the count.
    assert_eq!(host.read(&conf).unwrap(), b"x");
}

#[test]
fn test_two_name_scenario() {
    let (env, host) = setup();
    let a = env.create_file("a", b"x").unwrap();
    let b = env.path("b");
    host.link(&a, &b).unwrap();
    assert_eq!(host.stat(&a).unwrap().nlink, 2);
    assert_eq!(host.stat(&b).unwrap().nlink, 2);

    host.unlink(&b).unwrap();
    assert_eq!(
        env.entries(&env.root).unwrap(),
        vec![".l2s.a0001", ".l2s.a0001.0001", "a"]
    );
    assert_eq!(host.read(&a).unwrap(), b"x");

    host.unlink(&a).unwrap();
    assert!(env.entries(&env.root).unwrap().is_empty());
    assert_eq!(host.stat(&a).unwrap_err().errno(), Errno::ENOENT);
}
