//! Link creation: build a chain on the first link, bump its count after.

use std::path::{Path, PathBuf};

use l2s_config::{log_grow_debug, log_grow_info, log_grow_warn};
use nix::errno::Errno;
use tracing::field::display;
use tracing::instrument;

use crate::chain::Chain;
use crate::classify::{classify, ChainNode};
use crate::naming::{self, ChainNames, Disambiguator};
use crate::sys::{self, Op};
use crate::{ChainError, Result};

/// Account for one more link to `source`.
///
/// Returns the intermediate node. The caller rewrites its link request
/// into `symlink(<returned path>, <new name>)`, which makes the new name
/// an alias of the chain.
#[instrument(level = "debug", skip_all, fields(source = %source.display()))]
pub fn grow(source: &Path) -> Result<PathBuf> {
    match classify(source)? {
        ChainNode::Missing => Err(ChainError::io(Op::Lstat, source, Errno::ENOENT)),
        ChainNode::Directory | ChainNode::ForeignSymlink { .. } => Err(ChainError::NotPermitted {
            path: source.to_path_buf(),
        }),
        ChainNode::Plain => create_chain(source),
        ChainNode::ChainEntry { intermediate } => extend_chain(&intermediate),
        ChainNode::Intermediate => extend_chain(source),
        ChainNode::Final => extend_chain(&naming::intermediate_of(source)?),
    }
}

/// Turn `source` into the chain's first alias.
///
/// Each candidate is claimed by creating its intermediate symlink, which
/// fails atomically if the name is taken. Only then is the content moved.
fn create_chain(source: &Path) -> Result<PathBuf> {
    let base = naming::intermediate_base(source)?;

    for disambiguator in Disambiguator::all() {
        let names = ChainNames::candidate(&base, disambiguator)?;

        match sys::symlink(&names.final_node, &names.intermediate) {
            Ok(()) => {}
            Err(e) if e.errno() == Errno::EEXIST => continue,
            Err(e) => return Err(e),
        }

        match sys::rename_noreplace(source, &names.final_node) {
            Ok(()) => {}
            Err(e) => {
                withdraw_claim(&names.intermediate);
                if e.errno() == Errno::EEXIST {
                    // Orphaned final node from an interrupted run.
                    continue;
                }
                return Err(e);
            }
        }

        sys::symlink(&names.intermediate, source)?;

        log_grow_info!(
            "Chain created",
            source = display(source.display()),
            intermediate = display(names.intermediate.display())
        );
        return Ok(names.intermediate);
    }

    Err(ChainError::ExhaustedNamespace { base })
}

fn withdraw_claim(intermediate: &Path) {
    if let Err(e) = sys::unlink(intermediate) {
        log_grow_warn!(
            "Failed to withdraw claimed intermediate",
            intermediate = display(intermediate.display()),
            error = display(e)
        );
    }
}

fn extend_chain(intermediate: &Path) -> Result<PathBuf> {
    let mut chain = Chain::open(intermediate)?;
    let count = chain
        .count()
        .increment()
        .ok_or_else(|| ChainError::TooManyLinks {
            path: chain.final_node().to_path_buf(),
        })?;
    chain.set_count(count)?;

    log_grow_debug!(
        "Chain extended",
        intermediate = display(intermediate.display()),
        count = display(count)
    );
    Ok(intermediate.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2s_config::testing::TestEnvironment;
    use std::fs;

    #[test]
    fn test_first_link_builds_chain() {
        let env = TestEnvironment::new().unwrap();
        let a = env.create_file("a", b"x").unwrap();

        let intermediate = grow(&a).unwrap();
        assert_eq!(intermediate, env.path(".l2s.a0001"));

        assert_eq!(env.link_target(&a), Some(env.path(".l2s.a0001")));
        assert_eq!(
            env.link_target(&intermediate),
            Some(env.path(".l2s.a0001.0002"))
        );
        assert_eq!(fs::read(env.path(".l2s.a0001.0002")).unwrap(), b"x");
    }

    #[test]
    fn test_second_link_increments() {
        let env = TestEnvironment::new().unwrap();
        let a = env.create_file("a", b"x").unwrap();
        let intermediate = grow(&a).unwrap();

        assert_eq!(grow(&a).unwrap(), intermediate);
        assert_eq!(
            env.entries(&env.root).unwrap(),
            vec![".l2s.a0001", ".l2s.a0001.0003", "a"]
        );
        assert_eq!(
            env.link_target(&intermediate),
            Some(env.path(".l2s.a0001.0003"))
        );
    }

    #[test]
    fn test_growing_hidden_nodes_keeps_count_consistent() {
        let env = TestEnvironment::new().unwrap();
        let a = env.create_file("a", b"x").unwrap();
        let intermediate = grow(&a).unwrap();

        grow(&intermediate).unwrap();
        grow(&env.path(".l2s.a0001.0003")).unwrap();
        assert_eq!(
            env.link_target(&intermediate),
            Some(env.path(".l2s.a0001.0004"))
        );
    }

    #[test]
    fn test_disambiguator_skips_taken_names() {
        let env = TestEnvironment::new().unwrap();
        env.create_file(".l2s.a0001", b"other").unwrap();
        let a = env.create_file("a", b"x").unwrap();

        assert_eq!(grow(&a).unwrap(), env.path(".l2s.a0002"));
        assert_eq!(fs::read(env.path(".l2s.a0001")).unwrap(), b"other");
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_orphaned_final_is_not_clobbered() {
        let env = TestEnvironment::new().unwrap();
        env.create_file(".l2s.a0001.0002", b"orphan").unwrap();
        let a = env.create_file("a", b"x").unwrap();

        assert_eq!(grow(&a).unwrap(), env.path(".l2s.a0002"));
        assert_eq!(fs::read(env.path(".l2s.a0001.0002")).unwrap(), b"orphan");
        assert!(!env.node_exists(&env.path(".l2s.a0001")));
    }

    #[test]
    fn test_directory_not_permitted() {
        let env = TestEnvironment::new().unwrap();
        let d = env.create_dir("d").unwrap();
        assert!(matches!(grow(&d), Err(ChainError::NotPermitted { .. })));
        assert_eq!(env.entries(&env.root).unwrap(), vec!["d"]);
    }

    #[test]
    fn test_foreign_symlink_not_permitted() {
        let env = TestEnvironment::new().unwrap();
        let real = env.create_file("real", b"x").unwrap();
        let link = env.path("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(matches!(grow(&link), Err(ChainError::NotPermitted { .. })));
    }

    #[test]
    fn test_missing_source() {
        let env = TestEnvironment::new().unwrap();
        let err = grow(&env.path("nope")).unwrap_err();
        assert_eq!(err.errno(), Errno::ENOENT);
    }

    #[test]
    fn test_exhausted_namespace() {
        let env = TestEnvironment::new().unwrap();
        for n in Disambiguator::all() {
            env.create_file(&format!(".l2s.a{n}"), b"").unwrap();
        }
        let a = env.create_file("a", b"x").unwrap();

        assert!(matches!(
            grow(&a),
            Err(ChainError::ExhaustedNamespace { .. })
        ));
        assert_eq!(fs::read(&a).unwrap(), b"x");
    }

    #[test]
    fn test_count_overflow() {
        let env = TestEnvironment::new().unwrap();
        let final_node = env.create_file(".l2s.a0001.9999", b"x").unwrap();
        let intermediate = env.path(".l2s.a0001");
        std::os::unix::fs::symlink(&final_node, &intermediate).unwrap();

        assert!(matches!(
            grow(&intermediate),
            Err(ChainError::TooManyLinks { .. })
        ));
        assert!(env.node_exists(&final_node));
    }

    #[test]
    fn test_malformed_final() {
        let env = TestEnvironment::new().unwrap();
        let final_node = env.create_file(".l2s.a0001.zz", b"x").unwrap();
        let intermediate = env.path(".l2s.a0001");
        std::os::unix::fs::symlink(&final_node, &intermediate).unwrap();
        let entry = env.path("a");
        std::os::unix::fs::symlink(&intermediate, &entry).unwrap();

        assert!(matches!(grow(&entry), Err(ChainError::Malformed { .. })));
    }
}
