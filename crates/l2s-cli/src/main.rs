//! # l2s CLI
//!
//! Runs filesystem operations through the hard-link emulation, the way an
//! intercepted process would see them.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use l2s_config::path::{normalize_entry, normalize_nonexistent};
use l2s_config::{log_cli_debug, log_cli_info, Config};
use l2s_core::{chain_final, classify, ChainNode, DirectHost, LinkCount, StatRecord};
use tracing::field::display;

/// link2symlink - hard links emulated with symlink chains
#[derive(Parser)]
#[command(name = "l2s")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create NEW as a hard link to EXISTING
    Link {
        #[arg(value_name = "EXISTING")]
        existing: PathBuf,
        #[arg(value_name = "NEW")]
        new: PathBuf,
    },

    /// Remove a name, dropping it from its chain
    Unlink {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Rename FROM to TO, replacing TO
    Rename {
        #[arg(value_name = "FROM")]
        from: PathBuf,
        #[arg(value_name = "TO")]
        to: PathBuf,
    },

    /// Show file status with the emulated link count
    Stat {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Do not follow a trailing symlink (lstat)
        #[arg(long)]
        no_follow: bool,
    },

    /// Print file content through any alias
    Cat {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Show which chain node a path is and where its chain lives
    Inspect {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Print the default configuration
    Config,
}

fn main() -> Result<()> {
    #[cfg(unix)]
    // SAFETY: restores the default disposition before any output is written.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let config = l2s_config::config().clone();
    l2s_config::logging::init_logging(config.log.level);

    let cli = Cli::parse();
    let host = DirectHost::from_config(&config);

    match cli.command {
        Commands::Link { existing, new } => cmd_link(&host, &existing, &new),
        Commands::Unlink { path } => cmd_unlink(&host, &path),
        Commands::Rename { from, to } => cmd_rename(&host, &from, &to),
        Commands::Stat { path, no_follow } => cmd_stat(&host, &path, no_follow),
        Commands::Cat { path } => cmd_cat(&host, &path),
        Commands::Inspect { path } => cmd_inspect(&path),
        Commands::Config => cmd_config(),
    }
}

fn cmd_link(host: &DirectHost, existing: &Path, new: &Path) -> Result<()> {
    let existing = normalize_entry(existing)?;
    let new = normalize_nonexistent(new)?;
    log_cli_info!(
        "link",
        existing = display(existing.display()),
        new = display(new.display())
    );
    host.link(&existing, &new)
        .with_context(|| format!("cannot link {} to {}", new.display(), existing.display()))
}

fn cmd_unlink(host: &DirectHost, path: &Path) -> Result<()> {
    let path = normalize_entry(path)?;
    log_cli_info!("unlink", path = display(path.display()));
    host.unlink(&path)
        .with_context(|| format!("cannot remove {}", path.display()))
}

fn cmd_rename(host: &DirectHost, from: &Path, to: &Path) -> Result<()> {
    let from = normalize_entry(from)?;
    let to = normalize_nonexistent(to)?;
    log_cli_info!(
        "rename",
        from = display(from.display()),
        to = display(to.display())
    );
    host.rename(&from, &to)
        .with_context(|| format!("cannot rename {} to {}", from.display(), to.display()))
}

fn cmd_stat(host: &DirectHost, path: &Path, no_follow: bool) -> Result<()> {
    let path = normalize_entry(path)?;
    let record = if no_follow {
        host.lstat(&path)
    } else {
        host.stat(&path)
    }
    .with_context(|| format!("cannot stat {}", path.display()))?;

    print!("{}", format_stat(&path, &record));
    Ok(())
}

fn format_stat(path: &Path, record: &StatRecord) -> String {
    let kind = if record.is_symlink() {
        "symbolic link"
    } else if (record.mode & libc::S_IFMT as u32) == libc::S_IFDIR as u32 {
        "directory"
    } else {
        "regular file"
    };
    format!(
        "  File: {}\n  Size: {}\tBlocks: {}\t{}\nDevice: {}\tInode: {}\tLinks: {}\nAccess: {:04o}\tUid: {}\tGid: {}\n",
        path.display(),
        record.size,
        record.blocks,
        kind,
        record.dev,
        record.ino,
        record.nlink,
        record.mode & 0o7777,
        record.uid,
        record.gid,
    )
}

fn cmd_cat(host: &DirectHost, path: &Path) -> Result<()> {
    let path = normalize_entry(path)?;
    let data = host
        .read(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    std::io::stdout().lock().write_all(&data)?;
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let path = normalize_entry(path)?;
    let node = classify(&path).with_context(|| format!("cannot inspect {}", path.display()))?;
    log_cli_debug!("inspect", path = display(path.display()));

    let kind = match &node {
        ChainNode::Missing => "missing",
        ChainNode::Directory => "directory",
        ChainNode::Plain => "plain file",
        ChainNode::ForeignSymlink { .. } => "symlink (not part of a chain)",
        ChainNode::ChainEntry { .. } => "chain alias",
        ChainNode::Intermediate => "chain intermediate node",
        ChainNode::Final => "chain final node",
    };
    println!("{}: {}", path.display(), kind);

    match &node {
        ChainNode::ForeignSymlink { target } => println!("  target: {}", target.display()),
        ChainNode::ChainEntry { intermediate } => {
            println!("  intermediate: {}", intermediate.display())
        }
        _ => {}
    }

    if let Some(final_node) = chain_final(&path)? {
        let count = LinkCount::parse_final(&final_node)?;
        println!("  final: {}", final_node.display());
        println!("  links: {}", count.get());
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    print!("{}", Config::default_toml()?);
    Ok(())
}
