//! hashfs command-line front end.
//!
//! Drives a copy-on-write filesystem over an on-disk object store. Every
//! mutation produces a new root, which is written to `<store>/ROOT`.
//!
//! Usage:
//!   hashfs --store ./fs init
//!   hashfs --store ./fs mkdir /docs
//!   echo hello | hashfs --store ./fs put - /docs/readme.txt
//!   hashfs --store ./fs ls /docs
//!   hashfs --store ./fs ln -s /docs/readme.txt /latest
//!
//! `<store>/hashfs.toml`, if present, configures the filesystem.

mod root_file;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hashfs_cas::FileStore;
use hashfs_vfs::mode::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use hashfs_vfs::{CasObjects, ObjectStore, Root, TreeFs, TreeFsConfig, VfsError, VfsOps};
use parking_lot::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::root_file::RootFile;

const CONFIG_FILE: &str = "hashfs.toml";

/// Content-addressed copy-on-write filesystem.
#[derive(Parser, Debug)]
#[command(name = "hashfs")]
#[command(about = "Content-addressed copy-on-write filesystem")]
struct Args {
    /// Store directory (objects, ROOT and hashfs.toml)
    #[arg(long, default_value = ".hashfs")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store and an empty root
    Init,
    /// Create a directory
    Mkdir {
        path: String,
        /// Octal permissions or full mode
        #[arg(long, value_parser = parse_octal)]
        mode: Option<u32>,
    },
    /// Store a local file (`-` for stdin) at a path
    Put {
        source: PathBuf,
        path: String,
        /// Octal permissions or full mode
        #[arg(long, value_parser = parse_octal)]
        mode: Option<u32>,
    },
    /// Write a file's content to stdout
    Cat { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show mode and size
    Stat { path: String },
    /// Change permissions
    Chmod {
        #[arg(value_parser = parse_octal)]
        mode: u32,
        path: String,
    },
    /// Move an entry
    Mv { from: String, to: String },
    /// Remove a file or symlink
    Rm { path: String },
    /// Remove an empty directory
    Rmdir { path: String },
    /// Create a symbolic link
    Ln {
        /// Make a symbolic link instead of a hard link
        #[arg(short = 's', long)]
        symbolic: bool,
        target: String,
        path: String,
    },
    /// Print a symlink's target
    Readlink { path: String },
    /// Print the current root
    Root,
}

fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))
}

/// Attach `tag` (from a default mode) to a permission-only mode.
fn with_type(mode: Option<u32>, default: u32) -> u32 {
    match mode {
        None => default,
        Some(m) if m <= 0o777 => (default & !0o777) | m,
        Some(m) => m,
    }
}

/// Open the filesystem in `store_dir`, creating the store and root lazily.
///
/// The returned slot receives the first error the ROOT writer hits.
async fn open(store_dir: &Path) -> Result<(TreeFs, Arc<Mutex<Option<String>>>)> {
    let content = FileStore::open(store_dir)
        .with_context(|| format!("opening store {}", store_dir.display()))?;
    let objects: Arc<dyn ObjectStore> = Arc::new(CasObjects::from_store(content));

    let config_path = store_dir.join(CONFIG_FILE);
    let config = if config_path.exists() {
        TreeFsConfig::load(&config_path)?
    } else {
        TreeFsConfig::default()
    };

    let root_file = RootFile::in_store(store_dir);
    let existing = root_file.load()?;
    let fs = TreeFs::open(objects, config, existing).await?;
    if existing.is_none() {
        root_file.save(&fs.snapshot())?;
    }

    let failure = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&failure);
    let fs = fs.with_observer(move |root: &Root| {
        if let Err(e) = root_file.save(root) {
            tracing::error!(error = %e, "failed to persist root");
            slot.lock().get_or_insert_with(|| format!("{e:#}"));
        }
    });
    Ok((fs, failure))
}

async fn run(args: Args) -> Result<()> {
    let (fs, failure) = open(&args.store).await?;
    let mut out = io::stdout().lock();

    match args.command {
        Command::Init => {
            writeln!(out, "{}", fs.snapshot().entry)?;
        }
        Command::Mkdir { path, mode } => {
            fs.create_dir(&path, with_type(mode, DEFAULT_DIR_MODE))
                .await
                .with_context(|| format!("mkdir {path}"))?;
        }
        Command::Put { source, path, mode } => {
            let data = if source.as_os_str() == "-" {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                std::fs::read(&source).with_context(|| format!("reading {}", source.display()))?
            };
            let blob = fs
                .write_file(&path, &data, with_type(mode, DEFAULT_FILE_MODE))
                .await
                .with_context(|| format!("put {path}"))?;
            writeln!(out, "{blob}")?;
        }
        Command::Cat { path } => {
            let data = fs
                .read_file(&path)
                .await
                .with_context(|| format!("cat {path}"))?;
            out.write_all(&data)?;
        }
        Command::Ls { path } => {
            for entry in fs
                .read_dir(&path)
                .await
                .with_context(|| format!("ls {path}"))?
            {
                let suffix = match entry.kind {
                    hashfs_vfs::FileType::Directory => "/",
                    hashfs_vfs::FileType::Symlink => "@",
                    hashfs_vfs::FileType::File => "",
                };
                writeln!(out, "{:07o} {}{suffix}", entry.mode, entry.name)?;
            }
        }
        Command::Stat { path } => {
            let stat = fs
                .stat(&path)
                .await
                .with_context(|| format!("stat {path}"))?;
            writeln!(out, "mode: {:07o}", stat.mode)?;
            writeln!(out, "size: {}", stat.size)?;
        }
        Command::Chmod { mode, path } => {
            fs.chmod(&path, mode)
                .await
                .with_context(|| format!("chmod {path}"))?;
        }
        Command::Mv { from, to } => {
            fs.rename(&from, &to)
                .await
                .with_context(|| format!("mv {from} {to}"))?;
        }
        Command::Rm { path } => {
            fs.unlink(&path).await.with_context(|| format!("rm {path}"))?;
        }
        Command::Rmdir { path } => {
            fs.rmdir(&path)
                .await
                .with_context(|| format!("rmdir {path}"))?;
        }
        Command::Ln {
            symbolic,
            target,
            path,
        } => {
            if symbolic {
                fs.symlink(&target, &path)
                    .await
                    .with_context(|| format!("ln -s {target} {path}"))?;
            } else {
                fs.link(&target, &path)
                    .await
                    .with_context(|| format!("ln {target} {path}"))?;
            }
        }
        Command::Readlink { path } => {
            let target = fs
                .readlink(&path)
                .await
                .with_context(|| format!("readlink {path}"))?;
            writeln!(out, "{target}")?;
        }
        Command::Root => {
            writeln!(out, "{}", serde_json::to_string_pretty(&fs.snapshot())?)?;
        }
    }

    if let Some(e) = failure.lock().take() {
        bail!("root was not persisted: {e}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    run(Args::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_octal("755").unwrap(), 0o755);
        assert_eq!(parse_octal("0o100644").unwrap(), 0o100644);
        assert!(parse_octal("9").is_err());
    }

    #[test]
    fn test_with_type() {
        assert_eq!(with_type(None, DEFAULT_DIR_MODE), 0o040777);
        assert_eq!(with_type(Some(0o700), DEFAULT_DIR_MODE), 0o040700);
        assert_eq!(with_type(Some(0o100600), DEFAULT_FILE_MODE), 0o100600);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["hashfs", "--store", "/tmp/x", "ln", "-s", "/a", "/b"])
            .unwrap();
        assert!(matches!(args.command, Command::Ln { symbolic: true, .. }));

        let args = Args::try_parse_from(["hashfs", "put", "-", "/a", "--mode", "600"]).unwrap();
        assert!(matches!(args.command, Command::Put { mode: Some(0o600), .. }));
        assert_eq!(args.store, PathBuf::from(".hashfs"));
    }

    #[tokio::test]
    async fn test_open_persists_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path();

        let (fs, failure) = open(store).await.unwrap();
        fs.create_dir("/docs", 0o040755).await.unwrap();
        assert!(failure.lock().is_none());
        let root = fs.snapshot();
        drop(fs);

        assert_eq!(RootFile::in_store(store).load().unwrap(), Some(root));
        let (reopened, _) = open(store).await.unwrap();
        assert!(reopened.exists("/docs").await);
    }

    #[tokio::test]
    async fn test_hard_link_reports_unimplemented() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().to_str().unwrap();
        let args = Args::try_parse_from(["hashfs", "--store", store, "ln", "/a", "/b"]).unwrap();

        let err = run(args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VfsError>(),
            Some(VfsError::Unimplemented(_))
        ));
    }

    #[tokio::test]
    async fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "umask = 0o077\n").unwrap();
        let (fs, _) = open(dir.path()).await.unwrap();
        assert_eq!(fs.config().umask, 0o077);
    }
}
