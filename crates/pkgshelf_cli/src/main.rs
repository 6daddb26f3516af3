//! Operator entry point for a pkgshelf store.
//!
//! # Responsibility
//! - Load the declared configuration, start logging and reconcile.
//! - Expose listing, upload and verification against the storage core.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use pkgshelf_core::{
    init_from_config, normalize_project_name, CatalogStore, PackageStore, Repository,
    StoreConfig, VerifyOutcome,
};
use std::fs::File;
use std::path::{Path, PathBuf};

/// pkgshelf - self-hosted package index store
#[derive(Parser, Debug)]
#[command(name = "pkgshelf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Align the catalog with the declared indexes
    Reconcile,
    /// List repositories and their bases
    Repos,
    /// List the effective projects of a repository, including inherited ones
    Projects { repository: String },
    /// List the files of a project
    Files { repository: String, project: String },
    /// Upload files into a project owned by the repository
    Upload {
        repository: String,
        project: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Re-hash a stored file and compare it with its checksum
    Verify {
        repository: String,
        project: String,
        file: String,
    },
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = StoreConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(logging) = &config.logging {
        init_from_config(logging).context("starting logging")?;
    }

    let (store, report) = PackageStore::bootstrap(&config).context("opening the store")?;
    info!(
        "event=cli_command module=cli status=start command={:?}",
        cli.command
    );

    match cli.command {
        Command::Reconcile => {
            if report.is_noop() {
                println!("catalog already matches the declaration");
            }
            for name in &report.created {
                println!("created {name}");
            }
            for name in &report.rebased {
                println!("rebased {name}");
            }
        }
        Command::Repos => {
            for repository in store.list_repositories()? {
                let bases = repository
                    .bases()?
                    .iter()
                    .map(|base| base.name().to_string())
                    .collect::<Vec<_>>();
                println!("{}\t[{}]", repository.name(), bases.join(", "));
            }
        }
        Command::Projects { repository } => {
            let repository = require_repository(&store, &repository)?;
            for (name, project) in repository.all_projects()? {
                let owner = if project.repository_id() == repository.id() {
                    "own"
                } else {
                    "inherited"
                };
                println!("{name}\t{owner}");
            }
        }
        Command::Files {
            repository,
            project,
        } => {
            let repository = require_repository(&store, &repository)?;
            let project = repository
                .find_project(&normalize_project_name(&project))?
                .ok_or_else(|| anyhow!("project `{project}` not found"))?;
            for file in project.files()? {
                let state = if file.is_locked() { "locked" } else { "ready" };
                println!(
                    "{}\t{}\t{}",
                    file.name(),
                    file.checksum().unwrap_or("-"),
                    state
                );
            }
        }
        Command::Upload {
            repository,
            project,
            paths,
        } => {
            let repository = require_repository(&store, &repository)?;
            let project = repository.add_project(&normalize_project_name(&project))?;
            for path in &paths {
                let name = file_name(path)?;
                let content =
                    File::open(path).with_context(|| format!("opening {}", path.display()))?;
                let file = project
                    .add_file(name, content)
                    .with_context(|| format!("uploading {name}"))?;
                println!("{}\t{}", file.name(), file.checksum().unwrap_or("-"));
            }
        }
        Command::Verify {
            repository,
            project,
            file,
        } => {
            let repository = require_repository(&store, &repository)?;
            let project = repository
                .find_project(&normalize_project_name(&project))?
                .ok_or_else(|| anyhow!("project `{project}` not found"))?;
            let stored = project
                .get_file(&file)?
                .ok_or_else(|| anyhow!("file `{file}` not found"))?;
            match stored.verify()? {
                VerifyOutcome::Match => println!("ok {file}"),
                VerifyOutcome::NoChecksum => println!("unverified {file}: no completed upload"),
                VerifyOutcome::Locked => println!("busy {file}: upload in progress"),
                VerifyOutcome::Mismatch { expected, actual } => {
                    bail!("checksum mismatch for {file}: expected {expected}, found {actual}")
                }
            }
        }
    }
    Ok(())
}

fn require_repository<'s, S: CatalogStore>(
    store: &'s PackageStore<S>,
    name: &str,
) -> Result<Repository<'s, S>> {
    store
        .get_repository(name)?
        .ok_or_else(|| anyhow!("repository `{name}` is not declared"))
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("`{}` has no usable file name", path.display()))
}
