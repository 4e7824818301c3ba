// src/main.rs

use anyhow::Result;
use archdeps::Error;
use archdeps::config::{Config, DEFAULT_CONFIG_PATH};
use archdeps::db::Catalog;
use archdeps::repository::aur::AurClient;
use archdeps::repository::{Fetcher, HttpFetcher, JobPool, SyncMode, Synchronizer};
use archdeps::resolver::Resolver;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "archdeps")]
#[command(author, version, about = "Repository indexing and SAT-based dependency resolution for Arch-style systems", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Prefix applied to every configured directory
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize repository databases and cross-reference installed packages
    Sync {
        /// Use cached databases only
        #[arg(long, conflicts_with = "force")]
        offline: bool,
        /// Download every database even if the cache is fresh
        #[arg(short, long)]
        force: bool,
    },
    /// Search repositories by name and description
    Search {
        /// Substring to look for
        term: String,
        /// Also query the AUR
        #[arg(long)]
        aur: bool,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },
    /// Compute the install set keeping every explicitly installed package
    Resolve {
        /// Ignore declared conflicts
        #[arg(long)]
        no_conflicts: bool,
    },
    /// Compare two version strings
    Vercmp {
        a: String,
        b: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(cli).inspect_err(|err| {
        if let Some(e) = err.downcast_ref::<Error>()
            && e.is_internal()
        {
            error!("internal error, please report: {}", e);
        }
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = || Config::load(&cli.config, cli.root.as_deref());

    match cli.command {
        Some(Commands::Sync { offline, force }) => {
            let mode = if offline {
                SyncMode::Offline
            } else if force {
                SyncMode::Force
            } else {
                SyncMode::Auto
            };
            let (catalog, _) = load_catalog(&config()?, mode)?;

            for db in &catalog.upstream {
                println!("{:>12} {} packages", db.name(), db.cluster_count());
            }
            println!("{:>12} {} packages", catalog.local.name(), catalog.local.len());
            Ok(())
        }
        Some(Commands::Search { term, aur, limit }) => {
            let config = config()?;
            let (mut catalog, fetcher) = load_catalog(&config, SyncMode::Auto)?;
            if aur || config.options.aur {
                AurClient::new(fetcher).search_into(&mut catalog, &term)?;
            }

            let mut hits = catalog.search(&term);
            // Exact name first, then alphabetical
            hits.sort_by(|a, b| {
                (a.name != term)
                    .cmp(&(b.name != term))
                    .then_with(|| a.name.cmp(&b.name))
            });
            if hits.is_empty() {
                println!("No packages found.");
                return Ok(());
            }
            for hit in hits.iter().take(limit) {
                let mut line = format!("{}/{} {}", hit.repository, hit.name, hit.version);
                if let Some(owner) = &hit.provided_by {
                    line.push_str(&format!(" (provided by {})", owner));
                }
                if hit.installed {
                    line.push_str(" [installed]");
                }
                println!("{}", line);
                if !hit.description.is_empty() {
                    println!("    {}", hit.description);
                }
            }
            if hits.len() > limit {
                println!("\n{} more result(s) not shown", hits.len() - limit);
            }
            Ok(())
        }
        Some(Commands::Resolve { no_conflicts }) => {
            let (mut catalog, _) = load_catalog(&config()?, SyncMode::Auto)?;
            let set = Resolver::new()
                .with_conflicts(!no_conflicts)
                .resolve(&mut catalog)?;

            for entry in &set.packages {
                println!("{}", entry);
            }
            println!("\nTotal: {} package(s)", set.len());
            Ok(())
        }
        Some(Commands::Vercmp { a, b }) => {
            println!("{}", archdeps::version::vercmp(&a, &b));
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "archdeps",
                &mut std::io::stdout(),
            );
            Ok(())
        }
        None => {
            println!("Archdeps v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'archdeps --help' for usage information");
            Ok(())
        }
    }
}

/// Build a cross-referenced catalog for `config`
fn load_catalog(config: &Config, mode: SyncMode) -> Result<(Catalog, Arc<dyn Fetcher>)> {
    info!(
        "Using {} repositories for {}",
        config.repositories.len(),
        config.options.arch
    );

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::with_policy(
        config.options.timeout(),
        config.options.retry,
    )?);
    let pool = JobPool::new(config.options.parallel, config.options.queue_capacity())?;
    let catalog = Synchronizer::new(config, Arc::clone(&fetcher))
        .with_mode(mode)
        .run(&pool)?;
    Ok((catalog, fetcher))
}
