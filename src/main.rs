use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mod_portal_cache::config::{self, Config};
use mod_portal_cache::mods::cache::{Cache, Progress, SearchOptions};
use mod_portal_cache::mods::credentials::Credentials;
use mod_portal_cache::mods::install::Resolver;
use mod_portal_cache::mods::local::{LocalMod, load_installed};

#[derive(Parser)]
#[command(name = "modcache")]
#[command(version, about = "Cache the Factorio mod portal and install mods from it")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull the mod list from the portal and store it in the cache
    Update,
    /// Search cached mods by name
    Search {
        term: String,
        /// Only show mods in this category (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Most recently released first
        #[arg(long)]
        sort_by_date: bool,
        /// Also match against mod summaries
        #[arg(long)]
        summary: bool,
        /// Treat the term as a regular expression
        #[arg(long)]
        regex: bool,
    },
    /// List cached or installed mods
    List {
        /// List mods of the game installation instead of the cache
        #[arg(long)]
        installed: bool,
        /// Game installation directory
        #[arg(short = 'D', long = "dir")]
        install_dir: Option<PathBuf>,
    },
    /// Download mods with their dependencies and install them
    Install {
        #[arg(required = true)]
        mods: Vec<String>,
        /// Also install optional dependencies
        #[arg(short, long)]
        optional: bool,
        /// Enable the installed mods
        #[arg(short, long)]
        enable: bool,
        /// Game installation directory
        #[arg(short = 'D', long = "dir")]
        install_dir: Option<PathBuf>,
        #[arg(long, env = "FACTORIO_USERNAME", default_value = "")]
        username: String,
        #[arg(long, env = "FACTORIO_TOKEN", default_value = "", hide_env_values = true)]
        token: String,
    },
    /// Remove staged pulls from the cache directory
    Clean,
}

struct LogProgress;

impl Progress for LogProgress {
    fn page_pulled(&self, page: u32, total: u32) {
        info!("Pulled page {}/{}", page, total);
    }

    fn entries_stored(&self, count: usize) {
        info!("Stored {} mods", count);
    }
}

/// Log to stderr and to the log file. The returned guard flushes the file
/// writer when dropped.
fn initialize_tracing(verbose: bool) -> anyhow::Result<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let log_path = config::log_path();
    let log_dir = log_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let file_name = log_path
        .file_name()
        .context("log path has no file name")?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, file_name));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(EnvFilter::new("debug")),
        )
        .init();

    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = initialize_tracing(cli.verbose)?;

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cancellable(run(cli.command, config)))
}

/// Run `future` until it completes or Ctrl-C is pressed. Dropping the future
/// cancels in-flight requests and rolls back uncommitted work.
async fn cancellable<F>(future: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    tokio::select! {
        result = future => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            anyhow::bail!("interrupted")
        }
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Update => {
            let cache = open_cache(&config)?;
            let stored = cache.update().await?;
            cache.clean()?;
            println!("Updated {} mods", stored);
        }
        Command::Search {
            term,
            categories,
            sort_by_date,
            summary,
            regex,
        } => {
            let options = SearchOptions {
                sort_by_date,
                match_summary: summary,
                regex,
                ..SearchOptions::default()
            }
            .with_categories(&categories)?;

            let cache = open_cache(&config)?;
            for found in cache.search(&term, &options)? {
                print_mod(&found);
            }
        }
        Command::List {
            installed,
            install_dir,
        } => {
            let mods = if installed {
                let install_dir = install_dir.unwrap_or(config.install.directory.clone());
                load_installed(&install_dir)?
            } else {
                open_cache(&config)?.cached_mods()?
            };
            for found in &mods {
                print_mod(found);
            }
        }
        Command::Install {
            mods,
            optional,
            enable,
            install_dir,
            username,
            token,
        } => {
            let cache = open_cache(&config)?;
            let plan = Resolver::new(&cache, Credentials::new(username, token))
                .install_optional(optional || config.install.install_optional)
                .resolve(mods.as_slice())
                .await?;

            let install_dir = install_dir.unwrap_or(config.install.directory.clone());
            let copied = plan.apply(&install_dir, enable || config.install.enable)?;
            println!(
                "Resolved {} mods, installed {} into {}",
                plan.len(),
                copied.len(),
                install_dir.display()
            );
        }
        Command::Clean => {
            open_cache(&config)?.clean()?;
        }
    }

    Ok(())
}

fn open_cache(config: &Config) -> anyhow::Result<Cache> {
    let cache = Cache::open(config)
        .with_context(|| format!("failed to open cache at {}", config.cache_dir().display()))?;
    Ok(cache.with_progress(Arc::new(LogProgress)))
}

fn print_mod(found: &LocalMod) {
    let version = found
        .latest_version()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!("{} {}", found.name, version);
    if found.enabled {
        line.push_str(" (enabled)");
    }
    if let Some(released_at) = found.released_at {
        line.push_str(&format!(" {}", released_at.format("%Y-%m-%d")));
    }
    if !found.category.is_empty() {
        line.push_str(&format!(" [{}]", found.category));
    }
    if !found.summary.is_empty() {
        line.push_str(&format!(" - {}", found.summary));
    }
    println!("{}", line);
}
