//! # hubsync CLI
//!
//! The `hubsync` binary syncs GitHub content into the local store, inspects
//! sources, and runs the webhook receiver.
//!
//! ## Usage
//!
//! ```bash
//! hubsync --config ./config/hubsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hubsync init` | Create the SQLite database and run schema migrations |
//! | `hubsync sources` | List configured sources, token status and sync progress |
//! | `hubsync sync <source\|all>` | Incremental sync (`--since`, `--full`) |
//! | `hubsync repos <source>` | List repositories and their cursors |
//! | `hubsync get <source> <id>` | Show an item by external id |
//! | `hubsync file <source> <repo> <path>` | Print a repository file (cached) |
//! | `hubsync users <source> <repo>` | List repository contributors |
//! | `hubsync validate <source>` | Check the source's token against GitHub |
//! | `hubsync serve` | Start the webhook server |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use hubsync::{config, get, github_cmd, ingest, migrate, server, sources};

/// hubsync: GitHub pull requests, issues, discussions and wikis as
/// canonical content items.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hubsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hubsync",
    about = "Sync GitHub pull requests, issues, discussions and wiki pages into a local store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hubsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it repeatedly is safe.
    Init,

    /// List configured sources and their status.
    Sources,

    /// Sync one source, or every source with `all`.
    ///
    /// Without flags each repository resumes from its stored cursor.
    Sync {
        /// Source id from `[sources.<id>]`, or `all`.
        source: String,

        /// Only fetch items updated on or after this date (YYYY-MM-DD).
        /// Overrides stored cursors.
        #[arg(long)]
        since: Option<String>,

        /// Ignore stored cursors and backfill up to the page ceilings.
        #[arg(long)]
        full: bool,
    },

    /// List the repositories a source covers.
    Repos { source: String },

    /// Show an item by external id (`owner/repo#12`, a node id, or
    /// `owner/repo/wiki/Page.md`).
    Get {
        source: String,
        id: String,

        /// Refetch from GitHub even if the item is stored.
        #[arg(long)]
        refresh: bool,
    },

    /// Print a file from a repository.
    File {
        source: String,
        repo: String,
        path: String,

        /// Branch, tag or commit. Defaults to the repository's default branch.
        #[arg(long = "ref")]
        git_ref: Option<String>,
    },

    /// List contributors of a repository.
    Users { source: String, repo: String },

    /// Check that a source's token is accepted by GitHub.
    Validate { source: String },

    /// Start the webhook server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on the first Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, cancelling in-flight sync");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Sync {
            source,
            since,
            full,
        } => {
            let cancel = CancellationToken::new();
            cancel_on_ctrl_c(cancel.clone());
            ingest::run_sync(&cfg, &source, since, full, cancel).await?;
        }
        Commands::Repos { source } => {
            github_cmd::run_repos(&cfg, &source).await?;
        }
        Commands::Get {
            source,
            id,
            refresh,
        } => {
            get::run_get(&cfg, &source, &id, refresh).await?;
        }
        Commands::File {
            source,
            repo,
            path,
            git_ref,
        } => {
            github_cmd::run_file(&cfg, &source, &repo, &path, git_ref.as_deref()).await?;
        }
        Commands::Users { source, repo } => {
            github_cmd::run_users(&cfg, &source, &repo).await?;
        }
        Commands::Validate { source } => {
            github_cmd::run_validate(&cfg, &source).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
