//! # Repository Sourcing CLI (`sourcing`)
//!
//! The `sourcing` binary discovers repositories for a topic taxonomy and
//! ranks them at repository, owner and organization level.
//!
//! ## Usage
//!
//! ```bash
//! sourcing --config ./config/sourcing.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sourcing init` | Create the SQLite database and run schema migrations |
//! | `sourcing collect` | Run the taxonomy queries and store new repositories |
//! | `sourcing score` | Compute features, scores and rankings |
//! | `sourcing stats` | Summarize the collected dataset |
//! | `sourcing export` | Write stored rankings as JSON |
//! | `sourcing rate-limit` | Show the remaining GitHub API quota |
//! | `sourcing completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! sourcing init --config ./config/sourcing.toml
//!
//! # Collect one category, with JSON progress for a log file
//! sourcing collect --category privacy --progress json 2>collect.log
//!
//! # Rank and show the top 10 per level with contributions
//! sourcing score --top 10 --explain
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use repo_sourcing::rollup::Level;
use repo_sourcing::{collect, config, export, github, migrate, progress, score_cmd, stats};

/// Repository Sourcing CLI: discover and rank open-source repositories for a
/// taxonomy of topics.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sourcing.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sourcing",
    about = "Discover and rank open-source repositories for a taxonomy of topics",
    version,
    long_about = "Runs every query of a topic taxonomy against the GitHub search API, \
    deduplicates results across queries and runs, and ranks repositories, owners and \
    organizations by a configurable weighted score."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sourcing.toml")]
    config: PathBuf,

    /// Progress output on stderr: `auto`, `off`, `human`, or `json`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the repositories, rollups and
    /// runs tables. Safe to run repeatedly.
    Init,

    /// Run the taxonomy queries and store newly discovered repositories.
    ///
    /// Ids already in the database are skipped. If the search API fails
    /// (rate limit, network), collection stops early and keeps everything
    /// gathered by the queries that completed.
    Collect {
        /// Only run the queries of this taxonomy category.
        #[arg(long)]
        category: Option<String>,

        /// Run the queries but do not write to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// Compute features and weighted scores, and rank every level.
    Score {
        /// Rows to print per level.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Print rankings without saving them.
        #[arg(long)]
        dry_run: bool,

        /// Print per-feature contributions for the top repositories.
        #[arg(long)]
        explain: bool,
    },

    /// Show dataset statistics.
    Stats,

    /// Export stored rankings as JSON.
    Export {
        /// Output file path. Writes to stdout if omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// `repository`, `owner`, `organization`, or `all`.
        #[arg(long, default_value = "all")]
        level: String,
    },

    /// Show the remaining GitHub API quota.
    RateLimit,

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_level(value: &str) -> anyhow::Result<Option<Level>> {
    match value {
        "all" => Ok(None),
        other => Ok(Some(other.parse()?)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "sourcing", &mut std::io::stdout());
        return Ok(());
    }

    let progress = progress::ProgressMode::parse(&cli.progress)?;
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Collect { category, dry_run } => {
            collect::run_collect(&cfg, category.as_deref(), dry_run, progress).await?;
        }
        Commands::Score {
            top,
            dry_run,
            explain,
        } => {
            score_cmd::run_score(&cfg, top, dry_run, explain).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Export { output, level } => {
            let level = parse_level(&level)?;
            export::run_export(&cfg, output.as_deref(), level).await?;
        }
        Commands::RateLimit => {
            github::run_rate_limit(&cfg).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
