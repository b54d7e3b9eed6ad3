//! Command-line arguments

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tidemark-migrate")]
#[command(about = "Plain-SQL schema migrations for PostgreSQL")]
#[command(version)]
pub struct Cli {
    /// Database connection URL (overrides config and DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Migrations directory path
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Ledger table name
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Configuration file; must exist when given [default: config/tidemark.toml, if present]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Apply all pending migrations in order
    #[command(visible_alias = "migrate")]
    Up {
        /// Show what would be applied without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a new, timestamped migration file
    Create {
        /// Migration name, e.g. "add users table"
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Roll back the most recently applied migration
    #[command(visible_alias = "rollback")]
    Down {
        /// Show what would be rolled back without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show applied and pending migrations
    Status,
}

impl Commands {
    /// Whether the command needs a database connection
    pub fn needs_database(&self) -> bool {
        !matches!(self, Commands::Create { .. })
    }
}

/// Full usage text
pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

/// Exit code for an argument parsing outcome
///
/// `--help` and `--version` succeed; every other parse failure is a usage error.
pub fn parse_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Report a parse failure the way the tool does it and return the exit code
///
/// Help and version go to stdout as clap renders them. For anything else the
/// first line of the error goes to stderr and the usage text to `out`.
pub fn report_parse_error(err: &clap::Error, out: &mut dyn Write) -> u8 {
    let code = parse_exit_code(err);
    if code == 0 {
        let _ = err.print();
    } else {
        let message = err.to_string();
        eprintln!("{}", message.lines().next().unwrap_or_default());
        let _ = writeln!(out, "{}", usage());
    }
    code
}
