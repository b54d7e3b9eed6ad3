//! Layered configuration for the migration tool
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults (`migrations` directory, `migrations` ledger table)
//! 2. `config/tidemark.toml` if present, or the file named by `--config`, which must exist
//! 3. `TIDEMARK__*` environment variables, e.g. `TIDEMARK__DATABASE__URL`
//!
//! Command-line flags are applied on top by the caller.

use crate::migration::{LedgerTable, MigrationError, DEFAULT_LEDGER_TABLE};
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/tidemark.toml";

const ENV_PREFIX: &str = "TIDEMARK";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MigrationsConfig {
    /// Directory holding the `.sql` migration files
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,

    /// Ledger table name
    #[serde(default = "default_ledger_table")]
    pub table: String,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            table: default_ledger_table(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct TidemarkConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,
}

impl TidemarkConfig {
    /// Load from `config/tidemark.toml` (if present) and the environment
    ///
    /// # Errors
    ///
    /// Fails if the default file exists but cannot be parsed, or if a value has
    /// the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_file(Path::new(DEFAULT_CONFIG_FILE), false)
    }

    /// Load from an explicitly named file and the environment
    ///
    /// # Errors
    ///
    /// Unlike [`load`](Self::load), the file must exist. Parse errors are fatal.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_file(path.as_ref(), true)
    }

    fn load_file(path: &Path, required: bool) -> Result<Self, ConfigError> {
        log::debug!("loading configuration from {} (required: {required})", path.display());
        with_env(Config::builder().add_source(File::from(path).required(required)))
            .build()?
            .try_deserialize::<TidemarkConfig>()
    }

    /// Connection string from configuration, else from `DATABASE_URL`
    pub fn database_url(&self) -> Option<String> {
        self.database
            .url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()))
    }

    /// Validated ledger table
    pub fn ledger_table(&self) -> Result<LedgerTable, MigrationError> {
        LedgerTable::new(self.migrations.table.clone())
    }
}

fn with_env(builder: ConfigBuilder<config::builder::DefaultState>) -> ConfigBuilder<config::builder::DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__"),
    )
}
