//! Effective settings: configuration file and environment, overridden by flags

use crate::cli::Cli;
use std::path::PathBuf;
use tidemark::migration::{LedgerTable, MigrationError, PostgresLedger};
use tidemark::{connect, ConnectionError, PostgresExecutor, TidemarkConfig};

/// Errors specific to the command-line front end
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(
        "Database URL not provided. Use --database-url, set TIDEMARK__DATABASE__URL or \
         DATABASE_URL, or add [database] url to the config file."
    )]
    MissingDatabaseUrl,

    #[error("Failed to connect to database: {0}")]
    Connection(#[from] ConnectionError),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub table: LedgerTable,
}

impl Settings {
    /// Merge loaded configuration with command-line overrides
    pub fn resolve(cli: &Cli, config: TidemarkConfig) -> Result<Self, MigrationError> {
        let database_url = cli
            .database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| config.database_url());
        let migrations_dir = cli
            .migrations_dir
            .clone()
            .unwrap_or_else(|| config.migrations.dir.clone());
        let table = match &cli.table {
            Some(table) => LedgerTable::new(table.clone())?,
            None => config.ledger_table()?,
        };

        Ok(Self {
            database_url,
            migrations_dir,
            table,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, CliError> {
        self.database_url.as_deref().ok_or(CliError::MissingDatabaseUrl)
    }

    /// Connect and wrap the connection as a ledger
    pub fn open_ledger(&self) -> Result<PostgresLedger, CliError> {
        let client = connect(self.require_database_url()?)?;
        log::debug!("connected; ledger table is '{}'", self.table);
        Ok(PostgresLedger::new(PostgresExecutor::new(client), self.table.clone()))
    }
}
