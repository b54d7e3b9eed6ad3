//! Migration-specific error types

use crate::TideError;
use std::path::PathBuf;

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Migration directory or file could not be read or written
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or missing user input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Migration file content that cannot be interpreted safely
    #[error("Invalid migration format in '{file}': {reason}")]
    InvalidFormat { file: String, reason: String },

    /// Forward or rollback SQL failed; the transaction was rolled back
    #[error("Migration '{migration}' failed during execution: {source}")]
    SqlExecution {
        migration: String,
        #[source]
        source: TideError,
    },

    /// Ledger bookkeeping outside a migration script failed
    #[error("Database error: {0}")]
    Database(#[from] TideError),

    /// Rollback requested for a migration that embeds no rollback block
    #[error(
        "Migration '{migration}' has no rollback script.\n\
         Add a '-- ROLLBACK:' block to the migration file; nothing was executed."
    )]
    MissingRollbackScript { migration: String },

    /// Ledger and migration files disagree
    #[error("Ledger inconsistency: {0}")]
    LedgerInconsistency(String),
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn sql(migration: &str, source: TideError) -> Self {
        MigrationError::SqlExecution {
            migration: migration.to_string(),
            source,
        }
    }

    /// Name of the migration this error is about, when there is one
    pub fn migration(&self) -> Option<&str> {
        match self {
            MigrationError::InvalidFormat { file, .. } => Some(file),
            MigrationError::SqlExecution { migration, .. }
            | MigrationError::MissingRollbackScript { migration } => Some(migration),
            _ => None,
        }
    }
}
