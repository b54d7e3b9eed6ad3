//! # Tidemark
//!
//! Plain-SQL schema migrations for PostgreSQL on the `may` runtime.
//!
//! Migration files live in a directory, are applied in file name order, and are
//! recorded in a ledger table inside the target database. Every migration runs in
//! its own transaction together with its ledger row, so a failed migration leaves
//! neither schema changes nor a ledger entry behind.
//!
//! See [`migration`] for the file format and the [`migration::Migrator`] API, and the
//! `tidemark-migrate` crate for the command-line tool.

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod transaction;

#[cfg(test)]
mod tests_cfg;

pub use crate::config::{DatabaseConfig, MigrationsConfig, TidemarkConfig};
pub use connection::{connect, validate_connection_string, ConnectionError};
pub use executor::{PostgresExecutor, TideError, TideExecutor};
pub use transaction::Transaction;
