//! Ledger table management
//!
//! The ledger is a plain table, by default named `migrations`:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS migrations (
//!     id SERIAL PRIMARY KEY,
//!     name VARCHAR(255) NOT NULL UNIQUE,
//!     applied_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
//! )
//! ```
//!
//! `applied_at` comes from the database clock at transaction start, so rows
//! written by consecutive migration transactions order the same way they ran.

use crate::migration::{LedgerEntry, MigrationError};
use crate::{TideError, TideExecutor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Default ledger table name
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static identifier pattern"));

/// Validated ledger table name
///
/// The name is interpolated into SQL, so only plain identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable(String);

impl LedgerTable {
    /// Validate `name` as a ledger table name
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidArgument` unless `name` is a plain SQL
    /// identifier (letters, digits, underscores; at most 63 characters).
    pub fn new(name: impl Into<String>) -> Result<Self, MigrationError> {
        let name = name.into();
        if IDENTIFIER.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(MigrationError::InvalidArgument(format!(
                "'{name}' is not a valid ledger table name"
            )))
        }
    }

    /// Table name as written into SQL
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                name VARCHAR(255) NOT NULL UNIQUE,\n    \
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.0
        )
    }

    pub(crate) fn exists_sql(&self) -> &'static str {
        "SELECT to_regclass($1::text) IS NOT NULL"
    }

    pub(crate) fn list_sql(&self) -> String {
        format!(
            "SELECT name, applied_at FROM {} ORDER BY applied_at ASC, id ASC",
            self.0
        )
    }

    pub(crate) fn last_sql(&self) -> String {
        format!(
            "SELECT name, applied_at FROM {} ORDER BY applied_at DESC, id DESC LIMIT 1",
            self.0
        )
    }

    pub(crate) fn insert_sql(&self) -> String {
        format!("INSERT INTO {} (name) VALUES ($1)", self.0)
    }

    pub(crate) fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.0)
    }
}

impl Default for LedgerTable {
    fn default() -> Self {
        Self(DEFAULT_LEDGER_TABLE.to_string())
    }
}

impl fmt::Display for LedgerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Create the ledger table if it does not exist yet
///
/// Safe to call on every invocation.
pub fn initialize_ledger_table(executor: &dyn TideExecutor, table: &LedgerTable) -> Result<(), TideError> {
    executor.batch_execute(&table.create_sql())?;
    log::debug!("ledger table '{table}' ready");
    Ok(())
}

/// Whether the ledger table is visible on the search path; runs no DDL
pub fn ledger_table_exists(executor: &dyn TideExecutor, table: &LedgerTable) -> Result<bool, TideError> {
    let name = table.as_str().to_string();
    let rows = executor.query_all(table.exists_sql(), &[&name])?;
    let row = rows
        .first()
        .ok_or_else(|| TideError::QueryError(format!("to_regclass returned no row for '{table}'")))?;
    let exists: bool = row.try_get(0)?;
    Ok(exists)
}

/// All ledger entries, oldest first
pub fn query_applied(executor: &dyn TideExecutor, table: &LedgerTable) -> Result<Vec<LedgerEntry>, TideError> {
    executor
        .query_all(&table.list_sql(), &[])?
        .iter()
        .map(LedgerEntry::from_row)
        .collect()
}

/// The most recently applied entry, if any
pub fn query_last_applied(
    executor: &dyn TideExecutor,
    table: &LedgerTable,
) -> Result<Option<LedgerEntry>, TideError> {
    executor
        .query_all(&table.last_sql(), &[])?
        .first()
        .map(LedgerEntry::from_row)
        .transpose()
}

/// Insert the ledger row for `name`
pub fn insert_record(executor: &dyn TideExecutor, table: &LedgerTable, name: &str) -> Result<(), TideError> {
    let name = name.to_string();
    executor.execute(&table.insert_sql(), &[&name])?;
    Ok(())
}

/// Delete the ledger row for `name`, returning how many rows went away
pub fn delete_record(executor: &dyn TideExecutor, table: &LedgerTable, name: &str) -> Result<u64, TideError> {
    let name = name.to_string();
    executor.execute(&table.delete_sql(), &[&name])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_matches_ledger_schema() {
        let table = LedgerTable::default();
        assert_eq!(table.as_str(), "migrations");

        let sql = table.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS migrations ("));
        assert!(sql.contains("id SERIAL PRIMARY KEY"));
        assert!(sql.contains("name VARCHAR(255) NOT NULL UNIQUE"));
        assert!(sql.contains("applied_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_statements_use_table_and_bind_name() {
        let table = LedgerTable::new("schema_history").unwrap();
        assert_eq!(
            table.insert_sql(),
            "INSERT INTO schema_history (name) VALUES ($1)"
        );
        assert_eq!(
            table.delete_sql(),
            "DELETE FROM schema_history WHERE name = $1"
        );
        assert!(table.list_sql().contains("ORDER BY applied_at ASC, id ASC"));
        // Existence check binds the name and never creates anything
        assert!(table.exists_sql().contains("to_regclass($1"));
        assert!(!table.exists_sql().contains("CREATE"));
        assert!(table.last_sql().ends_with("ORDER BY applied_at DESC, id DESC LIMIT 1"));
    }

    #[test]
    fn test_rejects_non_identifier_table_names() {
        for name in ["", "1migrations", "migrations; DROP TABLE users", "public.migrations", "my-table"] {
            assert!(LedgerTable::new(name).is_err(), "should reject {name:?}");
        }
        assert!(LedgerTable::new("_tidemark_ledger").is_ok());
    }
}
