//! `LedgerEntry` - one row of the applied-migration ledger

use chrono::{DateTime, Utc};

/// A migration recorded as applied
///
/// Matches the `name` and `applied_at` columns of the ledger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Migration file name
    pub name: String,

    /// When the migration's transaction ran
    pub applied_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new `LedgerEntry`
    #[must_use]
    pub fn new(name: impl Into<String>, applied_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            applied_at,
        }
    }

    /// Create a `LedgerEntry` from a database row
    ///
    /// Expected column order: `name`, `applied_at`
    ///
    /// # Errors
    ///
    /// Returns `TideError` if a column is missing or has an unexpected type
    /// (`applied_at` must be `TIMESTAMP WITH TIME ZONE` and not null).
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, crate::TideError> {
        let name: String = row.try_get(0)?;
        let applied_at: DateTime<Utc> = row.try_get(1)?;

        Ok(Self { name, applied_at })
    }
}
