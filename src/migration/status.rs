//! Migration status tracking

use crate::migration::{LedgerEntry, MigrationError, MigrationFile};
use std::collections::HashSet;
use std::fmt;

/// A disagreement between the ledger and the migration directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerIssue {
    /// The ledger records a migration whose file is gone
    MissingFile { name: String },

    /// A pending file sorts before a migration that is already applied
    PendingBeforeApplied { pending: String, latest_applied: String },

    /// Applied history (by `applied_at`) is not in file name order
    AppliedOutOfOrder { name: String, previous: String },
}

impl fmt::Display for LedgerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerIssue::MissingFile { name } => {
                write!(f, "'{name}' is recorded as applied but its file is missing")
            }
            LedgerIssue::PendingBeforeApplied { pending, latest_applied } => write!(
                f,
                "'{pending}' is pending but sorts before already applied '{latest_applied}'"
            ),
            LedgerIssue::AppliedOutOfOrder { name, previous } => {
                write!(f, "'{name}' was applied after '{previous}' but sorts before it")
            }
        }
    }
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations (from the ledger), oldest first
    pub applied: Vec<LedgerEntry>,

    /// Pending migrations (from the file system), in apply order
    pub pending: Vec<MigrationFile>,

    /// Everything that breaks the ordering guarantees
    pub issues: Vec<LedgerIssue>,
}

impl MigrationStatus {
    /// Diff sorted migration files against ledger entries
    #[must_use]
    pub fn compute(files: Vec<MigrationFile>, applied: Vec<LedgerEntry>) -> Self {
        let applied_names: HashSet<&str> = applied.iter().map(|e| e.name.as_str()).collect();
        let file_names: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();

        let mut issues: Vec<LedgerIssue> = applied
            .iter()
            .filter(|e| !file_names.contains(e.name.as_str()))
            .map(|e| LedgerIssue::MissingFile {
                name: e.name.clone(),
            })
            .collect();

        issues.extend(applied.windows(2).filter_map(|pair| {
            (pair[1].name < pair[0].name).then(|| LedgerIssue::AppliedOutOfOrder {
                name: pair[1].name.clone(),
                previous: pair[0].name.clone(),
            })
        }));

        let pending: Vec<MigrationFile> = files
            .into_iter()
            .filter(|f| !applied_names.contains(f.name.as_str()))
            .collect();

        if let Some(latest) = applied.iter().map(|e| e.name.as_str()).max() {
            issues.extend(
                pending
                    .iter()
                    .filter(|f| f.name.as_str() < latest)
                    .map(|f| LedgerIssue::PendingBeforeApplied {
                        pending: f.name.clone(),
                        latest_applied: latest.to_string(),
                    }),
            );
        }

        Self {
            applied,
            pending,
            issues,
        }
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// The most recently applied migration
    #[must_use]
    pub fn latest_applied(&self) -> Option<&LedgerEntry> {
        self.applied.last()
    }

    /// Fail with `LedgerInconsistency` if any issue was found
    ///
    /// # Errors
    ///
    /// `LedgerInconsistency` when `issues` is non-empty; the message lists every
    /// [`LedgerIssue`] joined with `; `.
    pub fn ensure_consistent(&self) -> Result<(), MigrationError> {
        if self.issues.is_empty() {
            return Ok(());
        }

        let details = self
            .issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(MigrationError::LedgerInconsistency(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn files(names: &[&str]) -> Vec<MigrationFile> {
        names
            .iter()
            .map(|n| MigrationFile {
                path: PathBuf::from("migrations").join(n),
                name: n.to_string(),
            })
            .collect()
    }

    fn entries(names: &[&str]) -> Vec<LedgerEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| LedgerEntry::new(*n, Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap()))
            .collect()
    }

    #[test]
    fn test_pending_is_files_minus_ledger_in_order() {
        let status = MigrationStatus::compute(
            files(&["migration_001_a.sql", "migration_002_b.sql", "migration_003_c.sql"]),
            entries(&["migration_001_a.sql"]),
        );

        let pending: Vec<&str> = status.pending.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(pending, vec!["migration_002_b.sql", "migration_003_c.sql"]);
        assert!(status.issues.is_empty());
        assert!(!status.is_up_to_date());
        assert_eq!(status.latest_applied().unwrap().name, "migration_001_a.sql");
        assert!(status.ensure_consistent().is_ok());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let status = MigrationStatus::compute(
            files(&["migration_002_b.sql"]),
            entries(&["migration_001_a.sql", "migration_002_b.sql"]),
        );

        assert_eq!(
            status.issues,
            vec![LedgerIssue::MissingFile {
                name: "migration_001_a.sql".to_string()
            }]
        );
        assert!(status.is_up_to_date());
        assert!(matches!(
            status.ensure_consistent(),
            Err(MigrationError::LedgerInconsistency(_))
        ));
    }

    #[test]
    fn test_pending_before_latest_applied_is_reported() {
        let status = MigrationStatus::compute(
            files(&["migration_001_a.sql", "migration_002_b.sql", "migration_003_c.sql"]),
            entries(&["migration_001_a.sql", "migration_003_c.sql"]),
        );

        assert_eq!(
            status.issues,
            vec![LedgerIssue::PendingBeforeApplied {
                pending: "migration_002_b.sql".to_string(),
                latest_applied: "migration_003_c.sql".to_string(),
            }]
        );
        let err = status.ensure_consistent().unwrap_err();
        assert!(err.to_string().contains("migration_002_b.sql"));
    }

    #[test]
    fn test_applied_out_of_order_is_reported() {
        let status = MigrationStatus::compute(
            files(&["migration_001_a.sql", "migration_002_b.sql"]),
            entries(&["migration_002_b.sql", "migration_001_a.sql"]),
        );

        assert_eq!(
            status.issues,
            vec![LedgerIssue::AppliedOutOfOrder {
                name: "migration_001_a.sql".to_string(),
                previous: "migration_002_b.sql".to_string(),
            }]
        );
    }
}
