//! Migrator - runs pending migrations forward and reverses the latest one

use crate::migration::apply::{apply_migration, revert_migration};
use crate::migration::{
    LedgerConnection, LedgerEntry, MigrationError, MigrationFile, MigrationStatus, MigrationStore,
};
use std::path::Path;

/// Result of a successful `up` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpReport {
    /// Migrations applied by this run, in order
    pub applied: Vec<String>,
}

/// Result of a successful rollback request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The named migration was reverted and removed from the ledger
    RolledBack { name: String },

    /// The ledger was empty; nothing was executed
    NothingToRollBack,
}

/// The migration `down` would revert, with the SQL it would run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackPlan {
    /// Ledger entry of the most recently applied migration
    pub entry: LedgerEntry,

    /// Rollback SQL extracted from that migration's file
    pub rollback_sql: String,
}

/// Core migration execution engine
///
/// Stateless apart from the migrations directory: every call re-reads the ledger
/// and the directory, so a `Migrator` can be reused or rebuilt freely. The database
/// connection is passed in explicitly on each call.
pub struct Migrator {
    store: MigrationStore,
}

impl Migrator {
    /// Create a new Migrator over the specified migrations directory
    pub fn new(migrations_dir: impl AsRef<Path>) -> Self {
        Self {
            store: MigrationStore::new(migrations_dir),
        }
    }

    /// The migration file store
    pub fn store(&self) -> &MigrationStore {
        &self.store
    }

    /// Generate a new migration file; returns its name
    ///
    /// # Errors
    ///
    /// See [`MigrationStore::create_at`]: `InvalidArgument` for an empty or unusable
    /// name, `Io` if the directory or the file cannot be written.
    pub fn create(&self, human_name: &str) -> Result<String, MigrationError> {
        self.store.create(human_name)
    }

    /// Get migration status (applied vs pending, plus ledger issues)
    ///
    /// Read-only: a missing ledger table counts as an empty ledger and is not created.
    ///
    /// # Errors
    ///
    /// `Database` if the ledger cannot be read, `Io` if the directory cannot.
    pub fn status<C: LedgerConnection>(&self, conn: &mut C) -> Result<MigrationStatus, MigrationError> {
        let applied = if conn.table_exists()? {
            conn.list_applied()?
        } else {
            log::debug!("ledger table does not exist yet; treating it as empty");
            Vec::new()
        };
        let files = self.store.list()?;

        Ok(MigrationStatus::compute(files, applied))
    }

    /// Pending migrations `up` would apply, in order
    ///
    /// Read-only, like [`status`](Self::status).
    ///
    /// # Errors
    ///
    /// Besides I/O and database errors, returns `LedgerInconsistency` when the
    /// ledger and the directory disagree; see [`MigrationStatus::ensure_consistent`].
    pub fn plan_up<C: LedgerConnection>(&self, conn: &mut C) -> Result<Vec<MigrationFile>, MigrationError> {
        let status = self.status(conn)?;
        status.ensure_consistent()?;
        Ok(status.pending)
    }

    /// Apply all pending migrations in file name order
    ///
    /// Each migration runs in its own transaction together with its ledger insert.
    /// The first failure stops the run: later migrations are not attempted, earlier
    /// ones stay applied.
    ///
    /// # Errors
    ///
    /// - `Database` if the ledger cannot be created or read
    /// - `Io` / `InvalidFormat` if a pending file cannot be read or parsed; no
    ///   migration has been applied in that case
    /// - `LedgerInconsistency` if the ledger and the directory disagree
    /// - `SqlExecution` for the first migration that failed
    pub fn up<C: LedgerConnection>(&self, conn: &mut C) -> Result<UpReport, MigrationError> {
        conn.ensure_table()?;
        let pending = self.plan_up(conn)?;

        if pending.is_empty() {
            log::info!("No pending migrations to apply");
            return Ok(UpReport::default());
        }

        log::info!("Found {} pending migration(s)", pending.len());

        // Parse everything up front so a malformed file aborts before any schema change
        let scripts = pending
            .iter()
            .map(|file| self.store.read(&file.name).map(|script| (file, script)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = UpReport::default();
        for (file, script) in scripts {
            log::info!("Applying migration: {}", file.name);
            apply_migration(conn, &file.name, &script.forward_sql)?;
            report.applied.push(file.name.clone());
        }

        log::info!("All {} migration(s) applied successfully", report.applied.len());
        Ok(report)
    }

    /// Work out what `rollback_last` would do without changing anything
    ///
    /// Returns `None` when the ledger is empty or does not exist yet. Runs no DDL.
    ///
    /// # Errors
    ///
    /// - `Database` if the ledger cannot be read
    /// - `LedgerInconsistency` if the latest migration's file is gone
    /// - `MissingRollbackScript` if that file has no (or only a commented-out)
    ///   rollback block
    pub fn plan_rollback<C: LedgerConnection>(&self, conn: &mut C) -> Result<Option<RollbackPlan>, MigrationError> {
        if !conn.table_exists()? {
            return Ok(None);
        }

        let Some(entry) = conn.last_applied()? else {
            return Ok(None);
        };

        if !MigrationFile::is_migration_name(&entry.name) || !self.store.dir().join(&entry.name).is_file() {
            return Err(MigrationError::LedgerInconsistency(format!(
                "'{}' is recorded as applied but its file is missing from {}",
                entry.name,
                self.store.dir().display()
            )));
        }

        let script = self.store.read(&entry.name)?;
        let rollback_sql = script
            .executable_rollback()
            .ok_or_else(|| MigrationError::MissingRollbackScript {
                migration: entry.name.clone(),
            })?
            .to_string();

        Ok(Some(RollbackPlan {
            entry,
            rollback_sql,
        }))
    }

    /// Revert the most recently applied migration
    ///
    /// Only ever targets a single migration. An empty ledger is a successful no-op.
    ///
    /// # Errors
    ///
    /// Everything [`plan_rollback`](Self::plan_rollback) returns, plus
    /// `SqlExecution` if the rollback SQL fails; the ledger entry is left in place.
    pub fn rollback_last<C: LedgerConnection>(&self, conn: &mut C) -> Result<RollbackOutcome, MigrationError> {
        conn.ensure_table()?;
        let Some(plan) = self.plan_rollback(conn)? else {
            log::info!("No migrations to roll back");
            return Ok(RollbackOutcome::NothingToRollBack);
        };

        log::info!("Rolling back migration: {}", plan.entry.name);
        revert_migration(conn, &plan.entry.name, &plan.rollback_sql)?;

        Ok(RollbackOutcome::RolledBack {
            name: plan.entry.name,
        })
    }
}
