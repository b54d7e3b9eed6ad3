//! Transactional apply / revert of a single migration
//!
//! Both directions follow the same protocol:
//!
//! 1. `BEGIN`
//! 2. run the script verbatim
//! 3. insert (apply) or delete (revert) the ledger row
//! 4. `COMMIT`
//!
//! Any failure in 2–4 rolls the transaction back before the error is returned, so
//! the schema change and the ledger row are either both persisted or both absent.

use crate::migration::{LedgerConnection, LedgerTransaction, MigrationError};
use std::time::Instant;

/// Apply `forward_sql` and record `name` in the ledger, atomically
///
/// # Errors
///
/// Returns `MigrationError::SqlExecution` carrying `name` and the first error. The
/// transaction has been rolled back by the time this returns.
pub fn apply_migration<C>(conn: &mut C, name: &str, forward_sql: &str) -> Result<(), MigrationError>
where
    C: LedgerConnection,
{
    let start = Instant::now();
    let mut tx = conn.begin().map_err(|e| MigrationError::sql(name, e))?;

    let outcome = tx
        .execute_script(forward_sql)
        .and_then(|()| tx.record_applied(name))
        .map_err(|e| MigrationError::sql(name, e));
    finish(tx, name, outcome)?;

    log::info!("Applied migration {name} ({}ms)", start.elapsed().as_millis());
    Ok(())
}

/// Run `rollback_sql` and delete `name` from the ledger, atomically
///
/// # Errors
///
/// - `SqlExecution` if the script, the delete or the commit fails
/// - `LedgerInconsistency` if the delete did not remove exactly one row
///
/// Either way the transaction has been rolled back and the ledger is unchanged.
pub fn revert_migration<C>(conn: &mut C, name: &str, rollback_sql: &str) -> Result<(), MigrationError>
where
    C: LedgerConnection,
{
    let start = Instant::now();
    let mut tx = conn.begin().map_err(|e| MigrationError::sql(name, e))?;

    let outcome = revert_steps(&mut tx, name, rollback_sql);
    finish(tx, name, outcome)?;

    log::info!("Rolled back migration {name} ({}ms)", start.elapsed().as_millis());
    Ok(())
}

fn revert_steps<T: LedgerTransaction>(tx: &mut T, name: &str, rollback_sql: &str) -> Result<(), MigrationError> {
    tx.execute_script(rollback_sql)
        .map_err(|e| MigrationError::sql(name, e))?;

    match tx.record_reverted(name).map_err(|e| MigrationError::sql(name, e))? {
        1 => Ok(()),
        0 => Err(MigrationError::LedgerInconsistency(format!(
            "'{name}' is not recorded in the ledger"
        ))),
        n => Err(MigrationError::LedgerInconsistency(format!(
            "ledger holds {n} rows for '{name}'"
        ))),
    }
}

/// Commit on success; otherwise roll back and hand back the original error
fn finish<T: LedgerTransaction>(tx: T, name: &str, outcome: Result<(), MigrationError>) -> Result<(), MigrationError> {
    match outcome {
        Ok(()) => tx.commit().map_err(|e| MigrationError::sql(name, e)),
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                log::error!("Rollback after failed migration {name} also failed: {rollback_err}");
            }
            log::warn!("Migration {name} rolled back: {e}");
            Err(e)
        }
    }
}
