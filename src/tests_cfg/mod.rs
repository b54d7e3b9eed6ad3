//! In-memory ledger for unit tests
//!
//! `MemoryLedger` behaves like a database with transactional DDL: everything a
//! transaction does is staged on a copy and only becomes visible on commit. Any
//! script containing the token `INVALID` fails, and a second ledger row for the
//! same name violates the unique constraint.

use crate::migration::{LedgerConnection, LedgerEntry, LedgerTransaction};
use crate::TideError;
use chrono::{TimeZone, Utc};

#[derive(Debug, Clone, Default)]
struct State {
    table_exists: bool,
    entries: Vec<LedgerEntry>,
    schema: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    committed: State,
    clock: i64,
    fail_ensure: bool,
    ensure_calls: usize,
    tables_created: usize,
    transactions_started: usize,
    open: usize,
    rollbacks: usize,
    attempted: Vec<String>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` as applied without running anything
    pub fn seed_applied(&mut self, name: &str) {
        self.committed.table_exists = true;
        let entry = LedgerEntry::new(name, self.tick());
        self.committed.entries.push(entry);
    }

    /// Make every `ensure_table` call fail
    pub fn fail_ensure_table(&mut self) {
        self.fail_ensure = true;
    }

    pub fn applied_names(&self) -> Vec<String> {
        self.committed.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Committed scripts, in execution order
    pub fn schema(&self) -> Vec<String> {
        self.committed.schema.clone()
    }

    /// Every script handed to `execute_script`, committed or not
    pub fn attempted(&self) -> Vec<String> {
        self.attempted.clone()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls
    }

    pub fn tables_created(&self) -> usize {
        self.tables_created
    }

    pub fn transactions_started(&self) -> usize {
        self.transactions_started
    }

    pub fn open_transactions(&self) -> usize {
        self.open
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    fn tick(&mut self) -> chrono::DateTime<Utc> {
        self.clock += 1;
        Utc.timestamp_opt(1_700_000_000 + self.clock, 0).unwrap()
    }
}

impl LedgerConnection for MemoryLedger {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn ensure_table(&mut self) -> Result<(), TideError> {
        self.ensure_calls += 1;
        if self.fail_ensure {
            return Err(TideError::QueryError("permission denied for schema public".to_string()));
        }
        if !self.committed.table_exists {
            self.committed.table_exists = true;
            self.tables_created += 1;
        }
        Ok(())
    }

    fn table_exists(&mut self) -> Result<bool, TideError> {
        Ok(self.committed.table_exists)
    }

    fn list_applied(&mut self) -> Result<Vec<LedgerEntry>, TideError> {
        if !self.committed.table_exists {
            return Err(TideError::QueryError("relation \"migrations\" does not exist".to_string()));
        }
        let mut entries = self.committed.entries.clone();
        entries.sort_by_key(|e| e.applied_at);
        Ok(entries)
    }

    fn last_applied(&mut self) -> Result<Option<LedgerEntry>, TideError> {
        Ok(self.list_applied()?.pop())
    }

    fn begin(&mut self) -> Result<Self::Transaction<'_>, TideError> {
        let staged = self.committed.clone();
        self.transactions_started += 1;
        self.open += 1;
        Ok(MemoryTransaction {
            ledger: self,
            staged,
            closed: false,
        })
    }
}

pub struct MemoryTransaction<'a> {
    ledger: &'a mut MemoryLedger,
    staged: State,
    closed: bool,
}

impl LedgerTransaction for MemoryTransaction<'_> {
    fn execute_script(&mut self, sql: &str) -> Result<(), TideError> {
        let sql = sql.trim().to_string();
        self.ledger.attempted.push(sql.clone());
        if sql.contains("INVALID") {
            return Err(TideError::QueryError(format!(
                "syntax error at or near \"INVALID\" in: {sql}"
            )));
        }
        self.staged.schema.push(sql);
        Ok(())
    }

    fn record_applied(&mut self, name: &str) -> Result<(), TideError> {
        if self.staged.entries.iter().any(|e| e.name == name) {
            return Err(TideError::QueryError(format!(
                "duplicate key value violates unique constraint: name = {name}"
            )));
        }
        let entry = LedgerEntry::new(name, self.ledger.tick());
        self.staged.entries.push(entry);
        Ok(())
    }

    fn record_reverted(&mut self, name: &str) -> Result<u64, TideError> {
        let before = self.staged.entries.len();
        self.staged.entries.retain(|e| e.name != name);
        Ok((before - self.staged.entries.len()) as u64)
    }

    fn commit(mut self) -> Result<(), TideError> {
        self.ledger.committed = std::mem::take(&mut self.staged);
        self.closed = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), TideError> {
        self.ledger.rollbacks += 1;
        self.closed = true;
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.ledger.rollbacks += 1;
        }
        self.ledger.open -= 1;
    }
}
