//! Transaction management
//!
//! A transaction mutates tables through triggers, keeps an undo log of the
//! inverse of every mutation, and holds the table locks it acquired until it
//! commits or rolls back. Either way it ends up fresh, with a new id.

mod dml;
mod locking;

use crate::clock::TxnId;
use crate::error::FlatResult;
use crate::storage::{DELETE_COLUMN, Database, Row, TableRef};
use std::sync::Arc;

/// Inverse of one completed mutation.
#[derive(Debug)]
pub enum UndoEntry {
    /// Undone by deleting the inserted row
    Insert { table: TableRef, row: usize },
    /// Undone by writing back the row as it was
    Update {
        table: TableRef,
        row: usize,
        original: Row,
    },
    /// Undone by clearing the delete marker
    Delete { table: TableRef, row: usize },
}

impl UndoEntry {
    pub fn undo(&self) -> FlatResult<()> {
        match self {
            UndoEntry::Insert { table, row } => table.write().delete(*row),
            UndoEntry::Update {
                table,
                row,
                original,
            } => table.write().update(*row, original),
            UndoEntry::Delete { table, row } => {
                let live: Row = [(DELETE_COLUMN.to_string(), String::new())].into();
                table.write().update(*row, &live)
            }
        }
    }
}

/// A database transaction
pub struct Transaction {
    db: Arc<Database>,
    id: TxnId,
    locked: Vec<String>,
    undo_log: Vec<UndoEntry>,
}

impl Transaction {
    pub fn new(db: Arc<Database>) -> Self {
        let id = db.next_txn_id();
        tracing::debug!("Transaction {} started", id);
        Self {
            db,
            id,
            locked: Vec::new(),
            undo_log: Vec::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Tables this transaction holds a lock on, in locking order.
    pub fn locked_tables(&self) -> &[String] {
        &self.locked
    }

    pub fn undo_log(&self) -> &[UndoEntry] {
        &self.undo_log
    }

    fn log(&mut self, entry: UndoEntry) {
        self.undo_log.push(entry);
    }

    /// Flush every locked table and release its lock.
    ///
    /// Stops at the first table that fails; tables already released stay so.
    pub fn commit(&mut self) -> FlatResult<()> {
        while let Some(name) = self.locked.first().cloned() {
            if let Ok(table) = self.db.get(&name) {
                table.read().flush()?;
            }
            self.db.locks().release(self.id, &name)?;
            self.locked.remove(0);
        }
        tracing::debug!(
            "Transaction {} committed ({} undo entries discarded)",
            self.id,
            self.undo_log.len()
        );
        self.reset();
        Ok(())
    }

    /// Undo every logged mutation, newest first, then release locks as
    /// commit does. The first undo failure is returned even if the locks
    /// were released.
    pub fn rollback(&mut self) -> FlatResult<()> {
        let mut undo_result = Ok(());
        while let Some(entry) = self.undo_log.pop() {
            if let Err(e) = entry.undo() {
                tracing::error!("Transaction {} failed to undo {:?}: {}", self.id, entry, e);
                undo_result = Err(e);
                break;
            }
        }
        self.undo_log.clear();

        let released = self.commit();
        undo_result?;
        released
    }

    fn reset(&mut self) {
        self.locked.clear();
        self.undo_log.clear();
        self.id = self.db.next_txn_id();
    }
}
