use crate::error::FlatResult;
use crate::storage::TableLocks;
use crate::transaction::Transaction;

impl Transaction {
    fn remember_lock(&mut self, table: &str) {
        if !self.locked.iter().any(|t| t == table) {
            self.locked.push(table.to_string());
        }
    }

    /// Lock a table for writing. Fails at once if any other transaction holds
    /// a lock on it; a shared lock held only by this transaction is upgraded.
    pub fn elock(&mut self, table: &str) -> FlatResult<()> {
        self.db.get(table)?;
        self.db.locks().acquire_exclusive(self.id, table)?;
        self.remember_lock(table);
        Ok(())
    }

    /// Lock a table for reading. Fails at once if another transaction holds
    /// it exclusively; an exclusive lock of this transaction is downgraded.
    pub fn slock(&mut self, table: &str) -> FlatResult<()> {
        self.db.get(table)?;
        self.db.locks().acquire_shared(self.id, table)?;
        self.remember_lock(table);
        Ok(())
    }

    /// Release this transaction's lock on a table without flushing it.
    pub fn unlock(&mut self, table: &str) -> FlatResult<()> {
        self.db.locks().release(self.id, table)?;
        self.locked.retain(|t| t != table);
        Ok(())
    }

    /// Exclusively lock every table of the database, stopping at the first
    /// failure. Locks taken before the failure are kept until commit or
    /// rollback.
    pub fn lock_all(&mut self) -> FlatResult<()> {
        for table in self.db.table_names() {
            self.elock(&table)?;
        }
        Ok(())
    }

    /// Current holders of a table's locks.
    pub fn locks_of(&self, table: &str) -> FlatResult<TableLocks> {
        self.db.locks().locks_of(table)
    }
}
