use crate::error::FlatResult;
use crate::storage::{Row, TableRef};
use crate::transaction::{Transaction, UndoEntry};
use crate::trigger::{Operation, Timing, TriggerContext, execute_triggers};

impl Transaction {
    fn context<'a>(
        &'a self,
        table: &'a TableRef,
        table_name: &'a str,
        row: &'a Row,
        old: Option<&'a Row>,
        row_number: Option<usize>,
    ) -> TriggerContext<'a> {
        TriggerContext {
            db: &self.db,
            table,
            table_name,
            row,
            old,
            row_number,
        }
    }

    /// Insert a row through the table's triggers and return its row number.
    ///
    /// The undo entry is logged as soon as the row is written, so a failing
    /// after-trigger leaves a mutation that rollback still reverts.
    pub fn insert(&mut self, table: &TableRef, row: &Row) -> FlatResult<usize> {
        let name = table.read().name().to_string();
        execute_triggers(
            &self.context(table, &name, row, None, None),
            Timing::Before,
            Operation::Insert,
        )?;

        let row_number = table.write().insert(row)?;
        self.log(UndoEntry::Insert {
            table: TableRef::clone(table),
            row: row_number,
        });

        execute_triggers(
            &self.context(table, &name, row, None, Some(row_number)),
            Timing::After,
            Operation::Insert,
        )?;
        Ok(row_number)
    }

    /// Overwrite the given fields of a row through the table's triggers.
    pub fn update(&mut self, table: &TableRef, row_number: usize, values: &Row) -> FlatResult<()> {
        let (name, original) = {
            let table = table.read();
            (table.name().to_string(), table.read(row_number)?)
        };
        execute_triggers(
            &self.context(table, &name, values, Some(&original), Some(row_number)),
            Timing::Before,
            Operation::Update,
        )?;

        table.write().update(row_number, values)?;
        self.log(UndoEntry::Update {
            table: TableRef::clone(table),
            row: row_number,
            original: original.clone(),
        });

        execute_triggers(
            &self.context(table, &name, values, Some(&original), Some(row_number)),
            Timing::After,
            Operation::Update,
        )
    }

    /// Soft-delete a row through the table's triggers.
    pub fn delete(&mut self, table: &TableRef, row_number: usize) -> FlatResult<()> {
        let (name, row) = {
            let table = table.read();
            (table.name().to_string(), table.read(row_number)?)
        };
        execute_triggers(
            &self.context(table, &name, &row, None, Some(row_number)),
            Timing::Before,
            Operation::Delete,
        )?;

        table.write().delete(row_number)?;
        self.log(UndoEntry::Delete {
            table: TableRef::clone(table),
            row: row_number,
        });

        execute_triggers(
            &self.context(table, &name, &row, None, Some(row_number)),
            Timing::After,
            Operation::Delete,
        )
    }
}
