//! Creating and removing key constraints
//!
//! Constraints are only trigger rows in `~before`; making one inserts them,
//! removing one soft-deletes them. Callers lock `~before` like any other
//! table when other transactions may be running.

use crate::error::{FlatError, FlatResult};
use crate::query::{Condition, Eq, RaResult};
use crate::storage::{BEFORE_TABLE, Database};
use crate::trigger::{Operation, PARAM_SEPARATOR, Trigger, TriggerFunc};

fn check_column(db: &Database, table: &str, column: &str) -> FlatResult<()> {
    if !db.get(table)?.read().has_column(column) {
        return Err(FlatError::ColumnNotFound(format!("{}.{}", table, column)));
    }
    Ok(())
}

fn reference(table: &str, column: &str) -> String {
    format!("{}{}{}", table, PARAM_SEPARATOR, column)
}

fn register(db: &Database, triggers: &[Trigger]) -> FlatResult<()> {
    let before = db.get(BEFORE_TABLE)?;
    let mut before = before.write();
    for trigger in triggers {
        before.insert(&trigger.to_row())?;
    }
    before.flush()
}

/// Soft-delete the trigger rows matching every condition.
fn unregister(db: &Database, conditions: &[Condition]) -> FlatResult<usize> {
    let before = db.get(BEFORE_TABLE)?;
    let mut query = RaResult::new();
    query.load(&before)?.multiple_select(conditions)?;
    let rows = query.table(BEFORE_TABLE)?.row_numbers.clone();

    let mut before = before.write();
    for &row in &rows {
        before.delete(row)?;
    }
    before.flush()?;
    Ok(rows.len())
}

/// Make `table.column` a primary key.
pub fn make_primary_key(db: &Database, table: &str, column: &str) -> FlatResult<()> {
    check_column(db, table, column)?;
    register(
        db,
        &[
            Trigger::new(table, column, TriggerFunc::PrimaryKey, Operation::Insert, ""),
            Trigger::new(table, column, TriggerFunc::PrimaryKey, Operation::Update, ""),
        ],
    )?;
    tracing::info!("Made {}.{} a primary key", table, column);
    Ok(())
}

/// Make `fk_table.fk_column` reference `pk_table.pk_column`.
pub fn make_foreign_key(
    db: &Database,
    fk_table: &str,
    fk_column: &str,
    pk_table: &str,
    pk_column: &str,
) -> FlatResult<()> {
    check_column(db, fk_table, fk_column)?;
    check_column(db, pk_table, pk_column)?;
    let referenced = reference(pk_table, pk_column);
    let referencing = reference(fk_table, fk_column);
    register(
        db,
        &[
            Trigger::new(
                fk_table,
                fk_column,
                TriggerFunc::ForeignKey,
                Operation::Insert,
                &referenced,
            ),
            Trigger::new(
                fk_table,
                fk_column,
                TriggerFunc::ForeignKey,
                Operation::Update,
                &referenced,
            ),
            Trigger::new(
                pk_table,
                pk_column,
                TriggerFunc::UpdateRestricted,
                Operation::Update,
                &referencing,
            ),
            Trigger::new(
                pk_table,
                pk_column,
                TriggerFunc::DeleteRestricted,
                Operation::Delete,
                &referencing,
            ),
        ],
    )?;
    tracing::info!(
        "Made {}.{} a foreign key to {}.{}",
        fk_table,
        fk_column,
        pk_table,
        pk_column
    );
    Ok(())
}

/// Drop the primary key on `table.column`. Returns the number of trigger
/// rows removed.
pub fn remove_primary_key(db: &Database, table: &str, column: &str) -> FlatResult<usize> {
    unregister(
        db,
        &[
            Condition::new("TABLE", Eq, table),
            Condition::new("COLUMN", Eq, column),
            Condition::new("FUNC", Eq, TriggerFunc::PrimaryKey.code()),
        ],
    )
}

/// Drop the foreign key from `fk_table.fk_column` to `pk_table.pk_column`,
/// including the restrictions it placed on the referenced key.
pub fn remove_foreign_key(
    db: &Database,
    fk_table: &str,
    fk_column: &str,
    pk_table: &str,
    pk_column: &str,
) -> FlatResult<usize> {
    let mut removed = unregister(
        db,
        &[
            Condition::new("TABLE", Eq, fk_table),
            Condition::new("COLUMN", Eq, fk_column),
            Condition::new("FUNC", Eq, TriggerFunc::ForeignKey.code()),
            Condition::new("PARAM", Eq, reference(pk_table, pk_column)),
        ],
    )?;
    for func in [TriggerFunc::UpdateRestricted, TriggerFunc::DeleteRestricted] {
        removed += unregister(
            db,
            &[
                Condition::new("TABLE", Eq, pk_table),
                Condition::new("COLUMN", Eq, pk_column),
                Condition::new("FUNC", Eq, func.code()),
                Condition::new("PARAM", Eq, reference(fk_table, fk_column)),
            ],
        )?;
    }
    Ok(removed)
}
