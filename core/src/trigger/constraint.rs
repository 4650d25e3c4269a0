//! Key constraints built on triggers

use crate::error::{FlatError, FlatResult};
use crate::storage::record;
use crate::storage::{Row, TableRef, is_deleted};
use crate::trigger::{Trigger, TriggerContext, TriggerFunc};

/// Whether a live row of `table` other than `skip` holds `value` in `column`.
/// The value is compared as the column would store it.
fn find(table: &TableRef, column: &str, value: &str, skip: Option<usize>) -> FlatResult<bool> {
    let table = table.read();
    let length = table
        .column(column)
        .map(|c| c.length)
        .ok_or_else(|| FlatError::ColumnNotFound(format!("{}.{}", table.name(), column)))?;
    let wanted = record::normalize(value, length);

    for i in 0..table.number_of_rows()? {
        if Some(i) == skip {
            continue;
        }
        let row = table.read(i)?;
        if !is_deleted(&row) && row.get(column).is_some_and(|v| *v == wanted) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn value<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map_or("", String::as_str)
}

/// Run one trigger function against the rows in `ctx`.
pub fn execute(trigger: &Trigger, ctx: &TriggerContext<'_>) -> FlatResult<()> {
    let column = trigger.column.as_str();
    match trigger.func {
        TriggerFunc::PrimaryKey => primary_key(ctx, column),
        TriggerFunc::ForeignKey => {
            let (table, referenced) = trigger.target()?;
            foreign_key(ctx, column, table, referenced)
        }
        TriggerFunc::UpdateRestricted => {
            let (table, referencing) = trigger.target()?;
            update_restricted(ctx, column, table, referencing)
        }
        TriggerFunc::DeleteRestricted => {
            let (table, referencing) = trigger.target()?;
            delete_restricted(ctx, column, table, referencing)
        }
    }
}

/// No other live row may hold the new value.
fn primary_key(ctx: &TriggerContext<'_>, column: &str) -> FlatResult<()> {
    let value = value(ctx.row, column);
    if find(ctx.table, column, value, ctx.row_number)? {
        return Err(FlatError::DuplicatePrimaryKey {
            table: ctx.table_name.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// The new value must exist in `table.referenced`.
fn foreign_key(
    ctx: &TriggerContext<'_>,
    column: &str,
    table: &str,
    referenced: &str,
) -> FlatResult<()> {
    let value = value(ctx.row, column);
    let target = ctx.db.get(table)?;
    if !find(&target, referenced, value, None)? {
        return Err(FlatError::InvalidForeignKey {
            table: ctx.table_name.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A key still referenced from `table.referencing` may not change.
fn update_restricted(
    ctx: &TriggerContext<'_>,
    column: &str,
    table: &str,
    referencing: &str,
) -> FlatResult<()> {
    let Some(old) = ctx.old else {
        return Ok(());
    };
    let old_value = value(old, column);
    let length = ctx.table.read().column(column).map(|c| c.length);
    let unchanged = length.is_some_and(|length| {
        record::normalize(value(ctx.row, column), length) == record::normalize(old_value, length)
    });
    if unchanged {
        return Ok(());
    }

    let source = ctx.db.get(table)?;
    if find(&source, referencing, old_value, None)? {
        return Err(FlatError::UpdateRestricted {
            table: ctx.table_name.to_string(),
            column: column.to_string(),
            value: old_value.to_string(),
        });
    }
    Ok(())
}

/// A key still referenced from `table.referencing` may not be deleted.
fn delete_restricted(
    ctx: &TriggerContext<'_>,
    column: &str,
    table: &str,
    referencing: &str,
) -> FlatResult<()> {
    let value = value(ctx.row, column);
    let source = ctx.db.get(table)?;
    if find(&source, referencing, value, None)? {
        return Err(FlatError::DeleteRestricted {
            table: ctx.table_name.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::trigger::Operation;
    use tempfile::tempdir;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup(db: &Database) -> (TableRef, TableRef) {
        let people = db.create("PEOPLE").unwrap();
        people.write().add("NAME", 20).unwrap();
        let contact = db.create("CONTACT").unwrap();
        contact.write().add("NAME", 20).unwrap();
        people.write().insert(&row(&[("NAME", "Buzz")])).unwrap();
        people.write().insert(&row(&[("NAME", "Nick")])).unwrap();
        contact.write().insert(&row(&[("NAME", "Buzz")])).unwrap();
        (people, contact)
    }

    fn ctx<'a>(
        db: &'a Database,
        table: &'a TableRef,
        name: &'a str,
        new: &'a Row,
        old: Option<&'a Row>,
        row_number: Option<usize>,
    ) -> TriggerContext<'a> {
        TriggerContext {
            db,
            table,
            table_name: name,
            row: new,
            old,
            row_number,
        }
    }

    #[test]
    fn test_primary_key() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (people, _) = setup(&db);
        let pk = Trigger::new("PEOPLE", "NAME", TriggerFunc::PrimaryKey, Operation::Insert, "");

        let dup = row(&[("NAME", "Buzz")]);
        assert!(matches!(
            execute(&pk, &ctx(&db, &people, "PEOPLE", &dup, None, None)),
            Err(FlatError::DuplicatePrimaryKey { .. })
        ));

        // The row being updated does not collide with itself
        execute(&pk, &ctx(&db, &people, "PEOPLE", &dup, None, Some(0))).unwrap();

        // Deleted rows free their key
        people.write().delete(0).unwrap();
        execute(&pk, &ctx(&db, &people, "PEOPLE", &dup, None, None)).unwrap();
    }

    #[test]
    fn test_foreign_key() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (_, contact) = setup(&db);
        let fk = Trigger::new(
            "CONTACT",
            "NAME",
            TriggerFunc::ForeignKey,
            Operation::Insert,
            "PEOPLE;NAME",
        );

        let known = row(&[("NAME", "Nick")]);
        execute(&fk, &ctx(&db, &contact, "CONTACT", &known, None, None)).unwrap();

        let unknown = row(&[("NAME", "Christina")]);
        assert!(matches!(
            execute(&fk, &ctx(&db, &contact, "CONTACT", &unknown, None, None)),
            Err(FlatError::InvalidForeignKey { .. })
        ));

        let missing = Trigger::new(
            "CONTACT",
            "NAME",
            TriggerFunc::ForeignKey,
            Operation::Insert,
            "NOWHERE;NAME",
        );
        assert!(matches!(
            execute(&missing, &ctx(&db, &contact, "CONTACT", &known, None, None)),
            Err(FlatError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_restricted_keys() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let (people, _) = setup(&db);
        let ur = Trigger::new(
            "PEOPLE",
            "NAME",
            TriggerFunc::UpdateRestricted,
            Operation::Update,
            "CONTACT;NAME",
        );
        let dr = Trigger::new(
            "PEOPLE",
            "NAME",
            TriggerFunc::DeleteRestricted,
            Operation::Delete,
            "CONTACT;NAME",
        );

        let buzz = people.read().read(0).unwrap();
        let renamed = row(&[("NAME", "BuzzM")]);
        assert!(matches!(
            execute(&ur, &ctx(&db, &people, "PEOPLE", &renamed, Some(&buzz), Some(0))),
            Err(FlatError::UpdateRestricted { .. })
        ));
        // Rewriting the same key is not a change
        let same = row(&[("NAME", "Buzz")]);
        execute(&ur, &ctx(&db, &people, "PEOPLE", &same, Some(&buzz), Some(0))).unwrap();

        assert!(matches!(
            execute(&dr, &ctx(&db, &people, "PEOPLE", &buzz, None, Some(0))),
            Err(FlatError::DeleteRestricted { .. })
        ));

        let nick = people.read().read(1).unwrap();
        execute(&dr, &ctx(&db, &people, "PEOPLE", &nick, None, Some(1))).unwrap();
    }
}
