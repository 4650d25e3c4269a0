//! Triggers
//!
//! A trigger is a row of `~before` or `~after`: when operation `OP` touches
//! `TABLE.COLUMN`, run function `FUNC` with parameter `PARAM`. The functions
//! themselves are a closed set; which column runs which function is data.

pub mod constraint;
pub mod maker;

use crate::error::{FlatError, FlatResult};
use crate::query::{Condition, Eq, RaResult};
use crate::storage::{AFTER_TABLE, BEFORE_TABLE, Database, Row, TableRef};
use std::fmt;
use std::str::FromStr;

/// Separates the table and column of a trigger parameter.
pub const PARAM_SEPARATOR: char = ';';

/// Built-in trigger functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerFunc {
    PrimaryKey,
    ForeignKey,
    UpdateRestricted,
    DeleteRestricted,
}

impl TriggerFunc {
    pub fn code(&self) -> &'static str {
        match self {
            TriggerFunc::PrimaryKey => "PK",
            TriggerFunc::ForeignKey => "FK",
            TriggerFunc::UpdateRestricted => "UR",
            TriggerFunc::DeleteRestricted => "DR",
        }
    }
}

impl FromStr for TriggerFunc {
    type Err = FlatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PK" => Ok(TriggerFunc::PrimaryKey),
            "FK" => Ok(TriggerFunc::ForeignKey),
            "UR" => Ok(TriggerFunc::UpdateRestricted),
            "DR" => Ok(TriggerFunc::DeleteRestricted),
            other => Err(FlatError::UnknownTriggerFunction(other.to_string())),
        }
    }
}

/// Table operations triggers fire on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn code(&self) -> &'static str {
        match self {
            Operation::Insert => "IN",
            Operation::Update => "UP",
            Operation::Delete => "DE",
        }
    }
}

impl FromStr for Operation {
    type Err = FlatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "IN" => Ok(Operation::Insert),
            "UP" => Ok(Operation::Update),
            "DE" => Ok(Operation::Delete),
            other => Err(FlatError::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether a trigger runs before or after the mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Before,
    After,
}

impl Timing {
    pub fn table_name(&self) -> &'static str {
        match self {
            Timing::Before => BEFORE_TABLE,
            Timing::After => AFTER_TABLE,
        }
    }
}

/// One trigger registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub table: String,
    pub column: String,
    pub func: TriggerFunc,
    pub operation: Operation,
    pub parameter: String,
}

impl Trigger {
    pub fn new(
        table: &str,
        column: &str,
        func: TriggerFunc,
        operation: Operation,
        parameter: &str,
    ) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            func,
            operation,
            parameter: parameter.to_string(),
        }
    }

    pub fn from_row(row: &Row) -> FlatResult<Self> {
        let field = |name: &str| row.get(name).map_or("", String::as_str);
        Ok(Self {
            table: field("TABLE").to_string(),
            column: field("COLUMN").to_string(),
            func: field("FUNC").parse()?,
            operation: field("OP").parse()?,
            parameter: field("PARAM").to_string(),
        })
    }

    pub fn to_row(&self) -> Row {
        [
            ("TABLE", self.table.as_str()),
            ("COLUMN", self.column.as_str()),
            ("FUNC", self.func.code()),
            ("OP", self.operation.code()),
            ("PARAM", self.parameter.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// The `table;column` pair a key trigger refers to.
    pub fn target(&self) -> FlatResult<(&str, &str)> {
        match self.parameter.trim().split_once(PARAM_SEPARATOR) {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {
                Ok((table, column))
            }
            _ => Err(FlatError::InvalidTriggerParameter(self.parameter.clone())),
        }
    }
}

/// The rows a mutation is about to write, or has written.
pub struct TriggerContext<'a> {
    pub db: &'a Database,
    pub table: &'a TableRef,
    pub table_name: &'a str,
    /// New row on insert and update, the removed row on delete
    pub row: &'a Row,
    /// Row before an update
    pub old: Option<&'a Row>,
    /// Stored row being updated or deleted
    pub row_number: Option<usize>,
}

/// Triggers of `timing` registered for `operation` on any column of `ctx.row`,
/// in registration order per column.
pub fn triggers_for(
    ctx: &TriggerContext<'_>,
    timing: Timing,
    operation: Operation,
) -> FlatResult<Vec<Trigger>> {
    let registry = ctx.db.get(timing.table_name())?;
    let mut on_table = RaResult::new();
    on_table.load(&registry)?.select("TABLE", &Eq, ctx.table_name)?;

    let mut columns: Vec<&String> = ctx.row.keys().collect();
    columns.sort();

    let mut triggers = Vec::new();
    for column in columns {
        let mut matching = on_table.copy();
        matching.multiple_select(&[
            Condition::new("COLUMN", Eq, column.as_str()),
            Condition::new("OP", Eq, operation.code()),
        ])?;
        for i in 0..matching.number_of_rows() {
            triggers.push(Trigger::from_row(&matching.read(i)?)?);
        }
    }
    Ok(triggers)
}

/// Run the triggers of `timing` for `operation`, stopping at the first failure.
pub fn execute_triggers(
    ctx: &TriggerContext<'_>,
    timing: Timing,
    operation: Operation,
) -> FlatResult<()> {
    for trigger in triggers_for(ctx, timing, operation)? {
        tracing::debug!(
            "Running {} trigger on {}.{} for {}",
            trigger.func.code(),
            trigger.table,
            trigger.column,
            operation
        );
        constraint::execute(&trigger, ctx)?;
    }
    Ok(())
}
