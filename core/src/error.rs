use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type FlatResult<T> = Result<T, FlatError>;

/// Broad class of a failure, used by callers to decide between retrying,
/// rolling back, or reporting a bug in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A schema or data resource could not be opened, read, written or moved.
    Resource,
    /// A definition was rejected before anything was mutated.
    Schema,
    /// An enforced invariant: constraints, locks, aliases.
    Logical,
}

#[derive(Error, Debug)]
pub enum FlatError {
    // Resource errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot open database directory {}: {source}", path.display())]
    CannotOpenDatabase {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create init marker in {}: {source}", path.display())]
    CannotCreateInitFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot open schema file of table '{table}': {source}")]
    CannotOpenDefFile {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Schema file of table '{table}' has a malformed line {line:?}")]
    CorruptDefFile { table: String, line: String },

    #[error("Cannot open data file of table '{table}': {source}")]
    CannotOpenDataFile {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot stat files of table '{table}': {source}")]
    CannotStatTable {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read table '{table}': {source}")]
    CannotReadTable {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write table '{table}': {source}")]
    CannotWriteTable {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot flush table '{table}': {source}")]
    CannotFlushTable {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot {action} files of table '{table}': {source}")]
    TableFiles {
        table: String,
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read locks of table '{table}': {source}")]
    CannotReadLocks {
        table: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot release {mode} lock on table '{table}': {source}")]
    CannotUnlock {
        table: String,
        mode: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Table '{0}' has no delete marker column")]
    MissingDeleteColumn(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Schema errors
    #[error("Invalid column definition: {0:?}")]
    InvalidColumnDefinition(String),

    #[error("Column name '{name}' is longer than {max} characters")]
    ColumnNameTooLong { name: String, max: usize },

    #[error("Table name '{name}' is longer than {max} characters")]
    TableNameTooLong { name: String, max: usize },

    #[error("Column '{0}' already exists")]
    ColumnAlreadyExists(String),

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Column '{0}' must have a positive length")]
    InvalidColumnLength(String),

    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Name '{0}' uses the reserved prefix")]
    ReservedName(String),

    #[error("Row {row} is out of range for table '{table}' ({rows} rows)")]
    RowOutOfRange {
        table: String,
        row: usize,
        rows: usize,
    },

    #[error("Unknown trigger function '{0}'")]
    UnknownTriggerFunction(String),

    #[error("Unknown trigger operation '{0}'")]
    UnknownOperation(String),

    #[error("Trigger parameter '{0}' must name a table and a column")]
    InvalidTriggerParameter(String),

    // Logical errors
    #[error("Duplicate primary key {table}.{column} = '{value}'")]
    DuplicatePrimaryKey {
        table: String,
        column: String,
        value: String,
    },

    #[error("Foreign key {table}.{column} = '{value}' has no referenced row")]
    InvalidForeignKey {
        table: String,
        column: String,
        value: String,
    },

    #[error("Cannot delete {table}.{column} = '{value}': still referenced")]
    DeleteRestricted {
        table: String,
        column: String,
        value: String,
    },

    #[error("Cannot update {table}.{column} = '{value}': still referenced")]
    UpdateRestricted {
        table: String,
        column: String,
        value: String,
    },

    #[error("Cannot lock table '{0}' in exclusive mode")]
    CannotLockExclusive(String),

    #[error("Cannot lock table '{0}' in shared mode")]
    CannotLockShared(String),

    #[error("Alias '{0}' duplicates an existing alias")]
    DuplicateAlias(String),

    #[error("Alias '{0}' not found")]
    AliasNotFound(String),

    #[error("Alias '{0}' already exists")]
    AliasAlreadyExists(String),
}

impl FlatError {
    pub fn kind(&self) -> ErrorKind {
        use FlatError::*;
        match self {
            Io(_)
            | CannotOpenDatabase { .. }
            | CannotCreateInitFile { .. }
            | CannotOpenDefFile { .. }
            | CorruptDefFile { .. }
            | CannotOpenDataFile { .. }
            | CannotStatTable { .. }
            | CannotReadTable { .. }
            | CannotWriteTable { .. }
            | CannotFlushTable { .. }
            | TableFiles { .. }
            | CannotReadLocks { .. }
            | CannotUnlock { .. }
            | MissingDeleteColumn(_)
            | Config(_) => ErrorKind::Resource,

            InvalidColumnDefinition(_)
            | ColumnNameTooLong { .. }
            | TableNameTooLong { .. }
            | ColumnAlreadyExists(_)
            | ColumnNotFound(_)
            | InvalidColumnLength(_)
            | TableAlreadyExists(_)
            | TableNotFound(_)
            | ReservedName(_)
            | RowOutOfRange { .. }
            | UnknownTriggerFunction(_)
            | UnknownOperation(_)
            | InvalidTriggerParameter(_) => ErrorKind::Schema,

            DuplicatePrimaryKey { .. }
            | InvalidForeignKey { .. }
            | DeleteRestricted { .. }
            | UpdateRestricted { .. }
            | CannotLockExclusive(_)
            | CannotLockShared(_)
            | DuplicateAlias(_)
            | AliasNotFound(_)
            | AliasAlreadyExists(_) => ErrorKind::Logical,
        }
    }
}

/// A condition that leaves the result usable but possibly incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Some rows could not be copied while rebuilding a table.
    RowsNotCopied { table: String, failed: usize },
    /// Some rows could not be read during a full scan.
    RowsNotRead { table: String, failed: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::RowsNotCopied { table, failed } => {
                write!(f, "{failed} row(s) of table '{table}' failed to copy")
            }
            Warning::RowsNotRead { table, failed } => {
                write!(f, "{failed} row(s) of table '{table}' failed to read")
            }
        }
    }
}

/// Value returned together with the partial-failure warnings raised while
/// producing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(value: T, warning: Option<Warning>) -> Self {
        Self {
            value,
            warnings: warning.into_iter().collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FlatError::ColumnAlreadyExists("NAME".into()).kind(),
            ErrorKind::Schema
        );
        assert_eq!(
            FlatError::CannotLockShared("t1".into()).kind(),
            ErrorKind::Logical
        );
        assert_eq!(
            FlatError::CorruptDefFile {
                table: "t1".into(),
                line: "NAME:x".into()
            }
            .kind(),
            ErrorKind::Resource
        );
        let io = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(FlatError::from(io).kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_outcome_completeness() {
        let clean = Outcome::complete(3);
        assert!(clean.is_complete());

        let partial = Outcome::with_warning(
            2,
            Some(Warning::RowsNotCopied {
                table: "t1".into(),
                failed: 1,
            }),
        );
        assert!(!partial.is_complete());
        assert_eq!(partial.into_value(), 2);
    }
}
