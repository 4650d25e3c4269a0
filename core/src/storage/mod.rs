//! Storage layer: fixed-width table files, the database directory and
//! file-based table locks

pub mod column;
pub mod database;
pub mod files;
pub mod lock;
pub mod record;
pub mod table;

// Re-export core types
pub use column::{Column, DELETE_COLUMN, DELETED, RESERVED_PREFIX};
pub use database::{AFTER_TABLE, BEFORE_TABLE, Database, TableRef};
pub use lock::{LockManager, TableLocks};
pub use record::Row;
pub use table::{Table, is_deleted};
