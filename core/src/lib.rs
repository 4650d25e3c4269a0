//! FlatDB - flat-file relational storage engine
//!
//! Tables are fixed-width row files with a schema file beside them. On top of
//! them sit a relational algebra engine, key constraints stored as trigger
//! rows, and transactions that lock tables through the filesystem and undo
//! their work on rollback.

pub mod clock;
pub mod config;
pub mod error;
pub mod query;
pub mod storage;
pub mod transaction;
pub mod trigger;


pub use clock::{Clock, IdGenerator, ManualClock, SystemClock, TxnId};
pub use config::Config;
pub use error::{ErrorKind, FlatError, FlatResult, Outcome, Warning};
pub use query::{Condition, Filter, RaResult};
pub use storage::{Database, Row, Table, TableRef};
pub use transaction::{Transaction, UndoEntry};
pub use trigger::maker::{
    make_foreign_key, make_primary_key, remove_foreign_key, remove_primary_key,
};
