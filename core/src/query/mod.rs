//! Relational algebra over stored tables
//!
//! Queries narrow an [`RaResult`] in place: load tables, select, join,
//! rename aliases and project, then read the surviving rows.

pub mod filter;
pub mod join;
pub mod project;
pub mod result;
pub mod select;

pub use filter::{Eq, Filter, Ge, Gt, Le, Lt, Ne};
pub use result::{RaResult, TableColumn, TableResult};
pub use select::Condition;
