//! Column definitions
//!
//! A table's `.def` file holds one `name:length` line per column, in
//! declaration order. Offsets are not stored; they follow from the order.

use crate::error::{FlatError, FlatResult};
use serde::{Deserialize, Serialize};

/// Prefix reserved for engine-owned columns and tables.
pub const RESERVED_PREFIX: &str = "~";

/// Soft-delete marker column, present in every table.
pub const DELETE_COLUMN: &str = "~del";

/// Value of the delete marker for a deleted row.
pub const DELETED: &str = "y";

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
	pub name: String,
	/// Byte offset of the field within a row
	pub offset: usize,
	pub length: usize,
	/// Engine-owned column; user code may neither add nor remove it
	pub is_system: bool,
}

impl Column {
	pub fn new(name: impl Into<String>, offset: usize, length: usize) -> Self {
		let name = name.into();
		let is_system = is_reserved(&name);
		Self {
			name,
			offset,
			length,
			is_system,
		}
	}

	/// Parse a `name:length` schema line into a column at `offset`.
	pub fn from_def(offset: usize, line: &str) -> FlatResult<Self> {
		let (name, length) = line
			.rsplit_once(':')
			.ok_or_else(|| FlatError::InvalidColumnDefinition(line.to_string()))?;
		let length: usize = length
			.trim()
			.parse()
			.map_err(|_| FlatError::InvalidColumnDefinition(line.to_string()))?;
		if name.is_empty() || length == 0 {
			return Err(FlatError::InvalidColumnDefinition(line.to_string()));
		}
		Ok(Self::new(name, offset, length))
	}

	/// Schema line for this column, newline included.
	pub fn to_def(&self) -> String {
		def_line(&self.name, self.length)
	}

	pub fn range(&self) -> std::ops::Range<usize> {
		self.offset..self.offset + self.length
	}
}

pub fn def_line(name: &str, length: usize) -> String {
	format!("{}:{}\n", name, length)
}

pub fn is_reserved(name: &str) -> bool {
	name.starts_with(RESERVED_PREFIX)
}
