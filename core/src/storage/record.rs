//! Fixed-width row encoding
//!
//! A row is the concatenation of its fields in declaration order, each
//! space-padded or truncated to the column length, followed by a newline.

use crate::storage::Column;
use std::collections::HashMap;

/// Column name to value, values trimmed of padding.
pub type Row = HashMap<String, String>;

pub const PAD: u8 = b' ';
pub const ROW_TERMINATOR: u8 = b'\n';

/// Bytes of `value` padded or truncated to exactly `length`.
///
/// Truncation never splits a multi-byte character; the freed bytes are padded.
pub fn encode_field(value: &str, length: usize) -> Vec<u8> {
	let mut end = value.len().min(length);
	while !value.is_char_boundary(end) {
		end -= 1;
	}
	let mut field = Vec::with_capacity(length);
	field.extend_from_slice(&value.as_bytes()[..end]);
	field.resize(length, PAD);
	field
}

pub fn decode_field(bytes: &[u8]) -> String {
	String::from_utf8_lossy(bytes).trim().to_string()
}

/// The value a column of `length` would hand back after storing `value`.
pub fn normalize(value: &str, length: usize) -> String {
	decode_field(&encode_field(value, length))
}

/// Encode a full row. Columns missing from `row` are written blank.
pub fn encode_row(columns: &[Column], row_length: usize, row: &Row) -> Vec<u8> {
	let mut bytes = vec![PAD; row_length];
	for column in columns {
		if let Some(value) = row.get(&column.name) {
			bytes[column.range()].copy_from_slice(&encode_field(value, column.length));
		}
	}
	if let Some(last) = bytes.last_mut() {
		*last = ROW_TERMINATOR;
	}
	bytes
}

pub fn decode_row(columns: &[Column], bytes: &[u8]) -> Row {
	columns
		.iter()
		.map(|column| (column.name.clone(), decode_field(&bytes[column.range()])))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn layout() -> (Vec<Column>, usize) {
		let columns = vec![
			Column::new("~del", 0, 1),
			Column::new("c1", 1, 2),
			Column::new("c2", 3, 5),
		];
		(columns, 9)
	}

	#[test]
	fn test_field_padding_and_truncation() {
		assert_eq!(encode_field("ab", 5), b"ab   ".to_vec());
		assert_eq!(encode_field("cccc", 2), b"cc".to_vec());
		assert_eq!(encode_field("", 3), b"   ".to_vec());
		// 'é' is two bytes and must not be split
		assert_eq!(encode_field("aé", 2), b"a ".to_vec());
		assert_eq!(normalize("  Buzz  ", 20), "Buzz");
	}

	#[test]
	fn test_row_layout() {
		let (columns, row_length) = layout();
		let row: Row = [("c1", "cccc"), ("c2", "333")]
			.into_iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();

		let bytes = encode_row(&columns, row_length, &row);
		assert_eq!(bytes, b" cc333  \n".to_vec());

		let decoded = decode_row(&columns, &bytes);
		assert_eq!(decoded["~del"], "");
		assert_eq!(decoded["c1"], "cc");
		assert_eq!(decoded["c2"], "333");
	}
}
