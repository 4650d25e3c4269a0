//! Table storage
//!
//! One table is a pair of files: the `.def` schema (one `name:length` line per
//! column) and the `.data` rows, each exactly `row_length` bytes. Rows are
//! addressed by index; deleting a row only sets its `~del` marker, and the
//! space is reclaimed when the table is rebuilt for a schema change.

use crate::error::{FlatError, FlatResult, Outcome, Warning};
use crate::storage::column::{self, Column, DELETE_COLUMN, DELETED};
use crate::storage::files;
use crate::storage::record::{self, Row};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const MAX_COLUMN_NAME_LENGTH: usize = 30;

/// Table storage
#[derive(Debug)]
pub struct Table {
	dir: PathBuf,
	name: String,
	def_file: File,
	data_file: File,
	columns: Vec<Column>,
	positions: HashMap<String, usize>,
	row_length: usize,
	max_column_name_length: usize,
}

/// Whether a row read from storage carries the delete marker.
pub fn is_deleted(row: &Row) -> bool {
	row.get(DELETE_COLUMN).is_some_and(|v| v == DELETED)
}

impl Table {
	/// Open an existing table
	pub fn open<P: AsRef<Path>>(dir: P, name: &str) -> FlatResult<Self> {
		Self::open_with(dir, name, MAX_COLUMN_NAME_LENGTH)
	}

	pub fn open_with<P: AsRef<Path>>(
		dir: P,
		name: &str,
		max_column_name_length: usize,
	) -> FlatResult<Self> {
		let dir = dir.as_ref().to_path_buf();
		let (def_file, data_file) = Self::open_files(&dir, name)?;
		let mut table = Self {
			dir,
			name: name.to_string(),
			def_file,
			data_file,
			columns: Vec::new(),
			positions: HashMap::new(),
			row_length: 0,
			max_column_name_length,
		};
		table.load_schema()?;
		tracing::debug!(
			"Opened table {} ({} columns, row length {})",
			table.name,
			table.columns.len(),
			table.row_length
		);
		Ok(table)
	}

	fn open_files(dir: &Path, name: &str) -> FlatResult<(File, File)> {
		let def_file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(files::def_path(dir, name))
			.map_err(|source| FlatError::CannotOpenDefFile {
				table: name.to_string(),
				source,
			})?;
		let data_file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(files::data_path(dir, name))
			.map_err(|source| FlatError::CannotOpenDataFile {
				table: name.to_string(),
				source,
			})?;
		Ok((def_file, data_file))
	}

	/// Re-open file handles and rebuild the column layout from the schema file.
	fn reload(&mut self) -> FlatResult<()> {
		let (def_file, data_file) = Self::open_files(&self.dir, &self.name)?;
		self.def_file = def_file;
		self.data_file = data_file;
		self.load_schema()
	}

	fn load_schema(&mut self) -> FlatResult<()> {
		let mut content = String::new();
		let mut def = &self.def_file;
		def.seek(SeekFrom::Start(0))
			.and_then(|_| def.read_to_string(&mut content))
			.map_err(|source| FlatError::CannotStatTable {
				table: self.name.clone(),
				source,
			})?;

		let mut columns = Vec::new();
		let mut offset = 0;
		for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
			let column = Column::from_def(offset, line).map_err(|_| {
				tracing::error!("Malformed schema line in table {}: {:?}", self.name, line);
				FlatError::CorruptDefFile {
					table: self.name.clone(),
					line: line.to_string(),
				}
			})?;
			offset += column.length;
			columns.push(column);
		}

		self.positions = columns
			.iter()
			.enumerate()
			.map(|(i, c)| (c.name.clone(), i))
			.collect();
		self.columns = columns;
		// Trailing newline of every row
		self.row_length = offset + 1;
		Ok(())
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn row_length(&self) -> usize {
		self.row_length
	}

	/// Columns in declaration order, the delete marker included.
	pub fn columns(&self) -> &[Column] {
		&self.columns
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.positions.get(name).map(|&i| &self.columns[i])
	}

	pub fn has_column(&self, name: &str) -> bool {
		self.positions.contains_key(name)
	}

	/// Durably persist both schema and data files.
	pub fn flush(&self) -> FlatResult<()> {
		let flush_error = |source| FlatError::CannotFlushTable {
			table: self.name.clone(),
			source,
		};
		self.def_file.sync_all().map_err(flush_error)?;
		self.data_file.sync_all().map_err(flush_error)?;
		Ok(())
	}

	pub fn number_of_rows(&self) -> FlatResult<usize> {
		let len = self
			.data_file
			.metadata()
			.map_err(|source| FlatError::CannotStatTable {
				table: self.name.clone(),
				source,
			})?
			.len();
		Ok(len as usize / self.row_length)
	}

	fn check_row(&self, row: usize) -> FlatResult<()> {
		let rows = self.number_of_rows()?;
		if row >= rows {
			return Err(FlatError::RowOutOfRange {
				table: self.name.clone(),
				row,
				rows,
			});
		}
		Ok(())
	}

	fn read_error(&self) -> impl FnOnce(io::Error) -> FlatError + '_ {
		move |source| {
			tracing::error!("Cannot read table {}: {}", self.name, source);
			FlatError::CannotReadTable {
				table: self.name.clone(),
				source,
			}
		}
	}

	fn write_error(&self) -> impl FnOnce(io::Error) -> FlatError + '_ {
		move |source| {
			tracing::error!("Cannot write table {}: {}", self.name, source);
			FlatError::CannotWriteTable {
				table: self.name.clone(),
				source,
			}
		}
	}

	fn write_at(&self, position: u64, bytes: &[u8]) -> FlatResult<()> {
		let mut data = &self.data_file;
		data.seek(SeekFrom::Start(position))
			.and_then(|_| data.write_all(bytes))
			.map_err(self.write_error())
	}

	fn row_position(&self, row: usize) -> u64 {
		(row * self.row_length) as u64
	}

	/// Read a row, delete marker included.
	pub fn read(&self, row: usize) -> FlatResult<Row> {
		self.check_row(row)?;
		let mut bytes = vec![0u8; self.row_length];
		let mut data = &self.data_file;
		data.seek(SeekFrom::Start(self.row_position(row)))
			.and_then(|_| data.read_exact(&mut bytes))
			.map_err(self.read_error())?;
		Ok(record::decode_row(&self.columns, &bytes))
	}

	/// Append a row and return its index. Missing columns are written blank
	/// and the row is always live.
	pub fn insert(&mut self, row: &Row) -> FlatResult<usize> {
		let mut live = row.clone();
		live.remove(DELETE_COLUMN);
		let bytes = record::encode_row(&self.columns, self.row_length, &live);

		let rows = self.number_of_rows()?;
		self.write_at(self.row_position(rows), &bytes)?;
		Ok(rows)
	}

	/// Mark a row deleted.
	pub fn delete(&mut self, row: usize) -> FlatResult<()> {
		let del = self
			.column(DELETE_COLUMN)
			.ok_or_else(|| FlatError::MissingDeleteColumn(self.name.clone()))?;
		let position = self.row_position(row) + del.offset as u64;
		let field = record::encode_field(DELETED, del.length);
		self.check_row(row)?;
		self.write_at(position, &field)
	}

	/// Overwrite the named fields of a row. Unknown columns are skipped.
	pub fn update(&mut self, row: usize, values: &Row) -> FlatResult<()> {
		self.check_row(row)?;
		for (name, value) in values {
			if let Some(column) = self.column(name) {
				let position = self.row_position(row) + column.offset as u64;
				self.write_at(position, &record::encode_field(value, column.length))?;
			}
		}
		Ok(())
	}

	/// All live rows with their indices.
	pub fn select_all(&self) -> FlatResult<Outcome<Vec<(usize, Row)>>> {
		let rows = self.number_of_rows()?;
		Ok(self.collect_live((0..rows).map(|i| (i, self.read(i)))))
	}

	/// Keep the live rows of a scan, counting the ones that failed to read.
	fn collect_live<I>(&self, rows: I) -> Outcome<Vec<(usize, Row)>>
	where
		I: IntoIterator<Item = (usize, FlatResult<Row>)>,
	{
		let mut live = Vec::new();
		let mut failed = 0;
		for (i, read) in rows {
			match read {
				Ok(row) if !is_deleted(&row) => live.push((i, row)),
				Ok(_) => {}
				Err(e) => {
					tracing::warn!("Skipping unreadable row {} of {}: {}", i, self.name, e);
					failed += 1;
				}
			}
		}
		let warning = (failed > 0).then(|| Warning::RowsNotRead {
			table: self.name.clone(),
			failed,
		});
		Outcome::with_warning(live, warning)
	}

	/// Add a column. Existing rows are rebuilt to make room for it.
	pub fn add(&mut self, name: &str, length: usize) -> FlatResult<Outcome<()>> {
		if self.has_column(name) {
			return Err(FlatError::ColumnAlreadyExists(name.to_string()));
		}
		if column::is_reserved(name) {
			return Err(FlatError::ReservedName(name.to_string()));
		}
		if name.len() > self.max_column_name_length {
			return Err(FlatError::ColumnNameTooLong {
				name: name.to_string(),
				max: self.max_column_name_length,
			});
		}
		if name.is_empty() || name.contains(':') || name.contains('\n') {
			return Err(FlatError::InvalidColumnDefinition(name.to_string()));
		}
		if length == 0 {
			return Err(FlatError::InvalidColumnLength(name.to_string()));
		}

		if self.number_of_rows()? > 0 {
			let copied = self.rebuild_data_file(Some((name, length)))?;
			return Ok(Outcome {
				value: (),
				warnings: copied.warnings,
			});
		}

		let mut def = &self.def_file;
		def.seek(SeekFrom::End(0))
			.and_then(|_| def.write_all(column::def_line(name, length).as_bytes()))
			.map_err(|source| FlatError::CannotWriteTable {
				table: self.name.clone(),
				source,
			})?;
		let column = Column::new(name, self.row_length - 1, length);
		self.positions.insert(column.name.clone(), self.columns.len());
		self.columns.push(column);
		self.row_length += length;
		Ok(Outcome::complete(()))
	}

	/// Remove a user column. Existing rows are rebuilt without it.
	pub fn remove(&mut self, name: &str) -> FlatResult<Outcome<()>> {
		let column = self
			.column(name)
			.cloned()
			.ok_or_else(|| FlatError::ColumnNotFound(name.to_string()))?;
		if column.is_system {
			return Err(FlatError::ReservedName(name.to_string()));
		}

		let layout: Vec<(String, usize)> = self
			.columns
			.iter()
			.filter(|c| c.name != column.name)
			.map(|c| (c.name.clone(), c.length))
			.collect();
		if self.number_of_rows()? > 0 {
			let copied = self.rebuild(&layout)?;
			return Ok(Outcome {
				value: (),
				warnings: copied.warnings,
			});
		}

		let schema: String = self
			.columns
			.iter()
			.filter(|c| c.name != column.name)
			.map(Column::to_def)
			.collect();
		files::rewrite(&files::def_path(&self.dir, &self.name), &schema).map_err(|source| {
			FlatError::CannotWriteTable {
				table: self.name.clone(),
				source,
			}
		})?;
		self.reload()?;
		Ok(Outcome::complete(()))
	}

	/// Copy every live row into a fresh table, optionally with one more
	/// column, and swap it in place of this one. Deleted rows are dropped.
	///
	/// Returns the number of rows copied.
	pub fn rebuild_data_file(
		&mut self,
		new_column: Option<(&str, usize)>,
	) -> FlatResult<Outcome<usize>> {
		let mut layout: Vec<(String, usize)> = self
			.columns
			.iter()
			.map(|c| (c.name.clone(), c.length))
			.collect();
		if let Some((name, length)) = new_column {
			layout.push((name.to_string(), length));
		}
		self.rebuild(&layout)
	}

	fn rebuild(&mut self, layout: &[(String, usize)]) -> FlatResult<Outcome<usize>> {
		let temp_name = format!("~tmp{}", uuid::Uuid::new_v4().simple());
		let schema: String = layout
			.iter()
			.map(|(name, length)| column::def_line(name, *length))
			.collect();
		files::create(&self.dir, &temp_name, &schema)?;
		tracing::debug!("Rebuilding table {} through {}", self.name, temp_name);

		let copied = match self.copy_live_rows(&temp_name) {
			Ok(copied) => copied,
			Err(e) => {
				if let Err(cleanup) = files::delete(&self.dir, &temp_name) {
					tracing::warn!("Leaving rebuild files {} behind: {}", temp_name, cleanup);
				}
				return Err(e);
			}
		};

		files::replace(&self.dir, &temp_name, &self.name)?;
		self.reload()?;

		let (rows, failed) = copied;
		if failed > 0 {
			tracing::warn!(
				"Rebuild of table {} copied {} rows, {} failed",
				self.name,
				rows,
				failed
			);
		}
		let warning = (failed > 0).then(|| Warning::RowsNotCopied {
			table: self.name.clone(),
			failed,
		});
		Ok(Outcome::with_warning(rows, warning))
	}

	/// Copy live rows into the table `temp`, returning (copied, failed).
	fn copy_live_rows(&self, temp: &str) -> FlatResult<(usize, usize)> {
		let mut target = Table::open_with(&self.dir, temp, self.max_column_name_length)?;
		let rows = self.number_of_rows()?;
		let counts = self.copy_rows(&mut target, (0..rows).map(|i| (i, self.read(i))));
		target.flush()?;
		Ok(counts)
	}

	fn copy_rows<I>(&self, target: &mut Table, rows: I) -> (usize, usize)
	where
		I: IntoIterator<Item = (usize, FlatResult<Row>)>,
	{
		let mut copied = 0;
		let mut failed = 0;
		for (i, read) in rows {
			let row = match read {
				Ok(row) => row,
				Err(e) => {
					tracing::warn!("Cannot copy row {} of {}: {}", i, self.name, e);
					failed += 1;
					continue;
				}
			};
			if is_deleted(&row) {
				continue;
			}
			match target.insert(&row) {
				Ok(_) => copied += 1,
				Err(e) => {
					tracing::warn!("Cannot copy row {} of {}: {}", i, self.name, e);
					failed += 1;
				}
			}
		}
		(copied, failed)
	}
}
