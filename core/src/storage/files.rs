//! Table file management
//!
//! A table `T` in directory `D` is made of `D/T.data`, `D/T.def` and the
//! shared-lock directory `D/T.shared/`, plus `D/T.exclusive` while an
//! exclusive lock is held. These are created, renamed and removed as a unit.

use crate::error::{FlatError, FlatResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const DATA_EXT: &str = "data";
pub const DEF_EXT: &str = "def";
pub const SHARED_EXT: &str = "shared";
pub const EXCLUSIVE_EXT: &str = "exclusive";

/// Files that carry table content and move with the table.
const TABLE_FILES: [&str; 2] = [DATA_EXT, DEF_EXT];

fn artifact(dir: &Path, name: &str, ext: &str) -> PathBuf {
	dir.join(format!("{}.{}", name, ext))
}

pub fn data_path(dir: &Path, name: &str) -> PathBuf {
	artifact(dir, name, DATA_EXT)
}

pub fn def_path(dir: &Path, name: &str) -> PathBuf {
	artifact(dir, name, DEF_EXT)
}

pub fn shared_dir(dir: &Path, name: &str) -> PathBuf {
	artifact(dir, name, SHARED_EXT)
}

pub fn exclusive_path(dir: &Path, name: &str) -> PathBuf {
	artifact(dir, name, EXCLUSIVE_EXT)
}

fn files_error<'a>(
	table: &'a str,
	action: &'static str,
) -> impl FnOnce(io::Error) -> FlatError + 'a {
	move |source| {
		tracing::error!("Cannot {} files of table {}: {}", action, table, source);
		FlatError::TableFiles {
			table: table.to_string(),
			action,
			source,
		}
	}
}

/// Create the files of a new table, writing `schema` into its `.def` file.
pub fn create(dir: &Path, name: &str, schema: &str) -> FlatResult<()> {
	let mut def = OpenOptions::new()
		.write(true)
		.create_new(true)
		.open(def_path(dir, name))
		.map_err(files_error(name, "create"))?;
	def.write_all(schema.as_bytes())
		.and_then(|_| def.sync_all())
		.map_err(files_error(name, "create"))?;

	OpenOptions::new()
		.write(true)
		.create_new(true)
		.open(data_path(dir, name))
		.map_err(files_error(name, "create"))?;

	fs::create_dir(shared_dir(dir, name)).map_err(files_error(name, "create"))?;
	Ok(())
}

/// Rename every file of a table.
pub fn rename(dir: &Path, old: &str, new: &str) -> FlatResult<()> {
	for ext in [DATA_EXT, DEF_EXT, SHARED_EXT] {
		fs::rename(artifact(dir, old, ext), artifact(dir, new, ext))
			.map_err(files_error(old, "rename"))?;
	}
	Ok(())
}

/// Remove every file of a table, including a leftover exclusive lock.
pub fn delete(dir: &Path, name: &str) -> FlatResult<()> {
	for ext in TABLE_FILES {
		fs::remove_file(artifact(dir, name, ext)).map_err(files_error(name, "remove"))?;
	}
	match fs::remove_file(exclusive_path(dir, name)) {
		Err(e) if e.kind() != io::ErrorKind::NotFound => {
			return Err(files_error(name, "remove")(e));
		}
		_ => {}
	}
	fs::remove_dir_all(shared_dir(dir, name)).map_err(files_error(name, "remove"))?;
	Ok(())
}

/// Move a rebuilt temporary table over `name`.
///
/// Each content file is swapped with a single rename, so a reader sees either
/// the old or the new file, never a missing one. Lock state of `name` stays.
pub fn replace(dir: &Path, temp: &str, name: &str) -> FlatResult<()> {
	for ext in TABLE_FILES {
		fs::rename(artifact(dir, temp, ext), artifact(dir, name, ext))
			.map_err(files_error(name, "replace"))?;
	}
	fs::remove_dir_all(shared_dir(dir, temp)).map_err(files_error(temp, "remove"))?;
	sync_dir(dir);
	Ok(())
}

/// Replace the contents of a file through a synced temporary sibling.
pub fn rewrite(path: &Path, content: &str) -> io::Result<()> {
	let temp_path = path.with_extension("tmp");
	let mut file = File::create(&temp_path)?;
	file.write_all(content.as_bytes())?;
	file.sync_all()?;
	fs::rename(&temp_path, path)
}

/// Split a file name into table name and extension at the last dot.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
	match file_name.rfind('.') {
		Some(i) if i + 1 < file_name.len() => (&file_name[..i], &file_name[i + 1..]),
		_ => (file_name, ""),
	}
}

pub fn sync_dir(dir: &Path) {
	if let Ok(dir) = File::open(dir) {
		let _ = dir.sync_all();
	}
}
