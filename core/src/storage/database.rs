//! Database directory
//!
//! A database is a directory of tables. Opening it discovers every table
//! from its `.data` file and makes sure the two trigger tables exist.

use crate::clock::{Clock, IdGenerator, SystemClock, TxnId};
use crate::config::Config;
use crate::error::{FlatError, FlatResult};
use crate::storage::column::{self, DELETE_COLUMN};
use crate::storage::files;
use crate::storage::lock::LockManager;
use crate::storage::table::Table;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Table holding triggers evaluated before a mutation.
pub const BEFORE_TABLE: &str = "~before";
/// Table holding triggers evaluated after a mutation.
pub const AFTER_TABLE: &str = "~after";
/// Marker recording that the trigger tables have been created.
pub const INIT_MARKER: &str = ".init";
/// Prefix of the temporary tables used while rebuilding a table.
pub const REBUILD_PREFIX: &str = "~tmp";

/// Columns of the trigger tables.
pub const TRIGGER_COLUMNS: [(&str, usize); 5] = [
    ("TABLE", 30),
    ("COLUMN", 30),
    ("FUNC", 50),
    ("OP", 4),
    ("PARAM", 200),
];

pub type TableRef = Arc<RwLock<Table>>;

pub struct Database {
    path: PathBuf,
    config: Config,
    tables: RwLock<HashMap<String, TableRef>>,
    locks: LockManager,
    ids: IdGenerator,
}

impl Database {
    /// Open a database with default settings and the system clock.
    pub fn open<P: AsRef<Path>>(path: P) -> FlatResult<Self> {
        Self::open_with(path, &Config::default(), Arc::new(SystemClock))
    }

    pub fn open_with<P: AsRef<Path>>(
        path: P,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> FlatResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = fs::read_dir(&path).map_err(|source| FlatError::CannotOpenDatabase {
            path: path.clone(),
            source,
        })?;

        let mut tables = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| FlatError::CannotOpenDatabase {
                path: path.clone(),
                source,
            })?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let (name, ext) = files::split_file_name(&file_name);
            if ext != files::DATA_EXT || name.is_empty() {
                continue;
            }
            if name.starts_with(REBUILD_PREFIX) {
                tracing::warn!("Ignoring leftover rebuild table {} in {}", name, path.display());
                continue;
            }
            let table = Table::open_with(&path, name, config.max_column_name_length)?;
            tables.insert(name.to_string(), Arc::new(RwLock::new(table)));
        }
        tracing::info!("Opened database {} with {} tables", path.display(), tables.len());

        let db = Self {
            locks: LockManager::new(&path, Arc::clone(&clock), config.lock_timeout()),
            ids: IdGenerator::new(clock),
            path,
            config: config.clone(),
            tables: RwLock::new(tables),
        };
        db.prepare_for_triggers(false)?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// A fresh transaction id.
    pub fn next_txn_id(&self) -> TxnId {
        self.ids.next_id()
    }

    fn check_new_name(&self, name: &str) -> FlatResult<()> {
        if column::is_reserved(name) {
            return Err(FlatError::ReservedName(name.to_string()));
        }
        if name.is_empty() || name.contains(['.', '/', '\\']) {
            return Err(FlatError::InvalidColumnDefinition(name.to_string()));
        }
        if name.len() > self.config.max_table_name_length {
            return Err(FlatError::TableNameTooLong {
                name: name.to_string(),
                max: self.config.max_table_name_length,
            });
        }
        if self.tables.read().contains_key(name) {
            return Err(FlatError::TableAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Create an empty table holding only the delete marker column.
    pub fn create(&self, name: &str) -> FlatResult<TableRef> {
        self.check_new_name(name)?;
        self.create_table(name, &column::def_line(DELETE_COLUMN, 1))
    }

    fn create_table(&self, name: &str, schema: &str) -> FlatResult<TableRef> {
        files::create(&self.path, name, schema)?;
        let table = Table::open_with(&self.path, name, self.config.max_column_name_length)?;
        let table = Arc::new(RwLock::new(table));
        self.tables
            .write()
            .insert(name.to_string(), Arc::clone(&table));
        tracing::debug!("Created table {}", name);
        Ok(table)
    }

    /// Remove a table and all its files.
    pub fn drop(&self, name: &str) -> FlatResult<()> {
        let table = self
            .tables
            .write()
            .remove(name)
            .ok_or_else(|| FlatError::TableNotFound(name.to_string()))?;
        // Close the file handles before the files go
        drop(table);
        files::delete(&self.path, name)?;
        tracing::debug!("Dropped table {}", name);
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> FlatResult<()> {
        self.check_new_name(new)?;
        let mut tables = self.tables.write();
        let table = tables
            .remove(old)
            .ok_or_else(|| FlatError::TableNotFound(old.to_string()))?;
        let flushed = table.read().flush();
        if let Err(e) = flushed {
            tables.insert(old.to_string(), table);
            return Err(e);
        }
        drop(table);

        files::rename(&self.path, old, new)?;
        let renamed = Table::open_with(&self.path, new, self.config.max_column_name_length)?;
        tables.insert(new.to_string(), Arc::new(RwLock::new(renamed)));
        tracing::debug!("Renamed table {} to {}", old, new);
        Ok(())
    }

    pub fn get(&self, name: &str) -> FlatResult<TableRef> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FlatError::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Names of all tables, trigger tables included, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn flush(&self) -> FlatResult<()> {
        for table in self.tables.read().values() {
            table.read().flush()?;
        }
        Ok(())
    }

    /// Create the trigger tables unless the init marker says they exist.
    /// Trigger tables already present are kept, so registered constraints
    /// survive a lost marker. With `override_existing`, both are dropped and
    /// recreated empty.
    pub fn prepare_for_triggers(&self, override_existing: bool) -> FlatResult<()> {
        let marker = self.path.join(INIT_MARKER);
        if marker.exists() && !override_existing {
            return Ok(());
        }

        let mut schema = column::def_line(DELETE_COLUMN, 1);
        for (name, length) in TRIGGER_COLUMNS {
            schema.push_str(&column::def_line(name, length));
        }
        for name in [BEFORE_TABLE, AFTER_TABLE] {
            if self.contains(name) {
                if !override_existing {
                    tracing::warn!("Keeping existing trigger table {}", name);
                    continue;
                }
                self.drop(name)?;
            }
            self.create_table(name, &schema)?;
        }

        File::create(&marker).map_err(|source| FlatError::CannotCreateInitFile {
            path: marker.clone(),
            source,
        })?;
        tracing::info!("Prepared trigger tables in {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Row;
    use tempfile::tempdir;

    #[test]
    fn test_open_prepares_trigger_tables() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.table_names(), vec![AFTER_TABLE, BEFORE_TABLE]);
        assert!(dir.path().join(INIT_MARKER).exists());

        let before = db.get(BEFORE_TABLE).unwrap();
        let names: Vec<_> = before
            .read()
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["~del", "TABLE", "COLUMN", "FUNC", "OP", "PARAM"]);
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            let people = db.create("PEOPLE").unwrap();
            let mut people = people.write();
            people.add("NAME", 20).unwrap();
            let row: Row = [("NAME".to_string(), "Buzz".to_string())].into();
            people.insert(&row).unwrap();
            people.flush().unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert!(db.contains("PEOPLE"));
        let people = db.get("PEOPLE").unwrap();
        assert_eq!(people.read().read(0).unwrap()["NAME"], "Buzz");
    }

    #[test]
    fn test_create_rejections() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.create("t1").unwrap();
        assert!(matches!(
            db.create("t1"),
            Err(FlatError::TableAlreadyExists(_))
        ));
        assert!(matches!(db.create("~mine"), Err(FlatError::ReservedName(_))));
        assert!(matches!(
            db.create(&"t".repeat(31)),
            Err(FlatError::TableNameTooLong { .. })
        ));
        assert!(matches!(db.get("nope"), Err(FlatError::TableNotFound(_))));
    }

    #[test]
    fn test_rename_and_drop() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        db.create("t1").unwrap();

        db.rename("t1", "t2").unwrap();
        assert!(!db.contains("t1"));
        assert!(files::def_path(dir.path(), "t2").exists());
        db.get("t2").unwrap().write().add("c1", 4).unwrap();

        db.drop("t2").unwrap();
        assert!(!files::data_path(dir.path(), "t2").exists());
        assert!(matches!(db.drop("t2"), Err(FlatError::TableNotFound(_))));
    }

    #[test]
    fn test_open_skips_rebuild_leftovers() {
        let dir = tempdir().unwrap();
        files::create(dir.path(), "~tmpdeadbeef", "~del:1\n").unwrap();
        let db = Database::open(dir.path()).unwrap();
        assert!(!db.contains("~tmpdeadbeef"));
    }

    #[test]
    fn test_override_recreates_trigger_tables() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let row: Row = [("TABLE".to_string(), "t1".to_string())].into();
        db.get(BEFORE_TABLE).unwrap().write().insert(&row).unwrap();

        db.prepare_for_triggers(false).unwrap();
        assert_eq!(db.get(BEFORE_TABLE).unwrap().read().number_of_rows().unwrap(), 1);

        db.prepare_for_triggers(true).unwrap();
        assert_eq!(db.get(BEFORE_TABLE).unwrap().read().number_of_rows().unwrap(), 0);
    }

    #[test]
    fn test_lost_marker_keeps_trigger_rows() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            let row: Row = [("TABLE".to_string(), "t1".to_string())].into();
            db.get(AFTER_TABLE).unwrap().write().insert(&row).unwrap();
        }
        fs::remove_file(dir.path().join(INIT_MARKER)).unwrap();
        fs::remove_file(files::data_path(dir.path(), BEFORE_TABLE)).unwrap();
        fs::remove_file(files::def_path(dir.path(), BEFORE_TABLE)).unwrap();

        let db = Database::open(dir.path()).unwrap();
        assert!(dir.path().join(INIT_MARKER).exists());
        assert_eq!(db.get(AFTER_TABLE).unwrap().read().number_of_rows().unwrap(), 1);
        assert_eq!(db.get(BEFORE_TABLE).unwrap().read().number_of_rows().unwrap(), 0);
    }

    #[test]
    fn test_lock_timeout_from_config() {
        let dir = tempdir().unwrap();
        let config = Config::from_toml("lock_timeout_ms = 500\n").unwrap();
        let db = Database::open_with(dir.path(), &config, Arc::new(SystemClock)).unwrap();
        assert_eq!(db.locks().timeout(), std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Database::open(dir.path().join("absent")),
            Err(FlatError::CannotOpenDatabase { .. })
        ));
    }
}
