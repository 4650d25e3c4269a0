//! File-based table locks
//!
//! Lock state lives in the database directory so that separate processes see
//! the same holders: `T.shared/<id>` is one shared token per holder and
//! `T.exclusive` holds the id of the exclusive holder. Tokens older than the
//! lock timeout belong to holders that went away and are purged whenever the
//! state of a table is read.

use crate::clock::{Clock, TxnId};
use crate::error::{FlatError, FlatResult};
use crate::storage::files;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Current holders of one table's locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLocks {
    pub shared: Vec<TxnId>,
    pub exclusive: Option<TxnId>,
}

impl TableLocks {
    pub fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    fn exclusive_by_other(&self, txn_id: TxnId) -> bool {
        self.exclusive.is_some_and(|holder| holder != txn_id)
    }
}

/// Lock manager
pub struct LockManager {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            dir: dir.into(),
            clock,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_stale(&self, id: TxnId) -> bool {
        let timeout = self.timeout.as_nanos().min(u64::MAX as u128) as u64;
        id.0.saturating_add(timeout) < self.clock.now_nanos()
    }

    fn read_error(table: &str) -> impl FnOnce(io::Error) -> FlatError + '_ {
        move |source| FlatError::CannotReadLocks {
            table: table.to_string(),
            source,
        }
    }

    /// Read the holders of `table`, purging stale tokens on the way.
    pub fn locks_of(&self, table: &str) -> FlatResult<TableLocks> {
        let mut locks = TableLocks::default();

        let shared_dir = files::shared_dir(&self.dir, table);
        fs::create_dir_all(&shared_dir).map_err(Self::read_error(table))?;
        for entry in fs::read_dir(&shared_dir).map_err(Self::read_error(table))? {
            let entry = entry.map_err(Self::read_error(table))?;
            let token = entry.file_name().to_string_lossy().into_owned();
            match token.parse::<TxnId>() {
                Ok(id) if !self.is_stale(id) => locks.shared.push(id),
                _ => {
                    tracing::warn!("Removing stale shared lock {} on table {}", token, table);
                    remove_if_present(&entry.path()).map_err(Self::read_error(table))?;
                }
            }
        }
        locks.shared.sort();

        let exclusive_path = files::exclusive_path(&self.dir, table);
        match fs::read_to_string(&exclusive_path) {
            Ok(content) => match content.parse::<TxnId>() {
                Ok(id) if !self.is_stale(id) => locks.exclusive = Some(id),
                _ => {
                    tracing::warn!(
                        "Removing stale exclusive lock {:?} on table {}",
                        content.trim(),
                        table
                    );
                    remove_if_present(&exclusive_path).map_err(Self::read_error(table))?;
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Self::read_error(table)(e)),
        }

        Ok(locks)
    }

    /// Acquire a shared lock, downgrading an exclusive lock held by `txn_id`.
    pub fn acquire_shared(&self, txn_id: TxnId, table: &str) -> FlatResult<()> {
        let locks = self.locks_of(table)?;
        if locks.exclusive_by_other(txn_id) {
            return Err(FlatError::CannotLockShared(table.to_string()));
        }
        if locks.exclusive == Some(txn_id) {
            tracing::debug!("Transaction {} downgrades its lock on {}", txn_id, table);
            self.remove_exclusive(table)?;
        }

        let token = self.shared_token(table, txn_id);
        File::create(&token).map_err(Self::read_error(table))?;

        // An exclusive lock published between the read and our token wins
        if self.locks_of(table)?.exclusive_by_other(txn_id) {
            remove_if_present(&token).map_err(Self::read_error(table))?;
            return Err(FlatError::CannotLockShared(table.to_string()));
        }
        tracing::debug!("Transaction {} holds a shared lock on {}", txn_id, table);
        Ok(())
    }

    /// Acquire an exclusive lock. A shared lock held only by `txn_id` is upgraded.
    pub fn acquire_exclusive(&self, txn_id: TxnId, table: &str) -> FlatResult<()> {
        let locks = self.locks_of(table)?;
        if locks.exclusive_by_other(txn_id) {
            return Err(FlatError::CannotLockExclusive(table.to_string()));
        }
        if locks.exclusive == Some(txn_id) {
            return Ok(());
        }
        let upgrading = match locks.shared.as_slice() {
            [] => false,
            [holder] if *holder == txn_id => true,
            _ => return Err(FlatError::CannotLockExclusive(table.to_string())),
        };
        if upgrading {
            remove_if_present(&self.shared_token(table, txn_id)).map_err(Self::read_error(table))?;
        }

        if !self.publish_exclusive(txn_id, table)? {
            if upgrading {
                File::create(self.shared_token(table, txn_id)).map_err(Self::read_error(table))?;
            }
            return Err(FlatError::CannotLockExclusive(table.to_string()));
        }
        tracing::debug!("Transaction {} holds an exclusive lock on {}", txn_id, table);
        Ok(())
    }

    /// Release whichever lock `txn_id` holds on `table`.
    pub fn release(&self, txn_id: TxnId, table: &str) -> FlatResult<()> {
        let exclusive_path = files::exclusive_path(&self.dir, table);
        match fs::read_to_string(&exclusive_path) {
            Ok(content) if content.parse::<TxnId>().ok() == Some(txn_id) => {
                self.remove_exclusive(table)?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(FlatError::CannotUnlock {
                    table: table.to_string(),
                    mode: "exclusive",
                    source,
                });
            }
        }

        remove_if_present(&self.shared_token(table, txn_id)).map_err(|source| {
            FlatError::CannotUnlock {
                table: table.to_string(),
                mode: "shared",
                source,
            }
        })
    }

    fn shared_token(&self, table: &str, txn_id: TxnId) -> PathBuf {
        files::shared_dir(&self.dir, table).join(txn_id.to_string())
    }

    fn remove_exclusive(&self, table: &str) -> FlatResult<()> {
        remove_if_present(&files::exclusive_path(&self.dir, table)).map_err(|source| {
            FlatError::CannotUnlock {
                table: table.to_string(),
                mode: "exclusive",
                source,
            }
        })
    }

    /// Write the token to a private file, then link it into place. Linking
    /// fails if the exclusive file exists, so at most one holder wins and
    /// readers never see a partial token. Returns false if the lock was taken.
    fn publish_exclusive(&self, txn_id: TxnId, table: &str) -> FlatResult<bool> {
        let target = files::exclusive_path(&self.dir, table);
        let temp = self.dir.join(format!(
            "{}.{}.{}",
            table,
            files::EXCLUSIVE_EXT,
            uuid::Uuid::new_v4().simple()
        ));

        let written = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(txn_id.to_string().as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| fs::hard_link(&temp, &target));
        let cleanup = remove_if_present(&temp);

        match written {
            Ok(()) => {
                cleanup.map_err(Self::read_error(table))?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Self::read_error(table)(e)),
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
