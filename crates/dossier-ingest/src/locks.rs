//! Per-file async locks serializing mutations of a single file.
//!
//! Registration, embedding attachment, and deletion for the same file must
//! not interleave; work on different files proceeds in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dossier_core::error::{DossierError, Result};
use tokio::sync::Mutex as AsyncMutex;

/// Registry handing out one async mutex per file id.
#[derive(Debug, Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `file_id`, creating it on first use.
    ///
    /// Callers hold the returned mutex for the duration of the mutation. The
    /// registry lock itself is only held long enough to clone the entry.
    pub fn for_file(&self, file_id: i64) -> Result<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(Arc::clone(locks.entry(file_id).or_default()))
    }

    /// Drops the registry entry for a deleted file.
    ///
    /// Holders of an already-cloned lock keep it alive through their `Arc`;
    /// later callers get a fresh mutex.
    pub fn discard(&self, file_id: i64) -> Result<()> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| DossierError::Storage(format!("Lock poisoned: {}", e)))?;
        locks.remove(&file_id);
        Ok(())
    }
}
