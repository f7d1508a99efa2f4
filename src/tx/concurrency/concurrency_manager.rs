use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{BlockId, Result};

use super::LockTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Per-transaction lock bookkeeping over the shared `LockTable`.
///
/// A transaction acquires at most one table-level hold per block: the first
/// `s_lock` takes it, an `x_lock` upgrades it in place, and both are
/// idempotent afterwards. `release` drops everything at commit or rollback,
/// never before (strict two-phase locking).
pub struct ConcurrencyManager {
    lock_table: Arc<LockTable>,
    held: HashMap<BlockId, LockMode>,
}

impl ConcurrencyManager {
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        Self {
            lock_table,
            held: HashMap::new(),
        }
    }

    /// Takes a shared lock on the block, once per transaction lifetime.
    pub fn s_lock(&mut self, blk: &BlockId) -> Result<()> {
        if self.held.contains_key(blk) {
            return Ok(());
        }
        self.lock_table.s_lock(blk)?;
        self.held.insert(blk.clone(), LockMode::Shared);
        Ok(())
    }

    /// Upgrades to an exclusive lock, taking the shared lock first when the
    /// block is untouched. Idempotent once exclusive.
    pub fn x_lock(&mut self, blk: &BlockId) -> Result<()> {
        if self.held.get(blk) == Some(&LockMode::Exclusive) {
            return Ok(());
        }
        self.s_lock(blk)?;
        self.lock_table.x_lock(blk)?;
        self.held.insert(blk.clone(), LockMode::Exclusive);
        Ok(())
    }

    /// Unlocks every block this transaction touched.
    pub fn release(&mut self) {
        for blk in self.held.keys() {
            self.lock_table.unlock(blk);
        }
        self.held.clear();
    }
}
