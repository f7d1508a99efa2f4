use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::common::{BasaltError, BlockId, Result};

/// LockTable keeps one integer per block: 0 or absent means unlocked,
/// `n > 0` counts concurrent shared holders, and `-1` marks one exclusive
/// holder. No other negative value ever appears.
///
/// Both acquisition paths wait on a condvar bounded by the configured
/// deadline; a request that cannot be granted in time fails with
/// `LockTimeout` and the caller is expected to abort its transaction.
/// There is no deadlock detection beyond the timeout.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, i64>>,
    released: Condvar,
    max_wait: Duration,
}

impl LockTable {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            max_wait,
        }
    }

    /// Acquires a shared lock, waiting out any exclusive holder.
    pub fn s_lock(&self, blk: &BlockId) -> Result<()> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock();
        while self.has_x_lock(&locks, blk) {
            if self.released.wait_until(&mut locks, deadline).timed_out() {
                return Err(BasaltError::LockTimeout(blk.clone()));
            }
        }
        *locks.entry(blk.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Upgrades to an exclusive lock. The caller must already hold one
    /// shared lock on the block; the wait ends when that is the only hold.
    pub fn x_lock(&self, blk: &BlockId) -> Result<()> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock();
        while self.has_other_s_locks(&locks, blk) {
            if self.released.wait_until(&mut locks, deadline).timed_out() {
                return Err(BasaltError::LockTimeout(blk.clone()));
            }
        }
        locks.insert(blk.clone(), -1);
        Ok(())
    }

    /// Releases one hold: a shared count decrements, an exclusive mark (or
    /// the final shared hold) removes the entry. All waiters are woken.
    pub fn unlock(&self, blk: &BlockId) {
        let mut locks = self.locks.lock();
        match locks.get_mut(blk) {
            Some(val) if *val > 1 => *val -= 1,
            Some(_) => {
                locks.remove(blk);
            }
            None => {}
        }
        self.released.notify_all();
    }

    fn has_x_lock(&self, locks: &HashMap<BlockId, i64>, blk: &BlockId) -> bool {
        matches!(locks.get(blk), Some(val) if *val < 0)
    }

    fn has_other_s_locks(&self, locks: &HashMap<BlockId, i64>, blk: &BlockId) -> bool {
        matches!(locks.get(blk), Some(val) if *val > 1)
    }
}
