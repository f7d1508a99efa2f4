use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{BlockId, Lsn, Result, TxId};
use crate::log::LogManager;
use crate::storage::{FileManager, Page};

use crate::common::config::MAX_USAGE_COUNT;

/// Buffer manages a single slot of the buffer pool: the page it holds, the
/// block currently assigned to it, a pin count, a capped usage count for the
/// clock sweep, and the transaction that last modified it together with the
/// LSN of that change.
pub struct Buffer {
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    /// Index of this slot in the pool.
    slot: usize,
    page: RwLock<Page>,
    blk: RwLock<Option<BlockId>>,
    /// Number of transactions currently pinning this slot.
    pin_count: AtomicU32,
    /// Second-chance counter, capped at MAX_USAGE_COUNT, floored at 0.
    usage_count: AtomicU32,
    /// Transaction that last modified the page, with the LSN of that
    /// modification (None for unlogged writes).
    modifier: Mutex<Option<(TxId, Option<Lsn>)>>,
}

impl Buffer {
    pub fn new(fm: Arc<FileManager>, lm: Arc<LogManager>, slot: usize, block_size: usize) -> Self {
        Self {
            fm,
            lm,
            slot,
            page: RwLock::new(Page::new(block_size)),
            blk: RwLock::new(None),
            pin_count: AtomicU32::new(0),
            usage_count: AtomicU32::new(0),
            modifier: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn block(&self) -> Option<BlockId> {
        self.blk.read().clone()
    }

    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn usage_count(&self) -> u32 {
        self.usage_count.load(Ordering::Acquire)
    }

    /// A slot is dirty once it is unpinned with an unflushed modification.
    pub fn is_dirty(&self) -> bool {
        !self.is_pinned() && self.modifier.lock().is_some()
    }

    pub fn modifying_tx(&self) -> Option<TxId> {
        (*self.modifier.lock()).map(|(tx, _)| tx)
    }

    /// Records that `tx` modified the page, with the LSN of the covering log
    /// record when the write was logged.
    pub fn set_modified(&self, tx: TxId, lsn: Option<Lsn>) {
        *self.modifier.lock() = Some((tx, lsn));
    }

    /// Applies one write atomically with respect to `flush`: the modifier
    /// mutex is held across the closure (log append plus page mutation) and
    /// the marker update. A concurrent flush therefore never writes out page
    /// bytes whose log record it has not flushed.
    pub fn modify<F>(&self, tx: TxId, op: F) -> Result<()>
    where
        F: FnOnce(&mut Page) -> Result<Option<Lsn>>,
    {
        let mut modifier = self.modifier.lock();
        let mut page = self.page.write();
        let lsn = op(&mut page)?;
        *modifier = Some((tx, lsn));
        Ok(())
    }

    pub(crate) fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the pin count and returns the new value, or None if the
    /// slot was not pinned.
    pub(crate) fn unpin(&self) -> Option<u32> {
        loop {
            let current = self.pin_count.load(Ordering::Acquire);
            if current == 0 {
                return None;
            }
            if self
                .pin_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(current - 1);
            }
        }
    }

    pub(crate) fn increment_usage(&self) {
        let _ = self
            .usage_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| {
                (u < MAX_USAGE_COUNT).then_some(u + 1)
            });
    }

    pub(crate) fn decrement_usage(&self) {
        let _ = self
            .usage_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |u| {
                (u > 0).then_some(u - 1)
            });
    }

    /// Rebinds this slot to a different block: flushes the prior contents if
    /// dirty, reads the new block into the page, and resets the pin count.
    pub(crate) fn assign_to_block(&self, blk: BlockId) -> Result<()> {
        self.flush()?;
        {
            let mut page = self.page.write();
            self.fm.read(&blk, &mut page)?;
        }
        *self.blk.write() = Some(blk);
        self.pin_count.store(0, Ordering::Release);
        self.usage_count.store(0, Ordering::Release);
        Ok(())
    }

    /// Writes the page to disk if a modification is recorded, honoring the
    /// WAL invariant: the log is flushed through this buffer's LSN strictly
    /// before the page itself is written.
    pub fn flush(&self) -> Result<()> {
        let mut modifier = self.modifier.lock();
        if let Some((_tx, lsn)) = *modifier {
            if let Some(lsn) = lsn {
                self.lm.flush(lsn)?;
            }
            let blk = self.blk.read();
            if let Some(blk) = blk.as_ref() {
                let page = self.page.read();
                self.fm.write(blk, &page)?;
            }
            *modifier = None;
        }
        Ok(())
    }
}
