use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::buffer::BufferManager;
use crate::common::{BasaltError, BlockId, Result, TxId};
use crate::log::LogManager;
use crate::storage::FileManager;

use super::buffer_list::BufferList;
use super::concurrency::{ConcurrencyManager, LockTable};
use super::recovery::RecoveryManager;

/// Transaction composes the buffer pool, lock table, and recovery manager
/// into the engine's public read/write surface.
///
/// The discipline it enforces: every read takes a shared lock and every
/// write an exclusive lock on the touched block (strict two-phase, released
/// only at commit or rollback); every logged write appends a before/after
/// record ahead of the page mutation; and file growth serializes on the
/// end-of-file sentinel block. Callers pin a block before touching it and
/// unpin it when done; commit and rollback unwind whatever is left.
pub struct Transaction {
    fm: Arc<FileManager>,
    bm: Arc<BufferManager>,
    tx_id: TxId,
    block_size: usize,
    concur: ConcurrencyManager,
    recovery: RecoveryManager,
    buffers: BufferList,
}

impl Transaction {
    /// Starts a new transaction; its START record is logged immediately.
    pub fn new(
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        bm: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
        tx_id: TxId,
        block_size: usize,
    ) -> Result<Self> {
        let recovery = RecoveryManager::new(tx_id, lm, Arc::clone(&bm))?;
        Ok(Self {
            fm,
            bm: Arc::clone(&bm),
            tx_id,
            block_size,
            concur: ConcurrencyManager::new(lock_table),
            recovery,
            buffers: BufferList::new(bm),
        })
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of buffer-pool slots not currently pinned by anyone.
    pub fn available_buffers(&self) -> usize {
        self.bm.available()
    }

    pub fn pin(&mut self, blk: &BlockId) -> Result<()> {
        self.buffers.pin(blk)
    }

    pub fn unpin(&mut self, blk: &BlockId) {
        self.buffers.unpin(blk);
    }

    pub fn get_int(&mut self, blk: &BlockId, offset: usize) -> Result<i32> {
        self.concur.s_lock(blk)?;
        let buf = self.pinned(blk)?;
        let val = buf.page().get_int(offset);
        Ok(val)
    }

    pub fn get_string(&mut self, blk: &BlockId, offset: usize) -> Result<String> {
        self.concur.s_lock(blk)?;
        let buf = self.pinned(blk)?;
        let val = buf.page().get_string(offset);
        Ok(val)
    }

    pub fn get_datetime(&mut self, blk: &BlockId, offset: usize) -> Result<DateTime<Utc>> {
        self.concur.s_lock(blk)?;
        let buf = self.pinned(blk)?;
        let val = buf.page().get_datetime(offset);
        Ok(val)
    }

    pub fn get_bit(&mut self, blk: &BlockId, offset: usize, bit: u32) -> Result<bool> {
        self.concur.s_lock(blk)?;
        let buf = self.pinned(blk)?;
        let val = buf.page().get_bit(offset, bit);
        Ok(val)
    }

    /// Writes an int. With `log` set, the old and new values are appended
    /// to the log first and the buffer records the covering LSN; unlogged
    /// writes are reserved for changes recovery can never observe (such as
    /// formatting a brand-new block) and for undo/redo itself. The log
    /// append, the page mutation, and the marker update run inside the
    /// buffer's modification critical section so a concurrent flush cannot
    /// interleave between them.
    pub fn set_int(&mut self, blk: &BlockId, offset: usize, val: i32, log: bool) -> Result<()> {
        self.concur.x_lock(blk)?;
        let buf = self.pinned(blk)?;
        let recovery = &self.recovery;
        buf.modify(self.tx_id, |page| {
            let lsn = if log {
                recovery.log_set_int(blk, page, offset, val)?
            } else {
                None
            };
            page.set_int(offset, val)?;
            Ok(lsn)
        })
    }

    pub fn set_string(&mut self, blk: &BlockId, offset: usize, val: &str, log: bool) -> Result<()> {
        self.concur.x_lock(blk)?;
        let buf = self.pinned(blk)?;
        let recovery = &self.recovery;
        buf.modify(self.tx_id, |page| {
            let lsn = if log {
                recovery.log_set_string(blk, page, offset, val)?
            } else {
                None
            };
            page.set_string(offset, val)?;
            Ok(lsn)
        })
    }

    /// Writes one bit inside the 4-byte field at `offset` (nullability
    /// flags in the record layer).
    pub fn set_bit(
        &mut self,
        blk: &BlockId,
        offset: usize,
        bit: u32,
        val: bool,
        log: bool,
    ) -> Result<()> {
        self.concur.x_lock(blk)?;
        let buf = self.pinned(blk)?;
        let recovery = &self.recovery;
        buf.modify(self.tx_id, |page| {
            let lsn = if log {
                recovery.log_set_bit(blk, page, offset, bit, val)?
            } else {
                None
            };
            page.set_bit(offset, bit, val)?;
            Ok(lsn)
        })
    }

    pub fn set_datetime(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: DateTime<Utc>,
        log: bool,
    ) -> Result<()> {
        self.concur.x_lock(blk)?;
        let buf = self.pinned(blk)?;
        let recovery = &self.recovery;
        buf.modify(self.tx_id, |page| {
            let lsn = if log {
                recovery.log_set_datetime(blk, page, offset, val.timestamp_micros())?
            } else {
                None
            };
            page.set_datetime(offset, val)?;
            Ok(lsn)
        })
    }

    /// Current block count of a file, made consistent with concurrent
    /// growth by a shared lock on the end-of-file sentinel.
    pub fn size(&mut self, file_name: &str) -> Result<u64> {
        self.concur.s_lock(&BlockId::end_of_file(file_name))?;
        self.fm.block_count(file_name, self.block_size)
    }

    /// Extends the file by one zeroed block. Exclusive on the end-of-file
    /// sentinel, so concurrent appends serialize.
    pub fn append(&mut self, file_name: &str) -> Result<BlockId> {
        self.concur.x_lock(&BlockId::end_of_file(file_name))?;
        self.fm.append(file_name, self.block_size)
    }

    /// Commits: flushes this transaction's writes, logs COMMIT durably,
    /// then releases locks and unpins everything.
    pub fn commit(&mut self) -> Result<()> {
        self.recovery.commit()?;
        self.concur.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Rolls back: undoes this transaction's writes from the log, logs
    /// ROLLBACK, then releases locks and unpins everything.
    pub fn rollback(&mut self) -> Result<()> {
        let recovery = self.recovery.clone();
        recovery.rollback(self)?;
        self.concur.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Restart recovery; run once at startup before any user transaction.
    /// Undoes every unfinished transaction, redoes every committed one, and
    /// leaves a fresh checkpoint bounding the next recovery scan.
    pub fn recover(&mut self) -> Result<()> {
        self.bm.flush_all(self.tx_id)?;
        let recovery = self.recovery.clone();
        recovery.recover(self)?;
        self.concur.release();
        self.buffers.unpin_all();
        Ok(())
    }

    fn pinned(&self, blk: &BlockId) -> Result<Arc<crate::buffer::Buffer>> {
        self.buffers
            .get(blk)
            .ok_or_else(|| BasaltError::BlockNotPinned(blk.clone()))
    }
}

/// A transaction abandoned without commit or rollback (an abort path after
/// a lock or buffer failure) still releases its locks and pins; both
/// operations are no-ops after a normal commit or rollback.
impl Drop for Transaction {
    fn drop(&mut self) {
        self.concur.release();
        self.buffers.unpin_all();
    }
}
