use std::collections::HashSet;
use std::sync::Arc;

use crate::buffer::BufferManager;
use crate::common::{BlockId, Lsn, Result, TxId};
use crate::log::LogManager;
use crate::storage::Page;

use super::super::transaction::Transaction;
use super::log_record::LogRecord;

/// RecoveryManager implements the undo/redo protocol for one transaction.
///
/// The engine runs a steal/no-force buffer policy: uncommitted pages may
/// reach disk before commit (so rollback and recovery undo them) and
/// committed pages may still be memory-only at a crash (so recovery redoes
/// them from the log).
#[derive(Clone)]
pub struct RecoveryManager {
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
    tx_id: TxId,
}

impl RecoveryManager {
    /// Creates the manager and writes the transaction's START record.
    pub fn new(tx_id: TxId, lm: Arc<LogManager>, bm: Arc<BufferManager>) -> Result<Self> {
        lm.append(&LogRecord::Start { tx: tx_id }.encode())?;
        Ok(Self { lm, bm, tx_id })
    }

    /// Flushes the transaction's buffers, writes COMMIT, and makes the log
    /// durable through it.
    pub fn commit(&self) -> Result<()> {
        self.bm.flush_all(self.tx_id)?;
        let lsn = self.lm.append(&LogRecord::Commit { tx: self.tx_id }.encode())?;
        self.lm.flush(lsn)
    }

    /// Undoes every one of this transaction's writes, newest first, back to
    /// its START record, then writes ROLLBACK.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        for rec in self.lm.iter_rev()? {
            let rec = LogRecord::decode(&rec?)?;
            if rec.tx_id() != Some(self.tx_id) {
                continue;
            }
            if matches!(rec, LogRecord::Start { .. }) {
                break;
            }
            rec.undo(tx)?;
        }
        self.bm.flush_all(self.tx_id)?;
        let lsn = self
            .lm
            .append(&LogRecord::Rollback { tx: self.tx_id }.encode())?;
        self.lm.flush(lsn)
    }

    /// Two-pass ARIES-style restart recovery.
    ///
    /// Pass 1 walks the durable log newest-first down to the last
    /// checkpoint, undoing every write of a transaction that never finished
    /// (no COMMIT or ROLLBACK seen). Pass 2 walks oldest-first and redoes
    /// every write of a committed transaction. Both directions are safe to
    /// repeat: undo and redo are idempotent. A fresh CHECKPOINT bounds the
    /// next recovery scan.
    pub fn recover(&self, tx: &mut Transaction) -> Result<()> {
        let mut finished: HashSet<TxId> = HashSet::new();
        let mut committed: HashSet<TxId> = HashSet::new();

        for rec in self.lm.iter_rev()? {
            let rec = LogRecord::decode(&rec?)?;
            match &rec {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { tx } => {
                    finished.insert(*tx);
                    committed.insert(*tx);
                }
                LogRecord::Rollback { tx } => {
                    finished.insert(*tx);
                }
                LogRecord::Start { .. } => {}
                _ => {
                    // An unfinished transaction's write is reverted no
                    // matter how far back it happened.
                    if let Some(owner) = rec.tx_id() {
                        if !finished.contains(&owner) {
                            rec.undo(tx)?;
                        }
                    }
                }
            }
        }

        for rec in self.lm.iter()? {
            let rec = LogRecord::decode(&rec?)?;
            if let Some(owner) = rec.tx_id() {
                if committed.contains(&owner) {
                    rec.redo(tx)?;
                }
            }
        }

        self.bm.flush_all(self.tx_id)?;
        let lsn = self.lm.append(&LogRecord::Checkpoint.encode())?;
        self.lm.flush(lsn)
    }

    /// Logs an int write: old value read from the page inside the buffer's
    /// modification critical section, new value about to be stored. Returns
    /// the record's LSN.
    pub fn log_set_int(
        &self,
        blk: &BlockId,
        page: &Page,
        offset: usize,
        new: i32,
    ) -> Result<Option<Lsn>> {
        let old = page.get_int(offset);
        let lsn = self.lm.append(
            &LogRecord::SetInt {
                tx: self.tx_id,
                blk: blk.clone(),
                offset,
                old,
                new,
            }
            .encode(),
        )?;
        Ok(Some(lsn))
    }

    pub fn log_set_string(
        &self,
        blk: &BlockId,
        page: &Page,
        offset: usize,
        new: &str,
    ) -> Result<Option<Lsn>> {
        let old = page.get_string(offset);
        let lsn = self.lm.append(
            &LogRecord::SetString {
                tx: self.tx_id,
                blk: blk.clone(),
                offset,
                old,
                new: new.to_string(),
            }
            .encode(),
        )?;
        Ok(Some(lsn))
    }

    pub fn log_set_bit(
        &self,
        blk: &BlockId,
        page: &Page,
        offset: usize,
        bit: u32,
        new: bool,
    ) -> Result<Option<Lsn>> {
        let old = page.get_bit(offset, bit);
        let lsn = self.lm.append(
            &LogRecord::SetBit {
                tx: self.tx_id,
                blk: blk.clone(),
                offset,
                bit,
                old,
                new,
            }
            .encode(),
        )?;
        Ok(Some(lsn))
    }

    pub fn log_set_datetime(
        &self,
        blk: &BlockId,
        page: &Page,
        offset: usize,
        new_ticks: i64,
    ) -> Result<Option<Lsn>> {
        let old_ticks = page.get_long(offset);
        let lsn = self.lm.append(
            &LogRecord::SetDateTime {
                tx: self.tx_id,
                blk: blk.clone(),
                offset,
                old_ticks,
                new_ticks,
            }
            .encode(),
        )?;
        Ok(Some(lsn))
    }
}
