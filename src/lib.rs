//! Basalt - a relational storage engine core in Rust
//!
//! This crate provides the hard engineering core of a relational database:
//! fixed-size block I/O, a write-ahead log, a pinned buffer pool with
//! clock-sweep eviction, lock-based concurrency control, and ARIES-style
//! crash recovery, all coordinated through a per-operation transaction.
//!
//! # Architecture
//!
//! The system is organized into layers, leaves first:
//!
//! - **Storage** (`storage`): block-level persistence
//!   - `Page`: a fixed-size byte buffer with typed, offset-addressed accessors
//!   - `FileManager`: maps logical files onto bounded chunk files and moves
//!     one block at a time, force-flushing every write
//!
//! - **Log** (`log`): the write-ahead log
//!   - `LogManager`: an append-only log with a right-to-left packed tail
//!     page, flush-by-LSN, and oldest/newest-first iteration
//!
//! - **Buffer pool** (`buffer`): memory management for blocks
//!   - `Buffer`: one slot with pin/usage counts and the modifying
//!     transaction's LSN, flushed log-before-data
//!   - `BufferManager`: free list plus clock-sweep eviction under a bounded
//!     wait
//!   - `FlushWorker`: periodic background sweep of dirty slots
//!
//! - **Transactions** (`tx`): the coordination layer
//!   - `LockTable`/`ConcurrencyManager`: per-block shared/exclusive locks,
//!     strict two-phase, timeout-bounded
//!   - `LogRecord`/`RecoveryManager`: before/after-image records, undo and
//!     redo, two-pass restart recovery
//!   - `Transaction`: the facade composing all of the above
//!
//! # Example
//!
//! ```rust,no_run
//! use basalt::{Basalt, BlockId};
//!
//! let db = Basalt::open("demo_db").unwrap();
//! let mut tx = db.new_tx().unwrap();
//!
//! let blk = tx.append("users.tbl").unwrap();
//! tx.pin(&blk).unwrap();
//! tx.set_int(&blk, 80, 1, true).unwrap();
//! tx.set_string(&blk, 40, "one", true).unwrap();
//! tx.unpin(&blk);
//! tx.commit().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod log;
pub mod storage;
pub mod tx;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use buffer::{BufferManager, FlushWorker};
use common::config::FLUSH_INTERVAL;
use log::LogManager;
use storage::FileManager;
use tx::concurrency::LockTable;
use tx::Transaction;

// Re-export commonly used types at the crate root
pub use common::{BasaltError, BlockId, EngineConfig, Lsn, Result, TxId};

/// Process-wide engine context: owns the file, log, and buffer managers,
/// the lock table, and the transaction-number counter, and vends
/// transactions. Opening an existing database runs restart recovery before
/// any user transaction.
pub struct Basalt {
    cfg: EngineConfig,
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    bm: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
    next_tx: AtomicU64,
    _flush_worker: FlushWorker,
}

impl Basalt {
    /// Opens a database directory with default configuration.
    pub fn open<P: AsRef<Path>>(db_dir: P) -> Result<Self> {
        Self::new(db_dir, EngineConfig::default())
    }

    pub fn new<P: AsRef<Path>>(db_dir: P, cfg: EngineConfig) -> Result<Self> {
        let fm = Arc::new(FileManager::new(
            db_dir,
            cfg.blocks_per_file,
            cfg.recreate,
        )?);
        let lm = Arc::new(LogManager::new(
            Arc::clone(&fm),
            cfg.log_file.clone(),
            cfg.log_page_size,
        )?);
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            cfg.pool_size,
            cfg.block_size,
            cfg.max_wait_time,
        ));
        let lock_table = Arc::new(LockTable::new(cfg.max_wait_time));
        let flush_worker = FlushWorker::new(Arc::clone(&bm), FLUSH_INTERVAL);

        let db = Self {
            cfg,
            fm,
            lm,
            bm,
            lock_table,
            next_tx: AtomicU64::new(1),
            _flush_worker: flush_worker,
        };

        // A brand-new database has nothing to recover.
        if !db.fm.is_new() {
            let mut tx = db.new_tx()?;
            tx.recover()?;
        }
        Ok(db)
    }

    /// Starts a new transaction with the next process-wide number.
    pub fn new_tx(&self) -> Result<Transaction> {
        let tx_id = self.next_tx.fetch_add(1, Ordering::SeqCst);
        Transaction::new(
            Arc::clone(&self.fm),
            Arc::clone(&self.lm),
            Arc::clone(&self.bm),
            Arc::clone(&self.lock_table),
            tx_id,
            self.cfg.block_size,
        )
    }

    pub fn file_manager(&self) -> Arc<FileManager> {
        Arc::clone(&self.fm)
    }

    pub fn log_manager(&self) -> Arc<LogManager> {
        Arc::clone(&self.lm)
    }

    pub fn buffer_manager(&self) -> Arc<BufferManager> {
        Arc::clone(&self.bm)
    }

    pub fn lock_table(&self) -> Arc<LockTable> {
        Arc::clone(&self.lock_table)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }
}
