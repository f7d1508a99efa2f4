use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::common::{BasaltError, BlockId, Result, TxId};
use crate::log::LogManager;
use crate::storage::FileManager;

use super::Buffer;

/// Bookkeeping shared by all pin/unpin paths, guarded by one mutex.
struct PoolState {
    /// Maps each bound block to its slot index.
    table: HashMap<BlockId, usize>,
    /// Slots never used since pool construction.
    free_list: VecDeque<usize>,
    /// Clock-sweep cursor.
    hand: usize,
}

/// BufferManager owns a bounded pool of page-sized slots and hands them out
/// against block ids.
///
/// Acquisition takes an already-mapped slot first, then the free list, then
/// runs a clock sweep: scanning from the cursor, pinned slots are skipped,
/// every unpinned slot visited has its usage count decremented, and the
/// first unpinned slot at usage zero is evicted. When a full pass finds no
/// victim the caller waits on a condvar (signalled by unpin) until the wait
/// bound elapses, at which point the pin fails with `BufferPoolExhausted`.
pub struct BufferManager {
    pool: Vec<Arc<Buffer>>,
    state: Mutex<PoolState>,
    available: Condvar,
    max_wait: Duration,
}

impl BufferManager {
    pub fn new(
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        pool_size: usize,
        block_size: usize,
        max_wait: Duration,
    ) -> Self {
        let mut pool = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for slot in 0..pool_size {
            pool.push(Arc::new(Buffer::new(
                Arc::clone(&fm),
                Arc::clone(&lm),
                slot,
                block_size,
            )));
            free_list.push_back(slot);
        }

        Self {
            pool,
            state: Mutex::new(PoolState {
                table: HashMap::new(),
                free_list,
                hand: 0,
            }),
            available: Condvar::new(),
            max_wait,
        }
    }

    /// Number of slots not currently pinned.
    pub fn available(&self) -> usize {
        self.pool.iter().filter(|b| !b.is_pinned()).count()
    }

    /// Pins the given block into a slot, waiting up to the configured bound
    /// for one to come free.
    pub fn pin(&self, blk: &BlockId) -> Result<Arc<Buffer>> {
        let deadline = Instant::now() + self.max_wait;
        let mut state = self.state.lock();
        loop {
            match self.try_pin(&mut state, blk)? {
                TryPin::Pinned(buf) => return Ok(buf),
                TryPin::Progress => {
                    // The sweep drained usage counts; retry right away.
                    if Instant::now() >= deadline {
                        return Err(BasaltError::BufferPoolExhausted);
                    }
                }
                TryPin::Exhausted => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        return Err(BasaltError::BufferPoolExhausted);
                    }
                }
            }
        }
    }

    /// Unpins the buffer; once its pin count reaches zero it becomes a
    /// clock-sweep candidate and waiters are woken.
    pub fn unpin(&self, buf: &Arc<Buffer>) {
        if buf.unpin() == Some(0) {
            self.available.notify_all();
        }
    }

    /// Flushes every buffer modified by the given transaction, including
    /// blocks the transaction already unpinned.
    pub fn flush_all(&self, tx: TxId) -> Result<()> {
        for buf in &self.pool {
            if buf.modifying_tx() == Some(tx) {
                buf.flush()?;
            }
        }
        Ok(())
    }

    /// Maintenance sweep: flushes every dirty buffer in the pool.
    pub fn flush_dirty(&self) -> Result<()> {
        for buf in &self.pool {
            if buf.is_dirty() {
                buf.flush()?;
            }
        }
        Ok(())
    }

    fn try_pin(&self, state: &mut PoolState, blk: &BlockId) -> Result<TryPin> {
        if let Some(&slot) = state.table.get(blk) {
            let buf = Arc::clone(&self.pool[slot]);
            buf.pin();
            buf.increment_usage();
            return Ok(TryPin::Pinned(buf));
        }

        let slot = match self.choose_unpinned_slot(state) {
            Sweep::Victim(slot) => slot,
            Sweep::Progress => return Ok(TryPin::Progress),
            Sweep::AllPinned => return Ok(TryPin::Exhausted),
        };

        let buf = Arc::clone(&self.pool[slot]);
        // On failure the victim keeps its mapping (its page was not
        // replaced) and a never-used slot goes back on the free list.
        let old = buf.block();
        if let Err(e) = buf.assign_to_block(blk.clone()) {
            if old.is_none() {
                state.free_list.push_back(slot);
            }
            return Err(e);
        }
        if let Some(old) = old {
            state.table.remove(&old);
        }
        state.table.insert(blk.clone(), slot);
        buf.pin();
        buf.increment_usage();
        Ok(TryPin::Pinned(buf))
    }

    /// Free list first, then one clock-sweep pass over the pool.
    fn choose_unpinned_slot(&self, state: &mut PoolState) -> Sweep {
        if let Some(slot) = state.free_list.pop_front() {
            return Sweep::Victim(slot);
        }

        let n = self.pool.len();
        let mut progress = false;
        for step in 0..n {
            let slot = (state.hand + step) % n;
            let buf = &self.pool[slot];
            if buf.is_pinned() {
                continue;
            }
            if buf.usage_count() == 0 {
                state.hand = (slot + 1) % n;
                return Sweep::Victim(slot);
            }
            buf.decrement_usage();
            progress = true;
        }
        if progress {
            Sweep::Progress
        } else {
            Sweep::AllPinned
        }
    }
}

enum TryPin {
    Pinned(Arc<Buffer>),
    /// No victim this pass, but usage counts were drained; retry.
    Progress,
    /// Every slot is pinned; wait for an unpin.
    Exhausted,
}

enum Sweep {
    Victim(usize),
    Progress,
    AllPinned,
}
