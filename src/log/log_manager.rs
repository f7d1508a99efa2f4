use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{BasaltError, BlockId, Lsn, Result};
use crate::storage::{FileManager, Page};

/// LogManager owns the append-only log file and its in-memory tail page.
///
/// Records are packed right-to-left: offset 0 of every log block holds the
/// "boundary", the offset of the earliest record in the block, and each new
/// record lands at `boundary - (4 + len)` with a 4-byte length prefix. A
/// reverse read of one block therefore yields records most-recent-first
/// without any index. The tail page is larger than a data block so many
/// records fit between flushes.
pub struct LogManager {
    fm: Arc<FileManager>,
    log_file: String,
    log_page_size: usize,
    inner: Mutex<LogInner>,
}

struct LogInner {
    tail: Page,
    current_blk: BlockId,
    latest_lsn: Lsn,
    last_saved_lsn: Lsn,
}

impl LogManager {
    pub fn new(fm: Arc<FileManager>, log_file: impl Into<String>, log_page_size: usize) -> Result<Self> {
        let log_file = log_file.into();
        let block_count = fm.block_count(&log_file, log_page_size)?;

        let mut tail = Page::new(log_page_size);
        let current_blk = if block_count == 0 {
            let blk = fm.append(&log_file, log_page_size)?;
            tail.set_int(0, log_page_size as i32)?;
            fm.write(&blk, &tail)?;
            blk
        } else {
            let blk = BlockId::new(log_file.clone(), block_count - 1);
            fm.read(&blk, &mut tail)?;
            blk
        };

        Ok(Self {
            fm,
            log_file,
            log_page_size,
            inner: Mutex::new(LogInner {
                tail,
                current_blk,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Appends a record to the tail page and returns its LSN. LSNs increase
    /// by exactly one per append. The record is not guaranteed durable until
    /// `flush` covers its LSN or the tail page fills up.
    pub fn append(&self, rec: &[u8]) -> Result<Lsn> {
        let mut inner = self.inner.lock();

        let needed = rec.len() + 4;
        // The record must fit in a fresh block beside the boundary word.
        if needed + 4 > self.log_page_size {
            return Err(BasaltError::PageOverflow {
                offset: 4,
                len: needed,
                page_size: self.log_page_size,
            });
        }
        let boundary = inner.tail.get_int(0) as usize;
        // Offset 0..4 is the boundary word itself.
        if boundary < needed + 4 {
            self.write_tail(&mut inner)?;
            self.start_new_block(&mut inner)?;
        }

        let boundary = inner.tail.get_int(0) as usize;
        let rec_pos = boundary - needed;
        inner.tail.set_bytes(rec_pos, rec)?;
        inner.tail.set_int(0, rec_pos as i32)?;

        inner.latest_lsn += 1;
        Ok(inner.latest_lsn)
    }

    /// Ensures every record with an LSN up to `lsn` is durable. A no-op when
    /// an earlier flush already covered it.
    pub fn flush(&self, lsn: Lsn) -> Result<()> {
        let mut inner = self.inner.lock();
        if lsn >= inner.last_saved_lsn {
            self.write_tail(&mut inner)?;
        }
        Ok(())
    }

    /// Oldest-first iteration over all durable records. Flushes first so the
    /// iterator sees everything appended so far.
    pub fn iter(&self) -> Result<LogIterator> {
        let last_blk = self.flush_for_iteration()?;
        LogIterator::new(
            Arc::clone(&self.fm),
            self.log_file.clone(),
            self.log_page_size,
            last_blk,
        )
    }

    /// Newest-first iteration over all durable records.
    pub fn iter_rev(&self) -> Result<LogReverseIterator> {
        let last_blk = self.flush_for_iteration()?;
        LogReverseIterator::new(
            Arc::clone(&self.fm),
            self.log_file.clone(),
            self.log_page_size,
            last_blk,
        )
    }

    fn flush_for_iteration(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        self.write_tail(&mut inner)?;
        Ok(inner.current_blk.num())
    }

    fn write_tail(&self, inner: &mut LogInner) -> Result<()> {
        self.fm.write(&inner.current_blk, &inner.tail)?;
        inner.last_saved_lsn = inner.latest_lsn;
        Ok(())
    }

    fn start_new_block(&self, inner: &mut LogInner) -> Result<()> {
        let blk = self.fm.append(&self.log_file, self.log_page_size)?;
        inner.tail = Page::new(self.log_page_size);
        inner.tail.set_int(0, self.log_page_size as i32)?;
        self.fm.write(&blk, &inner.tail)?;
        inner.current_blk = blk;
        Ok(())
    }
}

/// Walks log blocks from block 0 forward; within a block, from the boundary
/// toward the page end, which is oldest-record-first.
pub struct LogIterator {
    fm: Arc<FileManager>,
    log_file: String,
    page: Page,
    blk_num: u64,
    last_blk: u64,
    pos: usize,
    failed: bool,
}

impl LogIterator {
    fn new(fm: Arc<FileManager>, log_file: String, log_page_size: usize, last_blk: u64) -> Result<Self> {
        let mut page = Page::new(log_page_size);
        fm.read(&BlockId::new(log_file.clone(), 0), &mut page)?;
        let pos = page.get_int(0) as usize;
        Ok(Self {
            fm,
            log_file,
            page,
            blk_num: 0,
            last_blk,
            pos,
            failed: false,
        })
    }

    fn advance(&mut self) -> Result<Option<Vec<u8>>> {
        while self.pos >= self.page.len() {
            if self.blk_num == self.last_blk {
                return Ok(None);
            }
            self.blk_num += 1;
            self.fm
                .read(&BlockId::new(self.log_file.clone(), self.blk_num), &mut self.page)?;
            self.pos = self.page.get_int(0) as usize;
        }
        let rec = self.page.get_bytes(self.pos).to_vec();
        self.pos += 4 + rec.len();
        Ok(Some(rec))
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Walks log blocks from the current block backward; within a block the
/// boundary-computed record offsets are replayed in reverse, which is
/// newest-record-first.
pub struct LogReverseIterator {
    fm: Arc<FileManager>,
    log_file: String,
    page: Page,
    blk_num: u64,
    offsets: Vec<usize>,
    idx: usize,
    failed: bool,
}

impl LogReverseIterator {
    fn new(fm: Arc<FileManager>, log_file: String, log_page_size: usize, last_blk: u64) -> Result<Self> {
        let mut it = Self {
            fm,
            log_file,
            page: Page::new(log_page_size),
            blk_num: last_blk,
            offsets: Vec::new(),
            idx: 0,
            failed: false,
        };
        it.load_block(last_blk)?;
        Ok(it)
    }

    fn load_block(&mut self, blk_num: u64) -> Result<()> {
        self.blk_num = blk_num;
        self.fm
            .read(&BlockId::new(self.log_file.clone(), blk_num), &mut self.page)?;
        self.offsets.clear();
        let mut pos = self.page.get_int(0) as usize;
        while pos < self.page.len() {
            self.offsets.push(pos);
            pos += 4 + self.page.get_int(pos) as usize;
        }
        self.idx = self.offsets.len();
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<Vec<u8>>> {
        while self.idx == 0 {
            if self.blk_num == 0 {
                return Ok(None);
            }
            let prev = self.blk_num - 1;
            self.load_block(prev)?;
        }
        self.idx -= 1;
        Ok(Some(self.page.get_bytes(self.offsets[self.idx]).to_vec()))
    }
}

impl Iterator for LogReverseIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
