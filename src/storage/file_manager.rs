use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{BasaltError, BlockId, Result};

use super::page::Page;

/// FileManager maps logical files onto physical chunk files and reads and
/// writes one block at a time.
///
/// A logical file holds `blocks_per_file` blocks per chunk; block `n` lives
/// in chunk `n / blocks_per_file` (named `name`, `name_1`, `name_2`, ...) at
/// byte offset `(n % blocks_per_file) * page_len`. Every write is forced to
/// stable storage before returning; durability decisions live with callers
/// who decide when to skip logging, never whether to flush.
///
/// Each chunk file is guarded by its own mutex, so threads touching
/// different chunks never serialize against each other.
pub struct FileManager {
    db_dir: PathBuf,
    blocks_per_file: u64,
    is_new: bool,
    /// Open chunk handles keyed by chunk file name.
    open_files: Mutex<HashMap<String, Arc<Mutex<File>>>>,
}

impl FileManager {
    /// Opens (or creates) the database directory. With `recreate` the
    /// directory is wiped first. Leftover `temp*` files from interrupted
    /// runs are always removed.
    pub fn new<P: AsRef<Path>>(db_dir: P, blocks_per_file: u64, recreate: bool) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();

        if recreate && db_dir.exists() {
            fs::remove_dir_all(&db_dir)?;
        }
        let is_new = !db_dir.exists();
        if is_new {
            fs::create_dir_all(&db_dir)?;
        }

        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with("temp") {
                fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            db_dir,
            blocks_per_file,
            is_new,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    /// True if the directory did not exist before this manager created it;
    /// callers use this for bootstrap decisions.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn blocks_per_file(&self) -> u64 {
        self.blocks_per_file
    }

    /// Reads one block into `page`. Reading past the end of the chunk
    /// yields zeros, matching a freshly appended block.
    pub fn read(&self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let page_len = page.len();
        let file = self.chunk_for(blk, page_len)?;
        let mut file = file.lock();
        file.seek(SeekFrom::Start(self.chunk_offset(blk, page_len)))?;
        let data = page.contents_mut();
        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);
        Ok(())
    }

    /// Writes one block and forces it to stable storage before returning.
    pub fn write(&self, blk: &BlockId, page: &Page) -> Result<()> {
        let page_len = page.len();
        let file = self.chunk_for(blk, page_len)?;
        let mut file = file.lock();
        file.seek(SeekFrom::Start(self.chunk_offset(blk, page_len)))?;
        file.write_all(page.contents())?;
        file.sync_data()?;
        Ok(())
    }

    /// Extends the logical file by one zeroed block and returns its id.
    pub fn append(&self, file_name: &str, block_size: usize) -> Result<BlockId> {
        let blk = BlockId::new(file_name, self.block_count(file_name, block_size)?);
        let page = Page::new(block_size);
        self.write(&blk, &page)?;
        Ok(blk)
    }

    /// Number of blocks currently stored across all chunks of a logical file.
    pub fn block_count(&self, file_name: &str, block_size: usize) -> Result<u64> {
        let mut total = 0u64;
        for part in 0.. {
            let path = self.chunk_path(file_name, part);
            match fs::metadata(&path) {
                Ok(meta) => total += meta.len() / block_size as u64,
                Err(e) if e.kind() == ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Deletes every chunk of a logical file and recreates it empty.
    pub fn shrink(&self, file_name: &str) -> Result<()> {
        let mut open = self.open_files.lock();
        for part in 0.. {
            let path = self.chunk_path(file_name, part);
            if !path.exists() {
                break;
            }
            open.remove(&chunk_name(file_name, part));
            fs::remove_file(&path)?;
        }
        drop(open);
        File::create(self.chunk_path(file_name, 0))?;
        Ok(())
    }

    /// Drops every open handle; chunks reopen lazily on the next access.
    pub fn close_files(&self) {
        self.open_files.lock().clear();
    }

    fn chunk_offset(&self, blk: &BlockId, page_len: usize) -> u64 {
        (blk.num() % self.blocks_per_file) * page_len as u64
    }

    fn chunk_path(&self, file_name: &str, part: u64) -> PathBuf {
        self.db_dir.join(chunk_name(file_name, part))
    }

    /// Returns the open handle for the chunk holding `blk`, opening or
    /// creating the chunk file on first touch. Chunks must be created in
    /// order: materializing chunk `p` requires chunk `p - 1` on disk.
    fn chunk_for(&self, blk: &BlockId, page_len: usize) -> Result<Arc<Mutex<File>>> {
        debug_assert!(!blk.is_end_of_file());
        let part = blk.num() / self.blocks_per_file;
        let name = chunk_name(blk.file_name(), part);

        let mut open = self.open_files.lock();
        if let Some(file) = open.get(&name) {
            return Ok(Arc::clone(file));
        }

        let path = self.chunk_path(blk.file_name(), part);
        if !path.exists() && part > 0 {
            let prev = self.chunk_path(blk.file_name(), part - 1);
            if !prev.exists() {
                return Err(BasaltError::ChunkOutOfOrder(blk.clone()));
            }
            // A new chunk only ever starts at its first block.
            if blk.num() % self.blocks_per_file != 0 {
                let prev_len = fs::metadata(&prev)?.len();
                if prev_len < self.blocks_per_file * page_len as u64 {
                    return Err(BasaltError::ChunkOutOfOrder(blk.clone()));
                }
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let file = Arc::new(Mutex::new(file));
        open.insert(name, Arc::clone(&file));
        Ok(file)
    }
}

fn chunk_name(file_name: &str, part: u64) -> String {
    if part == 0 {
        file_name.to_string()
    } else {
        format!("{}_{}", file_name, part)
    }
}
