use std::time::Duration;

/// Size of a data block in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Size of the in-memory log tail page. Larger than a data block so many
/// records fit between flushes; the log file's blocks are this size.
pub const LOG_PAGE_SIZE: usize = 256 * 1024;

/// Number of blocks stored per physical chunk file. Block `n` of a logical
/// file lives in chunk `n / BLOCKS_PER_FILE`.
pub const BLOCKS_PER_FILE: u64 = 1024;

/// Default number of slots in the buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Wall-clock bound on buffer and lock acquisition.
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(10);

/// Usage-count cap for buffer slots; a hot slot survives this many
/// clock-sweep passes after being unpinned.
pub const MAX_USAGE_COUNT: u32 = 5;

/// Name of the write-ahead log file.
pub const LOG_FILE: &str = "basalt.log";

/// Interval between maintenance sweeps of the flush worker.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Tunable engine parameters. `Default` matches the constants above.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub block_size: usize,
    pub log_page_size: usize,
    pub blocks_per_file: u64,
    pub pool_size: usize,
    pub max_wait_time: Duration,
    pub log_file: String,
    /// Wipe and recreate the database directory on startup.
    pub recreate: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            log_page_size: LOG_PAGE_SIZE,
            blocks_per_file: BLOCKS_PER_FILE,
            pool_size: DEFAULT_POOL_SIZE,
            max_wait_time: MAX_WAIT_TIME,
            log_file: LOG_FILE.to_string(),
            recreate: false,
        }
    }
}
