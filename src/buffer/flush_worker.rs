use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};

use super::BufferManager;

/// FlushWorker runs a background thread that periodically sweeps the buffer
/// pool and writes out dirty slots, bounding how much redo work a crash can
/// leave behind. Shut down (and joined) on drop.
pub struct FlushWorker {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    pub fn new(bm: Arc<BufferManager>, interval: Duration) -> Self {
        let (shutdown, wakeup) = bounded::<()>(1);

        let handle = thread::spawn(move || loop {
            match wakeup.recv_timeout(interval) {
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    // A failed sweep retries on the next tick.
                    let _ = bm.flush_dirty();
                }
                Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::LOG_PAGE_SIZE;
    use crate::common::BlockId;
    use crate::log::LogManager;
    use crate::storage::{FileManager, Page};
    use tempfile::TempDir;

    #[test]
    fn test_background_sweep_flushes_dirty_slot() {
        let dir = TempDir::new().unwrap();
        let fm = Arc::new(FileManager::new(dir.path().join("db"), 1024, false).unwrap());
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "test.log", LOG_PAGE_SIZE).unwrap());
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            lm,
            2,
            128,
            Duration::from_millis(100),
        ));

        let blk = fm.append("t", 128).unwrap();
        let buf = bm.pin(&blk).unwrap();
        buf.page_mut().set_int(0, 11).unwrap();
        buf.set_modified(1, None);
        bm.unpin(&buf);

        let _worker = FlushWorker::new(Arc::clone(&bm), Duration::from_millis(20));
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while buf.is_dirty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!buf.is_dirty());

        let mut page = Page::new(128);
        fm.read(&BlockId::new("t", 0), &mut page).unwrap();
        assert_eq!(page.get_int(0), 11);
    }
}
