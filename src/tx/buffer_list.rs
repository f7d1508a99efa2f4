use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::{Buffer, BufferManager};
use crate::common::{BlockId, Result};

/// Tracks which buffers one transaction currently has pinned, so commit and
/// rollback can unwind every outstanding pin. A block pinned twice appears
/// twice in the pin list and keeps its map entry until the last unpin.
pub(crate) struct BufferList {
    bm: Arc<BufferManager>,
    buffers: HashMap<BlockId, Arc<Buffer>>,
    pins: Vec<BlockId>,
}

impl BufferList {
    pub fn new(bm: Arc<BufferManager>) -> Self {
        Self {
            bm,
            buffers: HashMap::new(),
            pins: Vec::new(),
        }
    }

    pub fn get(&self, blk: &BlockId) -> Option<Arc<Buffer>> {
        self.buffers.get(blk).cloned()
    }

    pub fn pin(&mut self, blk: &BlockId) -> Result<()> {
        let buf = self.bm.pin(blk)?;
        self.buffers.insert(blk.clone(), buf);
        self.pins.push(blk.clone());
        Ok(())
    }

    pub fn unpin(&mut self, blk: &BlockId) {
        if let Some(buf) = self.buffers.get(blk) {
            self.bm.unpin(buf);
        }
        if let Some(pos) = self.pins.iter().position(|b| b == blk) {
            self.pins.remove(pos);
        }
        if !self.pins.contains(blk) {
            self.buffers.remove(blk);
        }
    }

    pub fn unpin_all(&mut self) {
        for blk in &self.pins {
            if let Some(buf) = self.buffers.get(blk) {
                self.bm.unpin(buf);
            }
        }
        self.pins.clear();
        self.buffers.clear();
    }
}
