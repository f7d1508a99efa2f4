mod buffer;
mod buffer_manager;
mod flush_worker;

pub use buffer::Buffer;
pub use buffer_manager::BufferManager;
pub use flush_worker::FlushWorker;
