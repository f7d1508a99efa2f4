mod file_manager;
mod page;

pub use file_manager::FileManager;
pub use page::Page;
