mod buffer_list;
pub mod concurrency;
pub mod recovery;
mod transaction;

pub use transaction::Transaction;
