pub mod config;
mod error;
mod types;

pub use config::EngineConfig;
pub use error::{BasaltError, Result};
pub use types::{BlockId, Lsn, TxId, END_OF_FILE};
