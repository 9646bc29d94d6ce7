pub mod storage;
pub mod types;

pub use storage::LogBook;
pub use types::{LogEntry, LogKind};
