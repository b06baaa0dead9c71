//! On-disk storage: physical log files, per-day caches, scan metadata and
//! the per-market facade.

pub mod cache;
pub mod execution_log;
pub mod logfile;
pub mod repository;

pub use cache::Cache;
pub use execution_log::ExecutionLog;
pub use logfile::{LogFile, LogKind, ReadOutcome, RecordIter};
pub use repository::RepositoryMeta;
