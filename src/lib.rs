pub mod codec;
pub mod compaction;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;

pub use config::{Config, ConfigError};
pub use domain::{ConsecutiveType, Decimal, Execution, Market, Side};
pub use error::LogError;
pub use service::{
    ExecutionLogRepository, MarketService, MockMarketService, MockRepository, ServiceError,
};
pub use store::{Cache, ExecutionLog, LogFile, LogKind, ReadOutcome};
