//! Market service abstraction: the live feed and optional external archive
//! that log storage pulls from when local files are missing or damaged.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Execution, Market};

pub mod mock;

pub use mock::{MockMarketService, MockRepository};

/// Access to one market's execution feed.
///
/// Implementations wrap an exchange connection. All calls are blocking;
/// batching and rate limiting live behind this trait.
pub trait MarketService: fmt::Debug {
    /// The market this service reports for.
    fn market(&self) -> &Market;

    /// Current time as the exchange sees it.
    fn now(&self) -> DateTime<Utc>;

    /// Fetch the next batch of executions with id strictly greater than
    /// `since_id`, in id order. An empty batch means the feed has nothing
    /// newer yet.
    fn executions(&self, since_id: i64) -> Result<Vec<Execution>, ServiceError>;

    /// Best-effort lookup of the first execution at or after `date`. Used to
    /// seed [`MarketService::executions`] when no local record exists.
    fn search_nearest_id(&self, date: DateTime<Utc>) -> Result<Option<Execution>, ServiceError>;

    /// External archive of historical days, when the exchange publishes one.
    fn external_repository(&self) -> Option<Arc<dyn ExecutionLogRepository>> {
        None
    }
}

/// An out-of-band archive of whole-day execution histories, typically an
/// exchange's downloadable dumps.
pub trait ExecutionLogRepository: fmt::Debug {
    /// Days the archive can supply.
    fn collect(&self) -> Result<Vec<NaiveDate>, ServiceError>;

    /// Fetch the complete, id-ordered history for one day.
    fn convert(&self, date: NaiveDate) -> Result<Vec<Execution>, ServiceError>;
}

/// Error type for feed and archive operations.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("feed returned malformed data: {0}")]
    Malformed(String),

    #[error("no data available for {0}")]
    Unavailable(String),
}
