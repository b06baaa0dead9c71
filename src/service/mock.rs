//! In-memory market service for tests.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ExecutionLogRepository, MarketService, ServiceError};
use crate::domain::{Execution, Market};

/// Market service backed by a prepared execution list.
#[derive(Debug, Clone)]
pub struct MockMarketService {
    market: Market,
    now: Option<DateTime<Utc>>,
    feed: Vec<Execution>,
    batch: usize,
    repository: Option<Arc<MockRepository>>,
}

impl MockMarketService {
    /// Create a mock service with an empty feed.
    pub fn new(market: Market) -> Self {
        Self {
            market,
            now: None,
            feed: Vec::new(),
            batch: usize::MAX,
            repository: None,
        }
    }

    /// Append one execution to the feed.
    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.feed.push(execution);
        self
    }

    /// Append multiple executions to the feed.
    pub fn with_executions(mut self, executions: Vec<Execution>) -> Self {
        self.feed.extend(executions);
        self
    }

    /// Pin the clock instead of deriving it from the feed.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Cap the number of executions returned per `executions` call.
    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    /// Attach an external archive.
    pub fn with_repository(mut self, repository: MockRepository) -> Self {
        self.repository = Some(Arc::new(repository));
        self
    }
}

impl MarketService for MockMarketService {
    fn market(&self) -> &Market {
        &self.market
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
            .or_else(|| self.feed.last().map(|e| e.date))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    fn executions(&self, since_id: i64) -> Result<Vec<Execution>, ServiceError> {
        Ok(self
            .feed
            .iter()
            .filter(|e| e.id > since_id)
            .take(self.batch)
            .cloned()
            .collect())
    }

    fn search_nearest_id(&self, date: DateTime<Utc>) -> Result<Option<Execution>, ServiceError> {
        Ok(self.feed.iter().find(|e| e.date >= date).cloned())
    }

    fn external_repository(&self) -> Option<Arc<dyn ExecutionLogRepository>> {
        self.repository
            .clone()
            .map(|r| r as Arc<dyn ExecutionLogRepository>)
    }
}

/// External archive backed by a per-day map.
#[derive(Debug, Clone, Default)]
pub struct MockRepository {
    days: BTreeMap<NaiveDate, Vec<Execution>>,
    failure: Option<ServiceError>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a complete day of history.
    pub fn with_day(mut self, date: NaiveDate, executions: Vec<Execution>) -> Self {
        self.days.insert(date, executions);
        self
    }

    /// Make every call fail with the given error.
    pub fn with_failure(mut self, failure: ServiceError) -> Self {
        self.failure = Some(failure);
        self
    }
}

impl ExecutionLogRepository for MockRepository {
    fn collect(&self) -> Result<Vec<NaiveDate>, ServiceError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        Ok(self.days.keys().copied().collect())
    }

    fn convert(&self, date: NaiveDate) -> Result<Vec<Execution>, ServiceError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.days
            .get(&date)
            .cloned()
            .ok_or_else(|| ServiceError::Unavailable(date.to_string()))
    }
}
