//! Facade over one market's full execution history on disk.
//!
//! Day files live under `<root>/<exchange>/<symbol>/<year>/<month>/`. Each
//! instance owns its own memoized day-to-cache map; nothing is shared
//! globally, so two logs over different roots never interfere.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::config::Config;
use crate::domain::{Execution, Market};
use crate::error::LogError;
use crate::service::MarketService;
use crate::store::cache::Cache;
use crate::store::logfile::LogKind;
use crate::store::repository::{RepositoryMeta, META_FILE};

/// Entry point for reading, writing and repairing one market's logs.
pub struct ExecutionLog {
    market: Market,
    service: Arc<dyn MarketService>,
    root: PathBuf,
    tolerance_ms: i64,
    fast_scale: u32,
    caches: RefCell<HashMap<NaiveDate, Arc<Cache>>>,
}

impl ExecutionLog {
    pub fn new(service: Arc<dyn MarketService>, config: &Config) -> ExecutionLog {
        let market = service.market().clone();
        let root = config
            .root
            .join(&market.exchange)
            .join(&market.symbol);
        ExecutionLog {
            market,
            service,
            root,
            tolerance_ms: config.merge_tolerance_ms,
            fast_scale: config.fast_scale,
            caches: RefCell::new(HashMap::new()),
        }
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Scale passed to fast-log conversion for this market.
    pub fn fast_scale(&self) -> u32 {
        self.fast_scale
    }

    /// The cache for one day, created on first use and memoized.
    pub fn cache(&self, date: NaiveDate) -> Arc<Cache> {
        self.caches
            .borrow_mut()
            .entry(date)
            .or_insert_with(|| {
                Arc::new(Cache::new(
                    &self.directory(date),
                    date,
                    self.service.clone(),
                    self.tolerance_ms,
                ))
            })
            .clone()
    }

    /// All records of one day, from the cheapest representation present.
    pub fn at(&self, date: NaiveDate) -> Result<Vec<Execution>, LogError> {
        self.cache(date).read()
    }

    /// All records from `start` to `end`, both inclusive, in day order.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Execution>, LogError> {
        let mut records = Vec::new();
        let mut date = start;
        while date <= end {
            records.extend(self.at(date)?);
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(records)
    }

    /// Caches for every locally stored day, oldest first.
    pub fn caches(&self) -> Result<Vec<Arc<Cache>>, LogError> {
        Ok(self
            .scan_local_days()?
            .into_iter()
            .map(|date| self.cache(date))
            .collect())
    }

    /// First and last locally cached day, from `repository.json` when today's
    /// scan already ran, otherwise from a fresh directory walk.
    pub fn stored_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, LogError> {
        let today = self.service.now().date_naive();
        let meta = RepositoryMeta::load(&self.meta_path());
        if meta.is_fresh(today) {
            return Ok(meta.first_cached.zip(meta.last_cached));
        }
        let days = self.scan_local_days()?;
        Ok(days.first().copied().zip(days.last().copied()))
    }

    /// Record that `date` has just been written locally, widening the stored
    /// range without a rescan.
    pub fn update_local(&self, date: NaiveDate) -> Result<(), LogError> {
        let path = self.meta_path();
        let mut meta = RepositoryMeta::load(&path);
        if meta.update_local(date) {
            meta.store(&path)?;
        }
        Ok(())
    }

    /// Walk the directory tree collecting every day that has at least one
    /// log file, and refresh `repository.json` with the result.
    fn scan_local_days(&self) -> Result<Vec<NaiveDate>, LogError> {
        let mut days = Vec::new();
        for year in read_dirs(&self.root)? {
            for month in read_dirs(&year)? {
                for file in read_files(&month)? {
                    if let Some(date) = parse_day_file(&file) {
                        days.push(date);
                    }
                }
            }
        }
        days.sort_unstable();
        days.dedup();
        debug!(market = %self.market, days = days.len(), "scanned log directory");

        let mut meta = RepositoryMeta::load(&self.meta_path());
        meta.first_cached = days.first().copied();
        meta.last_cached = days.last().copied();
        meta.last_scan = Some(self.service.now().date_naive());
        meta.store(&self.meta_path())?;
        Ok(days)
    }

    fn directory(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }
}

impl std::fmt::Debug for ExecutionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLog")
            .field("market", &self.market)
            .field("root", &self.root)
            .finish()
    }
}

fn read_dirs(path: &Path) -> Result<Vec<PathBuf>, LogError> {
    list(path, |p| p.is_dir())
}

fn read_files(path: &Path) -> Result<Vec<PathBuf>, LogError> {
    list(path, |p| p.is_file())
}

fn list(path: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, LogError> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    let dir = std::fs::read_dir(path).map_err(|e| LogError::io(path, e))?;
    for entry in dir {
        let entry = entry.map_err(|e| LogError::io(path, e))?;
        let p = entry.path();
        if keep(&p) {
            entries.push(p);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Parse `execution<YYYYMMDD>.<ext>` into the day it stores.
fn parse_day_file(path: &Path) -> Option<NaiveDate> {
    let name = path.file_stem()?.to_str()?;
    let digits = name.strip_prefix("execution")?;
    let extension = path.extension()?.to_str()?;
    if ![LogKind::Normal, LogKind::Compact, LogKind::Fast]
        .iter()
        .any(|kind| kind.extension() == extension)
    {
        return None;
    }
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}
