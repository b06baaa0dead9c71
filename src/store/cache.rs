//! Per-market, per-day cache over the three log representations.
//!
//! A day is cached as up to three sibling files named
//! `execution<YYYYMMDD>.{log,clog,flog}`. The compact file is the archival
//! form; the normal file is the append target for live collection; the fast
//! file is a derived downsample. Reads prefer fast over compact over normal.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::compaction;
use crate::domain::Execution;
use crate::error::LogError;
use crate::service::{ExecutionLogRepository, MarketService, ServiceError};
use crate::store::logfile::{LogFile, LogKind, ReadOutcome};

/// One day of one market's execution history on disk.
pub struct Cache {
    date: NaiveDate,
    service: Arc<dyn MarketService>,
    normal: LogFile,
    compact: LogFile,
    fast: LogFile,
    tolerance_ms: i64,
}

impl Cache {
    pub fn new(
        directory: &Path,
        date: NaiveDate,
        service: Arc<dyn MarketService>,
        tolerance_ms: i64,
    ) -> Cache {
        let file = |kind: LogKind| {
            let name = format!("execution{}.{}", date.format("%Y%m%d"), kind.extension());
            LogFile::new(directory.join(name), kind)
        };
        Cache {
            date,
            service,
            normal: file(LogKind::Normal),
            compact: file(LogKind::Compact),
            fast: file(LogKind::Fast),
            tolerance_ms,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn exist_normal(&self) -> bool {
        self.normal.exists()
    }

    pub fn exist_compact(&self) -> bool {
        self.compact.exists()
    }

    pub fn exist_fast(&self) -> bool {
        self.fast.exists()
    }

    /// Read the day, preferring the cheapest representation present:
    /// fast, then compact, then normal. A corrupt file is skipped with a
    /// warning; [`Cache::repair`] is the way to fix it.
    pub fn read(&self) -> Result<Vec<Execution>, LogError> {
        let started = Instant::now();
        for file in [&self.fast, &self.compact, &self.normal] {
            let Some(records) = self.read_file(file)? else {
                continue;
            };
            info!(
                date = %self.date,
                kind = ?file.kind(),
                records = records.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "read cached day"
            );
            return Ok(records);
        }
        Ok(Vec::new())
    }

    pub fn read_normal(&self) -> Result<Vec<Execution>, LogError> {
        Ok(self.read_file(&self.normal)?.unwrap_or_default())
    }

    pub fn read_compact(&self) -> Result<Vec<Execution>, LogError> {
        Ok(self.read_file(&self.compact)?.unwrap_or_default())
    }

    pub fn read_fast(&self) -> Result<Vec<Execution>, LogError> {
        Ok(self.read_file(&self.fast)?.unwrap_or_default())
    }

    /// Append records to the normal log as-is.
    pub fn write_normal(&self, executions: &[Execution]) -> Result<(), LogError> {
        self.normal.append(executions)
    }

    /// Merge near-simultaneous same-side same-price runs, then append to the
    /// normal log. This is the write path for live collection.
    pub fn write_normal_compacted(&self, executions: &[Execution]) -> Result<(), LogError> {
        let merged = compaction::compact(executions.iter().cloned(), self.tolerance_ms);
        self.normal.append(&merged)
    }

    /// Append records to the compact log.
    pub fn write_compact(&self, executions: &[Execution]) -> Result<(), LogError> {
        self.compact.append(executions)
    }

    /// Convert the normal log into a fresh compact log, verify the compact
    /// file decodes back to the exact source records, then delete the normal
    /// log. A decode mismatch aborts before deletion.
    pub fn convert_normal_to_compact(&self) -> Result<(), LogError> {
        let Some(source) = self.read_file(&self.normal)? else {
            return Ok(());
        };
        let started = Instant::now();
        self.compact.write_all(&source)?;
        let restored = self.read_file(&self.compact)?.unwrap_or_default();
        if restored != source {
            return Err(LogError::Integrity {
                operation: "convert_normal_to_compact".to_string(),
                message: format!(
                    "{}: decoded {} records, expected {}",
                    self.compact.path().display(),
                    restored.len(),
                    source.len()
                ),
            });
        }
        self.normal.delete()?;
        info!(
            date = %self.date,
            records = source.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "converted normal log to compact"
        );
        Ok(())
    }

    /// Materialize a normal log from the compact log. Both files coexist
    /// afterwards.
    pub fn convert_compact_to_normal(&self) -> Result<(), LogError> {
        let Some(source) = self.read_file(&self.compact)? else {
            return Ok(());
        };
        self.normal.write_all(&source)
    }

    /// Derive the fast log from the best full-fidelity source available.
    pub fn convert_compact_to_fast(&self, scale: u32) -> Result<(), LogError> {
        let source = match self.read_file(&self.compact)? {
            Some(records) => records,
            None => match self.read_file(&self.normal)? {
                Some(records) => records,
                None => return Ok(()),
            },
        };
        let sampled = compaction::fast_log(source, scale);
        self.fast.write_all(&sampled)
    }

    /// Whether the normal log already holds the complete day: its last record
    /// falls inside the day and the feed's next record starts a later day.
    /// A silent feed means the day may still be in progress.
    pub fn exist_completed_normal(&self) -> Result<bool, LogError> {
        let Some(last) = self.normal.last_record()? else {
            return Ok(false);
        };
        if last.date.date_naive() > self.date {
            return Ok(false);
        }
        self.feed_confirms_day_over(last.id)
    }

    /// Whether the feed's first record after `last_id` starts a later day.
    fn feed_confirms_day_over(&self, last_id: i64) -> Result<bool, LogError> {
        let batch = self.service.executions(last_id)?;
        match batch.first() {
            Some(next) => Ok(next.date.date_naive() > self.date),
            None => Ok(false),
        }
    }

    /// Fetch the complete day from an external archive, persist it as the
    /// normal log, and return it.
    pub fn read_external_repository(
        &self,
        repository: &dyn ExecutionLogRepository,
    ) -> Result<Vec<Execution>, LogError> {
        let records = repository.convert(self.date)?;
        if !records.is_empty() {
            self.normal.write_all(&records)?;
        }
        Ok(records)
    }

    /// Bring the day to a verified state, reconciling local files against the
    /// external archive and the live feed. Returns whether the day is now
    /// (or, under `dry_run`, would be) completely cached. `dry_run` performs
    /// every check without touching disk.
    ///
    /// A healthy compact log is authoritative. A corrupt one is discarded.
    /// Missing history is seeded whole from the external archive when it has
    /// the day, but an archive restore still has to pass the completeness
    /// check: the archive may lag the live feed, so collection resumes after
    /// its last record. An archive that does not carry the day falls back to
    /// live seeding via nearest-id search; any other archive failure
    /// propagates. Collection stops at the first record of a later day;
    /// reaching it proves completeness and triggers conversion to compact.
    pub fn repair(&self, dry_run: bool) -> Result<bool, LogError> {
        if self.exist_compact() {
            if !self.compact.is_corrupted()? && self.read_file(&self.compact)?.is_some() {
                return Ok(true);
            }
            warn!(date = %self.date, path = %self.compact.path().display(), "discarding corrupt compact log");
            if !dry_run {
                self.compact.delete()?;
            }
        }

        let mut restored: Option<Execution> = None;
        if !self.exist_normal() {
            if let Some(repository) = self.service.external_repository() {
                match repository.convert(self.date) {
                    Ok(records) => {
                        if let Some(last) = records.last().cloned() {
                            debug!(date = %self.date, records = records.len(), "day restored from external repository");
                            if !dry_run {
                                self.normal.write_all(&records)?;
                            }
                            restored = Some(last);
                        }
                    }
                    Err(ServiceError::Unavailable(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let last_local = if self.exist_normal() {
            if !dry_run {
                self.normal.repair()?;
            }
            self.normal.last_record()?
        } else {
            // dry runs never materialize the archive restore
            restored
        };

        if let Some(last) = &last_local {
            if last.date.date_naive() <= self.date && self.feed_confirms_day_over(last.id)? {
                if !dry_run {
                    self.convert_normal_to_compact()?;
                }
                return Ok(true);
            }
        }

        let seed = match &last_local {
            Some(last) => last.id,
            None => match self.service.search_nearest_id(self.day_start())? {
                // fetch from just before the day's first known execution
                Some(execution) => execution.id - 1,
                None => return Ok(false),
            },
        };
        let completed = self.collect_from_feed(seed, last_local.map(|e| e.id), dry_run)?;
        if completed && !dry_run {
            self.convert_normal_to_compact()?;
        }
        Ok(completed)
    }

    /// Pull the feed forward from `seed` until it crosses the day boundary
    /// (complete) or goes silent (incomplete). Records of this day are
    /// appended to the normal log, deduplicated by id against `written`.
    fn collect_from_feed(
        &self,
        seed: i64,
        written: Option<i64>,
        dry_run: bool,
    ) -> Result<bool, LogError> {
        let day_start = self.day_start();
        let day_end = day_start + Duration::days(1);
        let mut cursor = seed;
        let mut written = written.unwrap_or(i64::MIN);

        loop {
            let batch = self.service.executions(cursor)?;
            let Some(max_id) = batch.iter().map(|e| e.id).max() else {
                debug!(date = %self.date, cursor, "feed silent, day left incomplete");
                return Ok(false);
            };
            if max_id <= cursor {
                // feed made no progress
                return Ok(false);
            }
            cursor = max_id;

            let mut fresh = Vec::new();
            for execution in batch {
                if execution.date >= day_end {
                    if !dry_run {
                        self.normal.append(&fresh)?;
                    }
                    return Ok(true);
                }
                if execution.date >= day_start && execution.id > written {
                    written = execution.id;
                    fresh.push(execution);
                }
            }
            if !dry_run {
                self.normal.append(&fresh)?;
            }
        }
    }

    fn day_start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(chrono::NaiveTime::MIN))
    }

    /// Read one file fully; `None` when missing, and `None` with a warning
    /// when corrupt.
    fn read_file(&self, file: &LogFile) -> Result<Option<Vec<Execution>>, LogError> {
        match file.read()? {
            ReadOutcome::Missing => Ok(None),
            ReadOutcome::Corrupted { last_good_id } => {
                warn!(
                    path = %file.path().display(),
                    ?last_good_id,
                    "skipping corrupt log file"
                );
                Ok(None)
            }
            ReadOutcome::Records(records) => records.collect::<Result<Vec<_>, _>>().map(Some),
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("date", &self.date)
            .field("normal", &self.normal.path())
            .finish()
    }
}
