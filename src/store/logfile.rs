//! One physical log file: a day of executions in one of three
//! representations.
//!
//! All three formats are newline-terminated text. A file whose last byte is
//! not `\n`, or whose final line does not parse, carries a torn tail from an
//! interrupted write; [`LogFile::repair`] drops the damaged tail and keeps
//! every complete record before it.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::codec::RecordCodec;
use crate::domain::Execution;
use crate::error::LogError;

/// Physical representation of a log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// Full records, one absolute line each. Extension `.log`.
    Normal,
    /// Delta-compressed records chained line to line. Extension `.clog`.
    Compact,
    /// Downsampled records in the normal line format. Extension `.flog`.
    Fast,
}

impl LogKind {
    pub fn extension(&self) -> &'static str {
        match self {
            LogKind::Normal => "log",
            LogKind::Compact => "clog",
            LogKind::Fast => "flog",
        }
    }

    fn is_compact(&self) -> bool {
        matches!(self, LogKind::Compact)
    }
}

/// Result of [`LogFile::read`].
pub enum ReadOutcome {
    /// No file on disk.
    Missing,
    /// The file carries a torn tail. `last_good_id` is the id of the last
    /// record that still decodes, if any record does.
    Corrupted { last_good_id: Option<i64> },
    /// Healthy file; records decode lazily, top to bottom.
    Records(RecordIter),
}

/// One log file on disk.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
    kind: LogKind,
}

impl LogFile {
    pub fn new(path: PathBuf, kind: LogKind) -> LogFile {
        LogFile { path, kind }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Id of the first record, if the file has a parseable first line.
    pub fn first_id(&self) -> Result<Option<i64>, LogError> {
        if !self.exists() {
            return Ok(None);
        }
        let mut records = self.open_reader()?.into_records();
        let Some(record) = records.next() else {
            return Ok(None);
        };
        let Ok(record) = record else {
            return Ok(None);
        };
        let fields: Vec<&str> = record.iter().collect();
        Ok(decode_record(self.kind, &Execution::base(), &fields)
            .ok()
            .map(|e| e.id))
    }

    /// Id of the last record that decodes cleanly, if any.
    pub fn last_id(&self) -> Result<Option<i64>, LogError> {
        Ok(self.last_record()?.map(|e| e.id))
    }

    /// Last record that decodes cleanly, if any. A torn tail is ignored.
    pub fn last_record(&self) -> Result<Option<Execution>, LogError> {
        Ok(self.scan()?.last_good)
    }

    /// Whether the file exists but carries a torn tail: last byte is not a
    /// newline, or the final line does not parse.
    pub fn is_corrupted(&self) -> Result<bool, LogError> {
        if !self.exists() {
            return Ok(false);
        }
        let text = self.read_text()?;
        if text.is_empty() {
            return Ok(false);
        }
        if !text.ends_with('\n') {
            return Ok(true);
        }
        match text[..text.len() - 1].rsplit('\n').next() {
            Some(line) => Ok(!syntactically_valid(self.kind, line)),
            None => Ok(false),
        }
    }

    /// Drop the torn tail: the unterminated final fragment and any trailing
    /// lines that do not parse. Complete records before the tail are kept.
    /// Idempotent; a healthy file is untouched.
    pub fn repair(&self) -> Result<(), LogError> {
        if !self.exists() {
            return Ok(());
        }
        let text = self.read_text()?;
        let mut end = match text.rfind('\n') {
            Some(pos) => pos + 1,
            None => 0,
        };
        while end > 0 {
            let body = &text[..end - 1];
            let start = body.rfind('\n').map(|pos| pos + 1).unwrap_or(0);
            if syntactically_valid(self.kind, &body[start..]) {
                break;
            }
            end = start;
        }
        if end < text.len() {
            warn!(
                path = %self.path.display(),
                dropped_bytes = text.len() - end,
                "truncating torn log tail"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| LogError::io(&self.path, e))?;
            file.set_len(end as u64)
                .map_err(|e| LogError::io(&self.path, e))?;
        }
        Ok(())
    }

    /// Read the file. Healthy files yield a lazy record iterator; corrupt
    /// files report the last id still reachable instead.
    pub fn read(&self) -> Result<ReadOutcome, LogError> {
        if !self.exists() {
            return Ok(ReadOutcome::Missing);
        }
        if self.is_corrupted()? {
            let last_good_id = self.scan()?.last_good.map(|e| e.id);
            return Ok(ReadOutcome::Corrupted { last_good_id });
        }
        Ok(ReadOutcome::Records(RecordIter {
            records: self.open_reader()?.into_records(),
            kind: self.kind,
            previous: Execution::base(),
            line: 0,
        }))
    }

    /// Collect every record of a healthy file; `None` when the file is
    /// missing or corrupt.
    pub fn read_all(&self) -> Result<Option<Vec<Execution>>, LogError> {
        match self.read()? {
            ReadOutcome::Missing | ReadOutcome::Corrupted { .. } => Ok(None),
            ReadOutcome::Records(records) => records.collect::<Result<Vec<_>, _>>().map(Some),
        }
    }

    /// Append records in this file's native representation. A compact append
    /// re-derives the delta baseline from the existing last record, so the
    /// file must be healthy.
    pub fn append(&self, executions: &[Execution]) -> Result<(), LogError> {
        if executions.is_empty() {
            return Ok(());
        }
        if self.is_corrupted()? {
            return Err(LogError::Integrity {
                operation: "append".to_string(),
                message: format!("{} has a torn tail, repair first", self.path.display()),
            });
        }
        let previous = if self.kind.is_compact() {
            self.scan()?.last_good.unwrap_or_else(Execution::base)
        } else {
            Execution::base()
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LogError::io(&self.path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LogError::io(&self.path, e))?;
        self.write_records(file, previous, executions)
    }

    /// Replace the whole file with the given records.
    pub fn write_all(&self, executions: &[Execution]) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LogError::io(&self.path, e))?;
        }
        let file = File::create(&self.path).map_err(|e| LogError::io(&self.path, e))?;
        self.write_records(file, Execution::base(), executions)
    }

    /// Remove the file if present.
    pub fn delete(&self) -> Result<(), LogError> {
        if self.exists() {
            fs::remove_file(&self.path).map_err(|e| LogError::io(&self.path, e))?;
        }
        Ok(())
    }

    fn write_records(
        &self,
        file: File,
        mut previous: Execution,
        executions: &[Execution],
    ) -> Result<(), LogError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(file);
        for execution in executions {
            if self.kind.is_compact() {
                let tokens = RecordCodec::encode(&previous, execution)
                    .map_err(|e| LogError::codec(0, e.to_string()))?;
                writer
                    .write_record(&tokens)
                    .map_err(|e| LogError::io(&self.path, std::io::Error::other(e)))?;
                previous = execution.clone();
            } else {
                writer
                    .write_record(execution.to_line().split(' '))
                    .map_err(|e| LogError::io(&self.path, std::io::Error::other(e)))?;
            }
        }
        writer.flush().map_err(|e| LogError::io(&self.path, e))
    }

    /// Decode from the top, stopping at the first line that fails. Used for
    /// compact chaining and for locating the readable prefix of a torn file.
    fn scan(&self) -> Result<Scan, LogError> {
        let mut scan = Scan::default();
        if !self.exists() {
            return Ok(scan);
        }
        let text = self.read_text()?;
        let body = match text.rfind('\n') {
            Some(pos) => &text[..pos + 1],
            None => "",
        };
        let mut previous = Execution::base();
        for line in body.lines() {
            let fields: Vec<&str> = line.split(' ').collect();
            match decode_record(self.kind, &previous, &fields) {
                Ok(execution) => {
                    previous = execution.clone();
                    scan.last_good = Some(execution);
                }
                Err(_) => break,
            }
        }
        Ok(scan)
    }

    fn read_text(&self) -> Result<String, LogError> {
        fs::read_to_string(&self.path).map_err(|e| LogError::io(&self.path, e))
    }

    fn open_reader(&self) -> Result<csv::Reader<File>, LogError> {
        csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .quoting(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| LogError::io(&self.path, std::io::Error::other(e)))
    }
}

#[derive(Default)]
struct Scan {
    last_good: Option<Execution>,
}

/// Lazy top-to-bottom record iterator over a healthy log file.
pub struct RecordIter {
    records: csv::StringRecordsIntoIter<File>,
    kind: LogKind,
    previous: Execution,
    line: usize,
}

impl Iterator for RecordIter {
    type Item = Result<Execution, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.line += 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => return Some(Err(LogError::codec(self.line, e.to_string()))),
        };
        let fields: Vec<&str> = record.iter().collect();
        match decode_record(self.kind, &self.previous, &fields) {
            Ok(execution) => {
                self.previous = execution.clone();
                Some(Ok(execution))
            }
            Err(message) => Some(Err(LogError::codec(self.line, message))),
        }
    }
}

fn decode_record(
    kind: LogKind,
    previous: &Execution,
    fields: &[&str],
) -> Result<Execution, String> {
    if kind.is_compact() {
        RecordCodec::decode(previous, fields).map_err(|e| e.to_string())
    } else {
        Execution::parse_line(fields)
    }
}

/// Whether one line parses in isolation. For compact lines the delta chain is
/// baseline-independent, so any baseline proves syntactic validity.
fn syntactically_valid(kind: LogKind, line: &str) -> bool {
    let fields: Vec<&str> = line.split(' ').collect();
    decode_record(kind, &Execution::base(), &fields).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;
    use chrono::{TimeZone, Utc};
    use std::io::Write as _;
    use tempfile::TempDir;

    fn exec(id: i64, price: &str) -> Execution {
        Execution::buy(Decimal::from_str_canonical("0.5").unwrap())
            .price(Decimal::from_str_canonical(price).unwrap())
            .id(id)
            .date(Utc.with_ymd_and_hms(2021, 1, 1, 9, 0, id as u32 % 60).unwrap())
    }

    fn log(dir: &TempDir, kind: LogKind) -> LogFile {
        LogFile::new(dir.path().join(format!("execution.{}", kind.extension())), kind)
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        assert!(!file.exists());
        assert!(!file.is_corrupted().unwrap());
        assert_eq!(file.first_id().unwrap(), None);
        assert_eq!(file.last_id().unwrap(), None);
        assert!(matches!(file.read().unwrap(), ReadOutcome::Missing));
    }

    #[test]
    fn test_normal_append_and_read() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        let records = vec![exec(1, "100"), exec(2, "101"), exec(3, "100")];
        file.append(&records).unwrap();

        assert_eq!(file.first_id().unwrap(), Some(1));
        assert_eq!(file.last_id().unwrap(), Some(3));
        assert_eq!(file.read_all().unwrap().unwrap(), records);
    }

    #[test]
    fn test_compact_append_chains_across_calls() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Compact);
        file.append(&[exec(1, "100"), exec(2, "101")]).unwrap();
        file.append(&[exec(3, "100")]).unwrap();

        assert_eq!(
            file.read_all().unwrap().unwrap(),
            vec![exec(1, "100"), exec(2, "101"), exec(3, "100")]
        );
    }

    #[test]
    fn test_fast_uses_normal_line_format() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Fast);
        file.append(&[exec(7, "99.5")]).unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, format!("{}\n", exec(7, "99.5").to_line()));
    }

    #[test]
    fn test_torn_tail_detected() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        file.append(&[exec(1, "100"), exec(2, "101")]).unwrap();

        let mut raw = OpenOptions::new().append(true).open(file.path()).unwrap();
        write!(raw, "3 2021-01-01T09:0").unwrap();

        assert!(file.is_corrupted().unwrap());
        match file.read().unwrap() {
            ReadOutcome::Corrupted { last_good_id } => assert_eq!(last_good_id, Some(2)),
            _ => panic!("expected corrupted outcome"),
        }
    }

    #[test]
    fn test_unparseable_final_line_detected() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        file.append(&[exec(1, "100")]).unwrap();

        let mut raw = OpenOptions::new().append(true).open(file.path()).unwrap();
        writeln!(raw, "not a record").unwrap();

        assert!(file.is_corrupted().unwrap());
    }

    #[test]
    fn test_repair_drops_tail_and_keeps_prefix() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        file.append(&[exec(1, "100"), exec(2, "101")]).unwrap();

        let mut raw = OpenOptions::new().append(true).open(file.path()).unwrap();
        writeln!(raw, "garbage line").unwrap();
        write!(raw, "torn fragm").unwrap();

        file.repair().unwrap();
        assert!(!file.is_corrupted().unwrap());
        assert_eq!(file.read_all().unwrap().unwrap(), vec![exec(1, "100"), exec(2, "101")]);

        // a second pass changes nothing
        file.repair().unwrap();
        assert_eq!(file.last_id().unwrap(), Some(2));
    }

    #[test]
    fn test_repair_of_healthy_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Compact);
        file.append(&[exec(1, "100"), exec(2, "101")]).unwrap();

        let before = std::fs::read(file.path()).unwrap();
        file.repair().unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), before);
    }

    #[test]
    fn test_repair_on_compact_tail() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Compact);
        file.append(&[exec(1, "100"), exec(2, "101"), exec(3, "102")]).unwrap();

        // cut the final line in half
        let text = std::fs::read_to_string(file.path()).unwrap();
        let cut = text[..text.len() - 1].rfind('\n').unwrap() + 3;
        std::fs::write(file.path(), &text[..cut]).unwrap();

        file.repair().unwrap();
        assert_eq!(file.read_all().unwrap().unwrap(), vec![exec(1, "100"), exec(2, "101")]);
    }

    #[test]
    fn test_append_to_corrupt_file_refused() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Compact);
        file.append(&[exec(1, "100")]).unwrap();

        let mut raw = OpenOptions::new().append(true).open(file.path()).unwrap();
        write!(raw, "torn").unwrap();

        assert!(matches!(
            file.append(&[exec(2, "101")]),
            Err(LogError::Integrity { .. })
        ));
    }

    #[test]
    fn test_write_all_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        file.append(&[exec(1, "100"), exec(2, "101")]).unwrap();
        file.write_all(&[exec(9, "200")]).unwrap();

        assert_eq!(file.read_all().unwrap().unwrap(), vec![exec(9, "200")]);
    }

    #[test]
    fn test_empty_file_is_healthy() {
        let dir = TempDir::new().unwrap();
        let file = log(&dir, LogKind::Normal);
        std::fs::write(file.path(), "").unwrap();

        assert!(!file.is_corrupted().unwrap());
        assert_eq!(file.last_id().unwrap(), None);
    }
}
