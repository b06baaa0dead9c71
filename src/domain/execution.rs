//! Execution: one matched trade reported by a market data feed.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Decimal, Side};

/// Classification of how an execution's side pairing relates to its
/// immediate predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsecutiveType {
    Different,
    SameBuyer,
    SameSeller,
    SameBoth,
}

impl ConsecutiveType {
    pub fn code(&self) -> u32 {
        match self {
            ConsecutiveType::Different => 0,
            ConsecutiveType::SameBuyer => 1,
            ConsecutiveType::SameSeller => 2,
            ConsecutiveType::SameBoth => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<ConsecutiveType> {
        match code {
            0 => Some(ConsecutiveType::Different),
            1 => Some(ConsecutiveType::SameBuyer),
            2 => Some(ConsecutiveType::SameSeller),
            3 => Some(ConsecutiveType::SameBoth),
            _ => None,
        }
    }
}

/// Reporting delay sentinel: latency could not be estimated.
pub const DELAY_INESTIMABLE: i32 = 0;

/// Reporting delay sentinel: latency exceeded 180 seconds.
pub const DELAY_HUGE: i32 = -1;

/// One matched trade. Immutable once constructed.
///
/// Within one log, `id` and `date` are non-decreasing. Instances come from
/// parsing a log line, from live feed ingestion, or from the compaction
/// pipeline synthesizing a merged record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Monotonic identifier, unique per market. May have gaps.
    pub id: i64,
    pub side: Side,
    pub price: Decimal,
    /// Executed size, always positive.
    pub size: Decimal,
    /// Execution time, millisecond resolution.
    pub date: DateTime<Utc>,
    pub consecutive: ConsecutiveType,
    /// Rough reporting latency estimate in seconds, or a sentinel
    /// (`DELAY_INESTIMABLE`, `DELAY_HUGE`).
    pub delay: i32,
}

impl Execution {
    /// Start a buy execution of the given size.
    pub fn buy(size: impl Into<Decimal>) -> Execution {
        Execution::with_side(Side::Buy, size)
    }

    /// Start a sell execution of the given size.
    pub fn sell(size: impl Into<Decimal>) -> Execution {
        Execution::with_side(Side::Sell, size)
    }

    pub fn with_side(side: Side, size: impl Into<Decimal>) -> Execution {
        Execution {
            id: 0,
            side,
            price: Decimal::ZERO,
            size: size.into(),
            date: DateTime::UNIX_EPOCH,
            consecutive: ConsecutiveType::Different,
            delay: DELAY_INESTIMABLE,
        }
    }

    /// The synthetic zero/epoch record used as the delta baseline for the
    /// first line of a compact log.
    pub fn base() -> Execution {
        Execution::buy(Decimal::ZERO)
    }

    pub fn price(mut self, price: impl Into<Decimal>) -> Execution {
        self.price = price.into();
        self
    }

    pub fn size(mut self, size: impl Into<Decimal>) -> Execution {
        self.size = size.into();
        self
    }

    pub fn id(mut self, id: i64) -> Execution {
        self.id = id;
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Execution {
        self.date = date;
        self
    }

    pub fn consecutive(mut self, consecutive: ConsecutiveType) -> Execution {
        self.consecutive = consecutive;
        self
    }

    pub fn delay(mut self, delay: i32) -> Execution {
        self.delay = delay;
        self
    }

    /// Epoch milliseconds of the execution time.
    pub fn mills(&self) -> i64 {
        self.date.timestamp_millis()
    }

    /// Render the normal-log line: all seven fields, space delimited,
    /// reconstructible without a baseline.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            self.id,
            self.date.naive_utc().format(DATE_FORMAT),
            self.side.mark(),
            self.price.to_canonical_string(),
            self.size.to_canonical_string(),
            self.consecutive.code(),
            self.delay
        )
    }

    /// Parse one normal-log line. The inverse of [`Execution::to_line`].
    pub fn parse_line(fields: &[&str]) -> Result<Execution, String> {
        if fields.len() != 7 {
            return Err(format!("expected 7 fields, got {}", fields.len()));
        }
        let id = fields[0]
            .parse::<i64>()
            .map_err(|e| format!("bad id {:?}: {e}", fields[0]))?;
        let naive = NaiveDateTime::parse_from_str(fields[1], DATE_FORMAT)
            .map_err(|e| format!("bad date {:?}: {e}", fields[1]))?;
        let side =
            Side::from_mark(fields[2]).ok_or_else(|| format!("bad side {:?}", fields[2]))?;
        let price = Decimal::from_str_canonical(fields[3])
            .map_err(|e| format!("bad price {:?}: {e}", fields[3]))?;
        let size = Decimal::from_str_canonical(fields[4])
            .map_err(|e| format!("bad size {:?}: {e}", fields[4]))?;
        let code = fields[5]
            .parse::<u32>()
            .map_err(|e| format!("bad consecutive {:?}: {e}", fields[5]))?;
        let consecutive = ConsecutiveType::from_code(code)
            .ok_or_else(|| format!("bad consecutive code {code}"))?;
        let delay = fields[6]
            .parse::<i32>()
            .map_err(|e| format!("bad delay {:?}: {e}", fields[6]))?;

        Ok(Execution {
            id,
            side,
            price,
            size,
            date: Utc.from_utc_datetime(&naive),
            consecutive,
            delay,
        })
    }
}

/// Millisecond-resolution timestamp format used in normal-log lines.
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
