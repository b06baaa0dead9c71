//! Stream transforms that shrink an execution stream before persisting.
//!
//! `compact` is lossless in shape: runs of near-simultaneous same-side
//! same-price trades collapse into one record with the summed size.
//! `fast_log` is deliberately lossy: it rebuilds each five-second window as
//! at most four evenly spaced synthetic records that preserve per-side
//! volume and the window's price envelope.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Decimal, Execution, Side};

/// Default merge tolerance for [`compact`], in milliseconds.
pub const MERGE_TOLERANCE_MS: i64 = 500;

/// Width of one [`fast_log`] aggregation window, in milliseconds.
const WINDOW_MS: i64 = 5000;

/// Merge consecutive executions sharing side and price that occur within
/// `tolerance_ms` of the run's start. The merged record keeps every identity
/// field of the run's first element; only the size changes, to the run sum.
pub fn compact<I>(executions: I, tolerance_ms: i64) -> Vec<Execution>
where
    I: IntoIterator<Item = Execution>,
{
    let mut merged = Vec::new();
    let mut run: Option<(Execution, Decimal)> = None;

    for execution in executions {
        match &mut run {
            Some((first, sum))
                if first.side == execution.side
                    && first.price == execution.price
                    && execution.mills() - first.mills() <= tolerance_ms =>
            {
                *sum += execution.size;
            }
            _ => {
                if let Some((first, sum)) = run.take() {
                    merged.push(first.size(sum));
                }
                let sum = execution.size;
                run = Some((execution, sum));
            }
        }
    }
    if let Some((first, sum)) = run.take() {
        merged.push(first.size(sum));
    }
    merged
}

/// Downsample a stream into five-second windows of at most four synthetic
/// records. Sizes are rounded to `scale` decimal places; output is strictly
/// ordered by the synthetic timestamps (window start + 0..3 seconds).
pub fn fast_log<I>(executions: I, scale: u32) -> Vec<Execution>
where
    I: IntoIterator<Item = Execution>,
{
    let mut output = Vec::new();
    let mut window: Option<Window> = None;

    for execution in executions {
        match &mut window {
            Some(current) if execution.mills() < current.end_ms => current.update(&execution),
            _ => {
                if let Some(done) = window.take() {
                    done.emit(scale, &mut output);
                }
                window = Some(Window::open(&execution));
            }
        }
    }
    if let Some(done) = window.take() {
        done.emit(scale, &mut output);
    }
    output
}

/// One in-progress aggregation window.
struct Window {
    start: DateTime<Utc>,
    end_ms: i64,
    latest_id: i64,
    first_side: Side,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    buys: Decimal,
    sells: Decimal,
}

impl Window {
    fn open(execution: &Execution) -> Window {
        let offset = execution.mills().rem_euclid(WINDOW_MS);
        let mut window = Window {
            start: execution.date - Duration::milliseconds(offset),
            end_ms: execution.mills() - offset + WINDOW_MS,
            latest_id: execution.id,
            first_side: execution.side,
            open: execution.price,
            high: execution.price,
            low: execution.price,
            close: execution.price,
            buys: Decimal::ZERO,
            sells: Decimal::ZERO,
        };
        window.accumulate(execution);
        window
    }

    fn update(&mut self, execution: &Execution) {
        if execution.price > self.high {
            self.high = execution.price;
        } else if execution.price < self.low {
            self.low = execution.price;
        }
        self.close = execution.price;
        self.latest_id = execution.id;
        self.accumulate(execution);
    }

    fn accumulate(&mut self, execution: &Execution) {
        match execution.side {
            Side::Buy => self.buys += execution.size,
            Side::Sell => self.sells += execution.size,
        }
    }

    fn date_at(&self, slot: i64) -> DateTime<Utc> {
        self.start + Duration::seconds(slot)
    }

    fn emit(self, scale: u32, output: &mut Vec<Execution>) {
        let mut buy_each = self.buys.round_dp(scale) / 2;
        let mut sell_each = self.sells.round_dp(scale) / 2;
        let mut buy_side = Side::Buy;
        let mut sell_side = Side::Sell;
        let single_price = self.open == self.close && self.open == self.high && self.open == self.low;

        if self.buys.is_zero() {
            if self.sells.is_zero() {
                return;
            }
            if single_price {
                output.push(self.single(Side::Sell, self.sells));
                return;
            }
            buy_each = sell_each / 2;
            sell_each = buy_each;
            buy_side = sell_side;
        } else if self.sells.is_zero() {
            if single_price {
                output.push(self.single(Side::Buy, self.buys));
                return;
            }
            sell_each = buy_each / 2;
            buy_each = sell_each;
            sell_side = buy_side;
        }

        let sides = if self.first_side.is_buy() {
            [buy_side, sell_side, buy_side, sell_side]
        } else {
            [sell_side, buy_side, sell_side, buy_side]
        };
        let prices = if self.open <= self.close {
            [self.open, self.low, self.high, self.close]
        } else {
            [self.open, self.high, self.low, self.close]
        };

        for slot in 0..4usize {
            let size = match sides[slot] {
                Side::Buy => buy_each,
                Side::Sell => sell_each,
            };
            output.push(
                Execution::with_side(sides[slot], size)
                    .price(prices[slot])
                    .id(self.latest_id - 3 + slot as i64)
                    .date(self.date_at(slot as i64)),
            );
        }
    }

    fn single(&self, side: Side, size: Decimal) -> Execution {
        Execution::with_side(side, size)
            .price(self.open)
            .id(self.latest_id)
            .date(self.date_at(0))
    }
}
