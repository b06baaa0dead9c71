//! Domain types: executions, sides, markets and the decimal numeric type.

pub mod decimal;
pub mod execution;
pub mod primitives;

pub use decimal::Decimal;
pub use execution::{ConsecutiveType, Execution, DELAY_HUGE, DELAY_INESTIMABLE};
pub use primitives::{Market, Side};
