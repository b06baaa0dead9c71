//! Domain primitives: Side and Market.

use serde::{Deserialize, Serialize};

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Single-character mark used in the normal-log serialization.
    pub fn mark(&self) -> &'static str {
        match self {
            Side::Buy => "B",
            Side::Sell => "S",
        }
    }

    /// Parse a side from its mark.
    pub fn from_mark(mark: &str) -> Option<Side> {
        match mark {
            "B" => Some(Side::Buy),
            "S" => Some(Side::Sell),
            _ => None,
        }
    }

    /// The opposite side.
    pub fn inverse(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mark())
    }
}

/// Identity of one market: exchange name plus symbol.
///
/// Determines the on-disk layout: logs for a market live under
/// `<root>/<exchange>/<symbol>/<year>/<month>/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    pub exchange: String,
    pub symbol: String,
}

impl Market {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Market {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.exchange, self.symbol)
    }
}
