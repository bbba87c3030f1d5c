use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic identity of a tradeable perpetual, e.g. "BTC".
///
/// Interned as a plain `String` rather than a `smol_str`-style handle: the
/// configured universe is small (tens of coins) and never on a per-tick
/// hot path that would justify the extra dependency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coin(pub String);

impl Coin {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Coin {
    fn from(s: &str) -> Self {
        Coin::new(s)
    }
}

impl From<String> for Coin {
    fn from(s: String) -> Self {
        Coin::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}
