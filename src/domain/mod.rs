//! Core data model shared by every component.
//!
//! Ownership is enforced by module boundary, not by convention: only
//! [`crate::knowledge_store`] constructs a [`CoinScore`], [`TradingPattern`],
//! [`RegimeRule`] or [`Adaptation`]; only [`crate::journal`] constructs a
//! [`TradeEvent`]; only [`crate::executor`] constructs a [`Position`].

pub mod adaptation;
pub mod coin;
pub mod coin_score;
pub mod errors;
pub mod insight;
pub mod market_state;
pub mod pattern;
pub mod position;
pub mod regime_rule;
pub mod trade_condition;
pub mod trade_event;

pub use adaptation::{Adaptation, AdaptationKind, Effectiveness};
pub use coin::{Coin, Direction};
pub use coin_score::{CoinScore, CoinStatus};
pub use errors::ErrorKind;
pub use insight::Insight;
pub use market_state::{CoinMarketView, MarketState, SentimentLabel};
pub use pattern::TradingPattern;
pub use position::Position;
pub use regime_rule::{RegimeAction, RegimeRule};
pub use trade_condition::TradeCondition;
pub use trade_event::{ExitReason, TradeEvent};
