//! Order book module
//!
//! Maintains the replicated order book from a snapshot followed by
//! sequenced incremental updates.

mod book;
mod dispatch;
mod metrics;
mod snapshot;

pub use book::{Fill, OrderBook, SequenceDecision};
pub use dispatch::{apply_update, UpdateOutcome};
pub use metrics::OrderBookMetrics;
pub use snapshot::{flatten, group_by_price};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Bid,
    Ask,
}

impl FromStr for Side {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BID" => Ok(Side::Bid),
            "ASK" => Ok(Side::Ask),
            other => Err(StreamError::UnknownSide(other.to_string())),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BID"),
            Side::Ask => write!(f, "ASK"),
        }
    }
}

/// A resting order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub price: Decimal,
    pub volume: Decimal,
}

/// A single entry in a flattened book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub volume: Decimal,
}

/// Orders sharing an integer price, merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedLevel {
    pub price: Decimal,
    pub volume: Decimal,
    pub count: u64,
}

/// Point-in-time copy of the book, best prices first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub sequence: i64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Point-in-time copy of the book grouped by integer price
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedBookSnapshot {
    pub sequence: i64,
    pub bids: Vec<GroupedLevel>,
    pub asks: Vec<GroupedLevel>,
}
