//! Top-of-book metrics derived from a snapshot

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BookSnapshot, Level};

fn depth(levels: &[Level]) -> Decimal {
    levels
        .iter()
        .fold(Decimal::ZERO, |total, l| total.saturating_add(l.volume))
}

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookMetrics {
    pub sequence: i64,

    pub best_bid: Option<Decimal>,

    pub best_ask: Option<Decimal>,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<Decimal>,

    /// Spread in basis points
    pub spread_bps: Option<Decimal>,

    /// Total bid volume
    pub bid_depth: Decimal,

    /// Total ask volume
    pub ask_depth: Decimal,

    /// Number of resting bids
    pub bid_orders: usize,

    /// Number of resting asks
    pub ask_orders: usize,
}

impl OrderBookMetrics {
    pub fn from_snapshot(snapshot: &BookSnapshot) -> Self {
        let best_bid = snapshot.bids.first().map(|l| l.price);
        let best_ask = snapshot.asks.first().map(|l| l.price);

        let mid_price = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => bid
                .checked_add(ask)
                .and_then(|sum| sum.checked_div(Decimal::from(2))),
            _ => None,
        };

        let spread_bps = match (best_bid, best_ask, mid_price) {
            (Some(bid), Some(ask), Some(mid)) if mid > Decimal::ZERO => {
                (ask - bid)
                    .checked_div(mid)
                    .and_then(|ratio| ratio.checked_mul(Decimal::from(10000)))
            }
            _ => None,
        };

        Self {
            sequence: snapshot.sequence,
            best_bid,
            best_ask,
            mid_price,
            spread_bps,
            bid_depth: depth(&snapshot.bids),
            ask_depth: depth(&snapshot.asks),
            bid_orders: snapshot.bids.len(),
            ask_orders: snapshot.asks.len(),
        }
    }

    /// Check if the order book is healthy (has valid data)
    pub fn is_healthy(&self) -> bool {
        self.sequence > 0 && self.mid_price.is_some() && self.bid_orders > 0 && self.ask_orders > 0
    }
}
