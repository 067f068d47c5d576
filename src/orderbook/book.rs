//! Core order book state
//!
//! Orders are keyed by id on each side. Sorting only happens when a snapshot
//! is materialised for readers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::{snapshot, BookSnapshot, GroupedBookSnapshot, Order, Side};
use crate::error::{Result, StreamError};
use crate::numeric::add_rounded;

/// Outcome of checking an update's sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceDecision {
    /// Already applied; discard
    Stale,
    /// Next in line
    Accept,
    /// One or more updates were missed
    Gap,
}

/// A trade applied to a resting order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub order_id: String,
    pub side: Side,
    pub price: Decimal,
    pub base: Decimal,
    /// Volume left on the order; zero means it was removed
    pub remaining: Decimal,
}

/// Replicated order book for one market
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Last applied sequence; zero until the first snapshot
    sequence: i64,
    bids: HashMap<String, Order>,
    asks: HashMap<String, Order>,
    /// Wall-clock time of the last frame that proved the feed alive
    last_message: Option<DateTime<Utc>>,
}

impl OrderBook {
    /// Create a new uninitialized order book
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book with a snapshot
    pub fn reset(&mut self, bids: Vec<Order>, asks: Vec<Order>, sequence: i64) {
        self.bids = bids.into_iter().map(|o| (o.id.clone(), o)).collect();
        self.asks = asks.into_iter().map(|o| (o.id.clone(), o)).collect();
        self.sequence = sequence;
        self.touch();
    }

    /// Drop all state, returning to uninitialized
    pub fn clear(&mut self) {
        self.sequence = 0;
        self.bids.clear();
        self.asks.clear();
    }

    /// Gate an update's sequence number against the book's, advancing on
    /// `Accept`
    pub fn accept_sequence(&mut self, next: i64) -> SequenceDecision {
        let decision = self.check_sequence(next);
        if decision == SequenceDecision::Accept {
            self.commit_sequence(next);
        }
        decision
    }

    /// Classify `next` without touching the book
    pub fn check_sequence(&self, next: i64) -> SequenceDecision {
        if next <= self.sequence {
            SequenceDecision::Stale
        } else if Some(next) != self.sequence.checked_add(1) {
            SequenceDecision::Gap
        } else {
            SequenceDecision::Accept
        }
    }

    /// Record `next` as the last fully applied sequence
    pub fn commit_sequence(&mut self, next: i64) {
        self.sequence = next;
    }

    /// Apply a trade, looking the order up among bids first, then asks.
    ///
    /// The wire format does not say which side a trade settles against, so
    /// the bid side wins if an id were ever present on both.
    pub fn apply_trade(&mut self, order_id: &str, base: Decimal) -> Result<Fill> {
        if base <= Decimal::ZERO {
            return Err(StreamError::InvalidTrade {
                order_id: order_id.to_string(),
                base,
            });
        }

        if let Some(fill) = self.dec_trade(Side::Bid, order_id, base)? {
            return Ok(fill);
        }
        if let Some(fill) = self.dec_trade(Side::Ask, order_id, base)? {
            return Ok(fill);
        }

        Err(StreamError::UnknownOrder(order_id.to_string()))
    }

    /// Decrement an order on one side. `Ok(None)` if the id is not there.
    fn dec_trade(&mut self, side: Side, order_id: &str, base: Decimal) -> Result<Option<Fill>> {
        let orders = self.side_mut(side);
        let Some(order) = orders.get_mut(order_id) else {
            return Ok(None);
        };

        let remaining = add_rounded(order.volume, -base).ok_or_else(|| {
            StreamError::VolumeOverflow {
                order_id: order_id.to_string(),
            }
        })?;
        if remaining < Decimal::ZERO {
            return Err(StreamError::CorruptState {
                order_id: order_id.to_string(),
                volume: remaining,
            });
        }

        let price = order.price;
        if remaining.is_zero() {
            orders.remove(order_id);
        } else {
            order.volume = remaining;
        }

        Ok(Some(Fill {
            order_id: order_id.to_string(),
            side,
            price,
            base,
            remaining,
        }))
    }

    /// Insert or overwrite an order on the side named by `side`
    pub fn apply_create(
        &mut self,
        order_id: &str,
        price: Decimal,
        volume: Decimal,
        side: &str,
    ) -> Result<Side> {
        let side: Side = side.parse()?;
        self.side_mut(side).insert(
            order_id.to_string(),
            Order {
                id: order_id.to_string(),
                price,
                volume,
            },
        );
        Ok(side)
    }

    /// Remove an order from both sides. Returns whatever was removed.
    pub fn apply_delete(&mut self, order_id: &str) -> Vec<(Side, Order)> {
        let mut removed = Vec::new();
        if let Some(order) = self.bids.remove(order_id) {
            removed.push((Side::Bid, order));
        }
        if let Some(order) = self.asks.remove(order_id) {
            removed.push((Side::Ask, order));
        }
        removed
    }

    /// Record that the feed is alive
    pub fn touch(&mut self) {
        self.last_message = Some(Utc::now());
    }

    fn side_mut(&mut self, side: Side) -> &mut HashMap<String, Order> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Look up a resting order
    pub fn order(&self, side: Side, order_id: &str) -> Option<&Order> {
        match side {
            Side::Bid => self.bids.get(order_id),
            Side::Ask => self.asks.get(order_id),
        }
    }

    /// Check if the book has received a snapshot
    pub fn is_initialized(&self) -> bool {
        self.sequence != 0
    }

    /// Last applied sequence
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn last_message(&self) -> Option<DateTime<Utc>> {
        self.last_message
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Sorted copy: bids descending, asks ascending
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            sequence: self.sequence,
            bids: snapshot::flatten(&self.bids, true),
            asks: snapshot::flatten(&self.asks, false),
        }
    }

    /// Sorted copy with orders merged by integer price
    pub fn grouped_snapshot(&self) -> GroupedBookSnapshot {
        GroupedBookSnapshot {
            sequence: self.sequence,
            bids: snapshot::group_by_price(&self.bids, true),
            asks: snapshot::group_by_price(&self.asks, false),
        }
    }
}
