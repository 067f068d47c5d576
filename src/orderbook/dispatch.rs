//! Applies one incremental update to the book
//!
//! Sub-events run in the exchange's order: trades, then the create, then the
//! delete. The first failure aborts the rest of the update and leaves the
//! book's sequence where it was; the session is expected to resync.

use chrono::{DateTime, Utc};

use super::{OrderBook, SequenceDecision, Side};
use crate::error::{Result, StreamError};
use crate::events::BookEvent;
use crate::parser::StreamUpdate;

/// What happened to an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No snapshot yet; update ignored
    Uninitialized,
    /// Sequence already applied; update ignored
    Stale,
    /// Update applied in full
    Applied,
}

/// Apply `update` to `book`, appending the resulting events to `events`.
///
/// Events for sub-events that ran before a failure are still appended.
pub fn apply_update(
    book: &mut OrderBook,
    update: &StreamUpdate,
    events: &mut Vec<BookEvent>,
) -> Result<UpdateOutcome> {
    if !book.is_initialized() {
        return Ok(UpdateOutcome::Uninitialized);
    }

    let current = book.sequence();
    match book.check_sequence(update.sequence) {
        SequenceDecision::Stale => return Ok(UpdateOutcome::Stale),
        SequenceDecision::Gap => {
            return Err(StreamError::Desync {
                expected: current.saturating_add(1),
                got: update.sequence,
            })
        }
        SequenceDecision::Accept => {}
    }

    let timestamp = DateTime::<Utc>::from_timestamp_millis(update.timestamp).unwrap_or_default();

    for trade in &update.trade_updates {
        let fill = book.apply_trade(&trade.order_id, trade.base)?;
        events.push(BookEvent::TradeApplied {
            order_id: fill.order_id,
            price: fill.price,
            base: fill.base,
            is_buy: fill.side == Side::Bid,
            timestamp,
        });
    }

    if let Some(create) = &update.create_update {
        let side = book.apply_create(&create.order_id, create.price, create.volume, &create.side)?;
        events.push(BookEvent::OrderCreated {
            order_id: create.order_id.clone(),
            price: create.price,
            volume: create.volume,
            side,
            timestamp,
        });
    }

    if let Some(delete) = &update.delete_update {
        for (side, order) in book.apply_delete(&delete.order_id) {
            events.push(BookEvent::OrderDeleted {
                order_id: order.id,
                price: order.price,
                volume: order.volume,
                side,
                timestamp,
            });
        }
    }

    book.commit_sequence(update.sequence);
    book.touch();
    Ok(UpdateOutcome::Applied)
}
