//! Book events and their delivery to user callbacks
//!
//! The receive loop only queues events; a separate task runs the
//! [`EventHandler`] so slow callbacks never hold the book lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::StreamError;
use crate::orderbook::Side;

/// A change applied to the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookEvent {
    TradeApplied {
        order_id: String,
        price: Decimal,
        base: Decimal,
        /// True when the traded order rested on the bid side
        is_buy: bool,
        timestamp: DateTime<Utc>,
    },
    OrderCreated {
        order_id: String,
        price: Decimal,
        volume: Decimal,
        side: Side,
        timestamp: DateTime<Utc>,
    },
    OrderDeleted {
        order_id: String,
        price: Decimal,
        volume: Decimal,
        side: Side,
        timestamp: DateTime<Utc>,
    },
}

/// Callbacks for book changes. Every method defaults to a no-op.
pub trait EventHandler: Send + 'static {
    fn on_trade_applied(
        &mut self,
        _order_id: &str,
        _price: Decimal,
        _base: Decimal,
        _is_buy: bool,
        _timestamp: DateTime<Utc>,
    ) {
    }

    fn on_order_created(
        &mut self,
        _order_id: &str,
        _price: Decimal,
        _volume: Decimal,
        _side: Side,
        _timestamp: DateTime<Utc>,
    ) {
    }

    fn on_order_deleted(
        &mut self,
        _order_id: &str,
        _price: Decimal,
        _volume: Decimal,
        _side: Side,
        _timestamp: DateTime<Utc>,
    ) {
    }

    /// Called once for every session that ends in an error
    fn on_connection_error(&mut self, _error: &StreamError) {}
}

/// Everything the dispatch task delivers
#[derive(Debug)]
pub(crate) enum Notification {
    Book(BookEvent),
    ConnectionError(StreamError),
}

pub(crate) type NotificationSender = mpsc::UnboundedSender<Notification>;

/// Spawn the task that feeds notifications to `handler` in order.
///
/// The task ends once every sender is dropped.
pub(crate) fn spawn_dispatcher(
    mut handler: Box<dyn EventHandler>,
) -> (NotificationSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            deliver(handler.as_mut(), notification);
        }
        debug!("Event dispatcher stopped");
    });
    (tx, task)
}

fn deliver(handler: &mut dyn EventHandler, notification: Notification) {
    match notification {
        Notification::Book(BookEvent::TradeApplied {
            order_id,
            price,
            base,
            is_buy,
            timestamp,
        }) => handler.on_trade_applied(&order_id, price, base, is_buy, timestamp),
        Notification::Book(BookEvent::OrderCreated {
            order_id,
            price,
            volume,
            side,
            timestamp,
        }) => handler.on_order_created(&order_id, price, volume, side, timestamp),
        Notification::Book(BookEvent::OrderDeleted {
            order_id,
            price,
            volume,
            side,
            timestamp,
        }) => handler.on_order_deleted(&order_id, price, volume, side, timestamp),
        Notification::ConnectionError(err) => handler.on_connection_error(&err),
    }
}
