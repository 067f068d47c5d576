//! Public handle for a replicated order book
//!
//! ```no_run
//! # async fn demo() {
//! use orderbook_stream::{Config, OrderBookStream};
//!
//! let stream = OrderBookStream::start(Config::new("key_id", "key_secret", "XBTZAR"));
//! let snapshot = stream.snapshot();
//! println!("{} {:?} {:?}", snapshot.sequence, snapshot.bids.first(), snapshot.asks.first());
//! stream.close();
//! # }
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::Config;
use crate::events::{spawn_dispatcher, BookEvent, EventHandler, Notification, NotificationSender};
use crate::orderbook::{BookSnapshot, GroupedBookSnapshot, OrderBook, OrderBookMetrics};
use crate::websocket::{ReconnectSupervisor, SessionState};

/// State shared between the receive loop, the supervisor and readers
pub(crate) struct Shared {
    pub(crate) book: Mutex<OrderBook>,
    state: Mutex<SessionState>,
    closed: watch::Sender<bool>,
    notifications: Option<NotificationSender>,
}

impl Shared {
    pub(crate) fn new(notifications: Option<NotificationSender>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            book: Mutex::new(OrderBook::new()),
            state: Mutex::new(SessionState::Idle),
            closed,
            notifications,
        }
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Request shutdown. Returns false if it was already requested.
    pub(crate) fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Queue book events for the handler, if there is one
    pub(crate) fn publish(&self, events: Vec<BookEvent>) {
        for event in events {
            self.notify(Notification::Book(event));
        }
    }

    pub(crate) fn notify(&self, notification: Notification) {
        if let Some(tx) = &self.notifications {
            if tx.send(notification).is_err() {
                warn!("Event dispatcher is gone, dropping notification");
            }
        }
    }
}

/// A running order book stream.
///
/// Reconnects on its own until [`close`](Self::close) is called or the
/// handle is dropped. Must be started from within a Tokio runtime.
pub struct OrderBookStream {
    shared: Arc<Shared>,
    supervisor: Option<JoinHandle<()>>,
}

impl OrderBookStream {
    /// Start streaming the configured pair in the background
    pub fn start(config: Config) -> Self {
        Self::spawn(config, None)
    }

    /// Start streaming and deliver book events to `handler`.
    ///
    /// The handler runs on its own task, in the order events were applied.
    pub fn start_with_handler(config: Config, handler: impl EventHandler) -> Self {
        let (tx, _dispatcher) = spawn_dispatcher(Box::new(handler));
        Self::spawn(config, Some(tx))
    }

    fn spawn(config: Config, notifications: Option<NotificationSender>) -> Self {
        let shared = Arc::new(Shared::new(notifications));
        let supervisor = ReconnectSupervisor::new(shared.clone(), Arc::new(config));
        let supervisor = Some(tokio::spawn(supervisor.run()));
        Self { shared, supervisor }
    }

    /// Latest book: bids best (highest) first, asks best (lowest) first
    pub fn snapshot(&self) -> BookSnapshot {
        self.shared.book.lock().snapshot()
    }

    /// Latest book with orders merged by integer price
    pub fn grouped_snapshot(&self) -> GroupedBookSnapshot {
        self.shared.book.lock().grouped_snapshot()
    }

    /// Latest applied sequence; zero while waiting for a snapshot
    pub fn sequence(&self) -> i64 {
        self.shared.book.lock().sequence()
    }

    /// When the feed last proved alive
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.shared.book.lock().last_message()
    }

    pub fn session_state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn metrics(&self) -> OrderBookMetrics {
        OrderBookMetrics::from_snapshot(&self.snapshot())
    }

    /// Stop reconnecting and close any live connection. Safe to call
    /// repeatedly and from any thread.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Wait for the stream to shut down after [`close`](Self::close)
    pub async fn join(mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await {
                warn!(error = %e, "Supervisor task failed");
            }
        }
    }
}

impl Drop for OrderBookStream {
    fn drop(&mut self) {
        self.shared.close();
    }
}
