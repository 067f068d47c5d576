//! One lifetime of a streaming connection
//!
//! `Idle -> Handshaking -> Streaming -> Closed`. The book is cleared when the
//! session ends, however it ends, so readers see `sequence == 0` until the
//! next snapshot arrives.

use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::client::{send_credentials, KeepAlive, WebSocketClient};
use crate::config::Config;
use crate::error::Result;
use crate::orderbook::{apply_update, Order, UpdateOutcome};
use crate::parser::{Credentials, OrderBookSnapshot, ParsedMessage, SnapshotOrder};
use crate::stream::Shared;
use crate::telemetry::{BOOK_SEQUENCE, FRAMES_RECEIVED, STALE_UPDATES};

/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// No connection attempt made yet
    Idle,
    /// Dialing and sending credentials
    Handshaking,
    /// Receiving the feed
    Streaming,
    /// Connection torn down
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Handshaking => write!(f, "HANDSHAKING"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A single connection to the streaming API
pub(crate) struct ConnectionSession {
    shared: Arc<Shared>,
    config: Arc<Config>,
}

impl ConnectionSession {
    pub(crate) fn new(shared: Arc<Shared>, config: Arc<Config>) -> Self {
        Self { shared, config }
    }

    /// Run the session until the connection fails or a close is requested.
    ///
    /// Returns `Ok(())` only when closed on request.
    pub(crate) async fn run(self) -> Result<()> {
        let mut closed = self.shared.subscribe_closed();
        if *closed.borrow() {
            return Ok(());
        }

        self.shared.set_state(SessionState::Handshaking);
        let result = self.connect_and_stream(&mut closed).await;

        self.shared.book.lock().clear();
        BOOK_SEQUENCE.set(0);
        self.shared.set_state(SessionState::Closed);

        result
    }

    async fn connect_and_stream(&self, closed: &mut watch::Receiver<bool>) -> Result<()> {
        let url = self.config.stream_url();
        let (mut client, mut sink) = tokio::select! {
            _ = closed.wait_for(|c| *c) => return Ok(()),
            connected = WebSocketClient::connect(&url, self.config.read_timeout()) => connected?,
        };

        if *closed.borrow() {
            let _ = sink.close().await;
            return Ok(());
        }

        let credentials = Credentials {
            api_key_id: self.config.api_key_id.clone(),
            api_key_secret: self.config.api_key_secret.clone(),
        };
        send_credentials(&mut sink, &credentials).await?;

        self.shared.set_state(SessionState::Streaming);
        info!(
            key_id = %self.config.api_key_id,
            pair = %self.config.pair,
            "Connection established"
        );

        let keepalive = KeepAlive::spawn(sink, self.config.keepalive_interval());

        let result = loop {
            let frame = tokio::select! {
                _ = closed.wait_for(|c| *c) => {
                    info!(pair = %self.config.pair, "Close requested, ending session");
                    break Ok(());
                }
                frame = client.next_frame() => frame,
            };

            match frame {
                Ok(Some(text)) => {
                    if let Err(e) = process_frame(&self.shared, &text) {
                        break Err(e);
                    }
                }
                Ok(None) => continue,
                Err(e) => break Err(e),
            }
        };

        keepalive.shutdown().await;
        result
    }
}

/// Route one text frame to the book
pub(crate) fn process_frame(shared: &Shared, raw: &str) -> Result<()> {
    match ParsedMessage::parse(raw)? {
        ParsedMessage::KeepAlive => {
            FRAMES_RECEIVED.with_label_values(&["keepalive"]).inc();
            shared.book.lock().touch();
        }
        ParsedMessage::Snapshot(snapshot) => {
            FRAMES_RECEIVED.with_label_values(&["snapshot"]).inc();
            apply_snapshot(shared, snapshot);
        }
        ParsedMessage::Update(update) => {
            FRAMES_RECEIVED.with_label_values(&["update"]).inc();

            let mut events = Vec::new();
            let result = {
                let mut book = shared.book.lock();
                let result = apply_update(&mut book, &update, &mut events);
                BOOK_SEQUENCE.set(book.sequence());
                result
            };
            shared.publish(events);

            match result? {
                UpdateOutcome::Applied => {}
                UpdateOutcome::Stale => {
                    STALE_UPDATES.inc();
                    debug!(sequence = update.sequence, "Discarded stale update");
                }
                UpdateOutcome::Uninitialized => {
                    debug!(sequence = update.sequence, "Update before snapshot ignored");
                }
            }
        }
    }
    Ok(())
}

fn apply_snapshot(shared: &Shared, snapshot: OrderBookSnapshot) {
    let bids: Vec<Order> = snapshot.bids.into_iter().map(into_order).collect();
    let asks: Vec<Order> = snapshot.asks.into_iter().map(into_order).collect();
    let (bid_count, ask_count) = (bids.len(), asks.len());

    shared.book.lock().reset(bids, asks, snapshot.sequence);
    BOOK_SEQUENCE.set(snapshot.sequence);

    info!(
        sequence = snapshot.sequence,
        bids = bid_count,
        asks = ask_count,
        "Order book snapshot received"
    );
}

fn into_order(o: SnapshotOrder) -> Order {
    Order {
        id: o.id,
        price: o.price,
        volume: o.volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::events::{spawn_dispatcher, EventHandler};
    use crate::orderbook::{Level, Side};
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[test]
    fn test_snapshot_then_full_fill() {
        let shared = Shared::new(None);
        process_frame(
            &shared,
            r#"{"sequence": 1, "bids": [{"id": "a", "price": 100, "volume": 2}], "asks": []}"#,
        )
        .unwrap();
        process_frame(
            &shared,
            r#"{"sequence": 2, "timestamp": 1, "trade_updates": [{"order_id": "a", "base": 2}]}"#,
        )
        .unwrap();

        let snapshot = shared.book.lock().snapshot();
        assert_eq!(snapshot.sequence, 2);
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());
    }

    #[test]
    fn test_update_before_snapshot_is_ignored() {
        let shared = Shared::new(None);
        process_frame(
            &shared,
            r#"{"sequence": 9, "timestamp": 1, "delete_update": {"order_id": "a"}}"#,
        )
        .unwrap();
        assert_eq!(shared.book.lock().sequence(), 0);
    }

    #[test]
    fn test_keepalive_records_liveness() {
        let shared = Shared::new(None);
        process_frame(&shared, "\"\"").unwrap();
        assert!(shared.book.lock().last_message().is_some());
    }

    #[test]
    fn test_gap_is_fatal() {
        let shared = Shared::new(None);
        process_frame(&shared, r#"{"sequence": 5, "bids": [], "asks": []}"#).unwrap();
        let err = process_frame(&shared, r#"{"sequence": 7, "timestamp": 1}"#).unwrap_err();
        assert!(matches!(err, StreamError::Desync { expected: 6, got: 7 }));
    }

    #[test]
    fn test_oversized_volume_fails_session_without_panicking() {
        let shared = Shared::new(None);
        process_frame(
            &shared,
            r#"{"sequence":1,"bids":[{"id":"a","price":"1","volume":"1000000000000000000000"}],"asks":[]}"#,
        )
        .unwrap();
        let err = process_frame(
            &shared,
            r#"{"sequence":2,"trade_updates":[{"order_id":"a","base":"1"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StreamError::VolumeOverflow { .. }));
        assert!(err.is_protocol_violation());
        assert_eq!(shared.book.lock().sequence(), 1);
    }

    #[test]
    fn test_malformed_frame_is_fatal() {
        let shared = Shared::new(None);
        assert!(matches!(
            process_frame(&shared, "{not json"),
            Err(StreamError::ParseError(_))
        ));
    }

    #[test]
    fn test_second_snapshot_replaces_book() {
        let shared = Shared::new(None);
        process_frame(
            &shared,
            r#"{"sequence": 3, "bids": [{"id": "a", "price": "100", "volume": "1"}], "asks": []}"#,
        )
        .unwrap();
        process_frame(
            &shared,
            r#"{"sequence": 10, "asks": [{"id": "z", "price": "101", "volume": "4"}], "bids": []}"#,
        )
        .unwrap();
        let snapshot = shared.book.lock().snapshot();
        assert_eq!(snapshot.sequence, 10);
        assert!(snapshot.bids.is_empty());
        assert_eq!(snapshot.asks, vec![Level { price: dec!(101), volume: dec!(4) }]);
    }

    struct Collector(Arc<Mutex<Vec<(String, Side)>>>);

    impl EventHandler for Collector {
        fn on_order_created(
            &mut self,
            order_id: &str,
            _price: Decimal,
            _volume: Decimal,
            side: Side,
            _timestamp: DateTime<Utc>,
        ) {
            self.0.lock().unwrap().push((order_id.to_string(), side));
        }
    }

    #[tokio::test]
    async fn test_events_reach_handler() {
        let created = Arc::new(Mutex::new(Vec::new()));
        let (tx, task) = spawn_dispatcher(Box::new(Collector(created.clone())));
        let shared = Shared::new(Some(tx));

        process_frame(&shared, r#"{"sequence": 1, "bids": [], "asks": []}"#).unwrap();
        process_frame(
            &shared,
            r#"{"sequence": 2, "timestamp": 1, "create_update": {"order_id": "n", "price": "5", "volume": "1", "type": "ASK"}}"#,
        )
        .unwrap();

        drop(shared);
        task.await.unwrap();
        assert_eq!(*created.lock().unwrap(), vec![("n".to_string(), Side::Ask)]);
    }
}
