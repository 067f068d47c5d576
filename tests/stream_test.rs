//! End-to-end tests against a local streaming server

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use orderbook_stream::{
    Config, EventHandler, GroupedLevel, Level, OrderBookStream, SessionState, Side, StreamError,
};

type ServerSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

/// Accepts websocket connections and hands each one to the test
struct MockExchange {
    endpoint: String,
    connections: mpsc::UnboundedReceiver<(String, ServerSocket)>,
}

impl MockExchange {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let mut path = String::new();
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    path = req.uri().path().to_string();
                    Ok(resp)
                };
                let accepted = accept_hdr_async(tcp, callback).await;
                if let Ok(ws) = accepted {
                    if tx.send((path, ws)).is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            endpoint,
            connections: rx,
        }
    }

    fn config(&self) -> Config {
        let mut config = Config::new("test-key", "test-secret", "XBTZAR");
        config.ws_endpoint = self.endpoint.clone();
        config.keepalive_interval_ms = 60_000;
        config.backoff_base_ms = 2_000;
        config
    }

    /// Next client connection, after reading its credentials message
    async fn accept(&mut self) -> ServerSocket {
        let (path, mut ws) = timeout(WAIT, self.connections.recv())
            .await
            .expect("client connects")
            .expect("server running");
        assert_eq!(path, "/api/1/stream/XBTZAR");

        let credentials: serde_json::Value =
            serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(credentials["api_key_id"], "test-key");
        assert_eq!(credentials["api_key_secret"], "test-secret");
        ws
    }
}

async fn next_text(ws: &mut ServerSocket) -> String {
    loop {
        match timeout(WAIT, ws.next()).await.expect("frame arrives") {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("connection ended: {other:?}"),
        }
    }
}

async fn send(ws: &mut ServerSocket, frame: &str) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

/// Forwards every callback to a channel as a short string
struct ChannelHandler(mpsc::UnboundedSender<String>);

impl EventHandler for ChannelHandler {
    fn on_trade_applied(
        &mut self,
        order_id: &str,
        _price: Decimal,
        base: Decimal,
        is_buy: bool,
        _timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        let _ = self.0.send(format!("trade {order_id} {base} {is_buy}"));
    }

    fn on_order_created(
        &mut self,
        order_id: &str,
        _price: Decimal,
        volume: Decimal,
        side: Side,
        _timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        let _ = self.0.send(format!("create {order_id} {volume} {side}"));
    }

    fn on_order_deleted(
        &mut self,
        order_id: &str,
        _price: Decimal,
        _volume: Decimal,
        side: Side,
        _timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        let _ = self.0.send(format!("delete {order_id} {side}"));
    }

    fn on_connection_error(&mut self, error: &StreamError) {
        let kind = match error {
            StreamError::Desync { .. } => "desync".to_string(),
            other => other.to_string(),
        };
        let _ = self.0.send(format!("error {kind}"));
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(WAIT, rx.recv())
        .await
        .expect("event arrives")
        .expect("dispatcher running")
}

#[tokio::test]
async fn test_trade_consumes_whole_order() {
    let mut exchange = MockExchange::start().await;
    let stream = OrderBookStream::start(exchange.config());

    let mut ws = exchange.accept().await;
    send(
        &mut ws,
        r#"{"sequence": 1, "bids": [{"id": "a", "price": "100", "volume": "2"}], "asks": []}"#,
    )
    .await;
    wait_until("snapshot", || stream.sequence() == 1).await;
    assert_eq!(stream.session_state(), SessionState::Streaming);
    assert_eq!(
        stream.snapshot().bids,
        vec![Level { price: dec!(100), volume: dec!(2) }]
    );

    send(
        &mut ws,
        r#"{"sequence": 2, "timestamp": 1700000000000, "trade_updates": [{"order_id": "a", "base": "2"}], "create_update": null, "delete_update": null}"#,
    )
    .await;
    wait_until("trade", || stream.sequence() == 2).await;

    let snapshot = stream.snapshot();
    assert_eq!(snapshot.sequence, 2);
    assert!(snapshot.bids.is_empty());
    assert!(snapshot.asks.is_empty());

    stream.close();
    stream.join().await;
}

#[tokio::test]
async fn test_sequence_gap_clears_book_and_reports_desync() {
    let mut exchange = MockExchange::start().await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let stream = OrderBookStream::start_with_handler(exchange.config(), ChannelHandler(tx));

    let mut ws = exchange.accept().await;
    send(
        &mut ws,
        r#"{"sequence": 5, "bids": [{"id": "a", "price": "100", "volume": "1"}], "asks": [{"id": "b", "price": "101", "volume": "1"}]}"#,
    )
    .await;
    wait_until("snapshot", || stream.sequence() == 5).await;

    send(&mut ws, r#"{"sequence": 7, "timestamp": 1}"#).await;

    assert_eq!(next_event(&mut events).await, "error desync");
    wait_until("teardown", || stream.session_state() == SessionState::Closed).await;
    let snapshot = stream.snapshot();
    assert_eq!(snapshot.sequence, 0);
    assert!(snapshot.bids.is_empty());
    assert!(snapshot.asks.is_empty());

    stream.close();
    stream.join().await;
}

#[tokio::test]
async fn test_reconnects_and_resnapshots_after_drop() {
    let mut exchange = MockExchange::start().await;
    let mut config = exchange.config();
    config.backoff_base_ms = 5;
    let stream = OrderBookStream::start(config);

    let mut ws = exchange.accept().await;
    send(&mut ws, r#"{"sequence": 5, "bids": [], "asks": []}"#).await;
    wait_until("first snapshot", || stream.sequence() == 5).await;
    drop(ws);

    let mut ws = exchange.accept().await;
    send(
        &mut ws,
        r#"{"sequence": 42, "asks": [{"id": "z", "price": "250.5", "volume": "0.1"}], "bids": []}"#,
    )
    .await;
    wait_until("second snapshot", || stream.sequence() == 42).await;
    assert_eq!(
        stream.snapshot().asks,
        vec![Level { price: dec!(250.5), volume: dec!(0.1) }]
    );

    stream.close();
    stream.join().await;
}

#[tokio::test]
async fn test_events_follow_trade_create_delete_order() {
    let mut exchange = MockExchange::start().await;
    let (tx, mut events) = mpsc::unbounded_channel();
    let stream = OrderBookStream::start_with_handler(exchange.config(), ChannelHandler(tx));

    let mut ws = exchange.accept().await;
    send(
        &mut ws,
        r#"{"sequence": 10, "bids": [{"id": "a", "price": "100.25", "volume": "1"}, {"id": "c", "price": "100.75", "volume": "2"}], "asks": []}"#,
    )
    .await;
    send(
        &mut ws,
        r#"{"sequence": 11, "timestamp": 1, "trade_updates": [{"order_id": "a", "base": "1"}], "create_update": {"order_id": "a", "price": "99", "volume": "3", "type": "BID"}, "delete_update": {"order_id": "a"}}"#,
    )
    .await;
    // Redelivered update must be ignored
    send(
        &mut ws,
        r#"{"sequence": 11, "timestamp": 1, "create_update": {"order_id": "x", "price": "1", "volume": "1", "type": "ASK"}}"#,
    )
    .await;
    send(
        &mut ws,
        r#"{"sequence": 12, "timestamp": 2, "create_update": {"order_id": "d", "price": "100.1", "volume": "0.5", "type": "BID"}}"#,
    )
    .await;

    assert_eq!(next_event(&mut events).await, "trade a 1 true");
    assert_eq!(next_event(&mut events).await, "create a 3 BID");
    assert_eq!(next_event(&mut events).await, "delete a BID");
    assert_eq!(next_event(&mut events).await, "create d 0.5 BID");

    wait_until("last update", || stream.sequence() == 12).await;
    let grouped = stream.grouped_snapshot();
    assert!(grouped.asks.is_empty());
    assert_eq!(
        grouped.bids,
        vec![GroupedLevel { price: dec!(100), volume: dec!(2.5), count: 2 }]
    );

    stream.close();
    stream.join().await;
}

#[tokio::test]
async fn test_keepalive_frames_are_sent() {
    let mut exchange = MockExchange::start().await;
    let mut config = exchange.config();
    config.keepalive_interval_ms = 20;
    let stream = OrderBookStream::start(config);

    let mut ws = exchange.accept().await;
    for _ in 0..3 {
        assert_eq!(next_text(&mut ws).await, "");
    }

    stream.close();
    stream.join().await;
}

#[tokio::test]
async fn test_close_tears_down_live_connection() {
    let mut exchange = MockExchange::start().await;
    let stream = OrderBookStream::start(exchange.config());

    let mut ws = exchange.accept().await;
    send(&mut ws, r#"{"sequence": 3, "bids": [], "asks": []}"#).await;
    wait_until("snapshot", || stream.sequence() == 3).await;

    send(&mut ws, r#""""#).await;
    wait_until("keep-alive ack", || stream.last_message_at().is_some()).await;

    stream.close();
    stream.close();

    let ended = timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "client should close the transport");

    wait_until("teardown", || stream.session_state() == SessionState::Closed).await;
    timeout(WAIT, stream.join()).await.unwrap();
}
