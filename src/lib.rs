//! Order book replication client for the Luno streaming API
//!
//! Connects to the streaming endpoint for one market pair, applies the full
//! snapshot and the sequenced updates that follow it, and keeps a consistent
//! copy of the book that any thread can read while the feed is applied.

pub mod config;
pub mod error;
pub mod events;
pub mod numeric;
pub mod orderbook;
pub mod parser;
pub mod stream;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use error::{Result, StreamError};
pub use events::{BookEvent, EventHandler};
pub use orderbook::{
    BookSnapshot, GroupedBookSnapshot, GroupedLevel, Level, Order, OrderBook, OrderBookMetrics,
    Side,
};
pub use parser::{OrderBookSnapshot, ParsedMessage, StreamUpdate};
pub use stream::OrderBookStream;
pub use websocket::SessionState;
