//! WebSocket module for streaming API connection management

mod client;
mod manager;
mod session;

pub use client::{send_credentials, KeepAlive, WebSocketClient, WsSink};
pub use manager::{Backoff, MAX_BACKOFF_EXPONENT};
pub use session::SessionState;

pub(crate) use manager::ReconnectSupervisor;
