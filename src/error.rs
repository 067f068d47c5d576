//! Error types for the order book stream

use rust_decimal::Decimal;
use thiserror::Error;

/// Order book stream errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Update received out of sequence: expected {expected}, got {got}")]
    Desync { expected: i64, got: i64 },

    #[error("Trade for unknown order: {0}")]
    UnknownOrder(String),

    #[error("Unknown order type: {0}")]
    UnknownSide(String),

    #[error("Negative volume {volume} for order {order_id}")]
    CorruptState { order_id: String, volume: Decimal },

    #[error("Volume out of range for order {order_id}")]
    VolumeOverflow { order_id: String },

    #[error("Nonpositive trade of {base} for order {order_id}")]
    InvalidTrade { order_id: String, base: Decimal },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StreamError {
    /// True for errors caused by the content of the feed rather than the
    /// transport carrying it.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            StreamError::ParseError(_)
                | StreamError::Desync { .. }
                | StreamError::UnknownOrder(_)
                | StreamError::UnknownSide(_)
                | StreamError::CorruptState { .. }
                | StreamError::VolumeOverflow { .. }
                | StreamError::InvalidTrade { .. }
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::ParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_protocol_violation_classification() {
        assert!(StreamError::Desync { expected: 6, got: 7 }.is_protocol_violation());
        assert!(StreamError::CorruptState {
            order_id: "a".to_string(),
            volume: dec!(-1)
        }
        .is_protocol_violation());
        assert!(StreamError::VolumeOverflow {
            order_id: "a".to_string()
        }
        .is_protocol_violation());
        assert!(!StreamError::ConnectionTimeout.is_protocol_violation());
        assert!(!StreamError::WebSocketConnection("reset".to_string()).is_protocol_violation());
    }

    #[test]
    fn test_desync_message() {
        let err = StreamError::Desync { expected: 6, got: 7 };
        assert_eq!(
            err.to_string(),
            "Update received out of sequence: expected 6, got 7"
        );
    }
}
