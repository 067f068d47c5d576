//! Parser module for streaming API messages
//!
//! Handles deserialization of order book snapshots, incremental updates and
//! keep-alive frames.

use rust_decimal::Decimal;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::Result;

/// Raw text of a keep-alive acknowledgement frame
pub const KEEPALIVE_FRAME: &str = "\"\"";

/// Credentials sent as the first message on a new connection
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub api_key_id: String,
    pub api_key_secret: String,
}

/// A resting order as it appears in a snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotOrder {
    pub id: String,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub volume: Decimal,
}

/// Full order book sent once per connection
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    #[serde(deserialize_with = "deserialize_i64")]
    pub sequence: i64,

    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub asks: Vec<SnapshotOrder>,

    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub bids: Vec<SnapshotOrder>,
}

/// Volume traded against a resting order
#[derive(Debug, Clone, Deserialize)]
pub struct TradeUpdate {
    pub order_id: String,

    /// Base volume traded
    #[serde(deserialize_with = "deserialize_decimal")]
    pub base: Decimal,
}

/// New resting order
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUpdate {
    pub order_id: String,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub volume: Decimal,

    /// "BID" or "ASK"
    #[serde(rename = "type")]
    pub side: String,
}

/// Removed resting order
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteUpdate {
    pub order_id: String,
}

/// Incremental change to the order book
#[derive(Debug, Clone, Deserialize)]
pub struct StreamUpdate {
    #[serde(deserialize_with = "deserialize_i64")]
    pub sequence: i64,

    /// Exchange time in milliseconds since the epoch
    #[serde(default, deserialize_with = "deserialize_i64")]
    pub timestamp: i64,

    #[serde(default, deserialize_with = "deserialize_nullable_vec")]
    pub trade_updates: Vec<TradeUpdate>,

    #[serde(default)]
    pub create_update: Option<CreateUpdate>,

    #[serde(default)]
    pub delete_update: Option<DeleteUpdate>,
}

/// Only the keys that tell a snapshot apart from an update
#[derive(Deserialize)]
struct FrameProbe {
    #[serde(default)]
    asks: Option<IgnoredAny>,
    #[serde(default)]
    bids: Option<IgnoredAny>,
}

/// Parsed streaming message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    KeepAlive,
    Snapshot(OrderBookSnapshot),
    Update(StreamUpdate),
}

impl ParsedMessage {
    /// Classify and parse a raw text frame
    pub fn parse(raw: &str) -> Result<Self> {
        if raw == KEEPALIVE_FRAME {
            return Ok(ParsedMessage::KeepAlive);
        }

        let probe: FrameProbe = serde_json::from_str(raw)?;
        if probe.asks.is_some() || probe.bids.is_some() {
            return Ok(ParsedMessage::Snapshot(serde_json::from_str(raw)?));
        }

        Ok(ParsedMessage::Update(serde_json::from_str(raw)?))
    }
}

/// The feed writes numbers either as JSON strings or JSON numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(serde_json::Number),
}

impl StrOrNum {
    fn into_string(self) -> String {
        match self {
            StrOrNum::Str(s) => s,
            StrOrNum::Num(n) => n.to_string(),
        }
    }
}

fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = StrOrNum::deserialize(deserializer)?.into_string();
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(serde::de::Error::custom)
}

fn deserialize_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = StrOrNum::deserialize(deserializer)?.into_string();
    raw.parse().map_err(serde::de::Error::custom)
}

/// `null` and a missing key both mean an empty list
fn deserialize_nullable_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
