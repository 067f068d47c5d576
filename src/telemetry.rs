//! Prometheus metrics for the stream

use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};
use std::sync::LazyLock;

/// Frames received, by kind
pub static FRAMES_RECEIVED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "orderbook_stream_frames_total",
        "Frames received from the streaming API",
        &["kind"]
    )
    .expect("frames counter registers once")
});

/// Updates discarded because their sequence was already applied
pub static STALE_UPDATES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "orderbook_stream_stale_updates_total",
        "Updates discarded as already applied"
    )
    .expect("stale updates counter registers once")
});

/// Connection attempts made by the supervisor
pub static SESSIONS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "orderbook_stream_sessions_total",
        "Connection attempts"
    )
    .expect("sessions counter registers once")
});

/// Sessions that ended in an error, by kind
pub static SESSION_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "orderbook_stream_session_failures_total",
        "Sessions ended by an error",
        &["kind"]
    )
    .expect("session failures counter registers once")
});

/// Sequence of the replicated book; zero while resyncing
pub static BOOK_SEQUENCE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "orderbook_stream_sequence",
        "Last applied order book sequence"
    )
    .expect("sequence gauge registers once")
});
