use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal at startup, the router refuses to run with these
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("willingness {0} is outside 0..=7")]
    Willingness(u8),
    #[error("{message} interval must be non-zero")]
    ZeroInterval { message: &'static str },
    #[error("{message} interval {interval:?} minus jitter {jitter:?} is shorter than the minimum interval {min_interval:?}")]
    IntervalTooShort {
        message: &'static str,
        interval: Duration,
        jitter: Duration,
        min_interval: Duration,
    },
    #[error("ETX memory length must be at least one slot")]
    EtxMemoryLength,
    #[error("hysteresis parameter {name} = {value} is outside [0, 1)")]
    Hysteresis { name: &'static str, value: f64 },
    #[error("hysteresis accept threshold {accept} is below the reject threshold {reject}")]
    HysteresisOrder { accept: f64, reject: f64 },
    #[error("advertise policy does not select any neighbour")]
    EmptyAdvertisePolicy,
    #[error("metric file line {line}: expected `src dst dir metric`")]
    MetricFileFormat { line: usize },
    #[error("metric file line {line}: cannot parse address `{address}`")]
    MetricFileAddress { line: usize, address: String },
    #[error("metric file line {line}: metric `{metric}` is outside 16..=1015808")]
    MetricOutOfRange { line: usize, metric: String },
}

/// Returned by the route table sink. Logged and counted, never rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route table rejected the request: {0}")]
    Rejected(String),
    #[error("route table is unavailable")]
    Unavailable,
}

/// Although this is an error enum, these are absorbed by the router and only show up in statistics.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiscardReason {
    #[error("HELLO with hop limit other than 1 or hop count other than 0")]
    HelloHopLimit,
    #[error("address listed both as a local interface address and as a neighbour")]
    AddressConflict,
    #[error("message originated by this router")]
    OwnMessage,
    #[error("TC without an originator")]
    MissingOriginator,
    #[error("TC without a message sequence number")]
    MissingSeqnum,
    #[error("TC without a hop limit")]
    MissingHopLimit,
    #[error("TC advertises its own originator as a neighbour")]
    AdvertisesOriginator,
    #[error("TC with content but without an ANSN")]
    MissingAnsn,
    #[error("TC ANSN is older than the one already accepted")]
    StaleAnsn,
    #[error("message already processed")]
    Duplicate,
    #[error("packet received on an unknown interface")]
    UnknownInterface,
}

cfg_if::cfg_if! {
    if #[cfg(debug_assertions)] {
        /// A broken cross reference between information bases, this is a bug in cascade handling
        #[track_caller]
        pub(crate) fn invariant_violation(what: std::fmt::Arguments<'_>) {
            panic!("invariant violated: {what}");
        }
    } else {
        pub(crate) fn invariant_violation(what: std::fmt::Arguments<'_>) {
            log::error!("invariant violated: {what}");
        }
    }
}
