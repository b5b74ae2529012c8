//! Log matching for tunnel agent readiness detection
//!
//! The agent is started with `--log=stdout` and announces its internal web
//! API by logging `starting web service` with an `addr=<ip>:<port>` field.
//! Classification is attempted against each raw output chunk as received,
//! not against reassembled logical lines, so a marker split across two
//! chunks is simply not matched (best-effort, matching the agent's
//! one-line-per-write behavior in practice).

use regex::Regex;
use std::sync::LazyLock;

static READY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"starting web service.*addr=(\d+\.\d+\.\d+\.\d+:\d+)")
        .expect("readiness pattern is valid")
});

const ADDRESS_IN_USE: &str = "address already in use";

/// Classification of one chunk of agent output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEvent {
    /// The agent's web API is listening on the captured `host:port`
    Ready(String),

    /// The agent could not bind its listening address
    AddressInUse,
}

/// Classify a chunk of agent stdout.
///
/// Returns `None` when the chunk carries neither the readiness marker nor
/// the address-in-use failure marker. Pure function, no side effects.
pub fn classify(chunk: &str) -> Option<ReadinessEvent> {
    if let Some(captures) = READY.captures(chunk) {
        return Some(ReadinessEvent::Ready(captures[1].to_string()));
    }
    if chunk.contains(ADDRESS_IN_USE) {
        return Some(ReadinessEvent::AddressInUse);
    }
    None
}
