//! Bet key extraction from emitted transaction logs.
//!
//! Recognized entries: a bare 56-byte key, or a 4-byte marker followed by the key.
//! Inner transactions are searched depth-first after the outer logs; the first match wins.
use crate::{
    adapter::{
        LogEntry,
        TransactionRecord,
    },
    bet_key::{
        BET_KEY_LEN,
        BetKey,
    },
};
use tracing::trace;

pub const LOG_MARKER_LEN: usize = 4;
pub const PREFIXED_LOG_LEN: usize = LOG_MARKER_LEN + BET_KEY_LEN;

/// Parses a single log entry as a bet key.
pub fn parse_entry(entry: &[u8], marker: &[u8; LOG_MARKER_LEN]) -> Option<BetKey> {
    match entry.len() {
        BET_KEY_LEN => BetKey::from_slice(entry).ok(),
        PREFIXED_LOG_LEN if entry.starts_with(marker) => {
            BetKey::from_slice(&entry[LOG_MARKER_LEN..]).ok()
        }
        _ => None,
    }
}

pub fn find_in_logs(logs: &[LogEntry], marker: &[u8; LOG_MARKER_LEN]) -> Option<BetKey> {
    logs.iter()
        .find_map(|entry| parse_entry(entry.as_bytes(), marker))
}

pub fn find_bet_key(
    tx: &TransactionRecord,
    marker: &[u8; LOG_MARKER_LEN],
) -> Option<BetKey> {
    if let Some(key) = find_in_logs(&tx.logs, marker) {
        trace!(tx_ref = %tx.tx_ref, "bet key found in transaction logs");
        return Some(key);
    }
    tx.inner.iter().find_map(|inner| find_bet_key(inner, marker))
}
