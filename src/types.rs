use alloy::primitives::{Address, B256, BlockNumber, Bytes};
use serde::{Deserialize, Serialize};

/// Event name recorded for logs whose signature is not in the classifier table.
pub const UNKNOWN_EVENT: &str = "Unknown";

/// A log entry as observed on chain, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    /// `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: BlockNumber,
    pub transaction_hash: B256,
    pub log_index: u64,
    /// Timestamp of the containing block, when the source already knows it.
    pub block_timestamp: Option<u64>,
}

impl RawLog {
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey { transaction_hash: self.transaction_hash, log_index: self.log_index }
    }
}

/// `(transaction hash, log index)`: unique per chain, so it identifies a log across
/// overlapping scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// A classified log, in the record format written to batch artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub event_name: String,
    pub transaction_hash: B256,
    pub block_number: BlockNumber,
    pub block_timestamp: u64,
    pub log_index: u64,
    pub contract_address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl ClassifiedEvent {
    #[must_use]
    pub fn new(log: RawLog, event_name: &str, block_timestamp: u64) -> Self {
        Self {
            event_name: event_name.to_owned(),
            transaction_hash: log.transaction_hash,
            block_number: log.block_number,
            block_timestamp,
            log_index: log.log_index,
            contract_address: log.address,
            topics: log.topics,
            data: log.data,
        }
    }

    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey { transaction_hash: self.transaction_hash, log_index: self.log_index }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.event_name == UNKNOWN_EVENT
    }
}
