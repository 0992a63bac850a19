//! In-memory chain source and assertion helpers for tests.

mod macros;

use std::{
    ops::RangeInclusive,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy::{
    primitives::{Address, B256, BlockNumber, Bytes, U256, address, keccak256},
    transports::TransportErrorKind,
};

use crate::{
    log_source::{ChainLogSource, Error},
    types::RawLog,
};

/// Signature used for logs built by [`MockLogSource::raw_log`].
pub const MOCK_EVENT_SIGNATURE: &str = "LoanRepaid(uint256,address,uint256,uint256)";

#[derive(Debug, Default)]
struct MockChain {
    latest: BlockNumber,
    logs: Vec<RawLog>,
    failing_latest: usize,
    failing_get_logs: usize,
    failing_block_timestamp: usize,
    requested_windows: Vec<RangeInclusive<BlockNumber>>,
    timestamp_requests: Vec<BlockNumber>,
}

/// A scriptable [`ChainLogSource`].
///
/// Clones share the same chain, so a test can keep one clone to mine blocks and inject
/// failures while the scanner owns another.
#[derive(Debug, Clone, Default)]
pub struct MockLogSource {
    chain: Arc<Mutex<MockChain>>,
}

impl MockLogSource {
    /// Contract address every [`raw_log`](Self::raw_log) is emitted by.
    pub const CONTRACT: Address = address!("0xD9aB5190eFA86eB955C5e146ccb30421faBc3405");

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A classifiable log at `block`. The transaction hash is derived from the block, so
    /// `(block, log_index)` pairs map one-to-one onto dedup keys.
    #[must_use]
    pub fn raw_log(block: BlockNumber, log_index: u64) -> RawLog {
        RawLog {
            address: Self::CONTRACT,
            topics: vec![keccak256(MOCK_EVENT_SIGNATURE.as_bytes()), B256::from(U256::from(log_index))],
            data: Bytes::from(block.to_be_bytes().to_vec()),
            block_number: block,
            transaction_hash: B256::from(U256::from(block)),
            log_index,
            block_timestamp: None,
        }
    }

    /// Deterministic timestamp reported for `block`.
    #[must_use]
    pub fn timestamp_of(block: BlockNumber) -> u64 {
        1_700_000_000 + block * 12
    }

    pub fn set_latest(&self, latest: BlockNumber) {
        self.chain().latest = latest;
    }

    pub fn add_log(&self, log: RawLog) {
        self.chain().logs.push(log);
    }

    /// Adds one [`raw_log`](Self::raw_log) per entry of `blocks`, each at log index 0.
    pub fn add_logs_at(&self, blocks: impl IntoIterator<Item = BlockNumber>) {
        let mut chain = self.chain();
        chain.logs.extend(blocks.into_iter().map(|block| Self::raw_log(block, 0)));
    }

    /// Makes the next `count` `latest_block_number` calls fail.
    pub fn fail_next_latest(&self, count: usize) {
        self.chain().failing_latest = count;
    }

    /// Makes the next `count` `get_logs` calls fail.
    pub fn fail_next_get_logs(&self, count: usize) {
        self.chain().failing_get_logs = count;
    }

    /// Makes the next `count` `block_timestamp` calls fail.
    pub fn fail_next_block_timestamp(&self, count: usize) {
        self.chain().failing_block_timestamp = count;
    }

    /// Every range passed to `get_logs`, failed calls included.
    #[must_use]
    pub fn requested_windows(&self) -> Vec<RangeInclusive<BlockNumber>> {
        self.chain().requested_windows.clone()
    }

    /// Every block passed to `block_timestamp`, failed calls included.
    #[must_use]
    pub fn timestamp_requests(&self) -> Vec<BlockNumber> {
        self.chain().timestamp_requests.clone()
    }

    fn chain(&self) -> MutexGuard<'_, MockChain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn take_failure(remaining: &mut usize, call: &str) -> Result<(), Error> {
    if *remaining == 0 {
        return Ok(());
    }
    *remaining -= 1;
    Err(TransportErrorKind::custom_str(&format!("injected {call} failure")).into())
}

impl ChainLogSource for MockLogSource {
    async fn latest_block_number(&self) -> Result<BlockNumber, Error> {
        let mut chain = self.chain();
        take_failure(&mut chain.failing_latest, "latest_block_number")?;
        Ok(chain.latest)
    }

    async fn get_logs(
        &self,
        contract: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<RawLog>, Error> {
        let mut chain = self.chain();
        chain.requested_windows.push(range.clone());
        take_failure(&mut chain.failing_get_logs, "get_logs")?;

        let mut logs: Vec<_> = chain
            .logs
            .iter()
            .filter(|log| log.address == contract && range.contains(&log.block_number))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }

    async fn block_timestamp(&self, block: BlockNumber) -> Result<u64, Error> {
        let mut chain = self.chain();
        chain.timestamp_requests.push(block);
        take_failure(&mut chain.failing_block_timestamp, "block_timestamp")?;
        Ok(Self::timestamp_of(block))
    }
}
