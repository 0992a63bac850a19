//! The chain log source consumed by the scanner.
//!
//! [`ChainLogSource`] is the seam between the indexing pipeline and the chain. The production
//! implementation is [`RpcLogSource`], which talks JSON-RPC through alloy with per-call timeouts,
//! retries and fallback endpoints. Tests drive the scanner with an in-memory source instead.

mod rpc;

use std::{ops::RangeInclusive, sync::Arc};

use alloy::{
    primitives::{Address, BlockNumber},
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

use crate::types::RawLog;

pub use rpc::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, IntoRootProvider, RpcLogSource,
    RpcLogSourceBuilder,
};

/// Failures of a chain log source call. The scanner treats every variant as transient.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Operation timed out")]
    Timeout,
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),
    #[error("Block not found: {0}")]
    BlockNotFound(BlockNumber),
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Error::RpcError(Arc::new(err))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

/// A queryable source of contract logs.
pub trait ChainLogSource: Send + Sync {
    /// Number of the current chain head.
    fn latest_block_number(&self) -> impl Future<Output = Result<BlockNumber, Error>> + Send;

    /// Logs emitted by `contract` within `range` (inclusive), in on-chain order.
    fn get_logs(
        &self,
        contract: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> impl Future<Output = Result<Vec<RawLog>, Error>> + Send;

    /// Unix timestamp of block `block`.
    fn block_timestamp(&self, block: BlockNumber) -> impl Future<Output = Result<u64, Error>> + Send;
}
