use std::{ops::RangeInclusive, pin::Pin, time::Duration};

use alloy::{
    consensus::BlockHeader,
    eips::BlockNumberOrTag,
    network::{BlockResponse, Ethereum, Network},
    primitives::{Address, BlockNumber},
    providers::{DynProvider, Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind, http::reqwest::Url},
};
use backon::{ExponentialBuilder, Retryable};
use tokio::time::timeout;

use super::{ChainLogSource, Error};
use crate::types::RawLog;

/// Default total timeout for one source call, retries included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default number of in-call retry attempts per endpoint.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default base delay of the in-call exponential backoff.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

type BoxedProviderFuture<N> = Pin<Box<dyn Future<Output = Result<RootProvider<N>, Error>> + Send>>;

/// Conversion into an alloy [`RootProvider`], so the builder accepts URLs as well as providers.
pub trait IntoRootProvider<N: Network = Ethereum> {
    /// # Errors
    ///
    /// Returns an error if the provider cannot be constructed or connected.
    fn into_root_provider(self) -> impl Future<Output = Result<RootProvider<N>, Error>> + Send;
}

impl<N: Network> IntoRootProvider<N> for RootProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(self)
    }
}

impl<N: Network> IntoRootProvider<N> for DynProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(self.root().to_owned())
    }
}

impl<N: Network> IntoRootProvider<N> for &'static str {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(RootProvider::connect(self).await?)
    }
}

impl<N: Network> IntoRootProvider<N> for String {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(RootProvider::connect(&self).await?)
    }
}

impl<N: Network> IntoRootProvider<N> for Url {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(RootProvider::connect(self.as_str()).await?)
    }
}

/// Builder for [`RpcLogSource`].
pub struct RpcLogSourceBuilder<N: Network, P: IntoRootProvider<N>> {
    primary: P,
    fallbacks: Vec<BoxedProviderFuture<N>>,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
}

impl<N: Network, P: IntoRootProvider<N>> RpcLogSourceBuilder<N, P> {
    #[must_use]
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallbacks: vec![],
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: DEFAULT_MIN_DELAY,
        }
    }

    /// A source that gives up on the first failure and leaves all retrying to the scanner.
    #[must_use]
    pub fn fragile(primary: P) -> Self {
        Self::new(primary).max_retries(0).min_delay(Duration::ZERO)
    }

    /// Adds an endpoint tried, in insertion order, after the primary one fails.
    #[must_use]
    pub fn fallback<F: IntoRootProvider<N> + Send + 'static>(mut self, provider: F) -> Self {
        self.fallbacks.push(Box::pin(provider.into_root_provider()));
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// # Errors
    ///
    /// Returns an error if any of the endpoints fail to connect.
    pub async fn build(self) -> Result<RpcLogSource<N>, Error> {
        debug!(
            call_timeout_ms = self.call_timeout.as_millis(),
            max_retries = self.max_retries,
            fallback_count = self.fallbacks.len(),
            "Building RpcLogSource"
        );

        let primary = self.primary.into_root_provider().await?;
        let mut fallbacks = Vec::with_capacity(self.fallbacks.len());
        for fallback in self.fallbacks {
            fallbacks.push(fallback.await?);
        }

        Ok(RpcLogSource {
            primary,
            fallbacks,
            call_timeout: self.call_timeout,
            max_retries: self.max_retries,
            min_delay: self.min_delay,
        })
    }
}

/// [`ChainLogSource`] backed by JSON-RPC endpoints.
///
/// Each call is bounded by `call_timeout`, retried with exponential backoff, and then repeated
/// against every fallback endpoint before the last error is returned to the scanner.
#[derive(Clone, Debug)]
pub struct RpcLogSource<N: Network = Ethereum> {
    primary: RootProvider<N>,
    fallbacks: Vec<RootProvider<N>>,
    call_timeout: Duration,
    max_retries: usize,
    min_delay: Duration,
}

impl<N: Network> RpcLogSource<N> {
    #[must_use]
    pub fn primary(&self) -> &RootProvider<N> {
        &self.primary
    }

    async fn call_with_failover<T, F, Fut>(&self, operation: F) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let mut last_error = match self.call_with_retry(&self.primary, &operation).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        for (idx, provider) in self.fallbacks.iter().enumerate() {
            info!(fallback = idx + 1, total = self.fallbacks.len(), "Trying fallback endpoint");
            match self.call_with_retry(provider, &operation).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(fallback = idx + 1, error = %e, "Fallback endpoint failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn call_with_retry<T, F, Fut>(
        &self,
        provider: &RootProvider<N>,
        operation: F,
    ) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let strategy = ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.min_delay);

        timeout(
            self.call_timeout,
            (|| operation(provider.clone()))
                .retry(strategy)
                .notify(|err: &RpcError<TransportErrorKind>, dur: Duration| {
                    debug!(error = %err, "RPC error, retrying after {:?}", dur);
                })
                .sleep(tokio::time::sleep),
        )
        .await
        .map_err(Error::from)?
        .map_err(Error::from)
    }
}

impl<N: Network> ChainLogSource for RpcLogSource<N> {
    async fn latest_block_number(&self) -> Result<BlockNumber, Error> {
        let result = self
            .call_with_failover(|provider| async move { provider.get_block_number().await })
            .await;
        if let Err(e) = &result {
            error!(error = %e, "eth_blockNumber failed");
        }
        result
    }

    async fn get_logs(
        &self,
        contract: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<RawLog>, Error> {
        let filter =
            Filter::new().address(contract).from_block(*range.start()).to_block(*range.end());
        let filter = &filter;

        let logs = match self
            .call_with_failover(move |provider| async move { provider.get_logs(filter).await })
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                error!(from_block = range.start(), to_block = range.end(), error = %e, "eth_getLogs failed");
                return Err(e);
            }
        };

        Ok(logs.into_iter().filter_map(into_raw_log).collect())
    }

    async fn block_timestamp(&self, block: BlockNumber) -> Result<u64, Error> {
        let number = BlockNumberOrTag::Number(block);
        let result = self
            .call_with_failover(move |provider| async move {
                provider.get_block_by_number(number).await
            })
            .await;
        match result {
            Ok(Some(block_response)) => Ok(block_response.header().timestamp()),
            Ok(None) => Err(Error::BlockNotFound(block)),
            Err(e) => {
                error!(block_number = block, error = %e, "eth_getBlockByNumber failed");
                Err(e)
            }
        }
    }
}

/// Logs without a block number, transaction hash or log index are still pending and are
/// dropped; so are logs flagged as removed.
fn into_raw_log(log: Log) -> Option<RawLog> {
    let (Some(block_number), Some(transaction_hash), Some(log_index)) =
        (log.block_number, log.transaction_hash, log.log_index)
    else {
        warn!(address = %log.inner.address, "Skipping log without chain position");
        return None;
    };
    if log.removed {
        warn!(tx_hash = %transaction_hash, log_index, "Skipping removed log");
        return None;
    }

    Some(RawLog {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number,
        transaction_hash,
        log_index,
        block_timestamp: log.block_timestamp,
    })
}
