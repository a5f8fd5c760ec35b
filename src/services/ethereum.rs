use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{FeeHistory, TransactionInput as TxData, TransactionRequest};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::AppConfig,
    error::{Error, Result},
    models::{
        estimate::{EstimateFeed, EstimateLevel, FeeEstimateSnapshot, LevelEstimate, PollingToken},
        transaction::Transaction,
    },
    services::collaborators::{AccountReader, AddressResolver, EstimateSource, TransactionSender},
    utils::cache::{cached_fee_history, cached_gas_price},
};

/// Per-level tuning of the estimates derived from the node.
struct LevelTuning {
    level: EstimateLevel,
    /// Index into the fee history reward percentiles.
    reward_index: usize,
    /// Headroom on the next base fee, in percent.
    base_fee_percent: u64,
    /// Scale applied to `eth_gasPrice` on legacy networks, in percent.
    gas_price_percent: u64,
    time_bounds_ms: (u64, u64),
}

const LEVEL_TUNING: [LevelTuning; 3] = [
    LevelTuning {
        level: EstimateLevel::Low,
        reward_index: 0,
        base_fee_percent: 110,
        gas_price_percent: 90,
        time_bounds_ms: (30_000, 60_000),
    },
    LevelTuning {
        level: EstimateLevel::Medium,
        reward_index: 1,
        base_fee_percent: 120,
        gas_price_percent: 100,
        time_bounds_ms: (15_000, 30_000),
    },
    LevelTuning {
        level: EstimateLevel::High,
        reward_index: 2,
        base_fee_percent: 125,
        gas_price_percent: 110,
        time_bounds_ms: (12_000, 15_000),
    },
];

#[derive(Default)]
struct Poller {
    tokens: HashSet<PollingToken>,
    task: Option<CancellationToken>,
}

/// Estimate source, account reader and sender backed by a JSON-RPC node.
///
/// All polling tokens share one background task: it is spawned with the
/// first token and cancelled once the last token is released.
#[derive(Clone)]
pub struct EthereumService {
    provider: Arc<RootProvider>,
    endpoint: String,
    cache_duration: Duration,
    poll_interval: Duration,
    feed: Arc<watch::Sender<EstimateFeed>>,
    poller: Arc<Mutex<Poller>>,
    next_token: Arc<AtomicU64>,
}

impl EthereumService {
    /// Connects to the first configured endpoint that answers.
    pub async fn new(config: &AppConfig) -> Result<Self> {
        for url in &config.ethereum_rpc_urls {
            let service = Self::with_endpoint(url.clone(), config.cache_duration, config.poll_interval);

            // Test provider connection
            match service.provider.get_block_number().await {
                Ok(block) => {
                    tracing::info!("Connected to {} at block {}", url, block);
                    return Ok(service);
                }
                Err(e) => tracing::warn!("Failed to connect to Ethereum node {}: {}", url, e),
            }
        }

        Err(Error::Provider(
            "Failed to connect to any configured Ethereum node".into(),
        ))
    }

    /// Builds the service without probing the node.
    pub fn with_endpoint(url: Url, cache_duration: Duration, poll_interval: Duration) -> Self {
        let endpoint = url.to_string();
        let (feed, _) = watch::channel(EstimateFeed::loading());

        Self {
            provider: Arc::new(RootProvider::new_http(url)),
            endpoint,
            cache_duration,
            poll_interval,
            feed: Arc::new(feed),
            poller: Arc::new(Mutex::new(Poller::default())),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Whether the node reports a base fee for the next block.
    pub async fn network_supports_fee_market(&self) -> Result<bool> {
        let history = cached_fee_history(self.provider.clone(), &self.endpoint, self.cache_duration)
            .await
            .map_err(|e| Error::Provider(format!("Failed to get fee history: {}", e)))?;

        Ok(next_base_fee(&history).is_some())
    }

    async fn fetch_snapshot(&self) -> FeeEstimateSnapshot {
        let history =
            cached_fee_history(self.provider.clone(), &self.endpoint, self.cache_duration).await;
        let fee_market = match history {
            Ok(history) => fee_market_snapshot(&history),
            Err(e) => {
                tracing::warn!("Failed to get fee history, falling back to eth_gasPrice: {}", e);
                return match self.gas_price().await {
                    Ok(gas_price) => FeeEstimateSnapshot::eth_gas_price(gas_price),
                    Err(e) => {
                        tracing::warn!("Failed to get gas price: {}", e);
                        FeeEstimateSnapshot::none()
                    }
                };
            }
        };
        if let Some(snapshot) = fee_market {
            return snapshot;
        }

        match self.gas_price().await {
            Ok(gas_price) => legacy_snapshot(gas_price),
            Err(e) => {
                tracing::warn!("Failed to get gas price: {}", e);
                FeeEstimateSnapshot::none()
            }
        }
    }

    async fn gas_price(&self) -> eyre::Result<U256> {
        let gas_price =
            cached_gas_price(self.provider.clone(), &self.endpoint, self.cache_duration).await?;
        Ok(U256::from(gas_price))
    }

    async fn run_poller(self, stop: CancellationToken) {
        tracing::info!("Estimate poller started ({:?} interval)", self.poll_interval);
        let mut failures_in_a_row = 0u32;

        loop {
            let snapshot = tokio::select! {
                _ = stop.cancelled() => break,
                snapshot = self.fetch_snapshot() => snapshot,
            };

            if snapshot.has_usable_fees() {
                if failures_in_a_row > 0 {
                    tracing::info!("Estimates recovered after {} failed polls", failures_in_a_row);
                }
                failures_in_a_row = 0;
            } else {
                failures_in_a_row += 1;
                tracing::warn!("No usable estimates ({} polls in a row)", failures_in_a_row);
            }
            tracing::debug!("Publishing {} estimates", snapshot.kind);
            self.feed.send_replace(EstimateFeed::ready(snapshot));

            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("Estimate poller stopped");
    }
}

#[async_trait]
impl EstimateSource for EthereumService {
    async fn start_polling(&self, cancel: CancellationToken) -> Result<PollingToken> {
        let token = PollingToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        if cancel.is_cancelled() {
            tracing::debug!("{} requested by an already cancelled session", token);
        }

        let mut poller = self.poller.lock().await;
        poller.tokens.insert(token);
        if poller.task.is_none() {
            let stop = CancellationToken::new();
            tokio::spawn(self.clone().run_poller(stop.clone()));
            poller.task = Some(stop);
        }

        Ok(token)
    }

    async fn stop_polling(&self, token: PollingToken) {
        let mut poller = self.poller.lock().await;
        if !poller.tokens.remove(&token) {
            tracing::warn!("Stop requested for unknown {}", token);
            return;
        }
        if poller.tokens.is_empty() {
            if let Some(stop) = poller.task.take() {
                stop.cancel();
            }
        }
    }

    fn current(&self) -> EstimateFeed {
        self.feed.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<EstimateFeed> {
        self.feed.subscribe()
    }
}

#[async_trait]
impl AccountReader for EthereumService {
    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn next_nonce(&self, address: Address) -> Result<u64> {
        Ok(self.provider.get_transaction_count(address).await?)
    }
}

#[async_trait]
impl TransactionSender for EthereumService {
    async fn send(&self, transaction: Transaction) -> Result<TxHash> {
        let request = build_transaction_request(&transaction)?;
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|e| Error::Submission(e.to_string()))?;

        Ok(*pending.tx_hash())
    }

    async fn cancel(&self, transaction: &Transaction) -> Result<()> {
        // Nothing was broadcast yet, so there is nothing to replace on-chain.
        tracing::info!("Rejected transaction {}", transaction.id);
        Ok(())
    }

    async fn cancel_all(&self, count: usize) -> Result<()> {
        tracing::info!("Rejected {} transactions", count);
        Ok(())
    }
}

#[async_trait]
impl AddressResolver for EthereumService {
    async fn reverse_resolve(&self, _address: Address) -> Result<Option<String>> {
        Ok(None)
    }
}

fn build_transaction_request(transaction: &Transaction) -> Result<TransactionRequest> {
    let params = &transaction.tx_params;
    let mut request = TransactionRequest::default();

    request.from = Some(params.from);
    request.to = params.to.map(Into::into);
    request.value = Some(params.value);
    if let Some(data) = &params.data {
        request.input = TxData::new(data.clone());
    }
    request.gas = params.gas_limit();
    request.nonce = params.nonce.map(|nonce| nonce.to::<u64>());

    if let Some(gas_price) = params.gas_price.filter(|_| params.is_legacy()) {
        request.gas_price = Some(to_u128(gas_price, "gasPrice")?);
    } else {
        if let Some(max_fee) = params.max_fee_per_gas {
            request.max_fee_per_gas = Some(to_u128(max_fee, "maxFeePerGas")?);
        }
        if let Some(max_priority_fee) = params.max_priority_fee_per_gas {
            request.max_priority_fee_per_gas =
                Some(to_u128(max_priority_fee, "maxPriorityFeePerGas")?);
        }
    }

    Ok(request)
}

fn to_u128(value: U256, field: &str) -> Result<u128> {
    u128::try_from(value).map_err(|_| Error::InvalidInput(format!("{} out of range", field)))
}

fn next_base_fee(history: &FeeHistory) -> Option<u128> {
    history
        .base_fee_per_gas
        .last()
        .copied()
        .filter(|base_fee| *base_fee > 0)
}

/// Median of one reward percentile column across the sampled blocks.
fn median_reward(history: &FeeHistory, index: usize) -> Option<u128> {
    let mut column: Vec<u128> = history
        .reward
        .as_ref()?
        .iter()
        .filter_map(|block| block.get(index).copied())
        .collect();
    if column.is_empty() {
        return None;
    }
    column.sort_unstable();

    Some(column[column.len() / 2])
}

/// Fee-market estimates, or `None` when the node reports no base fee.
fn fee_market_snapshot(history: &FeeHistory) -> Option<FeeEstimateSnapshot> {
    let base_fee = U256::from(next_base_fee(history)?);

    let levels = LEVEL_TUNING.iter().map(|tuning| {
        let priority_fee = U256::from(median_reward(history, tuning.reward_index).unwrap_or(0));
        let max_fee =
            base_fee * U256::from(tuning.base_fee_percent) / U256::from(100u64) + priority_fee;
        let (lower, upper) = tuning.time_bounds_ms;

        (
            tuning.level,
            LevelEstimate::fee_market(max_fee, priority_fee).with_time_bounds(lower, upper),
        )
    });

    Some(FeeEstimateSnapshot::fee_market(base_fee, levels))
}

fn legacy_snapshot(gas_price: U256) -> FeeEstimateSnapshot {
    let mut snapshot = FeeEstimateSnapshot::legacy(LEVEL_TUNING.iter().map(|tuning| {
        (
            tuning.level,
            gas_price * U256::from(tuning.gas_price_percent) / U256::from(100u64),
        )
    }));
    for tuning in &LEVEL_TUNING {
        if let Some(estimate) = snapshot.by_level.get_mut(&tuning.level) {
            let (lower, upper) = tuning.time_bounds_ms;
            *estimate = estimate.clone().with_time_bounds(lower, upper);
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{estimate::GasEstimateType, transaction::TxParams};
    use alloy_primitives::{Bytes, U64};
    use assert_matches::assert_matches;

    const GWEI: u128 = 1_000_000_000;

    fn history(base_fees: Vec<u128>, rewards: Vec<Vec<u128>>) -> FeeHistory {
        FeeHistory {
            base_fee_per_gas: base_fees,
            reward: Some(rewards),
            ..Default::default()
        }
    }

    fn offline_service() -> EthereumService {
        // Nothing listens on port 1; every request fails fast.
        EthereumService::with_endpoint(
            "http://127.0.0.1:1".parse().unwrap(),
            Duration::ZERO,
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_fee_market_snapshot_from_history() {
        let history = history(
            vec![18 * GWEI, 19 * GWEI, 20 * GWEI],
            vec![
                vec![GWEI, 2 * GWEI, 5 * GWEI],
                vec![GWEI, 3 * GWEI, 4 * GWEI],
                vec![2 * GWEI, 2 * GWEI, 6 * GWEI],
            ],
        );
        let snapshot = fee_market_snapshot(&history).unwrap();

        assert_eq!(snapshot.kind, GasEstimateType::FeeMarket);
        assert_eq!(snapshot.base_fee_per_gas, Some(U256::from(20 * GWEI)));

        let low = snapshot.level(EstimateLevel::Low).unwrap();
        assert_eq!(low.fees.max_priority_fee_per_gas, Some(U256::from(GWEI)));
        assert_eq!(low.fees.max_fee_per_gas, Some(U256::from(23 * GWEI)));

        let high = snapshot.level(EstimateLevel::High).unwrap();
        assert_eq!(high.fees.max_priority_fee_per_gas, Some(U256::from(5 * GWEI)));
        assert_eq!(high.fees.max_fee_per_gas, Some(U256::from(30 * GWEI)));
        assert_eq!(high.time_bounds_ms.map(|bounds| bounds.upper_ms), Some(15_000));
    }

    #[test]
    fn test_zero_base_fee_is_not_fee_market() {
        let history = history(vec![0, 0], vec![vec![0, 0, 0]]);
        assert!(fee_market_snapshot(&history).is_none());
        assert!(next_base_fee(&FeeHistory::default()).is_none());
    }

    #[test]
    fn test_missing_rewards_default_to_zero_priority_fee() {
        let history = FeeHistory {
            base_fee_per_gas: vec![10 * GWEI],
            reward: None,
            ..Default::default()
        };
        let snapshot = fee_market_snapshot(&history).unwrap();
        let medium = snapshot.level(EstimateLevel::Medium).unwrap();

        assert_eq!(medium.fees.max_priority_fee_per_gas, Some(U256::ZERO));
        assert_eq!(medium.fees.max_fee_per_gas, Some(U256::from(12 * GWEI)));
    }

    #[test]
    fn test_legacy_snapshot_scales_gas_price() {
        let snapshot = legacy_snapshot(U256::from(100 * GWEI));

        assert_eq!(snapshot.kind, GasEstimateType::Legacy);
        assert_eq!(
            snapshot.level(EstimateLevel::Low).unwrap().fees.gas_price,
            Some(U256::from(90 * GWEI))
        );
        assert_eq!(
            snapshot.level(EstimateLevel::High).unwrap().fees.gas_price,
            Some(U256::from(110 * GWEI))
        );
        assert!(snapshot
            .level(EstimateLevel::Medium)
            .unwrap()
            .time_bounds_ms
            .is_some());
    }

    #[test]
    fn test_request_uses_fee_market_fields() {
        let tx = Transaction::new(
            "1",
            TxParams {
                to: Some(Address::repeat_byte(0x22)),
                value: U256::from(5u64),
                data: Some(Bytes::from_static(&[0xde, 0xad])),
                gas: Some(U64::from(50_000u64)),
                max_fee_per_gas: Some(U256::from(40 * GWEI)),
                max_priority_fee_per_gas: Some(U256::from(2 * GWEI)),
                ..Default::default()
            },
        );
        let request = build_transaction_request(&tx).unwrap();

        assert_eq!(request.gas, Some(50_000));
        assert_eq!(request.max_fee_per_gas, Some(40 * GWEI));
        assert_eq!(request.max_priority_fee_per_gas, Some(2 * GWEI));
        assert_eq!(request.gas_price, None);
        assert_eq!(request.value, Some(U256::from(5u64)));
    }

    #[test]
    fn test_request_uses_legacy_gas_price() {
        let tx = Transaction::new(
            "1",
            TxParams {
                gas_price: Some(U256::from(30 * GWEI)),
                ..Default::default()
            },
        );
        let request = build_transaction_request(&tx).unwrap();

        assert_eq!(request.gas_price, Some(30 * GWEI));
        assert_eq!(request.max_fee_per_gas, None);
    }

    #[test]
    fn test_request_rejects_oversized_fee() {
        let tx = Transaction::new(
            "1",
            TxParams {
                max_fee_per_gas: Some(U256::MAX),
                max_priority_fee_per_gas: Some(U256::from(1u64)),
                ..Default::default()
            },
        );
        assert_matches!(build_transaction_request(&tx), Err(Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_poller_shared_until_last_token_stops() {
        let service = offline_service();

        let first = service.start_polling(CancellationToken::new()).await.unwrap();
        let task = service.poller.lock().await.task.clone().unwrap();
        let second = service.start_polling(CancellationToken::new()).await.unwrap();
        assert_ne!(first, second);
        assert!(service.poller.lock().await.task.is_some());

        service.stop_polling(first).await;
        assert!(!task.is_cancelled());

        service.stop_polling(second).await;
        assert!(task.is_cancelled());
        assert!(service.poller.lock().await.task.is_none());

        // A stale token is ignored.
        service.stop_polling(first).await;
    }

    #[tokio::test]
    async fn test_unreachable_node_publishes_no_estimates() {
        let service = offline_service();
        let mut updates = service.subscribe();
        assert!(service.current().is_loading);

        let token = service.start_polling(CancellationToken::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), updates.changed())
            .await
            .unwrap()
            .unwrap();

        let feed = service.current();
        assert!(!feed.is_loading);
        assert_eq!(feed.snapshot.kind, GasEstimateType::None);

        service.stop_polling(token).await;
    }
}
