use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{BlockNumberOrTag, FeeHistory};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

lazy_static::lazy_static! {
    static ref PRICE_CACHE: Mutex<HashMap<String, (u128, Instant)>> = Mutex::new(HashMap::new());
    static ref FEE_HISTORY_CACHE: Mutex<HashMap<String, (FeeHistory, Instant)>> = Mutex::new(HashMap::new());
}

/// Blocks of history each fee-market estimate is derived from.
pub const FEE_HISTORY_BLOCKS: u64 = 5;
pub const REWARD_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];

async fn cached<T, F>(
    cache: &Mutex<HashMap<String, (T, Instant)>>,
    key: &str,
    ttl: Duration,
    fetch: F,
) -> eyre::Result<T>
where
    T: Clone,
    F: Future<Output = eyre::Result<T>>,
{
    if ttl.is_zero() {
        tracing::debug!("TTL is 0: bypassing cache for {}", key);
        return fetch.await;
    }

    let mut cache = cache.lock().await;
    if let Some((value, timestamp)) = cache.get(key) {
        if timestamp.elapsed() < ttl {
            tracing::debug!("Cache hit for {}", key);
            return Ok(value.clone());
        }
        tracing::debug!("Cache expired for {}", key);
    }

    let value = fetch.await?;
    cache.insert(key.to_string(), (value.clone(), Instant::now()));

    Ok(value)
}

pub async fn cached_gas_price(
    provider: Arc<RootProvider>,
    endpoint: &str,
    ttl: Duration,
) -> eyre::Result<u128> {
    let key = format!("gas_price:{}", endpoint);
    cached(&*PRICE_CACHE, &key, ttl, async {
        tracing::debug!("Fetching fresh gas price from provider");
        Ok(provider.get_gas_price().await?)
    })
    .await
}

pub async fn cached_fee_history(
    provider: Arc<RootProvider>,
    endpoint: &str,
    ttl: Duration,
) -> eyre::Result<FeeHistory> {
    let key = format!("fee_history:{}", endpoint);
    cached(&*FEE_HISTORY_CACHE, &key, ttl, async {
        tracing::debug!("Fetching fresh fee history from provider");
        Ok(provider
            .get_fee_history(
                FEE_HISTORY_BLOCKS,
                BlockNumberOrTag::Latest,
                &REWARD_PERCENTILES,
            )
            .await?)
    })
    .await
}
