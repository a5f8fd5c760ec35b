use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    models::{
        estimate::{EstimateFeed, PollingToken},
        transaction::Transaction,
    },
};

/// Supplies fee estimate snapshots and their polling lifecycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EstimateSource: Send + Sync {
    /// Registers interest in estimates. Resolution may happen after `cancel`
    /// fired; callers must then release the returned token themselves.
    async fn start_polling(&self, cancel: CancellationToken) -> Result<PollingToken>;

    async fn stop_polling(&self, token: PollingToken);

    /// The latest published feed.
    fn current(&self) -> EstimateFeed;

    fn subscribe(&self) -> watch::Receiver<EstimateFeed>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountReader: Send + Sync {
    async fn balance(&self, address: Address) -> Result<U256>;

    async fn next_nonce(&self, address: Address) -> Result<u64>;
}

/// The submission path a confirmed transaction is handed to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn send(&self, transaction: Transaction) -> Result<TxHash>;

    async fn cancel(&self, transaction: &Transaction) -> Result<()>;

    async fn cancel_all(&self, count: usize) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn reverse_resolve(&self, address: Address) -> Result<Option<String>>;
}
