use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{Error, Result},
    models::transaction::Transaction,
    services::{
        session::{Collaborators, SessionHandle, SessionOptions},
        submission::SubmitOutcome,
    },
};

/// Open confirmation sessions keyed by transaction id.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    collaborators: Collaborators,
}

impl SessionRegistry {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            collaborators,
        }
    }

    /// Opens a session for the transaction, or returns the one already open
    /// under the same id. The second flag is true when a session was created.
    pub async fn open(
        &self,
        transaction: Transaction,
        options: SessionOptions,
    ) -> Result<(SessionHandle, bool)> {
        if transaction.id.is_empty() {
            return Err(Error::InvalidInput("Transaction id must not be empty".into()));
        }

        if let Some(existing) = self.find_open(&transaction.id).await {
            tracing::debug!("Session {} already open", transaction.id);
            return Ok((existing, false));
        }

        // Opening reads the account from the node, so the map stays unlocked
        // until the session is ready.
        let id = transaction.id.clone();
        let handle = SessionHandle::open(transaction, options, self.collaborators.clone()).await;

        let mut sessions = self.sessions.write().await;
        let raced = sessions.get(&id).filter(|s| !s.is_closed()).cloned();
        if let Some(existing) = raced {
            drop(sessions);
            tracing::debug!("Session {} opened concurrently, dropping duplicate", id);
            handle.teardown().await;
            return Ok((existing, false));
        }
        sessions.insert(id, handle.clone());

        Ok((handle, true))
    }

    pub async fn get(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Submits and forgets the session once the sender accepted it.
    pub async fn submit(&self, id: &str) -> Result<SubmitOutcome> {
        let session = self.get(id).await?;
        let outcome = session.submit().await?;
        if matches!(
            outcome,
            SubmitOutcome::Submitted(_) | SubmitOutcome::Discarded
        ) {
            self.sessions.write().await.remove(id);
        }
        Ok(outcome)
    }

    /// Rejects a single transaction and closes its session.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let session = self.take(id).await?;
        session.cancel().await
    }

    /// Closes a session without rejecting its transaction.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let session = self.take(id).await?;
        session.teardown().await;
        Ok(())
    }

    /// Rejects every pending transaction. Sessions are torn down before the
    /// sender is told, so no polling registration outlives the request.
    pub async fn cancel_all(&self) -> Result<usize> {
        let drained = self.drain().await;
        let count = drained.len();
        for session in &drained {
            session.teardown().await;
        }
        tracing::info!("Cancelling {} pending transactions", count);
        self.collaborators.sender.cancel_all(count).await?;

        Ok(count)
    }

    /// Closes every session, leaving the transactions untouched.
    pub async fn shutdown(&self) {
        let drained = self.drain().await;
        for session in &drained {
            session.teardown().await;
        }
        if !drained.is_empty() {
            tracing::info!("Closed {} confirmation sessions", drained.len());
        }
    }

    async fn find_open(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|session| !session.is_closed())
            .cloned()
    }

    async fn take(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    async fn drain(&self) -> Vec<SessionHandle> {
        self.sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            estimate::{EstimateFeed, EstimateLevel, PollingToken},
            transaction::TxParams,
        },
        services::collaborators::{
            AccountReader, MockAccountReader, MockAddressResolver, MockEstimateSource,
            MockTransactionSender,
        },
    };
    use alloy_primitives::{Address, U256};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };
    use tokio::sync::{watch, Notify};

    fn options() -> SessionOptions {
        SessionOptions {
            default_level: EstimateLevel::Medium,
            prefers_advanced_gas: false,
            minimum_gas_limit: 21_000,
            maximum_gas_limit: 7_920_027,
            network_supports_fee_market: true,
            fiat_rate: None,
        }
    }

    fn registry(sender: MockTransactionSender) -> SessionRegistry {
        let mut accounts = MockAccountReader::new();
        accounts.expect_balance().returning(|_| Ok(U256::MAX));
        accounts.expect_next_nonce().returning(|_| Ok(0));
        registry_with(Arc::new(accounts), sender)
    }

    fn registry_with(
        accounts: Arc<dyn AccountReader>,
        sender: MockTransactionSender,
    ) -> SessionRegistry {
        let (feed, updates) = watch::channel(EstimateFeed::loading());
        let next_token = Arc::new(AtomicU64::new(1));

        let mut estimates = MockEstimateSource::new();
        estimates.expect_subscribe().returning(move || {
            let _ = &feed;
            updates.clone()
        });
        estimates
            .expect_start_polling()
            .returning(move |_| Ok(PollingToken(next_token.fetch_add(1, Ordering::SeqCst))));
        estimates.expect_stop_polling().returning(|_| ());

        SessionRegistry::new(Collaborators {
            estimates: Arc::new(estimates),
            accounts,
            sender: Arc::new(sender),
            resolver: Arc::new(MockAddressResolver::new()),
        })
    }

    #[tokio::test]
    async fn test_open_returns_existing_session() {
        let registry = registry(MockTransactionSender::new());
        let tx = Transaction::new("a", TxParams::default());

        let (_, created) = registry.open(tx.clone(), options()).await.unwrap();
        assert!(created);
        let (_, created) = registry.open(tx, options()).await.unwrap();
        assert!(!created);
        assert_eq!(registry.len().await, 1);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let registry = registry(MockTransactionSender::new());
        assert_matches!(registry.get("missing").await, Err(Error::SessionNotFound(id)) if id == "missing");
        assert_matches!(registry.remove("missing").await, Err(Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_all_reports_count() {
        let mut sender = MockTransactionSender::new();
        sender
            .expect_cancel_all()
            .withf(|count| *count == 2)
            .times(1)
            .returning(|_| Ok(()));
        let registry = registry(sender);

        let (first, _) = registry
            .open(Transaction::new("a", TxParams::default()), options())
            .await
            .unwrap();
        registry
            .open(Transaction::new("b", TxParams::default()), options())
            .await
            .unwrap();

        assert_eq!(registry.cancel_all().await.unwrap(), 2);
        assert!(registry.is_empty().await);
        assert!(first.is_closed());
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let registry = registry(MockTransactionSender::new());
        assert_matches!(
            registry
                .open(Transaction::new("", TxParams::default()), options())
                .await,
            Err(Error::InvalidInput(_))
        );
    }

    /// Account reader whose balance lookup for one address waits until released.
    struct SlowAccounts {
        slow: Address,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AccountReader for SlowAccounts {
        async fn balance(&self, address: Address) -> Result<U256> {
            if address == self.slow {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(U256::MAX)
        }

        async fn next_nonce(&self, _address: Address) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_slow_open_does_not_block_other_sessions() {
        let accounts = Arc::new(SlowAccounts {
            slow: Address::repeat_byte(0x51),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let registry = registry_with(accounts.clone(), MockTransactionSender::new());
        registry
            .open(Transaction::new("fast", TxParams::default()), options())
            .await
            .unwrap();

        let slow = tokio::spawn({
            let registry = registry.clone();
            let tx = Transaction::new(
                "slow",
                TxParams {
                    from: Address::repeat_byte(0x51),
                    ..Default::default()
                },
            );
            async move { registry.open(tx, options()).await }
        });
        accounts.entered.notified().await;

        let found = tokio::time::timeout(Duration::from_millis(500), registry.get("fast")).await;
        assert_matches!(found, Ok(Ok(_)));
        let opened = tokio::time::timeout(
            Duration::from_millis(500),
            registry.open(Transaction::new("other", TxParams::default()), options()),
        )
        .await;
        assert_matches!(opened, Ok(Ok((_, true))));

        accounts.release.notify_one();
        assert_matches!(slow.await.unwrap(), Ok((_, true)));
        assert_eq!(registry.len().await, 3);
        registry.shutdown().await;
    }
}
