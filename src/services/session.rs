use alloy_primitives::{Address, U256};
use std::{fmt, sync::Arc};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    models::{
        estimate::{EstimateFeed, EstimateLevel, PollingToken, TimeBounds},
        fees::{DerivedCosts, ManualEdit, ReconciledFees},
        transaction::Transaction,
        validation::{SubmitBlocker, ValidationResult},
    },
    services::{
        calculator::derive_costs,
        collaborators::{AccountReader, AddressResolver, EstimateSource, TransactionSender},
        fee_input::FeeInputState,
        reconciler::{EstimateReconciler, ReconcilerOptions},
        submission::{SubmissionCoordinator, SubmissionStatus, SubmitOutcome},
        validator::{submit_blocker, validate, SubmitGate, ValidationContext},
    },
    utils::units::FiatRate,
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub default_level: EstimateLevel,
    pub prefers_advanced_gas: bool,
    pub minimum_gas_limit: u64,
    pub maximum_gas_limit: u64,
    pub network_supports_fee_market: bool,
    pub fiat_rate: Option<FiatRate>,
}

#[derive(Clone)]
pub struct Collaborators {
    pub estimates: Arc<dyn EstimateSource>,
    pub accounts: Arc<dyn AccountReader>,
    pub sender: Arc<dyn TransactionSender>,
    pub resolver: Arc<dyn AddressResolver>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollingState {
    Starting,
    Active(PollingToken),
    Released,
}

/// Everything derived from a session at one logical tick.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub transaction: Transaction,
    pub fees: ReconciledFees,
    pub costs: DerivedCosts,
    pub validation: ValidationResult,
    pub submit_blocker: Option<SubmitBlocker>,
    pub is_loading: bool,
    pub time_bounds_ms: Option<TimeBounds>,
    pub balance: Option<U256>,
    pub custom_nonce: Option<u64>,
    pub next_nonce: Option<u64>,
    pub recipient_name: Option<String>,
    pub submission: SubmissionStatus,
    pub submit_error: Option<String>,
    pub confirmed_anyway: bool,
}

/// State of one confirmation flow. Only reachable through [`SessionHandle`].
struct ConfirmationSession {
    transaction: Transaction,
    options: SessionOptions,
    inputs: FeeInputState,
    reconciler: EstimateReconciler,
    feed: EstimateFeed,
    balance: Option<U256>,
    next_nonce: Option<u64>,
    /// Nonce set by the user; overrides the one the transaction carries.
    custom_nonce: Option<u64>,
    recipient_name: Option<String>,
    submission: SubmissionCoordinator,
    polling: PollingState,
    closed: bool,
}

impl ConfirmationSession {
    fn new(transaction: Transaction, options: SessionOptions, feed: EstimateFeed) -> Self {
        let (reconciler, inputs) = EstimateReconciler::start(
            &transaction,
            &ReconcilerOptions {
                default_level: options.default_level,
                prefers_advanced_gas: options.prefers_advanced_gas,
                minimum_gas_limit: options.minimum_gas_limit,
                maximum_gas_limit: options.maximum_gas_limit,
                network_supports_fee_market: options.network_supports_fee_market,
            },
            &feed.snapshot,
        );

        Self {
            transaction,
            options,
            inputs,
            reconciler,
            feed,
            balance: None,
            next_nonce: None,
            custom_nonce: None,
            recipient_name: None,
            submission: SubmissionCoordinator::default(),
            polling: PollingState::Starting,
            closed: false,
        }
    }

    fn ingest(&mut self, feed: EstimateFeed) {
        let outcome = self
            .reconciler
            .on_snapshot(&mut self.inputs, &feed.snapshot, &self.transaction);
        tracing::debug!(
            "Session {} ingested {} estimates: {:?}",
            self.transaction.id,
            feed.snapshot.kind,
            outcome
        );
        self.feed = feed;
    }

    fn nonce(&self) -> Option<u64> {
        self.custom_nonce
            .or_else(|| self.transaction.tx_params.nonce.map(|nonce| nonce.to::<u64>()))
    }

    fn snapshot(&self) -> SessionSnapshot {
        let snapshot = &self.feed.snapshot;
        let fees = self
            .reconciler
            .reconcile(&self.inputs, snapshot, &self.transaction);
        let costs = derive_costs(&fees, self.options.fiat_rate.as_ref());
        let validation = validate(&ValidationContext {
            fees: &fees,
            costs: &costs,
            snapshot,
            is_loading: self.feed.is_loading,
            transaction_value: self.transaction.tx_params.value,
            balance: self.balance,
            minimum_gas_limit: self.reconciler.minimum_gas_limit(),
            maximum_gas_limit: self.options.maximum_gas_limit,
            custom_nonce: self.nonce(),
            next_nonce: self.next_nonce,
        });
        let blocker = submit_blocker(
            &validation,
            &fees,
            SubmitGate {
                submitting: self.submission.status() == SubmissionStatus::Submitting,
                simulation_fails: self.transaction.simulation_fails.is_some(),
                confirmed_anyway: self.submission.confirmed_anyway(),
                is_loading: self.feed.is_loading,
            },
        );
        let time_bounds_ms = snapshot
            .level(fees.estimate_level)
            .and_then(|estimate| estimate.time_bounds_ms);

        SessionSnapshot {
            transaction: self.transaction.clone(),
            fees,
            costs,
            validation,
            submit_blocker: blocker,
            is_loading: self.feed.is_loading,
            time_bounds_ms,
            balance: self.balance,
            custom_nonce: self.custom_nonce,
            next_nonce: self.next_nonce,
            recipient_name: self.recipient_name.clone(),
            submission: self.submission.status(),
            submit_error: self.submission.submit_error().map(str::to_owned),
            confirmed_anyway: self.submission.confirmed_anyway(),
        }
    }
}

/// Shared handle to a confirmation session.
///
/// Every entry point takes the session lock once, so fees, gas limit and the
/// estimate snapshot are always read together. Background work (polling
/// start, estimate updates, account refresh, name lookups) checks the
/// cancellation token before it touches state.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    state: Arc<Mutex<ConfirmationSession>>,
    cancel: CancellationToken,
    collaborators: Collaborators,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub async fn open(
        transaction: Transaction,
        options: SessionOptions,
        collaborators: Collaborators,
    ) -> Self {
        let id = transaction.id.clone();
        let from = transaction.tx_params.from;
        let recipient = transaction.tx_params.to;
        // Seed from the subscription so no published feed falls between the
        // initial read and the first change notification.
        let mut updates = collaborators.estimates.subscribe();
        let feed = updates.borrow_and_update().clone();
        let session = ConfirmationSession::new(transaction, options, feed);

        let handle = Self {
            id,
            state: Arc::new(Mutex::new(session)),
            cancel: CancellationToken::new(),
            collaborators,
        };
        tracing::info!("Opened confirmation session {}", handle.id);

        handle.start_polling();
        handle.follow_estimates(updates);
        handle.refresh_account(from).await;
        if let Some(recipient) = recipient {
            handle.resolve_recipient(recipient);
        }

        handle
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, ConfirmationSession>> {
        let session = self.state.lock().await;
        if self.cancel.is_cancelled() || session.closed {
            return Err(Error::SessionClosed(self.id.clone()));
        }
        Ok(session)
    }

    fn start_polling(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            let source = handle.collaborators.estimates.clone();
            let started = source.start_polling(handle.cancel.clone()).await;

            let mut session = handle.state.lock().await;
            let token = match started {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!("Failed to start estimate polling for {}: {}", handle.id, e);
                    session.polling = PollingState::Released;
                    return;
                }
            };
            if handle.cancel.is_cancelled() || session.closed {
                drop(session);
                tracing::debug!(
                    "Session {} closed before polling started, releasing {}",
                    handle.id,
                    token
                );
                source.stop_polling(token).await;
                return;
            }
            tracing::debug!("Session {} polling with {}", handle.id, token);
            session.polling = PollingState::Active(token);
        });
    }

    fn follow_estimates(&self, mut updates: watch::Receiver<EstimateFeed>) {
        let handle = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = handle.cancel.cancelled() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            tracing::debug!("Estimate feed closed for {}", handle.id);
                            break;
                        }
                        let feed = updates.borrow_and_update().clone();
                        let from = match handle.lock_open().await {
                            Ok(mut session) => {
                                session.ingest(feed);
                                session.transaction.tx_params.from
                            }
                            Err(_) => break,
                        };
                        handle.refresh_account(from).await;
                    }
                }
            }
        });
    }

    async fn refresh_account(&self, from: Address) {
        let accounts = &self.collaborators.accounts;
        let (balance, nonce) = tokio::join!(accounts.balance(from), accounts.next_nonce(from));

        let Ok(mut session) = self.lock_open().await else {
            return;
        };
        match balance {
            Ok(balance) => session.balance = Some(balance),
            Err(e) => tracing::warn!("Failed to fetch balance of {}: {}", from, e),
        }
        match nonce {
            Ok(nonce) => session.next_nonce = Some(nonce),
            Err(e) => tracing::warn!("Failed to fetch next nonce of {}: {}", from, e),
        }
    }

    /// Fire-and-forget reverse lookup; the result is dropped after teardown.
    fn resolve_recipient(&self, address: Address) {
        let handle = self.clone();
        tokio::spawn(async move {
            let resolved = tokio::select! {
                _ = handle.cancel.cancelled() => return,
                resolved = handle.collaborators.resolver.reverse_resolve(address) => resolved,
            };
            match resolved {
                Ok(name) => {
                    if let Ok(mut session) = handle.lock_open().await {
                        session.recipient_name = name;
                    }
                }
                Err(e) => tracing::debug!("Reverse lookup of {} failed: {}", address, e),
            }
        });
    }

    pub async fn view(&self) -> Result<SessionSnapshot> {
        Ok(self.lock_open().await?.snapshot())
    }

    pub async fn select_level(&self, level: EstimateLevel) -> Result<SessionSnapshot> {
        let mut guard = self.lock_open().await?;
        let session = &mut *guard;
        let outcome = session.reconciler.select_level(
            level,
            &mut session.inputs,
            &session.feed.snapshot,
            &session.transaction,
        )?;
        tracing::info!("Session {} selected {}: {:?}", self.id, level, outcome);

        Ok(session.snapshot())
    }

    pub async fn edit(&self, edit: ManualEdit) -> Result<SessionSnapshot> {
        let mut guard = self.lock_open().await?;
        let session = &mut *guard;
        session
            .reconciler
            .notify_manual_edit(edit, &mut session.inputs)?;

        Ok(session.snapshot())
    }

    /// Sets or clears the nonce the transaction is sent with.
    pub async fn set_custom_nonce(&self, nonce: Option<u64>) -> Result<SessionSnapshot> {
        let mut session = self.lock_open().await?;
        session.custom_nonce = nonce;
        tracing::debug!("Session {} custom nonce: {:?}", self.id, nonce);

        Ok(session.snapshot())
    }

    pub async fn confirm_anyway(&self) -> Result<SessionSnapshot> {
        let mut session = self.lock_open().await?;
        session.submission.confirm_anyway();
        tracing::info!("Session {} acknowledged the simulation failure", self.id);

        Ok(session.snapshot())
    }

    /// Hands the reconciled transaction to the sender. At most one send is
    /// in flight; a result arriving after teardown is dropped.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let merged = {
            let mut guard = self.lock_open().await?;
            let session = &mut *guard;
            let snapshot = session.snapshot();
            match snapshot.submit_blocker {
                Some(SubmitBlocker::AlreadySubmitting) => {
                    tracing::debug!("Ignoring submit for {}: already submitting", self.id);
                    return Ok(SubmitOutcome::Ignored);
                }
                Some(blocker) => {
                    tracing::debug!("Submit for {} blocked: {}", self.id, blocker);
                    return Ok(SubmitOutcome::Blocked(blocker));
                }
                None => {}
            }
            match session.submission.begin(
                &session.transaction,
                &snapshot.fees,
                session.custom_nonce,
            ) {
                Some(merged) => merged,
                None => return Ok(SubmitOutcome::Ignored),
            }
        };

        tracing::info!("Submitting transaction {}", self.id);
        let result = self.collaborators.sender.send(merged.clone()).await;

        let mut session = self.state.lock().await;
        if self.cancel.is_cancelled() || session.closed {
            tracing::warn!(
                "Session {} was torn down during submission, dropping the result",
                self.id
            );
            return Ok(SubmitOutcome::Discarded);
        }
        match result {
            Ok(tx_hash) => {
                session.submission.succeed();
                session.transaction = merged;
                drop(session);
                tracing::info!("Transaction {} submitted as {}", self.id, tx_hash);
                self.teardown().await;
                Ok(SubmitOutcome::Submitted(tx_hash))
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Submission of {} failed: {}", self.id, message);
                session.submission.fail(message.clone());
                Ok(SubmitOutcome::Failed(message))
            }
        }
    }

    /// Rejects the transaction. Polling is released before the session goes.
    pub async fn cancel(&self) -> Result<()> {
        let transaction = self.lock_open().await?.transaction.clone();
        self.teardown().await;
        tracing::info!("Cancelling transaction {}", self.id);
        self.collaborators.sender.cancel(&transaction).await
    }

    /// Stops polling, then discards the fee inputs. Safe to call repeatedly.
    pub async fn teardown(&self) {
        self.cancel.cancel();

        let polling = {
            let mut session = self.state.lock().await;
            std::mem::replace(&mut session.polling, PollingState::Released)
        };
        if let PollingState::Active(token) = polling {
            tracing::debug!("Session {} releasing {}", self.id, token);
            self.collaborators.estimates.stop_polling(token).await;
        }

        let mut session = self.state.lock().await;
        if !session.closed {
            session.closed = true;
            session.inputs = FeeInputState::default();
            tracing::info!("Closed confirmation session {}", self.id);
        }
    }
}
