use crate::chain::{ChainBackend, SignedTransaction};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::pending::PendingPlan;
use crate::ledger::reconcile::ReconcileReport;
use crate::ledger::selection::{InputSelectionAlgorithm, PlanId, SelectionStrategy, SpendPlan};
use crate::ledger::state::LedgerState;
use crate::ledger::stats::SyncStats;
use crate::ledger::store::UTxOStore;
use crate::output::{Address, Amount, Output, OutputId, TransactionId};
use crate::snapshot;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Wallet ledger over one chain backend.
///
/// The store and the pending-spent set sit behind a single lock. Every ledger step
/// (select, reconcile, finalize, abandon) runs entirely under it, while calls to the
/// backend happen with the lock released.
pub struct UtxoEngine<B: ChainBackend, A: InputSelectionAlgorithm = SelectionStrategy> {
    backend: B,
    algorithm: A,
    state: Mutex<LedgerState>,
}

impl<B: ChainBackend, A: InputSelectionAlgorithm> UtxoEngine<B, A> {
    pub fn new(backend: B, algorithm: A) -> Self {
        Self::with_store(backend, algorithm, UTxOStore::new())
    }

    pub fn with_store(backend: B, algorithm: A, store: UTxOStore) -> Self {
        Self {
            backend,
            algorithm,
            state: Mutex::new(LedgerState::new(store)),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::invariant("ledger lock poisoned"))
    }

    /// Plans a payment of `target` to `recipient`, change goes to the backend's self address.
    pub fn select(&self, target: i64, recipient: &Address) -> LedgerResult<SpendPlan> {
        let self_address = self.backend.self_address();
        let mut state = self.lock()?;
        state.select(
            &self.algorithm,
            target,
            recipient,
            &self_address,
            |address| self.backend.shard_of(address),
        )
    }

    pub fn validate(&self, plan: &SpendPlan) -> LedgerResult<()> {
        self.lock()?.validate(plan)
    }

    pub fn finalize(&self, plan_id: PlanId, transaction_id: TransactionId) -> LedgerResult<()> {
        self.lock()?.finalize(plan_id, transaction_id)
    }

    pub fn abandon(&self, plan_id: PlanId) -> LedgerResult<PendingPlan> {
        self.lock()?.abandon(plan_id)
    }

    /// Submits the signed transaction of a pending plan. The plan is finalized when the
    /// backend accepts it and abandoned otherwise.
    pub async fn broadcast(
        &self,
        plan_id: PlanId,
        transaction: &SignedTransaction,
    ) -> LedgerResult<TransactionId> {
        let is_pending = self.lock()?.pending().get(plan_id).is_some();
        if !is_pending {
            return Err(LedgerError::UnknownPlan(plan_id));
        }

        match self.backend.broadcast(transaction).await {
            Ok(transaction_id) => {
                self.finalize(plan_id, transaction_id.clone())?;
                Ok(transaction_id)
            }
            Err(err) => {
                tracing::warn!("broadcast of plan {} failed: {:#}", plan_id, err);
                self.abandon(plan_id)?;
                Err(LedgerError::Backend(format!("{err:#}")))
            }
        }
    }

    /// Merges an already fetched snapshot of `address` into the store.
    pub fn reconcile(&self, address: &Address, fetched: Vec<Output>) -> LedgerResult<ReconcileReport> {
        let shard = self.backend.shard_of(address);
        Ok(self.lock()?.reconcile(address, shard, fetched))
    }

    /// Fetches and reconciles every address in turn. A failed fetch is recorded and
    /// the remaining addresses are still synced.
    pub async fn sync(&self, addresses: &[Address]) -> LedgerResult<SyncStats> {
        let mut stats = SyncStats::default();
        for address in addresses.iter() {
            match self.backend.fetch_unspent(address).await {
                Ok(fetched) => {
                    let report = self.reconcile(address, fetched)?;
                    tracing::debug!("synced {}: {}", address, report);
                    stats.add_report(report);
                }
                Err(err) => {
                    tracing::warn!(
                        "can't fetch unspent outputs of {} from {}: {:#}",
                        address,
                        self.backend.chain_name(),
                        err
                    );
                    stats.add_failed_fetch(address.clone(), format!("{err:#}"));
                }
            }
        }

        tracing::info!(
            "sync of {} addresses: {} inserted, {} removed, {} anomalies, {} failed fetches",
            addresses.len(),
            stats.inserted(),
            stats.removed(),
            stats.anomalies(),
            stats.failed_fetches.len()
        );
        Ok(stats)
    }

    /// Adds an output known from outside the chain backend; its shard is recomputed.
    pub fn track(&self, mut output: Output) -> LedgerResult<Option<Output>> {
        output.shard = self.backend.shard_of(&output.address);
        self.lock()?.track(output)
    }

    pub fn balance(&self) -> LedgerResult<Amount> {
        self.lock()?.balance()
    }

    pub fn balance_of(&self, address: &Address) -> LedgerResult<Amount> {
        self.lock()?.store().balance_of(address)
    }

    pub fn pending_plans(&self) -> LedgerResult<Vec<PlanId>> {
        Ok(self.lock()?.pending().plan_ids())
    }

    pub fn is_pending_spent(&self, id: &OutputId) -> LedgerResult<bool> {
        Ok(self.lock()?.pending().is_spent(id))
    }

    /// Copy of the current store.
    pub fn store(&self) -> LedgerResult<UTxOStore> {
        Ok(self.lock()?.store().clone())
    }

    /// Replaces the store, e.g. with a loaded snapshot. Refused while plans are pending.
    pub fn restore(&self, store: UTxOStore) -> LedgerResult<()> {
        self.lock()?.replace_store(store)
    }

    /// Writes the store as JSON lines. Refused while plans are pending: their
    /// speculative outputs only carry provisional ids.
    pub fn dump_snapshot(&self, path: PathBuf) -> anyhow::Result<usize> {
        let store = {
            let state = self.lock()?;
            if !state.pending().is_empty() {
                return Err(LedgerError::invariant(format!(
                    "can't dump a snapshot with {} plans pending",
                    state.pending().len()
                ))
                .into());
            }
            state.store().clone()
        };
        snapshot::dump_to_file(path, &store)
    }
}
