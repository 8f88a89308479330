use crate::error::{LedgerError, LedgerResult};
use crate::ledger::accountant;
use crate::ledger::pending::{PendingPlan, PendingSpends};
use crate::ledger::reconcile::{reconcile, ReconcileReport};
use crate::ledger::selection::{
    build_plan, InputSelectionAlgorithm, PlanId, SelectionRequest, SpendPlan,
};
use crate::ledger::store::UTxOStore;
use crate::output::{Address, Amount, Output, OutputId, ShardKey, TransactionId};

/// Store plus pending-spent bookkeeping. Every method is one atomic step once the
/// caller holds exclusive access.
#[derive(Debug, Default, Clone)]
pub struct LedgerState {
    store: UTxOStore,
    pending: PendingSpends,
    next_plan_id: u64,
}

impl LedgerState {
    pub fn new(store: UTxOStore) -> Self {
        Self {
            store,
            pending: Default::default(),
            next_plan_id: 1,
        }
    }

    pub fn store(&self) -> &UTxOStore {
        &self.store
    }

    pub fn pending(&self) -> &PendingSpends {
        &self.pending
    }

    pub fn balance(&self) -> LedgerResult<Amount> {
        accountant::balance(&self.store)
    }

    /// Stores an output known from outside a sync. Identifiers held by a pending plan
    /// are refused, they are either withdrawn or owned by that plan.
    pub fn track(&mut self, output: Output) -> LedgerResult<Option<Output>> {
        if let Some(plan_id) = self.pending.spending_plan(&output.id) {
            return Err(LedgerError::invariant(format!(
                "output {} is spent by pending plan {}",
                output.id, plan_id
            )));
        }
        if self.pending.is_speculative(&output.id) {
            return Err(LedgerError::invariant(format!(
                "output {} is a speculative output of a pending plan",
                output.id
            )));
        }
        self.store.insert(output)
    }

    /// Replaces the whole store. Refused while plans are in flight.
    pub fn replace_store(&mut self, store: UTxOStore) -> LedgerResult<()> {
        if !self.pending.is_empty() {
            return Err(LedgerError::invariant(format!(
                "can't replace the store with {} plans pending",
                self.pending.len()
            )));
        }
        self.store = store;
        Ok(())
    }

    /// Selects inputs for `target`, validates the plan, then withdraws the inputs and
    /// stores the speculative change (and the recipient when paying ourselves).
    ///
    /// Nothing is modified unless the whole plan is accepted.
    pub fn select<Algo, ShardOf>(
        &mut self,
        algorithm: &Algo,
        target: i64,
        recipient: &Address,
        self_address: &Address,
        shard_of: ShardOf,
    ) -> LedgerResult<SpendPlan>
    where
        Algo: InputSelectionAlgorithm + ?Sized,
        ShardOf: Fn(&Address) -> ShardKey,
    {
        // plan ids start at 1 even for a defaulted state
        let plan_id = PlanId::new(self.next_plan_id.max(1));
        let plan = build_plan(
            &self.store,
            algorithm,
            plan_id,
            SelectionRequest {
                target,
                recipient,
                change_address: self_address,
            },
            shard_of,
        )?;
        accountant::validate(&plan, &self.store)?;

        let mut speculative = vec![];
        if plan.is_self_payment(self_address) {
            speculative.push(plan.recipient.clone());
        }
        if let Some(change) = &plan.change {
            speculative.push(change.clone());
        }
        if let Some(taken) = speculative
            .iter()
            .find(|output| self.store.contains(&output.id))
        {
            return Err(LedgerError::invariant(format!(
                "speculative output {} of plan {} is already stored",
                taken.id, plan.id
            )));
        }

        self.pending.register(
            plan.id,
            PendingPlan {
                inputs: plan.inputs.clone(),
                created: speculative.iter().map(|output| output.id.clone()).collect(),
            },
        )?;
        self.next_plan_id = plan_id.value() + 1;

        for input in plan.inputs.iter() {
            self.store.remove(&input.id);
        }
        for output in speculative.into_iter() {
            self.store.insert(output)?;
        }

        tracing::info!(
            "plan {}: {} inputs, recipient {} gets {}, change {}",
            plan.id,
            plan.inputs.len(),
            plan.recipient.address,
            plan.recipient.amount,
            plan.change.as_ref().map(|change| change.amount).unwrap_or(0)
        );

        Ok(plan)
    }

    /// Checks a plan against the ledger: a pending plan against what it withdrew,
    /// anything else against the current store.
    pub fn validate(&self, plan: &SpendPlan) -> LedgerResult<()> {
        if self.pending.get(plan.id).is_some() {
            accountant::validate_committed(plan, &self.pending)
        } else {
            accountant::validate(plan, &self.store)
        }
    }

    /// Broadcast succeeded: the plan's inputs are gone for good and its speculative
    /// outputs take the real transaction id, also where a later plan already spends them.
    pub fn finalize(&mut self, plan_id: PlanId, transaction_id: TransactionId) -> LedgerResult<()> {
        let plan = self.pending.release(plan_id)?;
        for id in plan.created.iter() {
            let real_id = OutputId {
                transaction_id: transaction_id.clone(),
                output_index: id.output_index,
            };
            match self.store.remove(id) {
                Some(mut output) => {
                    output.id = real_id;
                    self.store.insert(output)?;
                }
                None => self.pending.rekey_input(id, real_id)?,
            }
        }

        tracing::info!("plan {} finalized as {}", plan_id, transaction_id);
        Ok(())
    }

    /// Undo of `select`: inputs go back to the store, speculative outputs are dropped.
    ///
    /// Refused while another pending plan spends one of those speculative outputs.
    pub fn abandon(&mut self, plan_id: PlanId) -> LedgerResult<PendingPlan> {
        let held = self
            .pending
            .get(plan_id)
            .ok_or(LedgerError::UnknownPlan(plan_id))?;
        if let Some((id, holder)) = held
            .created
            .iter()
            .find_map(|id| self.pending.spending_plan(id).map(|holder| (id, holder)))
        {
            return Err(LedgerError::invariant(format!(
                "can't abandon plan {plan_id}: its output {id} is spent by pending plan {holder}"
            )));
        }

        let plan = self.pending.release(plan_id)?;
        for id in plan.created.iter() {
            self.store.remove(id);
        }
        for input in plan.inputs.iter() {
            self.store.insert(input.clone())?;
        }

        tracing::info!(
            "plan {} abandoned, {} inputs returned",
            plan_id,
            plan.inputs.len()
        );
        Ok(plan)
    }

    pub fn reconcile(
        &mut self,
        address: &Address,
        shard: ShardKey,
        fetched: Vec<Output>,
    ) -> ReconcileReport {
        reconcile(&mut self.store, &self.pending, address, shard, fetched)
    }
}
