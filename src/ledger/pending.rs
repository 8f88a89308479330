use crate::error::{LedgerError, LedgerResult};
use crate::ledger::selection::PlanId;
use crate::output::{Output, OutputId};
use std::collections::{BTreeMap, HashMap};

/// Bookkeeping for a plan that was selected but is neither finalized nor abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlan {
    /// records withdrawn from the store, kept for rollback
    pub inputs: Vec<Output>,
    /// speculative outputs the plan put into the store
    pub created: Vec<OutputId>,
}

/// Identifiers held by in-flight plans.
///
/// Spent inputs must not be resurrected by a sync and speculative outputs must not be
/// dropped by one, until the owning plan is released.
#[derive(Debug, Default, Clone)]
pub struct PendingSpends {
    plans: BTreeMap<PlanId, PendingPlan>,
    spent_by: HashMap<OutputId, PlanId>,
    created_by: HashMap<OutputId, PlanId>,
    /// provisional id -> real id, for held inputs re-keyed by a finalized parent plan
    renamed: HashMap<OutputId, OutputId>,
}

impl PendingSpends {
    pub fn register(&mut self, plan_id: PlanId, plan: PendingPlan) -> LedgerResult<()> {
        if self.plans.contains_key(&plan_id) {
            return Err(LedgerError::invariant(format!(
                "plan {plan_id} is already pending"
            )));
        }
        if let Some(input) = plan
            .inputs
            .iter()
            .find(|input| self.spent_by.contains_key(&input.id))
        {
            return Err(LedgerError::invariant(format!(
                "output {} is already held by plan {:?}",
                input.id,
                self.spent_by.get(&input.id)
            )));
        }

        for input in plan.inputs.iter() {
            self.spent_by.insert(input.id.clone(), plan_id);
        }
        for id in plan.created.iter() {
            self.created_by.insert(id.clone(), plan_id);
        }
        self.plans.insert(plan_id, plan);
        Ok(())
    }

    pub fn is_spent(&self, id: &OutputId) -> bool {
        self.spent_by.contains_key(id)
    }

    pub fn spending_plan(&self, id: &OutputId) -> Option<PlanId> {
        self.spent_by.get(id).cloned()
    }

    pub fn is_speculative(&self, id: &OutputId) -> bool {
        self.created_by.contains_key(id)
    }

    /// Current identifier of a held input that may have been re-keyed since selection.
    pub fn resolve(&self, id: &OutputId) -> OutputId {
        self.renamed.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    /// The plan that created `old` was finalized while another plan still holds it:
    /// the holder now spends `new`.
    pub fn rekey_input(&mut self, old: &OutputId, new: OutputId) -> LedgerResult<()> {
        let plan_id = match self.spent_by.remove(old) {
            Some(plan_id) => plan_id,
            None => return Ok(()),
        };
        let plan = self.plans.get_mut(&plan_id).ok_or_else(|| {
            LedgerError::invariant(format!("output {old} is held by unknown plan {plan_id}"))
        })?;
        for input in plan.inputs.iter_mut().filter(|input| &input.id == old) {
            input.id = new.clone();
        }
        self.spent_by.insert(new.clone(), plan_id);
        self.renamed.insert(old.clone(), new);
        Ok(())
    }

    pub fn get(&self, plan_id: PlanId) -> Option<&PendingPlan> {
        self.plans.get(&plan_id)
    }

    /// Drops every entry of `plan_id` and hands back what the plan held.
    pub fn release(&mut self, plan_id: PlanId) -> LedgerResult<PendingPlan> {
        let plan = self
            .plans
            .remove(&plan_id)
            .ok_or(LedgerError::UnknownPlan(plan_id))?;
        for input in plan.inputs.iter() {
            self.spent_by.remove(&input.id);
        }
        for id in plan.created.iter() {
            self.created_by.remove(id);
        }
        self.renamed
            .retain(|_, new| !plan.inputs.iter().any(|input| &input.id == new));
        Ok(plan)
    }

    pub fn plan_ids(&self) -> Vec<PlanId> {
        self.plans.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
