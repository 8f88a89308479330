use crate::error::{LedgerError, LedgerResult};
use crate::ledger::pending::PendingSpends;
use crate::ledger::selection::SpendPlan;
use crate::ledger::store::UTxOStore;
use crate::output::Amount;
use itertools::Itertools;

/// Conservation check: inputs must equal recipient plus change, no value appears or vanishes.
pub fn verify_plan_balance(plan: &SpendPlan) -> LedgerResult<()> {
    if plan.inputs.is_empty() {
        return Err(LedgerError::invariant(format!(
            "plan {} has no inputs",
            plan.id
        )));
    }
    if !plan.inputs.iter().map(|input| &input.id).all_unique() {
        return Err(LedgerError::invariant(format!(
            "found non unique input in plan {}",
            plan.id
        )));
    }
    if plan.recipient.amount == 0 {
        return Err(LedgerError::invariant(format!(
            "plan {} pays a zero-value recipient",
            plan.id
        )));
    }
    if matches!(&plan.change, Some(change) if change.amount == 0) {
        return Err(LedgerError::invariant(format!(
            "plan {} carries a zero-value change output",
            plan.id
        )));
    }

    let inputs = plan.input_total()?;
    let outputs = plan.output_total()?;
    if inputs != outputs {
        return Err(LedgerError::invariant(format!(
            "plan {} is not balanced: inputs {}, outputs {}",
            plan.id, inputs, outputs
        )));
    }

    Ok(())
}

/// Validates a plan that was not committed yet: every input must still be in `store`
/// with the same amount.
pub fn validate(plan: &SpendPlan, store: &UTxOStore) -> LedgerResult<()> {
    verify_plan_balance(plan)?;

    for input in plan.inputs.iter() {
        match store.get(&input.id) {
            Some(stored) if stored.amount == input.amount => {}
            Some(stored) => {
                return Err(LedgerError::invariant(format!(
                    "input {} of plan {} claims {} but the store holds {}",
                    input.id, plan.id, input.amount, stored.amount
                )));
            }
            None => {
                return Err(LedgerError::invariant(format!(
                    "plan {} references phantom output {}",
                    plan.id, input.id
                )));
            }
        }
    }

    Ok(())
}

/// Validates a committed plan: every input must be held by this very plan.
pub fn validate_committed(plan: &SpendPlan, pending: &PendingSpends) -> LedgerResult<()> {
    verify_plan_balance(plan)?;

    let held = pending
        .get(plan.id)
        .ok_or(LedgerError::UnknownPlan(plan.id))?;
    for input in plan.inputs.iter() {
        let current = pending.resolve(&input.id);
        let is_held = held.inputs.iter().any(|withdrawn| {
            withdrawn.id == current
                && withdrawn.amount == input.amount
                && withdrawn.address == input.address
        });
        if !is_held {
            return Err(LedgerError::invariant(format!(
                "plan {} references output {} it never withdrew",
                plan.id, input.id
            )));
        }
    }

    Ok(())
}

pub fn balance(store: &UTxOStore) -> LedgerResult<Amount> {
    store.balance()
}
