use crate::error::{LedgerError, LedgerResult};
use crate::ledger::store::UTxOStore;
use crate::output::{Address, Amount, Output, OutputId, ShardKey, TransactionId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(u64);

impl PlanId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const RECIPIENT_OUTPUT_INDEX: u32 = 0;
pub const CHANGE_OUTPUT_INDEX: u32 = 1;

/// Placeholder transaction id for outputs of a plan that was not broadcast yet.
pub fn provisional_transaction_id(plan_id: PlanId) -> TransactionId {
    TransactionId::new(format!("pending-{plan_id}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    pub id: PlanId,
    pub inputs: Vec<Output>,
    pub recipient: Output,
    pub change: Option<Output>,
}

impl SpendPlan {
    pub fn input_total(&self) -> LedgerResult<Amount> {
        self.inputs.iter().try_fold(0 as Amount, |total, input| {
            total
                .checked_add(input.amount)
                .ok_or_else(|| LedgerError::invariant("input total overflows"))
        })
    }

    pub fn output_total(&self) -> LedgerResult<Amount> {
        self.outputs().try_fold(0 as Amount, |total, output| {
            total
                .checked_add(output.amount)
                .ok_or_else(|| LedgerError::invariant("output total overflows"))
        })
    }

    /// Recipient first, then change if any.
    pub fn outputs(&self) -> impl Iterator<Item = &Output> + '_ {
        std::iter::once(&self.recipient).chain(self.change.iter())
    }

    pub fn input_ids(&self) -> Vec<OutputId> {
        self.inputs.iter().map(|input| input.id.clone()).collect()
    }

    pub fn is_self_payment(&self, self_address: &Address) -> bool {
        self.recipient.is_owned_by(self_address)
    }
}

/// Picks which candidates cover `target`. Candidates come in store iteration order.
pub trait InputSelectionAlgorithm {
    /// Identifiers of a covering subset, in spending order.
    fn select_inputs(&self, candidates: &[&Output], target: Amount) -> LedgerResult<Vec<OutputId>>;
}

/// Walks the candidates in order and stops as soon as the target is covered.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstFitAccumulate;

impl InputSelectionAlgorithm for FirstFitAccumulate {
    fn select_inputs(&self, candidates: &[&Output], target: Amount) -> LedgerResult<Vec<OutputId>> {
        accumulate(candidates.iter().copied(), target)
    }
}

/// Biggest outputs first; equal amounts keep store order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestFirst;

impl InputSelectionAlgorithm for LargestFirst {
    fn select_inputs(&self, candidates: &[&Output], target: Amount) -> LedgerResult<Vec<OutputId>> {
        let ordered = candidates
            .iter()
            .copied()
            .sorted_by(|left, right| right.amount.cmp(&left.amount));
        accumulate(ordered, target)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    FirstFit,
    LargestFirst,
}

impl InputSelectionAlgorithm for SelectionStrategy {
    fn select_inputs(&self, candidates: &[&Output], target: Amount) -> LedgerResult<Vec<OutputId>> {
        match self {
            SelectionStrategy::FirstFit => FirstFitAccumulate.select_inputs(candidates, target),
            SelectionStrategy::LargestFirst => LargestFirst.select_inputs(candidates, target),
        }
    }
}

fn accumulate<'a>(
    candidates: impl Iterator<Item = &'a Output>,
    target: Amount,
) -> LedgerResult<Vec<OutputId>> {
    let mut chosen = vec![];
    let mut total: Amount = 0;
    for output in candidates {
        total = total
            .checked_add(output.amount)
            .ok_or_else(|| LedgerError::invariant("selected total overflows"))?;
        chosen.push(output.id.clone());
        if total >= target {
            return Ok(chosen);
        }
    }

    Err(LedgerError::InsufficientFunds {
        available: total,
        required: target,
    })
}

pub fn parse_target(target: i64) -> LedgerResult<Amount> {
    if target <= 0 {
        return Err(LedgerError::InvalidAmount(target));
    }
    Ok(target as Amount)
}

pub struct SelectionRequest<'a> {
    pub target: i64,
    pub recipient: &'a Address,
    pub change_address: &'a Address,
}

/// Builds a plan from the current store without modifying it. Every stored output is
/// offered to the algorithm.
pub fn build_plan<Algo, ShardOf>(
    store: &UTxOStore,
    algorithm: &Algo,
    plan_id: PlanId,
    request: SelectionRequest<'_>,
    shard_of: ShardOf,
) -> LedgerResult<SpendPlan>
where
    Algo: InputSelectionAlgorithm + ?Sized,
    ShardOf: Fn(&Address) -> ShardKey,
{
    let target = parse_target(request.target)?;

    let candidates: Vec<&Output> = store.iter(None).collect();
    let chosen = algorithm.select_inputs(&candidates, target)?;
    let mut inputs = Vec::with_capacity(chosen.len());
    for id in chosen.iter() {
        let output = store.get(id).ok_or_else(|| {
            LedgerError::invariant(format!("selection returned unknown output {id}"))
        })?;
        inputs.push(output.clone());
    }

    let total = inputs.iter().try_fold(0 as Amount, |total, input| {
        total
            .checked_add(input.amount)
            .ok_or_else(|| LedgerError::invariant("selected total overflows"))
    })?;
    if total < target {
        return Err(LedgerError::InsufficientFunds {
            available: total,
            required: target,
        });
    }

    let transaction_id = provisional_transaction_id(plan_id);
    let recipient = Output::new(
        OutputId {
            transaction_id: transaction_id.clone(),
            output_index: RECIPIENT_OUTPUT_INDEX,
        },
        target,
        request.recipient.clone(),
        shard_of(request.recipient),
    );

    let change = (total > target).then(|| {
        Output::new(
            OutputId {
                transaction_id,
                output_index: CHANGE_OUTPUT_INDEX,
            },
            total - target,
            request.change_address.clone(),
            shard_of(request.change_address),
        )
    });

    Ok(SpendPlan {
        id: plan_id,
        inputs,
        recipient,
        change,
    })
}

#[cfg(test)]
mod tests {
    use crate::error::LedgerError;
    use crate::ledger::selection::{
        build_plan, FirstFitAccumulate, InputSelectionAlgorithm, LargestFirst, PlanId,
        SelectionRequest, SelectionStrategy,
    };
    use crate::ledger::store::UTxOStore;
    use crate::output::{Address, Output, OutputId, ShardKey};

    fn store_abc() -> UTxOStore {
        let mut store = UTxOStore::new();
        for (tx, amount) in [("A", 30), ("B", 45), ("C", 10)] {
            store
                .insert(Output::new(
                    OutputId::new(tx, 0),
                    amount,
                    Address::new("me"),
                    ShardKey::IMPLICIT,
                ))
                .unwrap();
        }
        store
    }

    fn request<'a>(target: i64, recipient: &'a Address, me: &'a Address) -> SelectionRequest<'a> {
        SelectionRequest {
            target,
            recipient,
            change_address: me,
        }
    }

    #[test]
    fn first_fit_stops_at_threshold() {
        let store = store_abc();
        let (bob, me) = (Address::new("bob"), Address::new("me"));
        let plan = build_plan(
            &store,
            &FirstFitAccumulate,
            PlanId::new(1),
            request(50, &bob, &me),
            |_| ShardKey::IMPLICIT,
        )
        .unwrap();

        assert_eq!(
            plan.input_ids(),
            vec![OutputId::new("A", 0), OutputId::new("B", 0)]
        );
        assert_eq!(plan.recipient.amount, 50);
        assert_eq!(plan.recipient.address, bob);
        assert_eq!(plan.recipient.id, OutputId::new("pending-1", 0));
        let change = plan.change.clone().unwrap();
        assert_eq!(change.amount, 25);
        assert_eq!(change.address, me);
        assert_eq!(change.id, OutputId::new("pending-1", 1));
        assert_eq!(plan.input_total().unwrap(), plan.output_total().unwrap());

        // planning alone leaves the store as it was
        assert_eq!(store.balance().unwrap(), 85);
    }

    #[test]
    fn exact_match_has_no_change() {
        let store = store_abc();
        let (bob, me) = (Address::new("bob"), Address::new("me"));
        let plan = build_plan(
            &store,
            &FirstFitAccumulate,
            PlanId::new(2),
            request(75, &bob, &me),
            |_| ShardKey::IMPLICIT,
        )
        .unwrap();
        assert!(plan.change.is_none());
        assert_eq!(plan.outputs().count(), 1);
    }

    #[test]
    fn insufficient_funds() {
        let store = store_abc();
        let (bob, me) = (Address::new("bob"), Address::new("me"));
        let result = build_plan(
            &store,
            &FirstFitAccumulate,
            PlanId::new(3),
            request(86, &bob, &me),
            |_| ShardKey::IMPLICIT,
        );
        assert_eq!(
            result,
            Err(LedgerError::InsufficientFunds {
                available: 85,
                required: 86
            })
        );
    }

    #[test]
    fn non_positive_targets_are_invalid() {
        let store = store_abc();
        let (bob, me) = (Address::new("bob"), Address::new("me"));
        for target in [0, -5] {
            let result = build_plan(
                &store,
                &FirstFitAccumulate,
                PlanId::new(4),
                request(target, &bob, &me),
                    |_| ShardKey::IMPLICIT,
            );
            assert_eq!(result, Err(LedgerError::InvalidAmount(target)));
        }
    }

    #[test]
    fn new_outputs_use_shard_function() {
        let store = store_abc();
        let (bob, me) = (Address::new("bob"), Address::new("me"));
        let plan = build_plan(
            &store,
            &FirstFitAccumulate,
            PlanId::new(5),
            request(40, &bob, &me),
            |address| {
                if address.as_str() == "bob" {
                    ShardKey::new(2)
                } else {
                    ShardKey::new(1)
                }
            },
        )
        .unwrap();
        assert_eq!(plan.recipient.shard, ShardKey::new(2));
        assert_eq!(plan.change.unwrap().shard, ShardKey::new(1));
    }

    #[test]
    fn largest_first_prefers_big_outputs() {
        let store = store_abc();
        let candidates: Vec<&Output> = store.iter(None).collect();
        let chosen = LargestFirst.select_inputs(&candidates, 40).unwrap();
        assert_eq!(chosen, vec![OutputId::new("B", 0)]);

        let chosen = SelectionStrategy::LargestFirst
            .select_inputs(&candidates, 80)
            .unwrap();
        assert_eq!(
            chosen,
            vec![
                OutputId::new("B", 0),
                OutputId::new("A", 0),
                OutputId::new("C", 0)
            ]
        );

        let chosen = SelectionStrategy::FirstFit
            .select_inputs(&candidates, 40)
            .unwrap();
        assert_eq!(chosen, vec![OutputId::new("A", 0), OutputId::new("B", 0)]);
    }
}
