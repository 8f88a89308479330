use crate::error::LedgerError;
use crate::ledger::pending::PendingSpends;
use crate::ledger::store::UTxOStore;
use crate::output::{Address, Output, OutputId, ShardKey};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub address: Address,
    pub shard: ShardKey,
    pub inserted: usize,
    pub removed: usize,
    pub kept: usize,
    pub skipped_pending: usize,
    pub anomalies: Vec<LedgerError>,
}

impl ReconcileReport {
    fn new(address: Address, shard: ShardKey) -> Self {
        Self {
            address,
            shard,
            inserted: 0,
            removed: 0,
            kept: 0,
            skipped_pending: 0,
            anomalies: vec![],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

fn check_record(
    output: &Output,
    address: &Address,
    seen: &HashSet<OutputId>,
) -> Result<(), LedgerError> {
    let reason = if output.amount == 0 {
        "zero amount".to_string()
    } else if !output.is_owned_by(address) {
        format!("owned by {} instead of {}", output.address, address)
    } else if seen.contains(&output.id) {
        "duplicate identifier in snapshot".to_string()
    } else {
        return Ok(());
    };

    Err(LedgerError::AnomalousRecord {
        id: output.id.clone(),
        reason,
    })
}

/// Merges the authoritative snapshot of `address` into `shard` of the store.
///
/// * stored outputs of `address` missing from the snapshot were spent on-chain and are removed,
///   except speculative outputs of pending plans;
/// * snapshot outputs missing from the store are inserted, except those held by a pending plan;
/// * outputs present on both sides are not touched, so local annotations survive.
///
/// Malformed records are reported and skipped, they never abort the merge.
pub fn reconcile(
    store: &mut UTxOStore,
    pending: &PendingSpends,
    address: &Address,
    shard: ShardKey,
    fetched: Vec<Output>,
) -> ReconcileReport {
    let mut report = ReconcileReport::new(address.clone(), shard);

    let mut snapshot: Vec<Output> = Vec::with_capacity(fetched.len());
    let mut snapshot_ids = HashSet::<OutputId>::with_capacity(fetched.len());
    for mut output in fetched.into_iter() {
        if let Err(anomaly) = check_record(&output, address, &snapshot_ids) {
            tracing::warn!("skipping fetched record for {}: {}", address, anomaly);
            report.anomalies.push(anomaly);
            continue;
        }
        if output.shard != shard {
            tracing::debug!(
                "record {} reported in shard {}, assigning shard {}",
                output.id,
                output.shard,
                shard
            );
            output.shard = shard;
        }
        snapshot_ids.insert(output.id.clone());
        snapshot.push(output);
    }

    for id in store.ids_owned_by(address, shard) {
        if snapshot_ids.contains(&id) || pending.is_speculative(&id) {
            continue;
        }
        if store.remove(&id).is_some() {
            tracing::debug!("output {} of {} was spent on-chain", id, address);
            report.removed += 1;
        }
    }

    for output in snapshot.into_iter() {
        if store.contains(&output.id) {
            report.kept += 1;
        } else if let Some(plan) = pending.spending_plan(&output.id) {
            tracing::debug!(
                "output {} is held by pending plan {}, not resurrecting it",
                output.id,
                plan
            );
            report.skipped_pending += 1;
        } else {
            let id = output.id.clone();
            match store.insert(output) {
                Ok(_) => report.inserted += 1,
                Err(err) => {
                    tracing::warn!("can't insert fetched record {}: {}", id, err);
                    report.anomalies.push(LedgerError::AnomalousRecord {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use crate::error::LedgerError;
    use crate::ledger::pending::{PendingPlan, PendingSpends};
    use crate::ledger::reconcile::reconcile;
    use crate::ledger::selection::PlanId;
    use crate::ledger::store::UTxOStore;
    use crate::output::{Address, Output, OutputId, Payload, ShardKey};

    fn utxo(tx: &str, amount: u64, address: &str) -> Output {
        Output::new(
            OutputId::new(tx, 0),
            amount,
            Address::new(address),
            ShardKey::IMPLICIT,
        )
    }

    fn x() -> Address {
        Address::new("X")
    }

    #[test]
    fn spent_outputs_are_removed() {
        let mut store = UTxOStore::new();
        store.insert(utxo("O1", 20, "X")).unwrap();
        store.insert(utxo("O2", 5, "X")).unwrap();
        let pending = PendingSpends::default();

        let report = reconcile(
            &mut store,
            &pending,
            &x(),
            ShardKey::IMPLICIT,
            vec![utxo("O1", 20, "X")],
        );

        assert_eq!(report.removed, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(report.inserted, 0);
        assert!(report.is_clean());
        assert!(!store.contains(&OutputId::new("O2", 0)));
        assert_eq!(store.balance().unwrap(), 20);
    }

    #[test]
    fn other_addresses_are_untouched() {
        let mut store = UTxOStore::new();
        store.insert(utxo("Y1", 7, "Y")).unwrap();
        store.insert(utxo("O1", 20, "X")).unwrap();

        let report = reconcile(
            &mut store,
            &PendingSpends::default(),
            &x(),
            ShardKey::IMPLICIT,
            vec![],
        );
        assert_eq!(report.removed, 1);
        assert_eq!(store.balance().unwrap(), 7);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut store = UTxOStore::new();
        store.insert(utxo("O9", 3, "X")).unwrap();
        let pending = PendingSpends::default();
        let snapshot = vec![utxo("O1", 20, "X"), utxo("O2", 5, "X")];

        reconcile(&mut store, &pending, &x(), ShardKey::IMPLICIT, snapshot.clone());
        let after_once: Vec<Output> = store.iter(None).cloned().collect();

        let report = reconcile(&mut store, &pending, &x(), ShardKey::IMPLICIT, snapshot);
        let after_twice: Vec<Output> = store.iter(None).cloned().collect();

        assert_eq!(after_once, after_twice);
        assert_eq!(report.kept, 2);
        assert_eq!(report.inserted + report.removed, 0);
    }

    #[test]
    fn superset_snapshot_never_lowers_balance() {
        let mut store = UTxOStore::new();
        let pending = PendingSpends::default();
        let mut snapshot = vec![utxo("O1", 20, "X")];
        reconcile(&mut store, &pending, &x(), ShardKey::IMPLICIT, snapshot.clone());
        let mut previous = store.balance_of(&x()).unwrap();

        for (index, amount) in [4u64, 1, 16].into_iter().enumerate() {
            snapshot.push(utxo(&format!("N{index}"), amount, "X"));
            reconcile(&mut store, &pending, &x(), ShardKey::IMPLICIT, snapshot.clone());
            let current = store.balance_of(&x()).unwrap();
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(previous, 41);
    }

    #[test]
    fn local_annotations_survive() {
        let mut store = UTxOStore::new();
        store
            .insert(utxo("O1", 20, "X").with_payload(Payload::new(vec![9u8])))
            .unwrap();

        reconcile(
            &mut store,
            &PendingSpends::default(),
            &x(),
            ShardKey::IMPLICIT,
            vec![utxo("O1", 20, "X")],
        );
        assert_eq!(
            store.get(&OutputId::new("O1", 0)).unwrap().payload,
            Some(Payload::new(vec![9u8]))
        );
    }

    #[test]
    fn pending_spends_are_not_resurrected() {
        let mut store = UTxOStore::new();
        let mut pending = PendingSpends::default();
        pending
            .register(
                PlanId::new(1),
                PendingPlan {
                    inputs: vec![utxo("O1", 20, "X")],
                    created: vec![OutputId::new("pending-1", 1)],
                },
            )
            .unwrap();
        store
            .insert(Output::new(
                OutputId::new("pending-1", 1),
                5,
                x(),
                ShardKey::IMPLICIT,
            ))
            .unwrap();

        let report = reconcile(
            &mut store,
            &pending,
            &x(),
            ShardKey::IMPLICIT,
            vec![utxo("O1", 20, "X"), utxo("O3", 2, "X")],
        );

        assert_eq!(report.skipped_pending, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.removed, 0);
        assert!(!store.contains(&OutputId::new("O1", 0)));
        assert!(store.contains(&OutputId::new("pending-1", 1)));
        assert_eq!(store.balance().unwrap(), 7);
    }

    #[test]
    fn anomalous_records_are_skipped() {
        let mut store = UTxOStore::new();
        let report = reconcile(
            &mut store,
            &PendingSpends::default(),
            &x(),
            ShardKey::IMPLICIT,
            vec![
                utxo("zero", 0, "X"),
                utxo("O1", 20, "X"),
                utxo("foreign", 3, "Y"),
                utxo("O1", 20, "X"),
                utxo("O2", 1, "X"),
            ],
        );

        assert_eq!(report.inserted, 2);
        assert_eq!(report.anomalies.len(), 3);
        assert!(matches!(
            &report.anomalies[0],
            LedgerError::AnomalousRecord { id, .. } if *id == OutputId::new("zero", 0)
        ));
        assert_eq!(store.balance().unwrap(), 21);
    }

    #[test]
    fn fetched_records_land_in_address_shard() {
        let mut store = UTxOStore::new();
        let report = reconcile(
            &mut store,
            &PendingSpends::default(),
            &x(),
            ShardKey::new(3),
            vec![utxo("O1", 20, "X")],
        );
        assert_eq!(report.inserted, 1);
        assert_eq!(store.shard_keys(), vec![ShardKey::new(3)]);
    }
}
