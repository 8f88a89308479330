use crate::error::{LedgerError, LedgerResult};
use crate::output::{Address, Amount, Output, OutputId, ShardKey};
use std::collections::{BTreeMap, HashMap};

/// One partition. `order` keeps insertion order, overwrites keep their slot.
#[derive(Default, Debug, Clone)]
struct Shard {
    entries: HashMap<OutputId, (u64, Output)>,
    order: BTreeMap<u64, OutputId>,
}

impl Shard {
    fn iter(&self) -> impl Iterator<Item = &Output> + '_ {
        self.order
            .values()
            .filter_map(move |id| self.entries.get(id).map(|(_, output)| output))
    }

    fn remove(&mut self, id: &OutputId) -> Option<Output> {
        let (sequence, output) = self.entries.remove(id)?;
        self.order.remove(&sequence);
        Some(output)
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Unspent outputs partitioned by shard key.
///
/// Every identifier lives in at most one shard; `locator` tracks which.
#[derive(Default, Debug, Clone)]
pub struct UTxOStore {
    shards: BTreeMap<ShardKey, Shard>,
    locator: HashMap<OutputId, ShardKey>,
    next_sequence: u64,
}

impl UTxOStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites `output`, returning the record it replaced.
    pub fn insert(&mut self, output: Output) -> LedgerResult<Option<Output>> {
        if output.amount == 0 {
            return Err(LedgerError::invariant(format!(
                "zero-value output {} can't be stored",
                output.id
            )));
        }

        let mut previous = None;
        if let Some(current_shard) = self.locator.get(&output.id).cloned() {
            if current_shard != output.shard {
                previous = self.remove(&output.id);
            }
        }

        let shard = self.shards.entry(output.shard).or_default();
        if let Some((_, slot)) = shard.entries.get_mut(&output.id) {
            return Ok(Some(std::mem::replace(slot, output)));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.locator.insert(output.id.clone(), output.shard);
        shard.order.insert(sequence, output.id.clone());
        shard.entries.insert(output.id.clone(), (sequence, output));

        Ok(previous)
    }

    /// Deletes `id` if present. Removing an unknown id is not an error.
    pub fn remove(&mut self, id: &OutputId) -> Option<Output> {
        let shard_key = self.locator.remove(id)?;
        let shard = self.shards.get_mut(&shard_key)?;
        let removed = shard.remove(id);
        if shard.is_empty() {
            self.shards.remove(&shard_key);
        }
        removed
    }

    pub fn get(&self, id: &OutputId) -> Option<&Output> {
        let shard_key = self.locator.get(id)?;
        self.shards
            .get(shard_key)
            .and_then(|shard| shard.entries.get(id))
            .map(|(_, output)| output)
    }

    pub fn contains(&self, id: &OutputId) -> bool {
        self.locator.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_keys(&self) -> Vec<ShardKey> {
        self.shards.keys().cloned().collect()
    }

    /// Outputs in insertion order within a shard and ascending shard order across shards.
    /// Pass a shard key to restrict the walk to that shard.
    pub fn iter(&self, shard_filter: Option<ShardKey>) -> impl Iterator<Item = &Output> + '_ {
        self.shards
            .iter()
            .filter(move |(key, _)| shard_filter.map_or(true, |filter| **key == filter))
            .flat_map(|(_, shard)| shard.iter())
    }

    pub fn balance(&self) -> LedgerResult<Amount> {
        sum_amounts(self.iter(None))
    }

    pub fn balance_of(&self, address: &Address) -> LedgerResult<Amount> {
        sum_amounts(self.iter(None).filter(|output| output.is_owned_by(address)))
    }

    /// Identifiers owned by `address` inside `shard`, in iteration order.
    pub fn ids_owned_by(&self, address: &Address, shard: ShardKey) -> Vec<OutputId> {
        self.iter(Some(shard))
            .filter(|output| output.is_owned_by(address))
            .map(|output| output.id.clone())
            .collect()
    }
}

fn sum_amounts<'a>(mut outputs: impl Iterator<Item = &'a Output>) -> LedgerResult<Amount> {
    outputs.try_fold(0 as Amount, |total, output| {
        total
            .checked_add(output.amount)
            .ok_or_else(|| LedgerError::invariant("stored balance overflows"))
    })
}
