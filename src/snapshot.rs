use crate::ledger::store::UTxOStore;
use crate::output::{Address, Amount, Output, OutputId, Payload, ShardKey, TransactionId};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Flat persisted form of an output, one JSON object per line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputRecord {
    #[serde(rename = "tx")]
    pub transaction_id: TransactionId,
    #[serde(rename = "idx")]
    pub output_index: u32,
    #[serde(rename = "amt")]
    pub amount: Amount,
    #[serde(rename = "addr")]
    pub address: Address,
    #[serde(default)]
    pub shard: ShardKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl From<Output> for OutputRecord {
    fn from(output: Output) -> Self {
        OutputRecord {
            transaction_id: output.id.transaction_id,
            output_index: output.id.output_index,
            amount: output.amount,
            address: output.address,
            shard: output.shard,
            payload: output.payload,
        }
    }
}

impl From<OutputRecord> for Output {
    fn from(record: OutputRecord) -> Self {
        Output {
            id: OutputId {
                transaction_id: record.transaction_id,
                output_index: record.output_index,
            },
            amount: record.amount,
            address: record.address,
            shard: record.shard,
            payload: record.payload,
        }
    }
}

pub fn dump_to_file(path: PathBuf, store: &UTxOStore) -> anyhow::Result<usize> {
    let mut output = File::create(&path)
        .with_context(|| format!("Cannot create snapshot {path}", path = path.display()))?;
    let mut count = 0;
    for utxo in store.iter(None) {
        let record = OutputRecord::from(utxo.clone());
        output.write_all(format!("{}\n", serde_json::to_string(&record)?).as_bytes())?;
        count += 1;
    }
    Ok(count)
}

/// Rebuilds a store from a snapshot. Zero-value records are rejected by the store.
pub fn load_from_file(path: PathBuf) -> anyhow::Result<UTxOStore> {
    let file = File::open(&path)
        .with_context(|| format!("Cannot read snapshot {path}", path = path.display()))?;

    let mut store = UTxOStore::new();
    for (num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: OutputRecord = serde_json::from_str(&line)
            .with_context(|| format!("can't parse snapshot line {}", num + 1))?;
        store
            .insert(Output::from(record))
            .with_context(|| format!("can't restore snapshot line {}", num + 1))?;
    }
    Ok(store)
}
