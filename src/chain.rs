use crate::ledger::sharding::ShardingScheme;
use crate::output::{Address, Output, ShardKey, TransactionId};
use crate::snapshot::OutputRecord;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Serialized and signed transaction, produced outside of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction(Vec<u8>);

impl SignedTransaction {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Everything the ledger needs from a chain.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    fn chain_name(&self) -> &str;

    /// Pure and deterministic.
    fn shard_of(&self, address: &Address) -> ShardKey;

    /// Address receiving change.
    fn self_address(&self) -> Address;

    /// Point-in-time snapshot of the unspent outputs of `address`.
    async fn fetch_unspent(&self, address: &Address) -> anyhow::Result<Vec<Output>>;

    async fn broadcast(&self, transaction: &SignedTransaction) -> anyhow::Result<TransactionId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainProfile {
    Alephium,
    Bitcoin,
    Cardano,
}

impl ChainProfile {
    pub const ALEPHIUM_SHARDS: u32 = 4;

    pub fn name(&self) -> &'static str {
        match self {
            ChainProfile::Alephium => "alephium",
            ChainProfile::Bitcoin => "bitcoin",
            ChainProfile::Cardano => "cardano",
        }
    }

    pub fn sharding(&self) -> ShardingScheme {
        match self {
            ChainProfile::Alephium => ShardingScheme::Hashed {
                shards: Self::ALEPHIUM_SHARDS,
            },
            ChainProfile::Bitcoin | ChainProfile::Cardano => ShardingScheme::Unsharded,
        }
    }
}

/// Backend answering from snapshots kept in memory. Broadcasts are recorded and get
/// the hex SHA-256 of the transaction bytes as id.
pub struct StaticChainBackend {
    name: String,
    sharding: ShardingScheme,
    self_address: Address,
    unspent: Mutex<HashMap<Address, Vec<Output>>>,
    broadcasts: Mutex<Vec<SignedTransaction>>,
    reject_broadcasts: AtomicBool,
}

impl StaticChainBackend {
    pub fn new(name: impl Into<String>, sharding: ShardingScheme, self_address: Address) -> Self {
        Self {
            name: name.into(),
            sharding,
            self_address,
            unspent: Default::default(),
            broadcasts: Default::default(),
            reject_broadcasts: AtomicBool::new(false),
        }
    }

    pub fn for_profile(profile: ChainProfile, self_address: Address) -> Self {
        Self::new(profile.name(), profile.sharding(), self_address)
    }

    pub fn set_unspent(&self, address: Address, outputs: Vec<Output>) -> anyhow::Result<()> {
        let mut unspent = self
            .unspent
            .lock()
            .map_err(|_| anyhow!("unspent snapshot lock poisoned"))?;
        unspent.insert(address, outputs);
        Ok(())
    }

    /// Replaces the served snapshots with a JSON-lines file of output records.
    pub fn load_fixtures(&self, path: &Path) -> anyhow::Result<usize> {
        let file = File::open(path)
            .with_context(|| format!("Cannot read fixtures {path}", path = path.display()))?;

        let mut by_address = HashMap::<Address, Vec<Output>>::new();
        let mut count = 0;
        for (line_number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: OutputRecord = serde_json::from_str(&line).with_context(|| {
                format!("can't parse fixture line {}", line_number + 1)
            })?;
            let output = Output::from(record);
            by_address
                .entry(output.address.clone())
                .or_default()
                .push(output);
            count += 1;
        }

        let mut unspent = self
            .unspent
            .lock()
            .map_err(|_| anyhow!("unspent snapshot lock poisoned"))?;
        *unspent = by_address;
        Ok(count)
    }

    pub fn reject_broadcasts(&self, reject: bool) {
        self.reject_broadcasts.store(reject, Ordering::SeqCst);
    }

    pub fn broadcasts(&self) -> anyhow::Result<Vec<SignedTransaction>> {
        let broadcasts = self
            .broadcasts
            .lock()
            .map_err(|_| anyhow!("broadcast log lock poisoned"))?;
        Ok(broadcasts.clone())
    }
}

#[async_trait]
impl ChainBackend for StaticChainBackend {
    fn chain_name(&self) -> &str {
        &self.name
    }

    fn shard_of(&self, address: &Address) -> ShardKey {
        self.sharding.shard_of(address)
    }

    fn self_address(&self) -> Address {
        self.self_address.clone()
    }

    async fn fetch_unspent(&self, address: &Address) -> anyhow::Result<Vec<Output>> {
        let unspent = self
            .unspent
            .lock()
            .map_err(|_| anyhow!("unspent snapshot lock poisoned"))?;
        Ok(unspent.get(address).cloned().unwrap_or_default())
    }

    async fn broadcast(&self, transaction: &SignedTransaction) -> anyhow::Result<TransactionId> {
        if self.reject_broadcasts.load(Ordering::SeqCst) {
            return Err(anyhow!("{} node rejected the transaction", self.name));
        }
        let mut broadcasts = self
            .broadcasts
            .lock()
            .map_err(|_| anyhow!("broadcast log lock poisoned"))?;
        broadcasts.push(transaction.clone());
        Ok(TransactionId::new(hex::encode(Sha256::digest(
            transaction.as_bytes(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::{ChainBackend, ChainProfile, SignedTransaction, StaticChainBackend};
    use crate::ledger::sharding::ShardingScheme;
    use crate::output::{Address, Output, OutputId, ShardKey};
    use std::io::Write;

    #[test]
    fn profiles_pick_sharding() {
        assert_eq!(
            ChainProfile::Alephium.sharding(),
            ShardingScheme::Hashed { shards: 4 }
        );
        assert_eq!(ChainProfile::Bitcoin.sharding(), ShardingScheme::Unsharded);
        assert_eq!(ChainProfile::Cardano.sharding(), ShardingScheme::Unsharded);

        let backend = StaticChainBackend::for_profile(ChainProfile::Bitcoin, Address::new("me"));
        assert_eq!(backend.chain_name(), "bitcoin");
        assert_eq!(backend.shard_of(&Address::new("any")), ShardKey::IMPLICIT);
    }

    #[tokio::test]
    async fn serves_snapshots_and_records_broadcasts() {
        let backend = StaticChainBackend::new("test", ShardingScheme::Unsharded, Address::new("me"));
        let output = Output::new(OutputId::new("a", 0), 5, Address::new("me"), ShardKey::IMPLICIT);
        backend
            .set_unspent(Address::new("me"), vec![output.clone()])
            .unwrap();

        assert_eq!(
            backend.fetch_unspent(&Address::new("me")).await.unwrap(),
            vec![output]
        );
        assert!(backend
            .fetch_unspent(&Address::new("other"))
            .await
            .unwrap()
            .is_empty());

        let id = backend
            .broadcast(&SignedTransaction::new(b"abc".to_vec()))
            .await
            .unwrap();
        assert_eq!(
            id.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(backend.broadcasts().unwrap().len(), 1);

        backend.reject_broadcasts(true);
        assert!(backend
            .broadcast(&SignedTransaction::new(b"abc".to_vec()))
            .await
            .is_err());
        assert_eq!(backend.broadcasts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn loads_fixture_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"tx":"a","idx":0,"amt":30,"addr":"me"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"tx":"b","idx":1,"amt":5,"addr":"other","payload":"00ff"}}"#
        )
        .unwrap();

        let backend = StaticChainBackend::new("test", ShardingScheme::Unsharded, Address::new("me"));
        assert_eq!(backend.load_fixtures(file.path()).unwrap(), 2);

        let other = backend.fetch_unspent(&Address::new("other")).await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].id, OutputId::new("b", 1));
        assert_eq!(other[0].payload.as_ref().unwrap().as_bytes(), &[0u8, 255u8]);
    }
}
