use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;
use std::str::FromStr;

/// Value in the smallest unit of the chain.
pub type Amount = u64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Partition of the store. Unsharded chains put everything in [`ShardKey::IMPLICIT`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShardKey(u32);

impl ShardKey {
    pub const IMPLICIT: ShardKey = ShardKey(0);

    pub const fn new(key: u32) -> Self {
        Self(key)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pointer to an output: transaction id and position inside that transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputId {
    #[serde(rename = "tx")]
    pub transaction_id: TransactionId,
    #[serde(rename = "idx")]
    pub output_index: u32,
}

impl OutputId {
    pub fn new(transaction_id: impl Into<String>, output_index: u32) -> Self {
        Self {
            transaction_id: TransactionId::new(transaction_id),
            output_index,
        }
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.transaction_id, self.output_index)
    }
}

impl FromStr for OutputId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx, index) = s
            .rsplit_once('#')
            .ok_or_else(|| anyhow!("can't parse output id: {:?}", s))?;
        if tx.is_empty() {
            return Err(anyhow!("empty transaction id in output id: {:?}", s));
        }
        Ok(OutputId::new(tx, u32::from_str(index)?))
    }
}

/// Chain-specific attachment (e.g. a datum). Opaque to the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded)
            .map(Payload)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub id: OutputId,
    pub amount: Amount,
    pub address: Address,
    pub shard: ShardKey,
    pub payload: Option<Payload>,
}

impl Output {
    pub fn new(id: OutputId, amount: Amount, address: Address, shard: ShardKey) -> Self {
        Self {
            id,
            amount,
            address,
            shard,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_owned_by(&self, address: &Address) -> bool {
        &self.address == address
    }
}
