use crate::output::{Address, ShardKey};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// How a chain assigns addresses to shards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum ShardingScheme {
    #[default]
    Unsharded,
    Hashed { shards: u32 },
}

impl ShardingScheme {
    pub fn shard_count(&self) -> u32 {
        match self {
            ShardingScheme::Unsharded => 1,
            ShardingScheme::Hashed { shards } => (*shards).max(1),
        }
    }

    /// First four bytes of SHA-256(address), big endian, modulo the shard count.
    pub fn shard_of(&self, address: &Address) -> ShardKey {
        match self {
            ShardingScheme::Unsharded => ShardKey::IMPLICIT,
            ShardingScheme::Hashed { .. } => {
                let digest = Sha256::digest(address.as_str().as_bytes());
                let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
                ShardKey::new(prefix % self.shard_count())
            }
        }
    }
}
