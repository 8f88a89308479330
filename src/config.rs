use crate::chain::ChainProfile;
use crate::ledger::selection::SelectionStrategy;
use crate::ledger::sharding::ShardingScheme;
use crate::output::Address;
use anyhow::Context;
use itertools::Itertools;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    pub recipient: Address,
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    pub chain: ChainProfile,
    /// overrides the sharding of the chain profile
    #[serde(default)]
    pub sharding: Option<ShardingScheme>,
    pub self_address: Address,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub selection: SelectionStrategy,
    pub fixtures_path: PathBuf,
    pub payment: Option<PaymentConfig>,
    pub snapshot_path: Option<PathBuf>,
    pub stats_path: Option<PathBuf>,
}

impl WalletConfig {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let file = File::open(config_path).with_context(|| {
            format!(
                "Cannot read config file {path}",
                path = config_path.display()
            )
        })?;
        let config: WalletConfig = serde_yaml::from_reader(file).with_context(|| {
            format!(
                "Cannot read config file {path}",
                path = config_path.display()
            )
        })?;
        Ok(config)
    }

    pub fn sharding(&self) -> ShardingScheme {
        self.sharding.unwrap_or_else(|| self.chain.sharding())
    }

    /// Configured addresses followed by the change address, without repeats.
    pub fn sync_addresses(&self) -> Vec<Address> {
        self.addresses
            .iter()
            .chain(std::iter::once(&self.self_address))
            .unique()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::ChainProfile;
    use crate::config::WalletConfig;
    use crate::ledger::selection::SelectionStrategy;
    use crate::ledger::sharding::ShardingScheme;
    use crate::output::Address;
    use std::io::Write;

    const CONFIG: &str = "
chain: alephium
self_address: me
addresses:
  - savings
  - me
selection: largest_first
fixtures_path: fixtures.jsonl
payment:
  recipient: bob
  amount: 50
snapshot_path: store.jsonl
stats_path: ~
";

    #[test]
    fn parse_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = WalletConfig::load(file.path()).unwrap();
        assert_eq!(config.chain, ChainProfile::Alephium);
        assert_eq!(config.sharding(), ShardingScheme::Hashed { shards: 4 });
        assert_eq!(config.selection, SelectionStrategy::LargestFirst);
        assert_eq!(config.payment.as_ref().unwrap().amount, 50);
        assert!(config.stats_path.is_none());
        assert_eq!(
            config.sync_addresses(),
            vec![Address::new("savings"), Address::new("me")]
        );
    }

    #[test]
    fn sharding_override_and_defaults() {
        let config: WalletConfig = serde_yaml::from_str(
            "
chain: bitcoin
sharding:
  type: hashed
  shards: 2
self_address: me
fixtures_path: fixtures.jsonl
",
        )
        .unwrap();
        assert_eq!(config.sharding(), ShardingScheme::Hashed { shards: 2 });
        assert_eq!(config.selection, SelectionStrategy::FirstFit);
        assert!(config.payment.is_none());
        assert_eq!(config.sync_addresses(), vec![Address::new("me")]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<WalletConfig, _> = serde_yaml::from_str(
            "
chain: cardano
self_address: me
fixtures_path: fixtures.jsonl
fee_rate: 3
",
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_has_context() {
        let err = WalletConfig::load(std::path::Path::new("/definitely/not/here.yml")).unwrap_err();
        assert!(err.to_string().starts_with("Cannot read config file"));
    }
}
