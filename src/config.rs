use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    chain::{DEV_ACCOUNT_COUNT, DEV_CHAIN_ID},
    deploy::Network,
    wallet::{Wallet, WalletError},
};

pub const DEFAULT_CONFIG_FILE: &str = "fundme.config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("network {0} is not configured")]
    UnknownNetwork(String),
    #[error("account {index} of network {network}: {source}")]
    Account {
        network: String,
        index: usize,
        #[source]
        source: WalletError,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub default_network: String,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub etherscan: EtherscanConfig,
    pub gas_reporter: GasReporterConfig,
    /// Where per-network chain state and deployments are kept.
    pub state_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub url: Option<String>,
    /// Hex secret keys. Empty means the deterministic development accounts.
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub block_confirmations: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EtherscanConfig {
    pub api_key: Option<String>,
    pub outbox: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GasReporterConfig {
    pub enabled: bool,
    pub output_file: Option<PathBuf>,
    pub no_colors: bool,
    pub currency: String,
    pub token: String,
    pub coinmarketcap: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let dev = NetworkConfig {
            chain_id: DEV_CHAIN_ID,
            url: None,
            accounts: Vec::new(),
            block_confirmations: None,
        };
        let mut networks = BTreeMap::new();
        networks.insert("hardhat".to_string(), dev.clone());
        networks.insert(
            "localhost".to_string(),
            NetworkConfig {
                url: Some("http://127.0.0.1:8545".into()),
                ..dev
            },
        );
        networks.insert(
            "rinkeby".to_string(),
            NetworkConfig {
                chain_id: 4,
                url: None,
                accounts: Vec::new(),
                block_confirmations: Some(6),
            },
        );
        Self {
            default_network: "hardhat".into(),
            networks,
            etherscan: EtherscanConfig::default(),
            gas_reporter: GasReporterConfig::default(),
            state_dir: PathBuf::from(".fundme"),
        }
    }
}

impl Default for EtherscanConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            outbox: PathBuf::from("verify-outbox"),
        }
    }
}

impl Default for GasReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_file: Some(PathBuf::from("gas-report.txt")),
            no_colors: true,
            currency: "USD".into(),
            token: "MATIC".into(),
            coinmarketcap: None,
        }
    }
}

impl Config {
    /// Reads `path`, falling back to the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Applies `RINKEBY_RPC_URL`, `RINKEBY_PRIVATE_KEY`, `ETHERSCAN_API_KEY`
    /// and `COINMARKETCAP_API_KEY`. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(rinkeby) = self.networks.get_mut("rinkeby") {
            if let Some(url) = var("RINKEBY_RPC_URL") {
                rinkeby.url = Some(url);
            }
            if let Some(key) = var("RINKEBY_PRIVATE_KEY") {
                rinkeby.accounts = vec![key];
            }
        }
        if let Some(key) = var("ETHERSCAN_API_KEY") {
            self.etherscan.api_key = Some(key);
        }
        if let Some(key) = var("COINMARKETCAP_API_KEY") {
            self.gas_reporter.coinmarketcap = Some(key);
        }
    }

    pub fn network_config(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }

    pub fn network(&self, name: &str) -> Result<Network, ConfigError> {
        let config = self.network_config(name)?;
        Ok(Network {
            name: name.to_string(),
            chain_id: config.chain_id,
            block_confirmations: config.confirmations(),
        })
    }

    /// Signing accounts for `name`; index 0 is the deployer.
    pub fn wallets(&self, name: &str) -> Result<Vec<Wallet>, ConfigError> {
        self.network_config(name)?.wallets(name)
    }

    pub fn state_file(&self, network: &str) -> PathBuf {
        self.state_dir.join(format!("{network}.json"))
    }
}

impl NetworkConfig {
    pub fn confirmations(&self) -> u64 {
        self.block_confirmations.unwrap_or(1).max(1)
    }

    pub fn wallets(&self, network: &str) -> Result<Vec<Wallet>, ConfigError> {
        if self.accounts.is_empty() {
            return Ok((0..DEV_ACCOUNT_COUNT).map(Wallet::dev).collect());
        }
        self.accounts
            .iter()
            .enumerate()
            .map(|(index, secret)| {
                Wallet::from_secret_hex(secret).map_err(|source| ConfigError::Account {
                    network: network.to_string(),
                    index,
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_hardhat_setup() {
        let config = Config::default();
        assert_eq!(config.default_network, "hardhat");
        let rinkeby = config.network("rinkeby").unwrap();
        assert_eq!(rinkeby.chain_id, 4);
        assert_eq!(rinkeby.block_confirmations, 6);
        assert_eq!(config.network("localhost").unwrap().chain_id, DEV_CHAIN_ID);
        assert_eq!(config.network("hardhat").unwrap().block_confirmations, 1);
        assert_eq!(config.gas_reporter.token, "MATIC");
        assert_eq!(
            config.gas_reporter.output_file.as_deref(),
            Some(Path::new("gas-report.txt"))
        );
    }

    #[test]
    fn unknown_network_is_an_error() {
        assert!(matches!(
            Config::default().network("mainnet"),
            Err(ConfigError::UnknownNetwork(name)) if name == "mainnet"
        ));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "default_network": "localhost", "gas_reporter": { "enabled": false } }"#,
        )
        .unwrap();
        assert_eq!(config.default_network, "localhost");
        assert!(!config.gas_reporter.enabled);
        assert_eq!(config.gas_reporter.currency, "USD");
        assert!(config.networks.contains_key("rinkeby"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join(format!("fundme-missing-{}.json", rand::random::<u64>()));
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn environment_overrides_rinkeby_and_keys() {
        let wallet = Wallet::random();
        let secret = wallet.secret_hex();
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "RINKEBY_RPC_URL" => Some("https://rinkeby.example".into()),
            "RINKEBY_PRIVATE_KEY" => Some(secret.clone()),
            "ETHERSCAN_API_KEY" => Some("etherscan".into()),
            "COINMARKETCAP_API_KEY" => Some("  ".into()),
            _ => None,
        });
        let rinkeby = config.network_config("rinkeby").unwrap();
        assert_eq!(rinkeby.url.as_deref(), Some("https://rinkeby.example"));
        assert_eq!(config.wallets("rinkeby").unwrap()[0].address(), wallet.address());
        assert_eq!(config.etherscan.api_key.as_deref(), Some("etherscan"));
        assert_eq!(config.gas_reporter.coinmarketcap, None);
    }

    #[test]
    fn dev_networks_use_dev_accounts() {
        let wallets = Config::default().wallets("hardhat").unwrap();
        assert_eq!(wallets.len(), DEV_ACCOUNT_COUNT as usize);
        assert_eq!(wallets[0].address(), Wallet::dev(0).address());
    }

    #[test]
    fn malformed_account_reports_its_index() {
        let mut config = Config::default();
        if let Some(rinkeby) = config.networks.get_mut("rinkeby") {
            rinkeby.accounts = vec!["not-hex".into()];
        }
        assert!(matches!(
            config.wallets("rinkeby"),
            Err(ConfigError::Account { index: 0, .. })
        ));
    }
}
