use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    chain::{tx::Call, tx::Receipt, Chain, ChainError, SnapshotId, DEV_CHAIN_ID},
    primitives::{hex_bytes32, Address, ParseError},
    verify::{self, VerificationRequest, VerificationStatus, Verifier},
    wallet::Wallet,
};

pub const DECIMALS: u8 = 8;
/// 2000 USD with 8 decimals.
pub const INITIAL_ANSWER: i128 = 200_000_000_000;
pub const DEVELOPMENT_CHAINS: [&str; 2] = ["hardhat", "localhost"];

pub const MOCK_AGGREGATOR: &str = "MockV3Aggregator";
pub const FUND_ME: &str = "FundMe";

/// chain id, network name, ETH/USD feed
const NETWORK_CONFIG: [(u64, &str, &str); 2] = [
    (4, "rinkeby", "0x8A753747A1Fa494EC906cE90E9f37563A8AF630e"),
    (137, "polygon", "0x0715A7794a1dc8e42615F059dD6e406A6594651A"),
];

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("no deployment named {0}")]
    MissingDeployment(String),
    #[error("no price feed configured for chain {0}")]
    UnknownChain(u64),
    #[error("receipt for {0} has no contract address")]
    NotACreation(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Address(#[from] ParseError),
}

pub fn is_development(network: &str) -> bool {
    DEVELOPMENT_CHAINS.contains(&network)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkEntry {
    pub name: &'static str,
    pub eth_usd_price_feed: Address,
}

pub fn network_entry(chain_id: u64) -> Result<Option<NetworkEntry>, DeployError> {
    for (id, name, feed) in NETWORK_CONFIG {
        if id == chain_id {
            return Ok(Some(NetworkEntry {
                name,
                eth_usd_price_feed: feed.parse()?,
            }));
        }
    }
    Ok(None)
}

/// The network a deployment targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
    pub block_confirmations: u64,
}

impl Network {
    pub fn development(name: &str) -> Self {
        Self {
            name: name.to_string(),
            chain_id: DEV_CHAIN_ID,
            block_confirmations: 1,
        }
    }

    /// Mocks are deployed and verification is skipped on these networks.
    pub fn is_development(&self) -> bool {
        is_development(&self.name) || self.chain_id == DEV_CHAIN_ID
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub contract: String,
    pub address: Address,
    pub args: Vec<String>,
    #[serde(with = "hex_bytes32")]
    pub transaction_hash: [u8; 32],
    pub block_number: u64,
    pub deployer: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationStatus>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployments {
    entries: BTreeMap<String, Deployment>,
}

impl Deployments {
    pub fn get(&self, name: &str) -> Result<&Deployment, DeployError> {
        self.entries
            .get(name)
            .ok_or_else(|| DeployError::MissingDeployment(name.to_string()))
    }

    pub fn save(&mut self, name: &str, deployment: Deployment) {
        self.entries.insert(name.to_string(), deployment);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Deployment)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Existing deployment of `contract` that is still live on `chain`.
    fn live(&self, chain: &Chain, name: &str, contract: &str) -> Option<&Deployment> {
        let deployment = self.entries.get(name)?;
        match chain.contract(&deployment.address) {
            Ok(live) if live.name() == contract => Some(deployment),
            _ => None,
        }
    }
}

pub struct DeployContext<'a> {
    pub chain: &'a mut Chain,
    pub deployments: &'a mut Deployments,
    pub network: &'a Network,
    pub deployer: &'a Wallet,
    pub verifier: &'a mut dyn Verifier,
    pub etherscan_api_key: Option<&'a str>,
}

impl DeployContext<'_> {
    fn deploy(&mut self, name: &str, call: Call, args: Vec<String>) -> Result<Deployment, DeployError> {
        let receipt: Receipt = self.chain.transact(self.deployer, None, 0, call)?;
        let address = receipt
            .contract_address
            .ok_or_else(|| DeployError::NotACreation(name.to_string()))?;
        info!(
            contract = name,
            %address,
            tx = %receipt.hash_hex(),
            gas_used = receipt.gas_used,
            "deployed"
        );
        let deployment = Deployment {
            contract: name.to_string(),
            address,
            args,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            deployer: self.deployer.address(),
            verification: None,
        };
        self.deployments.save(name, deployment.clone());
        Ok(deployment)
    }
}

pub trait DeployScript {
    fn id(&self) -> &'static str;
    fn tags(&self) -> &'static [&'static str];
    fn run(&self, ctx: &mut DeployContext<'_>) -> Result<(), DeployError>;
}

/// Deploys the mock price feed on development networks.
pub struct DeployMocks;

impl DeployScript for DeployMocks {
    fn id(&self) -> &'static str {
        "00-deploy-mocks"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["all", "mocks"]
    }

    fn run(&self, ctx: &mut DeployContext<'_>) -> Result<(), DeployError> {
        if !ctx.network.is_development() {
            return Ok(());
        }
        if let Some(existing) = ctx.deployments.live(ctx.chain, MOCK_AGGREGATOR, MOCK_AGGREGATOR) {
            info!(address = %existing.address, "reusing MockV3Aggregator");
            return Ok(());
        }
        info!(network = %ctx.network.name, "local network detected, deploying mocks");
        ctx.deploy(
            MOCK_AGGREGATOR,
            Call::DeployAggregator {
                decimals: DECIMALS,
                initial_answer: INITIAL_ANSWER,
            },
            vec![DECIMALS.to_string(), INITIAL_ANSWER.to_string()],
        )?;
        Ok(())
    }
}

pub struct DeployFundMe;

impl DeployFundMe {
    fn price_feed(ctx: &DeployContext<'_>) -> Result<Address, DeployError> {
        if ctx.network.is_development() {
            return Ok(ctx.deployments.get(MOCK_AGGREGATOR)?.address);
        }
        network_entry(ctx.network.chain_id)?
            .map(|entry| entry.eth_usd_price_feed)
            .ok_or(DeployError::UnknownChain(ctx.network.chain_id))
    }
}

impl DeployScript for DeployFundMe {
    fn id(&self) -> &'static str {
        "01-deploy-fund-me"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["all", "fundme"]
    }

    fn run(&self, ctx: &mut DeployContext<'_>) -> Result<(), DeployError> {
        let chain_id = ctx.network.chain_id;
        let price_feed = Self::price_feed(ctx)?;
        info!(chain_id, %price_feed, "resolved ETH/USD price feed");

        if let Some(existing) = ctx.deployments.live(ctx.chain, FUND_ME, FUND_ME) {
            if existing.args == [price_feed.to_string()] {
                info!(address = %existing.address, "reusing FundMe");
                return Ok(());
            }
        }

        let mut deployment = ctx.deploy(
            FUND_ME,
            Call::DeployFundMe { price_feed },
            vec![price_feed.to_string()],
        )?;
        // the deployment block is the first confirmation
        let confirmations = ctx.network.block_confirmations.max(1);
        ctx.chain.mine(confirmations - 1);
        info!(confirmations, "deployment confirmed");

        let status = match ctx.etherscan_api_key {
            _ if ctx.network.is_development() => VerificationStatus::Skipped {
                reason: "development chain".into(),
            },
            None => VerificationStatus::Skipped {
                reason: "no explorer API key".into(),
            },
            Some(_) => submit_verification(ctx.verifier, chain_id, deployment.address, price_feed),
        };
        deployment.verification = Some(status);
        ctx.deployments.save(FUND_ME, deployment);
        Ok(())
    }
}

fn submit_verification(
    verifier: &mut dyn Verifier,
    chain_id: u64,
    address: Address,
    price_feed: Address,
) -> VerificationStatus {
    let outcome = VerificationRequest::new(chain_id, address, FUND_ME, &[price_feed])
        .and_then(|request| verify::verify(verifier, &request));
    match outcome {
        Ok(status) => status,
        Err(err) => {
            warn!(%address, "verification failed: {err}");
            VerificationStatus::Failed {
                reason: err.to_string(),
            }
        }
    }
}

pub fn scripts() -> Vec<Box<dyn DeployScript>> {
    vec![Box::new(DeployMocks), Box::new(DeployFundMe)]
}

/// Runs every script carrying one of `tags` (all scripts when empty) and
/// returns the ids that ran.
pub fn run(ctx: &mut DeployContext<'_>, tags: &[String]) -> Result<Vec<&'static str>, DeployError> {
    let mut ran = Vec::new();
    for script in scripts() {
        let selected = tags.is_empty()
            || script
                .tags()
                .iter()
                .any(|tag| tags.iter().any(|wanted| wanted == tag));
        if !selected {
            continue;
        }
        info!(script = script.id(), network = %ctx.network.name, "running deploy script");
        script.run(ctx)?;
        ran.push(script.id());
    }
    if ran.is_empty() {
        warn!(?tags, "no deploy script matches the requested tags");
    }
    Ok(ran)
}

/// Deploys once, then hands every later caller the same fresh state.
pub struct Fixture {
    tags: Vec<String>,
    saved: Option<(SnapshotId, Deployments)>,
}

impl Fixture {
    pub fn new(tags: &[&str]) -> Self {
        Self {
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            saved: None,
        }
    }

    pub fn load(&mut self, ctx: &mut DeployContext<'_>) -> Result<(), DeployError> {
        match self.saved.take() {
            Some((id, deployments)) => {
                ctx.chain.revert(id)?;
                *ctx.deployments = deployments;
            }
            None => {
                run(ctx, &self.tags)?;
            }
        }
        let id = ctx.chain.snapshot();
        self.saved = Some((id, ctx.deployments.clone()));
        Ok(())
    }
}
