#![allow(dead_code)]

use std::error::Error;

use fundme::{
    chain::{tx::Call, tx::Receipt, Chain, ChainError},
    deploy::{DeployContext, Deployments, Fixture, Network, FUND_ME, MOCK_AGGREGATOR},
    primitives::WEI_PER_ETHER,
    verify::MemoryVerifier,
    Address, FundMe, Wallet, Wei,
};

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

pub const SEND_VALUE: Wei = WEI_PER_ETHER;

/// Dev chain with the `all` deploy scripts applied, deployer is account 0.
pub struct TestHarness {
    pub chain: Chain,
    pub deployments: Deployments,
    pub deployer: Wallet,
    pub fund_me: Address,
    pub price_feed: Address,
}

impl TestHarness {
    pub fn new() -> TestResult<Self> {
        let mut chain = Chain::dev();
        let mut deployments = Deployments::default();
        let deployer = Wallet::dev(0);
        let network = Network::development("hardhat");
        let mut verifier = MemoryVerifier::default();
        let mut ctx = DeployContext {
            chain: &mut chain,
            deployments: &mut deployments,
            network: &network,
            deployer: &deployer,
            verifier: &mut verifier,
            etherscan_api_key: None,
        };
        Fixture::new(&["all"]).load(&mut ctx)?;

        let fund_me = deployments.get(FUND_ME)?.address;
        let price_feed = deployments.get(MOCK_AGGREGATOR)?.address;
        Ok(Self {
            chain,
            deployments,
            deployer,
            fund_me,
            price_feed,
        })
    }

    pub fn account(index: u32) -> Wallet {
        Wallet::dev(index)
    }

    pub fn contract(&self) -> TestResult<&FundMe> {
        Ok(self.chain.fund_me(&self.fund_me)?)
    }

    pub fn fund(&mut self, from: &Wallet, value: Wei) -> Result<Receipt, ChainError> {
        self.chain.transact(from, Some(self.fund_me), value, Call::Fund)
    }

    pub fn withdraw(&mut self, from: &Wallet) -> Result<Receipt, ChainError> {
        self.chain.transact(from, Some(self.fund_me), 0, Call::Withdraw)
    }

    pub fn cheaper_withdraw(&mut self, from: &Wallet) -> Result<Receipt, ChainError> {
        self.chain
            .transact(from, Some(self.fund_me), 0, Call::CheaperWithdraw)
    }

    pub fn balance(&self, address: &Address) -> Wei {
        self.chain.balance(address)
    }
}
