//! FundMe: a crowdfunding contract that accepts contributions above a USD
//! minimum, priced through an ETH/USD feed, and lets its owner withdraw
//! everything.
//!
//! The contract runs on an in-process development chain ([`chain::Chain`])
//! that signs, meters and mines transactions. [`deploy`] holds the deploy
//! scripts and the deployments registry, [`verify`] the explorer
//! verification requests.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod deploy;
pub mod oracle;
pub mod primitives;
pub mod report;
pub mod session;
pub mod verify;
pub mod wallet;

pub use {
    chain::{Chain, ChainError},
    contracts::{FundMe, FundMeError, MINIMUM_USD},
    primitives::{Address, Wei},
    wallet::Wallet,
};
