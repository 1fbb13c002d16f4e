use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fundme::{config::DEFAULT_CONFIG_FILE, Address};

/// FundMe toolkit
///
/// Deploys the FundMe contract and its mock price feed to a local
/// development chain, funds and withdraws through signed transactions,
/// and queues explorer verification for public networks.
#[derive(Debug, Parser)]
#[command(version)]
pub struct CliOptions {
    /// Configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, value_name = "PATH")]
    pub config: PathBuf,

    /// Network to operate on, defaults to the configured default network
    #[arg(long, short, value_name = "NAME")]
    pub network: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List signing accounts with balances and nonces
    Accounts,

    /// Run deploy scripts matching the given tags
    Deploy {
        #[arg(long, short, default_value = "all", value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Contribute to FundMe
    Fund {
        /// Account index of the contributor
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Amount in ether, e.g. 0.05
        #[arg(long, value_name = "ETHER")]
        value: String,
    },

    /// Withdraw all contributions to the owner
    Withdraw {
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Copy the funder list to memory before paying out
        #[arg(long)]
        cheaper: bool,
    },

    /// Send a plain value transfer
    Send {
        #[arg(long, default_value_t = 0)]
        from: usize,

        #[arg(long)]
        to: Address,

        #[arg(long, value_name = "ETHER")]
        value: String,
    },

    /// Push a new answer to the mock price feed
    UpdateAnswer {
        /// Price with the feed's decimals, e.g. 200000000000 for 2000 USD
        #[arg(allow_hyphen_values = true)]
        answer: i128,
    },

    /// Read contract and chain state
    Query {
        #[command(subcommand)]
        query: Query,
    },

    /// Mine empty blocks, optionally moving time forward first
    Mine {
        #[arg(long, default_value_t = 1)]
        blocks: u64,

        /// Seconds to add to the chain clock
        #[arg(long, default_value_t = 0)]
        time: u64,
    },

    /// Submit the FundMe deployment for explorer verification
    Verify,

    /// Print and write the per-method gas report
    GasReport,

    /// Generate a signing key pair
    Keygen {
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },

    /// Discard the network's chain state and deployments
    Reset,
}

#[derive(Debug, Subcommand)]
pub enum Query {
    /// getOwner()
    Owner,
    /// getPriceFeed()
    PriceFeed,
    /// getFunder(index)
    Funder { index: usize },
    /// getAddressToAmountFunded(address)
    AmountFunded { address: Address },
    /// Balance of an account or contract
    Balance { address: Address },
    /// USD value of an ether amount at the current feed price
    Conversion {
        #[arg(value_name = "ETHER")]
        value: String,
    },
    /// Smallest contribution FundMe accepts at the current price
    Minimum,
    /// Recorded deployments
    Deployments,
}
