mod cli;

use std::{env, fs, path::Path};

use anyhow::{bail, Context, Result};
use clap::Parser;
use fundme::{
    chain::tx::{Call, Event, Receipt},
    config::Config,
    deploy::{self, DeployContext, FUND_ME, MOCK_AGGREGATOR},
    oracle::{self, PriceFeed},
    primitives::{format_ether, parse_ether, Address},
    report::GasReport,
    session::Session,
    verify::{self, OutboxVerifier, VerificationRequest, VerificationStatus},
    Wallet, MINIMUM_USD,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{CliOptions, Command, Query};

fn signer(wallets: &[Wallet], index: usize) -> Result<&Wallet> {
    wallets
        .get(index)
        .with_context(|| format!("no account {index}, the network has {}", wallets.len()))
}

fn deployed(session: &Session, name: &str) -> Result<Address> {
    Ok(session
        .deployments
        .get(name)
        .with_context(|| "run `fundme deploy` first")?
        .address)
}

fn describe(event: &Event) -> String {
    match event {
        Event::ContractCreated { address, name } => format!("{name} created at {address}"),
        Event::Transfer { from, to, amount } => {
            format!("{from} sent {} ETH to {to}", format_ether(*amount))
        }
        Event::Funded { funder, amount, .. } => {
            format!("{funder} funded {} ETH", format_ether(*amount))
        }
        Event::Withdrawn {
            owner,
            amount,
            funders,
            ..
        } => format!(
            "{owner} withdrew {} ETH from {funders} funder entries",
            format_ether(*amount)
        ),
        Event::AnswerUpdated {
            answer, round_id, ..
        } => format!("round {round_id} answer {answer}"),
    }
}

fn print_receipt(receipt: &Receipt) {
    println!("tx        {}", receipt.hash_hex());
    println!("method    {}", receipt.method);
    println!("block     {}", receipt.block_number);
    println!(
        "gas used  {} ({} ETH)",
        receipt.gas_used,
        format_ether(receipt.gas_cost())
    );
    if let Some(address) = receipt.contract_address {
        println!("contract  {address}");
    }
    for event in &receipt.events {
        println!("  {}", describe(event));
    }
}

/// Current price of the feed FundMe reads, 18 decimals.
fn feed_price(session: &Session) -> Option<u128> {
    let chain = &session.chain;
    let feed = session.deployments.get(MOCK_AGGREGATOR).ok()?.address;
    let feed = chain.aggregator(&feed).ok()?;
    oracle::current_price(feed as &dyn PriceFeed, chain.timestamp()).ok()
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let wallet = Wallet::random();
    for (file, contents) in [
        ("sk.hex", wallet.secret_hex()),
        ("pk.hex", wallet.public_hex()),
        ("address.txt", wallet.address().to_string()),
    ] {
        let path = out_dir.join(file);
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
    }
    println!("keypair for {} written → {}", wallet.address(), out_dir.display());
    Ok(())
}

fn query_cmd(session: &Session, query: Query) -> Result<()> {
    let chain = &session.chain;
    match query {
        Query::Owner => println!("{}", chain.fund_me(&deployed(session, FUND_ME)?)?.owner()),
        Query::PriceFeed => println!("{}", chain.fund_me(&deployed(session, FUND_ME)?)?.price_feed()),
        Query::Funder { index } => {
            println!("{}", chain.fund_me(&deployed(session, FUND_ME)?)?.funder(index)?)
        }
        Query::AmountFunded { address } => {
            let funded = chain
                .fund_me(&deployed(session, FUND_ME)?)?
                .amount_funded(&address);
            println!("{funded} wei ({} ETH)", format_ether(funded));
        }
        Query::Balance { address } => {
            let balance = chain.balance(&address);
            println!("{balance} wei ({} ETH)", format_ether(balance));
        }
        Query::Conversion { value } => {
            let amount = parse_ether(&value)?;
            let feed = chain.fund_me(&deployed(session, FUND_ME)?)?.price_feed();
            let feed = chain.aggregator(&feed)?;
            let usd = oracle::conversion_rate(feed, amount, chain.timestamp())?;
            println!("{value} ETH = {} USD", format_ether(usd));
        }
        Query::Minimum => {
            let feed = chain.fund_me(&deployed(session, FUND_ME)?)?.price_feed();
            let feed = chain.aggregator(&feed)?;
            let wei = oracle::convert_usd(feed, MINIMUM_USD, chain.timestamp())?;
            println!("{} ETH ({wei} wei)", format_ether(wei));
        }
        Query::Deployments => {
            if session.deployments.is_empty() {
                println!("nothing deployed");
            }
            for (name, deployment) in session.deployments.iter() {
                println!(
                    "{name:<18} {} block {} args [{}]",
                    deployment.address,
                    deployment.block_number,
                    deployment.args.join(", ")
                );
                if let Some(status) = &deployment.verification {
                    println!("{:<18} verification {}", "", serde_json::to_string(status)?);
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let opts = CliOptions::parse();
    if let Command::Keygen { out_dir } = &opts.command {
        return keygen_cmd(out_dir);
    }

    let mut config = Config::load(&opts.config)?;
    config.apply_env(|name| env::var(name).ok());
    let network_name = opts
        .network
        .clone()
        .unwrap_or_else(|| config.default_network.clone());
    let network = config.network(&network_name)?;
    let state_file = config.state_file(&network_name);
    info!(network = %network_name, chain_id = network.chain_id, "using network");

    if let Command::Reset = opts.command {
        Session::reset(&state_file)?;
        println!("{network_name} reset");
        return Ok(());
    }

    let wallets = config.wallets(&network_name)?;
    let accounts: Vec<Address> = wallets.iter().map(Wallet::address).collect();
    let mut session = Session::open(&state_file, network.chain_id, &accounts)?;

    let changed = match opts.command {
        Command::Accounts => {
            for (index, wallet) in wallets.iter().enumerate() {
                let address = wallet.address();
                println!(
                    "{index:>2}  {address}  {:>24} ETH  nonce {}",
                    format_ether(session.chain.balance(&address)),
                    session.chain.nonce(&address)
                );
            }
            false
        }
        Command::Deploy { tags } => {
            let mut verifier = OutboxVerifier::new(&config.etherscan.outbox);
            let mut ctx = DeployContext {
                chain: &mut session.chain,
                deployments: &mut session.deployments,
                network: &network,
                deployer: signer(&wallets, 0)?,
                verifier: &mut verifier,
                etherscan_api_key: config.etherscan.api_key.as_deref(),
            };
            let ran = deploy::run(&mut ctx, &tags)?;
            for (name, deployment) in session.deployments.iter() {
                println!("{name:<18} {}", deployment.address);
            }
            !ran.is_empty()
        }
        Command::Fund { from, value } => {
            let fund_me = deployed(&session, FUND_ME)?;
            let value = parse_ether(&value)?;
            let receipt = session
                .chain
                .transact(signer(&wallets, from)?, Some(fund_me), value, Call::Fund)?;
            print_receipt(&receipt);
            true
        }
        Command::Withdraw { from, cheaper } => {
            let fund_me = deployed(&session, FUND_ME)?;
            let call = if cheaper {
                Call::CheaperWithdraw
            } else {
                Call::Withdraw
            };
            let receipt = session
                .chain
                .transact(signer(&wallets, from)?, Some(fund_me), 0, call)?;
            print_receipt(&receipt);
            true
        }
        Command::Send { from, to, value } => {
            let value = parse_ether(&value)?;
            let receipt = session
                .chain
                .transact(signer(&wallets, from)?, Some(to), value, Call::Transfer)?;
            print_receipt(&receipt);
            true
        }
        Command::UpdateAnswer { answer } => {
            let feed = deployed(&session, MOCK_AGGREGATOR)?;
            let receipt = session.chain.transact(
                signer(&wallets, 0)?,
                Some(feed),
                0,
                Call::UpdateAnswer { answer },
            )?;
            print_receipt(&receipt);
            true
        }
        Command::Query { query } => {
            query_cmd(&session, query)?;
            false
        }
        Command::Mine { blocks, time } => {
            session.chain.increase_time(time);
            session.chain.mine(blocks);
            println!(
                "block {} at {}",
                session.chain.block_number(),
                session.chain.timestamp()
            );
            true
        }
        Command::Verify => {
            let deployment = session.deployments.get(FUND_ME)?.clone();
            let status = if network.is_development() {
                VerificationStatus::Skipped {
                    reason: "development chain".into(),
                }
            } else if config.etherscan.api_key.is_none() {
                VerificationStatus::Skipped {
                    reason: "no explorer API key".into(),
                }
            } else {
                let args = deployment
                    .args
                    .iter()
                    .map(|arg| arg.parse::<Address>())
                    .collect::<Result<Vec<_>, _>>()?;
                let request =
                    VerificationRequest::new(network.chain_id, deployment.address, FUND_ME, &args)?;
                let mut verifier = OutboxVerifier::new(&config.etherscan.outbox);
                verify::verify(&mut verifier, &request)?
            };
            println!("{}", serde_json::to_string(&status)?);
            let mut deployment = deployment;
            deployment.verification = Some(status);
            session.deployments.save(FUND_ME, deployment);
            true
        }
        Command::GasReport => {
            if !config.gas_reporter.enabled {
                warn!("gas reporter is disabled in {}", opts.config.display());
                return Ok(());
            }
            let report = GasReport::from_receipts(session.chain.receipts(), session.chain.gas_price());
            if report.is_empty() {
                bail!("no transactions recorded on {network_name}");
            }
            let price = feed_price(&session);
            print!("{}", report.render(&config.gas_reporter, price));
            if let Some(path) = &config.gas_reporter.output_file {
                report
                    .write(path, &config.gas_reporter, price)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "gas report written");
            }
            false
        }
        Command::Keygen { .. } | Command::Reset => false,
    };

    if changed {
        session.save(&state_file)?;
    }
    Ok(())
}
