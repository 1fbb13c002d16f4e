pub mod gas;
pub mod tx;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    contracts::{FundMe, FundMeError, Msg, TransferError, Treasury},
    oracle::{MockV3Aggregator, PriceFeed},
    primitives::{Address, Wei, WEI_PER_ETHER, WEI_PER_GWEI},
    wallet::{SignedTransaction, Wallet, WalletError},
};

use self::{
    gas::GasMeter,
    tx::{Call, Event, Receipt, Transaction},
};

pub const DEV_CHAIN_ID: u64 = 31337;
pub const DEV_ACCOUNT_COUNT: u32 = 20;
pub const DEV_ACCOUNT_BALANCE: Wei = 10_000 * WEI_PER_ETHER;
pub const DEFAULT_GAS_PRICE: Wei = WEI_PER_GWEI;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
/// Seconds between automined blocks.
pub const BLOCK_TIME: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Signature(#[from] WalletError),
    #[error("transaction for chain {actual} sent to chain {expected}")]
    WrongChain { expected: u64, actual: u64 },
    #[error("nonce mismatch for {account}: expected {expected}, got {actual}")]
    NonceMismatch {
        account: Address,
        expected: u64,
        actual: u64,
    },
    #[error("account {account} cannot cover {required} wei, balance is {available}")]
    InsufficientBalance {
        account: Address,
        required: Wei,
        available: Wei,
    },
    #[error("gas price {offered} is below the network minimum {minimum}")]
    GasPriceTooLow { offered: Wei, minimum: Wei },
    #[error("{gas_used} gas at {gas_price} wei overflows the fee")]
    FeeOverflow { gas_used: u64, gas_price: Wei },
    #[error("no contract deployed at {0}")]
    NoContract(Address),
    #[error("{address} is a {actual}, expected a {expected}")]
    WrongContract {
        address: Address,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{call} cannot be sent to {target}")]
    UnsupportedCall { call: &'static str, target: String },
    #[error("{0} does not accept value")]
    TransferRejected(Address),
    #[error("{0} is not payable")]
    NonPayable(&'static str),
    #[error("execution reverted: {0}")]
    Reverted(#[from] FundMeError),
    #[error("unknown snapshot {0}")]
    UnknownSnapshot(usize),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    pub balance: Wei,
    pub nonce: u64,
    /// Incoming value transfers revert, like a contract without a payable receive.
    #[serde(default)]
    pub rejects_value: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Contract {
    MockV3Aggregator(MockV3Aggregator),
    FundMe(FundMe),
}

impl Contract {
    pub fn name(&self) -> &'static str {
        match self {
            Contract::MockV3Aggregator(_) => "MockV3Aggregator",
            Contract::FundMe(_) => "FundMe",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockMeta {
    pub chain_id: u64,
    pub number: u64,
    pub timestamp: u64,
    pub gas_price: Wei,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainState {
    pub meta: BlockMeta,
    accounts: BTreeMap<Address, Account>,
    contracts: BTreeMap<Address, Contract>,
    receipts: Vec<Receipt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotId(usize);

impl SnapshotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Development chain with automining: every accepted transaction seals a block.
#[derive(Debug)]
pub struct Chain {
    state: ChainState,
    snapshots: Vec<ChainState>,
}

impl Chain {
    /// Genesis state with the deterministic development accounts funded.
    pub fn new(chain_id: u64) -> Self {
        let wallets: Vec<Address> = (0..DEV_ACCOUNT_COUNT)
            .map(|index| Wallet::dev(index).address())
            .collect();
        Self::with_prefunded(chain_id, &wallets)
    }

    pub fn dev() -> Self {
        Self::new(DEV_CHAIN_ID)
    }

    pub fn with_prefunded(chain_id: u64, accounts: &[Address]) -> Self {
        let mut state = ChainState {
            meta: BlockMeta {
                chain_id,
                number: 0,
                timestamp: GENESIS_TIMESTAMP,
                gas_price: DEFAULT_GAS_PRICE,
            },
            accounts: BTreeMap::new(),
            contracts: BTreeMap::new(),
            receipts: Vec::new(),
        };
        for address in accounts {
            state.credit(address, DEV_ACCOUNT_BALANCE);
        }
        Self::from_state(state)
    }

    pub fn from_state(state: ChainState) -> Self {
        Self {
            state,
            snapshots: Vec::new(),
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn into_state(self) -> ChainState {
        self.state
    }

    pub fn chain_id(&self) -> u64 {
        self.state.meta.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.state.meta.number
    }

    pub fn timestamp(&self) -> u64 {
        self.state.meta.timestamp
    }

    pub fn gas_price(&self) -> Wei {
        self.state.meta.gas_price
    }

    pub fn set_gas_price(&mut self, gas_price: Wei) {
        self.state.meta.gas_price = gas_price;
    }

    pub fn balance(&self, address: &Address) -> Wei {
        self.state
            .accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or(0)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.state
            .accounts
            .get(address)
            .map(|account| account.nonce)
            .unwrap_or(0)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.state.accounts.iter()
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.state.receipts
    }

    pub fn contract(&self, address: &Address) -> Result<&Contract, ChainError> {
        self.state
            .contracts
            .get(address)
            .ok_or(ChainError::NoContract(*address))
    }

    pub fn fund_me(&self, address: &Address) -> Result<&FundMe, ChainError> {
        match self.contract(address)? {
            Contract::FundMe(fund_me) => Ok(fund_me),
            other => Err(ChainError::WrongContract {
                address: *address,
                expected: "FundMe",
                actual: other.name(),
            }),
        }
    }

    pub fn aggregator(&self, address: &Address) -> Result<&MockV3Aggregator, ChainError> {
        match self.contract(address)? {
            Contract::MockV3Aggregator(feed) => Ok(feed),
            other => Err(ChainError::WrongContract {
                address: *address,
                expected: "MockV3Aggregator",
                actual: other.name(),
            }),
        }
    }

    /// Test helper: overrides an account balance.
    pub fn set_balance(&mut self, address: &Address, balance: Wei) {
        self.state.accounts.entry(*address).or_default().balance = balance;
    }

    /// Test helper: makes `address` revert every incoming value transfer.
    pub fn set_rejects_value(&mut self, address: &Address, rejects: bool) {
        self.state.accounts.entry(*address).or_default().rejects_value = rejects;
    }

    /// Seals `blocks` empty blocks.
    pub fn mine(&mut self, blocks: u64) {
        for _ in 0..blocks {
            self.state.seal_block();
        }
    }

    pub fn increase_time(&mut self, seconds: u64) {
        self.state.meta.timestamp = self.state.meta.timestamp.saturating_add(seconds);
    }

    pub fn snapshot(&mut self) -> SnapshotId {
        self.snapshots.push(self.state.clone());
        SnapshotId(self.snapshots.len() - 1)
    }

    /// Restores the state captured by `id`. The snapshot and every later one
    /// are consumed.
    pub fn revert(&mut self, id: SnapshotId) -> Result<(), ChainError> {
        if id.0 >= self.snapshots.len() {
            return Err(ChainError::UnknownSnapshot(id.0));
        }
        self.snapshots.truncate(id.0 + 1);
        if let Some(state) = self.snapshots.pop() {
            self.state = state;
        }
        Ok(())
    }

    /// Builds, signs and sends a transaction from `wallet` at its current nonce.
    pub fn transact(
        &mut self,
        wallet: &Wallet,
        to: Option<Address>,
        value: Wei,
        call: Call,
    ) -> Result<Receipt, ChainError> {
        let tx = Transaction {
            chain_id: self.chain_id(),
            from: wallet.address(),
            to,
            value,
            nonce: self.nonce(&wallet.address()),
            gas_price: self.gas_price(),
            call,
        };
        self.send(wallet.sign(tx))
    }

    /// Executes a signed transaction. Either every effect is committed or none.
    pub fn send(&mut self, signed: SignedTransaction) -> Result<Receipt, ChainError> {
        signed.verify()?;
        let mut pending = self.state.clone();
        match pending.execute(&signed) {
            Ok(receipt) => {
                info!(
                    tx = %receipt.hash_hex(),
                    method = %receipt.method,
                    block = receipt.block_number,
                    gas_used = receipt.gas_used,
                    "transaction mined"
                );
                self.state = pending;
                Ok(receipt)
            }
            Err(err) => {
                warn!(from = %signed.tx.from, method = signed.tx.call.method(), "transaction reverted: {err}");
                Err(err)
            }
        }
    }

    /// SHA-256 Merkle root over accounts and contract storage.
    pub fn state_root(&self) -> [u8; 32] {
        compute_state_root(&self.state.accounts, &self.state.contracts)
    }
}

impl Serialize for Chain {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.state.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Chain {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ChainState::deserialize(deserializer).map(Chain::from_state)
    }
}

struct ContractTreasury<'a> {
    this: Address,
    accounts: &'a mut BTreeMap<Address, Account>,
}

impl Treasury for ContractTreasury<'_> {
    fn balance(&self) -> Wei {
        self.accounts
            .get(&self.this)
            .map(|account| account.balance)
            .unwrap_or(0)
    }

    fn pay(&mut self, to: &Address, amount: Wei) -> Result<(), TransferError> {
        if self
            .accounts
            .get(to)
            .map(|account| account.rejects_value)
            .unwrap_or(false)
        {
            return Err(TransferError::Rejected(*to));
        }
        let available = self.balance();
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        self.accounts.entry(self.this).or_default().balance -= amount;
        self.accounts.entry(*to).or_default().balance += amount;
        Ok(())
    }
}

impl ChainState {
    fn credit(&mut self, address: &Address, amount: Wei) {
        let account = self.accounts.entry(*address).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    fn debit(&mut self, address: &Address, amount: Wei) -> Result<(), ChainError> {
        let available = self
            .accounts
            .get(address)
            .map(|account| account.balance)
            .unwrap_or(0);
        if available < amount {
            return Err(ChainError::InsufficientBalance {
                account: *address,
                required: amount,
                available,
            });
        }
        self.accounts.entry(*address).or_default().balance = available - amount;
        Ok(())
    }

    fn seal_block(&mut self) {
        self.meta.number += 1;
        self.meta.timestamp += BLOCK_TIME;
    }

    fn price_feed(&self, address: &Address) -> Option<&dyn PriceFeed> {
        match self.contracts.get(address) {
            Some(Contract::MockV3Aggregator(feed)) => Some(feed as &dyn PriceFeed),
            _ => None,
        }
    }

    fn execute(&mut self, signed: &SignedTransaction) -> Result<Receipt, ChainError> {
        let tx = &signed.tx;
        if tx.chain_id != self.meta.chain_id {
            return Err(ChainError::WrongChain {
                expected: self.meta.chain_id,
                actual: tx.chain_id,
            });
        }
        let expected_nonce = self.accounts.get(&tx.from).map(|a| a.nonce).unwrap_or(0);
        if tx.nonce != expected_nonce {
            return Err(ChainError::NonceMismatch {
                account: tx.from,
                expected: expected_nonce,
                actual: tx.nonce,
            });
        }
        if tx.gas_price < self.meta.gas_price {
            return Err(ChainError::GasPriceTooLow {
                offered: tx.gas_price,
                minimum: self.meta.gas_price,
            });
        }

        if tx.value > 0 && !tx.call.is_payable() {
            return Err(ChainError::NonPayable(tx.call.method()));
        }

        // the transaction executes inside the block it is about to seal
        let now = self.meta.timestamp + BLOCK_TIME;
        let mut gas = GasMeter::new();
        gas.charge(gas::TX_BASE);

        let target = tx.to.unwrap_or_else(|| Address::create(&tx.from, tx.nonce));
        self.debit(&tx.from, tx.value)?;
        self.credit(&target, tx.value);

        let msg = Msg {
            sender: tx.from,
            value: tx.value,
        };
        let (label, events) = match tx.to {
            None => self.create(target, &tx.call, &msg, now, &mut gas)?,
            Some(to) => self.call(to, &tx.call, &msg, now, &mut gas)?,
        };

        let gas_cost = Wei::from(gas.used())
            .checked_mul(tx.gas_price)
            .ok_or(ChainError::FeeOverflow {
                gas_used: gas.used(),
                gas_price: tx.gas_price,
            })?;
        self.debit(&tx.from, gas_cost)?;
        self.accounts.entry(tx.from).or_default().nonce += 1;
        self.seal_block();
        debug!(block = self.meta.number, timestamp = self.meta.timestamp, "sealed block");

        let receipt = Receipt {
            transaction_hash: signed.hash(),
            block_number: self.meta.number,
            from: tx.from,
            to: tx.to,
            contract_address: tx.to.is_none().then_some(target),
            method: label,
            gas_used: gas.used(),
            effective_gas_price: tx.gas_price,
            events,
        };
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    fn create(
        &mut self,
        address: Address,
        call: &Call,
        msg: &Msg,
        now: u64,
        gas: &mut GasMeter,
    ) -> Result<(String, Vec<Event>), ChainError> {
        let contract = match call {
            Call::DeployAggregator {
                decimals,
                initial_answer,
            } => {
                gas.create();
                MockV3Aggregator::charge_update(gas);
                Contract::MockV3Aggregator(MockV3Aggregator::new(*decimals, *initial_answer, now))
            }
            Call::DeployFundMe { price_feed } => {
                FundMe::charge_constructor(gas);
                Contract::FundMe(FundMe::new(msg.sender, *price_feed))
            }
            other => {
                return Err(ChainError::UnsupportedCall {
                    call: other.method(),
                    target: "contract creation".into(),
                })
            }
        };
        let name = contract.name();
        self.contracts.insert(address, contract);
        Ok((
            format!("{name}.constructor"),
            vec![Event::ContractCreated {
                address,
                name: name.to_string(),
            }],
        ))
    }

    fn call(
        &mut self,
        to: Address,
        call: &Call,
        msg: &Msg,
        now: u64,
        gas: &mut GasMeter,
    ) -> Result<(String, Vec<Event>), ChainError> {
        let Some(contract) = self.contracts.remove(&to) else {
            return self.plain_transfer(to, call, msg, gas);
        };
        let result = match contract {
            Contract::FundMe(mut fund_me) => {
                let result = self.call_fund_me(&mut fund_me, to, call, msg, now, gas);
                self.contracts.insert(to, Contract::FundMe(fund_me));
                result
            }
            Contract::MockV3Aggregator(mut feed) => {
                let result = match call {
                    Call::UpdateAnswer { answer } => {
                        MockV3Aggregator::charge_update(gas);
                        let round = feed.update_answer(*answer, now);
                        Ok(vec![Event::AnswerUpdated {
                            feed: to,
                            answer: round.answer,
                            round_id: round.round_id,
                            updated_at: round.updated_at,
                        }])
                    }
                    other => Err(ChainError::UnsupportedCall {
                        call: other.method(),
                        target: format!("MockV3Aggregator at {to}"),
                    }),
                };
                self.contracts.insert(to, Contract::MockV3Aggregator(feed));
                result
            }
        };
        let name = self.contracts.get(&to).map(Contract::name).unwrap_or("Unknown");
        Ok((format!("{name}.{}", call.method()), result?))
    }

    fn call_fund_me(
        &mut self,
        fund_me: &mut FundMe,
        this: Address,
        call: &Call,
        msg: &Msg,
        now: u64,
        gas: &mut GasMeter,
    ) -> Result<Vec<Event>, ChainError> {
        match call {
            // receive/fallback forward plain value to fund
            Call::Fund | Call::Transfer => {
                let feed = self.price_feed(&fund_me.price_feed());
                fund_me.fund(msg, feed, now, gas)?;
                Ok(vec![Event::Funded {
                    contract: this,
                    funder: msg.sender,
                    amount: msg.value,
                }])
            }
            Call::Withdraw | Call::CheaperWithdraw => {
                let mut treasury = ContractTreasury {
                    this,
                    accounts: &mut self.accounts,
                };
                let withdrawal = if matches!(call, Call::Withdraw) {
                    fund_me.withdraw(msg, &mut treasury, gas)?
                } else {
                    fund_me.cheaper_withdraw(msg, &mut treasury, gas)?
                };
                Ok(vec![Event::Withdrawn {
                    contract: this,
                    owner: withdrawal.owner,
                    amount: withdrawal.amount,
                    funders: withdrawal.funders,
                }])
            }
            other => Err(ChainError::UnsupportedCall {
                call: other.method(),
                target: format!("FundMe at {this}"),
            }),
        }
    }

    fn plain_transfer(
        &mut self,
        to: Address,
        call: &Call,
        msg: &Msg,
        gas: &mut GasMeter,
    ) -> Result<(String, Vec<Event>), ChainError> {
        if !matches!(call, Call::Transfer) {
            return Err(ChainError::NoContract(to));
        }
        if self.accounts.get(&to).map(|a| a.rejects_value).unwrap_or(false) {
            return Err(ChainError::TransferRejected(to));
        }
        if msg.value > 0 {
            gas.call_value();
        }
        Ok((
            "transfer".to_string(),
            vec![Event::Transfer {
                from: msg.sender,
                to,
                amount: msg.value,
            }],
        ))
    }
}

fn compute_state_root(
    accounts: &BTreeMap<Address, Account>,
    contracts: &BTreeMap<Address, Contract>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (address, account) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(address.as_bytes());
        hasher.update(account.balance.to_le_bytes());
        hasher.update(account.nonce.to_le_bytes());
        hasher.update([u8::from(account.rejects_value)]);
        leaves.push(hasher.finalize().into());
    }
    for (address, contract) in contracts {
        let mut hasher = Sha256::new();
        hasher.update(b"contract");
        hasher.update(address.as_bytes());
        hasher.update(contract.name().as_bytes());
        match contract {
            Contract::FundMe(fund_me) => {
                hasher.update(fund_me.owner().as_bytes());
                hasher.update(fund_me.price_feed().as_bytes());
                for funder in fund_me.funders() {
                    hasher.update(funder.as_bytes());
                    hasher.update(fund_me.amount_funded(funder).to_le_bytes());
                }
            }
            Contract::MockV3Aggregator(feed) => {
                hasher.update([feed.decimals()]);
                hasher.update(feed.latest_round().to_le_bytes());
                if let Some(answer) = feed.latest_answer() {
                    hasher.update(answer.to_le_bytes());
                }
            }
        }
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"fundme-empty-state").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{contracts::MINIMUM_USD, oracle::OracleError};

    const ONE_ETHER: Wei = WEI_PER_ETHER;

    struct Deployed {
        chain: Chain,
        owner: Wallet,
        feed: Address,
        fund_me: Address,
    }

    fn deployed() -> Deployed {
        let mut chain = Chain::dev();
        let owner = Wallet::dev(0);
        let feed = chain
            .transact(
                &owner,
                None,
                0,
                Call::DeployAggregator {
                    decimals: 8,
                    initial_answer: 200_000_000_000,
                },
            )
            .unwrap()
            .contract_address
            .unwrap();
        let fund_me = chain
            .transact(&owner, None, 0, Call::DeployFundMe { price_feed: feed })
            .unwrap()
            .contract_address
            .unwrap();
        Deployed {
            chain,
            owner,
            feed,
            fund_me,
        }
    }

    #[test]
    fn genesis_funds_dev_accounts() {
        let chain = Chain::dev();
        assert_eq!(chain.balance(&Wallet::dev(0).address()), DEV_ACCOUNT_BALANCE);
        assert_eq!(chain.balance(&Wallet::dev(19).address()), DEV_ACCOUNT_BALANCE);
        assert_eq!(chain.balance(&Wallet::dev(20).address()), 0);
        assert_eq!(chain.block_number(), 0);
    }

    #[test]
    fn deployment_records_owner_and_feed() {
        let d = deployed();
        let fund_me = d.chain.fund_me(&d.fund_me).unwrap();
        assert_eq!(fund_me.owner(), d.owner.address());
        assert_eq!(fund_me.price_feed(), d.feed);
        assert_eq!(d.chain.block_number(), 2);
        assert_eq!(d.chain.nonce(&d.owner.address()), 2);
        assert!(matches!(
            d.chain.fund_me(&d.feed),
            Err(ChainError::WrongContract { actual: "MockV3Aggregator", .. })
        ));
    }

    #[test]
    fn fund_moves_value_and_charges_gas() {
        let mut d = deployed();
        let funder = Wallet::dev(1);
        let before = d.chain.balance(&funder.address());
        let receipt = d
            .chain
            .transact(&funder, Some(d.fund_me), ONE_ETHER, Call::Fund)
            .unwrap();
        assert_eq!(receipt.method, "FundMe.fund");
        assert_eq!(d.chain.balance(&d.fund_me), ONE_ETHER);
        assert_eq!(
            d.chain.balance(&funder.address()),
            before - ONE_ETHER - receipt.gas_cost()
        );
        assert_eq!(
            receipt.events,
            vec![Event::Funded {
                contract: d.fund_me,
                funder: funder.address(),
                amount: ONE_ETHER,
            }]
        );
    }

    #[test]
    fn plain_value_to_fund_me_is_recorded_as_funding() {
        let mut d = deployed();
        let funder = Wallet::dev(4);
        d.chain
            .transact(&funder, Some(d.fund_me), ONE_ETHER, Call::Transfer)
            .unwrap();
        let fund_me = d.chain.fund_me(&d.fund_me).unwrap();
        assert_eq!(fund_me.amount_funded(&funder.address()), ONE_ETHER);
        assert_eq!(fund_me.total_funded(), d.chain.balance(&d.fund_me));
    }

    #[test]
    fn reverted_fund_changes_nothing() {
        let mut d = deployed();
        let funder = Wallet::dev(1);
        let root = d.chain.state_root();
        let block = d.chain.block_number();
        let err = d
            .chain
            .transact(&funder, Some(d.fund_me), 1_000, Call::Fund)
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Reverted(FundMeError::InsufficientFunds { minimum: MINIMUM_USD, .. })
        ));
        assert_eq!(d.chain.state_root(), root);
        assert_eq!(d.chain.block_number(), block);
        assert_eq!(d.chain.nonce(&funder.address()), 0);
    }

    #[test]
    fn stale_feed_blocks_funding() {
        let mut d = deployed();
        d.chain.increase_time(crate::oracle::MAX_PRICE_AGE + 60);
        let err = d
            .chain
            .transact(&Wallet::dev(1), Some(d.fund_me), ONE_ETHER, Call::Fund)
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Reverted(FundMeError::OracleUnavailable(OracleError::Stale { .. }))
        ));

        d.chain
            .transact(&d.owner, Some(d.feed), 0, Call::UpdateAnswer { answer: 200_000_000_000 })
            .unwrap();
        d.chain
            .transact(&Wallet::dev(1), Some(d.fund_me), ONE_ETHER, Call::Fund)
            .unwrap();
    }

    #[test]
    fn fund_me_pointing_at_nothing_is_oracle_unavailable() {
        let mut chain = Chain::dev();
        let owner = Wallet::dev(0);
        let missing = Address::new([0xAB; 20]);
        let fund_me = chain
            .transact(&owner, None, 0, Call::DeployFundMe { price_feed: missing })
            .unwrap()
            .contract_address
            .unwrap();
        let err = chain
            .transact(&Wallet::dev(1), Some(fund_me), ONE_ETHER, Call::Fund)
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Reverted(FundMeError::OracleUnavailable(OracleError::Unreachable(a))) if a == missing
        ));
    }

    #[test]
    fn withdraw_to_rejecting_owner_reverts_everything() {
        let mut d = deployed();
        let funder = Wallet::dev(2);
        d.chain
            .transact(&funder, Some(d.fund_me), ONE_ETHER, Call::Fund)
            .unwrap();
        d.chain.set_rejects_value(&d.owner.address(), true);
        let owner_balance = d.chain.balance(&d.owner.address());

        let err = d
            .chain
            .transact(&d.owner, Some(d.fund_me), 0, Call::Withdraw)
            .unwrap_err();
        assert!(matches!(err, ChainError::Reverted(FundMeError::TransferFailed(_))));
        assert_eq!(d.chain.balance(&d.fund_me), ONE_ETHER);
        assert_eq!(d.chain.balance(&d.owner.address()), owner_balance);
        let fund_me = d.chain.fund_me(&d.fund_me).unwrap();
        assert_eq!(fund_me.amount_funded(&funder.address()), ONE_ETHER);
        assert_eq!(fund_me.funders(), &[funder.address()]);
    }

    #[test]
    fn nonce_and_chain_id_are_enforced() {
        let mut chain = Chain::dev();
        let wallet = Wallet::dev(0);
        let stale = Transaction {
            chain_id: DEV_CHAIN_ID,
            from: wallet.address(),
            to: Some(Wallet::dev(1).address()),
            value: 1,
            nonce: 5,
            gas_price: DEFAULT_GAS_PRICE,
            call: Call::Transfer,
        };
        assert!(matches!(
            chain.send(wallet.sign(stale.clone())),
            Err(ChainError::NonceMismatch { expected: 0, actual: 5, .. })
        ));
        let foreign = Transaction {
            chain_id: 4,
            nonce: 0,
            ..stale
        };
        assert!(matches!(
            chain.send(wallet.sign(foreign)),
            Err(ChainError::WrongChain { expected: DEV_CHAIN_ID, actual: 4 })
        ));
    }

    #[test]
    fn forged_signature_is_rejected() {
        let mut chain = Chain::dev();
        let victim = Wallet::dev(1);
        let attacker = Wallet::dev(2);
        let tx = Transaction {
            chain_id: DEV_CHAIN_ID,
            from: victim.address(),
            to: Some(attacker.address()),
            value: ONE_ETHER,
            nonce: 0,
            gas_price: DEFAULT_GAS_PRICE,
            call: Call::Transfer,
        };
        assert!(matches!(
            chain.send(attacker.sign(tx)),
            Err(ChainError::Signature(WalletError::SenderMismatch { .. }))
        ));
        assert_eq!(chain.balance(&victim.address()), DEV_ACCOUNT_BALANCE);
    }

    #[test]
    fn fee_overflow_is_an_error() {
        let mut chain = Chain::dev();
        let wallet = Wallet::dev(0);
        let root = chain.state_root();
        let tx = Transaction {
            chain_id: DEV_CHAIN_ID,
            from: wallet.address(),
            to: Some(Wallet::dev(1).address()),
            value: 0,
            nonce: 0,
            gas_price: Wei::MAX,
            call: Call::Transfer,
        };
        assert!(matches!(
            chain.send(wallet.sign(tx)),
            Err(ChainError::FeeOverflow { gas_used, gas_price })
                if gas_used == gas::TX_BASE && gas_price == Wei::MAX
        ));
        assert_eq!(chain.state_root(), root);
        assert_eq!(chain.nonce(&wallet.address()), 0);
    }

    #[test]
    fn value_on_non_payable_call_is_rejected() {
        let mut d = deployed();
        let err = d
            .chain
            .transact(&d.owner, Some(d.fund_me), ONE_ETHER, Call::Withdraw)
            .unwrap_err();
        assert!(matches!(err, ChainError::NonPayable("withdraw")));
    }

    #[test]
    fn unfunded_sender_cannot_pay_for_gas() {
        let mut chain = Chain::dev();
        let broke = Wallet::random();
        chain.set_balance(&broke.address(), 1);
        let err = chain
            .transact(&broke, Some(Wallet::dev(0).address()), 0, Call::Transfer)
            .unwrap_err();
        assert!(matches!(err, ChainError::InsufficientBalance { .. }));
    }

    #[test]
    fn snapshots_restore_earlier_state() {
        let mut d = deployed();
        let snap = d.chain.snapshot();
        d.chain
            .transact(&Wallet::dev(1), Some(d.fund_me), ONE_ETHER, Call::Fund)
            .unwrap();
        assert_eq!(d.chain.balance(&d.fund_me), ONE_ETHER);
        d.chain.revert(snap).unwrap();
        assert_eq!(d.chain.balance(&d.fund_me), 0);
        assert!(matches!(d.chain.revert(snap), Err(ChainError::UnknownSnapshot(0))));
    }

    #[test]
    fn mining_advances_blocks_and_time() {
        let mut chain = Chain::dev();
        chain.mine(3);
        assert_eq!(chain.block_number(), 3);
        assert_eq!(chain.timestamp(), GENESIS_TIMESTAMP + 3 * BLOCK_TIME);
    }

    #[test]
    fn chain_state_survives_json() {
        let mut d = deployed();
        d.chain
            .transact(&Wallet::dev(1), Some(d.fund_me), ONE_ETHER, Call::Fund)
            .unwrap();
        let json = serde_json::to_string(&d.chain).unwrap();
        let restored: Chain = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state(), d.chain.state());
        assert_eq!(restored.state_root(), d.chain.state_root());
    }
}
