//! The FundMe crowdfunding contract.
//!
//! Contributors send native currency worth at least [`MINIMUM_USD`]; the
//! owner fixed at construction withdraws everything and resets the ledger.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    chain::gas::GasMeter,
    oracle::{self, OracleError, PriceFeed},
    primitives::{Address, Wei, WEI_PER_ETHER},
};

/// Minimum contribution in USD, 18 decimals.
pub const MINIMUM_USD: u128 = 50 * WEI_PER_ETHER;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FundMeError {
    #[error("FundMe__InsufficientFunds: contribution worth {usd_value} is below {minimum} (USD, 18 decimals)")]
    InsufficientFunds { usd_value: u128, minimum: u128 },
    #[error("FundMe__NotOwner")]
    NotOwner,
    #[error("FundMe__TransferFailed: {0}")]
    TransferFailed(TransferError),
    #[error("FundMe__OracleUnavailable: {0}")]
    OracleUnavailable(#[from] OracleError),
    #[error("funder index {index} out of bounds for {len} funders")]
    FunderIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("recipient {0} does not accept value")]
    Rejected(Address),
    #[error("contract balance {available} cannot cover {required}")]
    InsufficientBalance { available: Wei, required: Wei },
}

/// Caller and attached value of the current call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Msg {
    pub sender: Address,
    pub value: Wei,
}

/// Balance held by the executing contract.
pub trait Treasury {
    fn balance(&self) -> Wei;
    fn pay(&mut self, to: &Address, amount: Wei) -> Result<(), TransferError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Withdrawal {
    pub owner: Address,
    pub amount: Wei,
    pub funders: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FundMe {
    owner: Address,
    price_feed: Address,
    address_to_amount_funded: BTreeMap<Address, Wei>,
    funders: Vec<Address>,
}

impl FundMe {
    pub fn new(owner: Address, price_feed: Address) -> Self {
        Self {
            owner,
            price_feed,
            address_to_amount_funded: BTreeMap::new(),
            funders: Vec::new(),
        }
    }

    pub(crate) fn charge_constructor(gas: &mut GasMeter) {
        gas.create();
        gas.sstore_set();
    }

    /// Records `msg.value` from `msg.sender` if it is worth at least [`MINIMUM_USD`].
    ///
    /// `feed` is `None` when nothing answers at the configured feed address.
    pub fn fund(
        &mut self,
        msg: &Msg,
        feed: Option<&dyn PriceFeed>,
        now: u64,
        gas: &mut GasMeter,
    ) -> Result<(), FundMeError> {
        gas.sload();
        let feed = feed.ok_or(OracleError::Unreachable(self.price_feed))?;
        gas.static_call();
        let usd_value = oracle::conversion_rate(feed, msg.value, now)?;
        if usd_value < MINIMUM_USD {
            return Err(FundMeError::InsufficientFunds {
                usd_value,
                minimum: MINIMUM_USD,
            });
        }

        let entry = self.address_to_amount_funded.entry(msg.sender).or_insert(0);
        gas.sload();
        if *entry == 0 {
            gas.sstore_set();
        } else {
            gas.sstore_reset();
        }
        *entry = entry.saturating_add(msg.value);

        gas.sload();
        gas.sstore_reset();
        gas.sstore_set();
        self.funders.push(msg.sender);
        gas.log(2);
        Ok(())
    }

    /// Baseline withdrawal: walks the funder list straight from storage,
    /// re-reading its length on every iteration.
    pub fn withdraw(
        &mut self,
        msg: &Msg,
        treasury: &mut dyn Treasury,
        gas: &mut GasMeter,
    ) -> Result<Withdrawal, FundMeError> {
        self.only_owner(msg, gas)?;
        let mut staged = self.clone();
        let mut index = 0;
        loop {
            gas.sload();
            if index >= staged.funders.len() {
                break;
            }
            gas.sload();
            let funder = staged.funders[index];
            staged.clear_entry(&funder, gas);
            index += 1;
        }
        self.settle(staged, treasury, gas)
    }

    /// Same effect as [`FundMe::withdraw`], but copies the funder list into
    /// memory once before iterating.
    pub fn cheaper_withdraw(
        &mut self,
        msg: &Msg,
        treasury: &mut dyn Treasury,
        gas: &mut GasMeter,
    ) -> Result<Withdrawal, FundMeError> {
        self.only_owner(msg, gas)?;
        let mut staged = self.clone();
        gas.sload();
        let funders = staged.funders.clone();
        for _ in &funders {
            gas.sload();
        }
        for funder in &funders {
            gas.mload();
            staged.clear_entry(funder, gas);
        }
        self.settle(staged, treasury, gas)
    }

    fn only_owner(&self, msg: &Msg, gas: &mut GasMeter) -> Result<(), FundMeError> {
        // owner is immutable and lives in code, not storage
        gas.mload();
        if msg.sender != self.owner {
            return Err(FundMeError::NotOwner);
        }
        Ok(())
    }

    fn clear_entry(&mut self, funder: &Address, gas: &mut GasMeter) {
        if self.address_to_amount_funded.remove(funder).is_some() {
            gas.sstore_reset();
        } else {
            // repeated funder, slot already zeroed
            gas.sload();
        }
    }

    /// Pays out the whole balance and only then adopts the reset ledger.
    fn settle(
        &mut self,
        mut staged: FundMe,
        treasury: &mut dyn Treasury,
        gas: &mut GasMeter,
    ) -> Result<Withdrawal, FundMeError> {
        let funders = staged.funders.len();
        for _ in 0..funders {
            gas.sstore_reset();
        }
        gas.sstore_reset();
        staged.funders.clear();

        let amount = treasury.balance();
        gas.call_value();
        treasury
            .pay(&staged.owner, amount)
            .map_err(FundMeError::TransferFailed)?;
        gas.log(2);

        *self = staged;
        Ok(Withdrawal {
            owner: self.owner,
            amount,
            funders,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn price_feed(&self) -> Address {
        self.price_feed
    }

    pub fn amount_funded(&self, funder: &Address) -> Wei {
        self.address_to_amount_funded
            .get(funder)
            .copied()
            .unwrap_or(0)
    }

    pub fn funder(&self, index: usize) -> Result<Address, FundMeError> {
        self.funders
            .get(index)
            .copied()
            .ok_or(FundMeError::FunderIndexOutOfBounds {
                index,
                len: self.funders.len(),
            })
    }

    pub fn funders(&self) -> &[Address] {
        &self.funders
    }

    /// Sum of all ledger entries; equals the contract balance between transactions.
    pub fn total_funded(&self) -> Wei {
        self.address_to_amount_funded.values().copied().sum()
    }
}
