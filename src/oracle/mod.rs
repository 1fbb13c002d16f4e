use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    chain::gas::GasMeter,
    primitives::{Address, Wei, WEI_PER_ETHER},
};

/// Oldest answer, in seconds, that is still accepted as a current price.
pub const MAX_PRICE_AGE: u64 = 3 * 60 * 60;

/// Prices are normalised to this many decimals before conversion.
pub const PRICE_DECIMALS: u8 = 18;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("no price feed deployed at {0}")]
    Unreachable(Address),
    #[error("price feed has not published round {0}")]
    MissingRound(u64),
    #[error("price feed answer {0} is not positive")]
    InvalidAnswer(i128),
    #[error("price feed answer is stale: updated at {updated_at}, now {now}")]
    Stale { updated_at: u64, now: u64 },
    #[error("price feed reports {0} decimals, at most 18 are supported")]
    UnsupportedDecimals(u8),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u64,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u64,
}

pub trait PriceFeed {
    fn decimals(&self) -> u8;
    fn description(&self) -> &str;
    fn latest_round_data(&self) -> Result<RoundData, OracleError>;
    fn get_round_data(&self, round_id: u64) -> Result<RoundData, OracleError>;
}

/// Latest price of one native unit in USD, scaled to 18 decimals.
///
/// A single read: unreachable, non-positive or stale answers fail the caller.
pub fn current_price(feed: &dyn PriceFeed, now: u64) -> Result<u128, OracleError> {
    let round = feed.latest_round_data()?;
    if round.answer <= 0 {
        return Err(OracleError::InvalidAnswer(round.answer));
    }
    if now.saturating_sub(round.updated_at) > MAX_PRICE_AGE {
        return Err(OracleError::Stale {
            updated_at: round.updated_at,
            now,
        });
    }
    let decimals = feed.decimals();
    if decimals > PRICE_DECIMALS {
        return Err(OracleError::UnsupportedDecimals(decimals));
    }
    let scale = 10u128.pow(u32::from(PRICE_DECIMALS - decimals));
    Ok((round.answer as u128).saturating_mul(scale))
}

/// USD value (18 decimals) of `amount` wei at `price`.
///
/// Equivalent to `price * amount / 1e18` without the intermediate product
/// overflowing; saturates at `u128::MAX`.
pub fn usd_value(amount: Wei, price: u128) -> u128 {
    let (price_whole, price_frac) = (price / WEI_PER_ETHER, price % WEI_PER_ETHER);
    let (amount_whole, amount_frac) = (amount / WEI_PER_ETHER, amount % WEI_PER_ETHER);
    price_whole
        .saturating_mul(amount)
        .saturating_add(price_frac.saturating_mul(amount_whole))
        .saturating_add(price_frac * amount_frac / WEI_PER_ETHER)
}

/// Reads the current price and converts `amount` in one step.
pub fn conversion_rate(feed: &dyn PriceFeed, amount: Wei, now: u64) -> Result<u128, OracleError> {
    Ok(usd_value(amount, current_price(feed, now)?))
}

/// Smallest wei amount worth at least `usd` (18 decimals) at `price`.
/// Saturates at `Wei::MAX`, which is also the answer for a zero price.
pub fn native_amount(usd: u128, price: u128) -> Wei {
    const GIGA: u128 = 1_000_000_000;
    if price == 0 {
        return Wei::MAX;
    }
    // usd * 1e18 / price, rounded up, with 1e18 applied as two 1e9 steps
    let whole = (usd / price).saturating_mul(WEI_PER_ETHER);
    let step = (usd % price).saturating_mul(GIGA);
    let (high, rest) = (step / price, step % price);
    let low = rest.saturating_mul(GIGA).div_ceil(price);
    whole.saturating_add(high * GIGA + low)
}

/// Native amount equivalent to `usd` at the feed's current price.
pub fn convert_usd(feed: &dyn PriceFeed, usd: u128, now: u64) -> Result<Wei, OracleError> {
    Ok(native_amount(usd, current_price(feed, now)?))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MockV3Aggregator {
    decimals: u8,
    latest_round: u64,
    rounds: BTreeMap<u64, RoundData>,
}

impl MockV3Aggregator {
    pub fn new(decimals: u8, initial_answer: i128, now: u64) -> Self {
        let mut mock = Self {
            decimals,
            latest_round: 0,
            rounds: BTreeMap::new(),
        };
        mock.update_answer(initial_answer, now);
        mock
    }

    /// Publishes a new round with `answer` stamped at `now`.
    pub fn update_answer(&mut self, answer: i128, now: u64) -> RoundData {
        let round_id = self.latest_round + 1;
        let round = RoundData {
            round_id,
            answer,
            started_at: now,
            updated_at: now,
            answered_in_round: round_id,
        };
        self.latest_round = round_id;
        self.rounds.insert(round_id, round);
        round
    }

    /// Overwrites a round directly, e.g. to simulate a stale feed.
    pub fn update_round_data(&mut self, round_id: u64, answer: i128, updated_at: u64, started_at: u64) {
        self.latest_round = self.latest_round.max(round_id);
        self.rounds.insert(
            round_id,
            RoundData {
                round_id,
                answer,
                started_at,
                updated_at,
                answered_in_round: round_id,
            },
        );
    }

    pub fn latest_answer(&self) -> Option<i128> {
        self.rounds.get(&self.latest_round).map(|round| round.answer)
    }

    pub fn latest_round(&self) -> u64 {
        self.latest_round
    }

    /// Storage cost of publishing a round: answer, timestamp, started-at and round id.
    pub(crate) fn charge_update(gas: &mut GasMeter) {
        gas.sload();
        gas.sstore_reset();
        gas.sstore_set();
        gas.sstore_set();
        gas.sstore_set();
        gas.log(3);
    }
}

impl PriceFeed for MockV3Aggregator {
    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn description(&self) -> &str {
        "v0.8/tests/MockV3Aggregator.sol"
    }

    fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        self.get_round_data(self.latest_round)
    }

    fn get_round_data(&self, round_id: u64) -> Result<RoundData, OracleError> {
        self.rounds
            .get(&round_id)
            .copied()
            .ok_or(OracleError::MissingRound(round_id))
    }
}
