//! Gas schedule used by the development chain.
//!
//! Costs follow the shape of the EVM schedule closely enough that storage
//! heavy code paths are visibly more expensive than memory bound ones.

pub const TX_BASE: u64 = 21_000;
pub const CREATE: u64 = 32_000;
pub const SLOAD: u64 = 2_100;
pub const SSTORE_SET: u64 = 20_000;
pub const SSTORE_RESET: u64 = 2_900;
pub const MLOAD: u64 = 3;
pub const STATIC_CALL: u64 = 2_600;
pub const CALL_VALUE: u64 = 9_000;
pub const LOG_BASE: u64 = 375;
pub const LOG_TOPIC: u64 = 375;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasMeter {
    used: u64,
}

impl GasMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn charge(&mut self, amount: u64) {
        self.used = self.used.saturating_add(amount);
    }

    pub fn sload(&mut self) {
        self.charge(SLOAD);
    }

    /// Write to a slot that currently holds zero.
    pub fn sstore_set(&mut self) {
        self.charge(SSTORE_SET);
    }

    /// Write to a slot that already holds a non-zero value.
    pub fn sstore_reset(&mut self) {
        self.charge(SSTORE_RESET);
    }

    pub fn mload(&mut self) {
        self.charge(MLOAD);
    }

    pub fn static_call(&mut self) {
        self.charge(STATIC_CALL);
    }

    pub fn call_value(&mut self) {
        self.charge(CALL_VALUE);
    }

    pub fn log(&mut self, topics: u64) {
        self.charge(LOG_BASE + LOG_TOPIC * topics);
    }

    pub fn create(&mut self) {
        self.charge(CREATE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_accumulates_schedule_costs() {
        let mut gas = GasMeter::new();
        gas.charge(TX_BASE);
        gas.sload();
        gas.sstore_set();
        gas.mload();
        gas.log(2);
        assert_eq!(
            gas.used(),
            TX_BASE + SLOAD + SSTORE_SET + MLOAD + LOG_BASE + 2 * LOG_TOPIC
        );
    }
}
