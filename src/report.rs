//! Per-method gas usage, in the layout of the usual gas reporter tables.

use std::{collections::BTreeMap, fmt::Write as _, fs, path::Path};

use crate::{
    chain::tx::Receipt,
    config::GasReporterConfig,
    oracle::usd_value,
    primitives::{format_ether, Wei},
};

const NATIVE_TOKEN: &str = "ETH";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodGas {
    pub calls: usize,
    pub min: u64,
    pub max: u64,
    pub total: u64,
}

impl MethodGas {
    fn record(&mut self, gas: u64) {
        if self.calls == 0 {
            self.min = gas;
            self.max = gas;
        } else {
            self.min = self.min.min(gas);
            self.max = self.max.max(gas);
        }
        self.calls += 1;
        self.total += gas;
    }

    pub fn avg(&self) -> u64 {
        if self.calls == 0 {
            0
        } else {
            self.total / self.calls as u64
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GasReport {
    /// (contract, method) → usage. Constructors land under `constructor`.
    pub methods: BTreeMap<(String, String), MethodGas>,
    pub gas_price: Wei,
}

impl GasReport {
    pub fn from_receipts<'a>(receipts: impl IntoIterator<Item = &'a Receipt>, gas_price: Wei) -> Self {
        let mut methods: BTreeMap<(String, String), MethodGas> = BTreeMap::new();
        for receipt in receipts {
            let (contract, method) = receipt
                .method
                .split_once('.')
                .unwrap_or(("-", receipt.method.as_str()));
            methods
                .entry((contract.to_string(), method.to_string()))
                .or_default()
                .record(receipt.gas_used);
        }
        Self { methods, gas_price }
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Renders the table. `price` is the ETH/USD feed price with 18 decimals;
    /// without it the fiat column is left empty. Costs are always in the
    /// chain's native ETH, whatever `config.token` names.
    pub fn render(&self, config: &GasReporterConfig, price: Option<u128>) -> String {
        let (bold, reset) = if config.no_colors {
            ("", "")
        } else {
            ("\x1b[1m", "\x1b[0m")
        };
        let mut out = String::new();
        let rule = "-".repeat(100);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{bold}Gas report{reset}  gas price {} gwei, {} priced from the ETH/USD feed",
            self.gas_price / 1_000_000_000,
            config.currency
        );
        if config.token != NATIVE_TOKEN {
            let _ = writeln!(
                out,
                "{} has no price source here, costs are shown in {NATIVE_TOKEN}",
                config.token
            );
        }
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{bold}{:<18} {:<16} {:>10} {:>10} {:>10} {:>7} {:>14} {:>10}{reset}",
            "Contract",
            "Method",
            "Min",
            "Max",
            "Avg",
            "# calls",
            NATIVE_TOKEN,
            config.currency
        );
        for ((contract, method), gas) in &self.methods {
            let cost = Wei::from(gas.avg()).saturating_mul(self.gas_price);
            let fiat = price
                .map(|price| format_fiat(usd_value(cost, price)))
                .unwrap_or_else(|| "-".into());
            let _ = writeln!(
                out,
                "{:<18} {:<16} {:>10} {:>10} {:>10} {:>7} {:>14} {:>10}",
                contract,
                method,
                gas.min,
                gas.max,
                gas.avg(),
                gas.calls,
                format_ether(cost),
                fiat
            );
        }
        let _ = writeln!(out, "{rule}");
        out
    }

    pub fn write(&self, path: &Path, config: &GasReporterConfig, price: Option<u128>) -> std::io::Result<()> {
        fs::write(path, self.render(config, price))
    }
}

/// 18-decimal amount with two decimals, truncated.
fn format_fiat(value: u128) -> String {
    let cents = value / 10_000_000_000_000_000;
    format!("{}.{:02}", cents / 100, cents % 100)
}
