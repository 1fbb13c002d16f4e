use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::primitives::{hex_bytes32, Address, Wei};

/// Contract entrypoints a transaction can invoke.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    /// Plain value transfer. Routed to `fund` when the target is a FundMe.
    Transfer,
    DeployAggregator { decimals: u8, initial_answer: i128 },
    DeployFundMe { price_feed: Address },
    Fund,
    Withdraw,
    CheaperWithdraw,
    UpdateAnswer { answer: i128 },
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::Transfer => "transfer",
            Call::DeployAggregator { .. } | Call::DeployFundMe { .. } => "constructor",
            Call::Fund => "fund",
            Call::Withdraw => "withdraw",
            Call::CheaperWithdraw => "cheaperWithdraw",
            Call::UpdateAnswer { .. } => "updateAnswer",
        }
    }

    /// Whether the entrypoint accepts attached value.
    pub fn is_payable(&self) -> bool {
        matches!(self, Call::Transfer | Call::Fund)
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.method().as_bytes());
        match self {
            Call::DeployAggregator {
                decimals,
                initial_answer,
            } => {
                buf.push(*decimals);
                buf.extend_from_slice(&initial_answer.to_le_bytes());
            }
            Call::DeployFundMe { price_feed } => buf.extend_from_slice(price_feed.as_bytes()),
            Call::UpdateAnswer { answer } => buf.extend_from_slice(&answer.to_le_bytes()),
            Call::Transfer | Call::Fund | Call::Withdraw | Call::CheaperWithdraw => {}
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub chain_id: u64,
    pub from: Address,
    /// `None` creates a contract.
    pub to: Option<Address>,
    pub value: Wei,
    pub nonce: u64,
    pub gas_price: Wei,
    pub call: Call,
}

impl Transaction {
    /// Signing digest; also serves as the transaction hash.
    pub fn digest(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(b"fundme-tx");
        buf.extend_from_slice(&self.chain_id.to_le_bytes());
        buf.extend_from_slice(self.from.as_bytes());
        match &self.to {
            Some(to) => {
                buf.push(1);
                buf.extend_from_slice(to.as_bytes());
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.value.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.gas_price.to_le_bytes());
        self.call.encode(&mut buf);
        Sha256::digest(&buf).into()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    ContractCreated {
        address: Address,
        name: String,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: Wei,
    },
    Funded {
        contract: Address,
        funder: Address,
        amount: Wei,
    },
    Withdrawn {
        contract: Address,
        owner: Address,
        amount: Wei,
        funders: usize,
    },
    AnswerUpdated {
        feed: Address,
        answer: i128,
        round_id: u64,
        updated_at: u64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    #[serde(with = "hex_bytes32")]
    pub transaction_hash: [u8; 32],
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    /// `Contract.method` label used by the gas reporter.
    pub method: String,
    pub gas_used: u64,
    pub effective_gas_price: Wei,
    pub events: Vec<Event>,
}

impl Receipt {
    pub fn gas_cost(&self) -> Wei {
        Wei::from(self.gas_used).saturating_mul(self.effective_gas_price)
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.transaction_hash))
    }
}
