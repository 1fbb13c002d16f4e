use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::primitives::{hex_bytes32, hex_vec, Address};

pub const COMPILER_VERSION: &str = concat!("fundme-", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("contract {0} is already verified")]
    AlreadyVerified(Address),
    #[error("no ABI known for contract {0}")]
    UnknownContract(String),
    #[error("verification outbox {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding verification request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("verification rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    Submitted { guid: String },
    AlreadyVerified,
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationRequest {
    pub chain_id: u64,
    pub address: Address,
    pub contract_name: String,
    pub compiler_version: String,
    #[serde(with = "hex_vec")]
    pub constructor_arguments: Vec<u8>,
    /// Base64 of the JSON metadata document.
    pub metadata: String,
    #[serde(with = "hex_bytes32")]
    pub metadata_hash: [u8; 32],
}

impl VerificationRequest {
    pub fn new(
        chain_id: u64,
        address: Address,
        contract_name: &str,
        args: &[Address],
    ) -> Result<Self, VerifyError> {
        let abi = contract_abi(contract_name)
            .ok_or_else(|| VerifyError::UnknownContract(contract_name.to_string()))?;
        let metadata = json!({
            "contractName": contract_name,
            "compiler": COMPILER_VERSION,
            "abi": abi,
        });
        let metadata_bytes = serde_json::to_vec(&metadata)?;
        Ok(Self {
            chain_id,
            address,
            contract_name: contract_name.to_string(),
            compiler_version: COMPILER_VERSION.to_string(),
            constructor_arguments: encode_constructor_args(args),
            metadata: general_purpose::STANDARD.encode(&metadata_bytes),
            metadata_hash: Sha256::digest(&metadata_bytes).into(),
        })
    }

    /// Identifier of the submission, stable for identical requests.
    pub fn guid(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.chain_id.to_le_bytes());
        hasher.update(self.address.as_bytes());
        hasher.update(self.contract_name.as_bytes());
        hasher.update(&self.constructor_arguments);
        hasher.update(self.metadata_hash);
        hex::encode(&hasher.finalize()[..16])
    }
}

/// Address arguments as consecutive 32-byte ABI words.
pub fn encode_constructor_args(args: &[Address]) -> Vec<u8> {
    args.iter().flat_map(|arg| arg.abi_word()).collect()
}

pub fn contract_abi(contract_name: &str) -> Option<serde_json::Value> {
    match contract_name {
        "FundMe" => Some(json!([
            { "type": "constructor", "inputs": [{ "name": "priceFeed", "type": "address" }] },
            { "type": "function", "name": "fund", "stateMutability": "payable", "inputs": [] },
            { "type": "function", "name": "withdraw", "stateMutability": "nonpayable", "inputs": [] },
            { "type": "function", "name": "cheaperWithdraw", "stateMutability": "nonpayable", "inputs": [] },
            { "type": "function", "name": "getOwner", "stateMutability": "view", "inputs": [],
              "outputs": [{ "type": "address" }] },
            { "type": "function", "name": "getPriceFeed", "stateMutability": "view", "inputs": [],
              "outputs": [{ "type": "address" }] },
            { "type": "function", "name": "getFunder", "stateMutability": "view",
              "inputs": [{ "name": "index", "type": "uint256" }], "outputs": [{ "type": "address" }] },
            { "type": "function", "name": "getAddressToAmountFunded", "stateMutability": "view",
              "inputs": [{ "name": "funder", "type": "address" }], "outputs": [{ "type": "uint256" }] },
            { "type": "error", "name": "FundMe__NotOwner", "inputs": [] },
            { "type": "error", "name": "FundMe__InsufficientFunds", "inputs": [] },
            { "type": "receive", "stateMutability": "payable" },
            { "type": "fallback", "stateMutability": "payable" }
        ])),
        "MockV3Aggregator" => Some(json!([
            { "type": "constructor", "inputs": [
                { "name": "decimals", "type": "uint8" },
                { "name": "initialAnswer", "type": "int256" }
            ] },
            { "type": "function", "name": "updateAnswer", "stateMutability": "nonpayable",
              "inputs": [{ "name": "answer", "type": "int256" }] },
            { "type": "function", "name": "latestRoundData", "stateMutability": "view", "inputs": [] }
        ])),
        _ => None,
    }
}

pub trait Verifier {
    /// Submits a request and returns the service's submission id.
    fn submit(&mut self, request: &VerificationRequest) -> Result<String, VerifyError>;
}

/// Queues requests as `<chain_id>-<address>.json` files in a directory.
pub struct OutboxVerifier {
    dir: PathBuf,
}

impl OutboxVerifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn request_path(&self, request: &VerificationRequest) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", request.chain_id, request.address))
    }
}

impl Verifier for OutboxVerifier {
    fn submit(&mut self, request: &VerificationRequest) -> Result<String, VerifyError> {
        let path = self.request_path(request);
        if path.exists() {
            return Err(VerifyError::AlreadyVerified(request.address));
        }
        fs::create_dir_all(&self.dir).map_err(|source| VerifyError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let body = serde_json::to_vec_pretty(request)?;
        fs::write(&path, body).map_err(|source| VerifyError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(request.guid())
    }
}

/// Keeps submissions in memory.
#[derive(Default)]
pub struct MemoryVerifier {
    pub submitted: Vec<VerificationRequest>,
    verified: BTreeSet<(u64, Address)>,
}

impl Verifier for MemoryVerifier {
    fn submit(&mut self, request: &VerificationRequest) -> Result<String, VerifyError> {
        if !self.verified.insert((request.chain_id, request.address)) {
            return Err(VerifyError::AlreadyVerified(request.address));
        }
        self.submitted.push(request.clone());
        Ok(request.guid())
    }
}

/// Submits `request`; an already verified contract counts as success.
pub fn verify(
    verifier: &mut dyn Verifier,
    request: &VerificationRequest,
) -> Result<VerificationStatus, VerifyError> {
    info!(address = %request.address, contract = %request.contract_name, "verifying contract");
    match verifier.submit(request) {
        Ok(guid) => {
            info!(%guid, "verification submitted");
            Ok(VerificationStatus::Submitted { guid })
        }
        Err(VerifyError::AlreadyVerified(address)) => {
            info!(%address, "already verified");
            Ok(VerificationStatus::AlreadyVerified)
        }
        Err(err) => Err(err),
    }
}
