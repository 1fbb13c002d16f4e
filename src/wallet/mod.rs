use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    chain::tx::Transaction,
    primitives::{hex_vec, Address},
};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("secret key must be 32 bytes (64 hex chars), got {0} bytes")]
    SecretLength(usize),
    #[error("secret key is not valid hex: {0}")]
    SecretHex(String),
    #[error("malformed public key for {0}")]
    MalformedKey(Address),
    #[error("malformed signature for transaction from {0}")]
    MalformedSignature(Address),
    #[error("invalid signature for transaction from {0}")]
    InvalidSignature(Address),
    #[error("transaction claims sender {claimed} but was signed by {actual}")]
    SenderMismatch { claimed: Address, actual: Address },
}

/// Account address controlled by an ed25519 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    Address::from_preimage(key.as_bytes())
}

#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&secret);
        let address = address_of(&signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, WalletError> {
        let trimmed = secret_hex.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|err| WalletError::SecretHex(err.to_string()))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::SecretLength(bytes.len()))?;
        Ok(Self::from_secret(secret))
    }

    /// Deterministic development account `index`, the same on every run.
    pub fn dev(index: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"fundme-dev-account");
        hasher.update(index.to_le_bytes());
        Self::from_secret(hasher.finalize().into())
    }

    pub fn random() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = address_of(&signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    pub fn sign(&self, tx: Transaction) -> SignedTransaction {
        let signature = self.signing_key.sign(&tx.digest());
        SignedTransaction {
            tx,
            public_key: self.signing_key.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub public_key: [u8; 32],
    #[serde(with = "hex_vec")]
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    pub fn hash(&self) -> [u8; 32] {
        self.tx.digest()
    }

    /// Checks the signature and that the key controls `tx.from`.
    pub fn verify(&self) -> Result<(), WalletError> {
        let from = self.tx.from;
        let key = VerifyingKey::from_bytes(&self.public_key)
            .map_err(|_| WalletError::MalformedKey(from))?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| WalletError::MalformedSignature(from))?;
        key.verify_strict(&self.tx.digest(), &signature)
            .map_err(|_| WalletError::InvalidSignature(from))?;
        let actual = address_of(&key);
        if actual != from {
            return Err(WalletError::SenderMismatch {
                claimed: from,
                actual,
            });
        }
        Ok(())
    }
}
