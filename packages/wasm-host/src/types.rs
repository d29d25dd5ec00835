//! Identity and environment types shared by the host and the VM.

use std::fmt;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HostError;

/// Human readable part of contract addresses.
pub const ADDRESS_HRP: Hrp = Hrp::parse_unchecked("wasm");

/// The identity of a contract instance: the code it runs and its instance number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId {
    /// The stored code the instance runs
    pub code_id: u64,
    /// The globally unique instance number
    pub instance_id: u64,
}

impl ContractId {
    /// Create a contract id.
    #[must_use]
    pub const fn new(code_id: u64, instance_id: u64) -> Self {
        Self {
            code_id,
            instance_id,
        }
    }

    /// The bech32 address of this contract.
    ///
    /// The first 20 bytes of `sha256("contract" || code_id || instance_id)`,
    /// integers big-endian.
    /// # Errors
    /// Returns [`HostError::AddressEncoding`] if bech32 encoding fails.
    pub fn address(&self) -> Result<String, HostError> {
        let mut hasher = Sha256::new();
        hasher.update(b"contract");
        hasher.update(self.code_id.to_be_bytes());
        hasher.update(self.instance_id.to_be_bytes());
        let hash = hasher.finalize();
        Ok(bech32::encode::<Bech32>(ADDRESS_HRP, &hash[..20])?)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.code_id, self.instance_id)
    }
}

/// The sha256 checksum of stored code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Checksum of the given code.
    #[must_use]
    pub fn generate(code: &[u8]) -> Self {
        Self(Sha256::digest(code).into())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Stored code metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    /// Checksum the VM knows the code by
    pub checksum: Checksum,
    /// Who stored the code
    pub creator: String,
    /// Pinned code stays loaded and is not charged the instance cost
    #[serde(default)]
    pub pinned: bool,
    /// Whether the code exports the IBC entry points
    #[serde(default)]
    pub ibc_enabled: bool,
}

/// Contract instance metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    /// Code and instance id
    pub id: ContractId,
    /// Bech32 address derived from the id
    pub address: String,
    /// Who instantiated the contract
    pub creator: String,
    /// Human readable label
    pub label: String,
    /// The port bound to the contract, if its code exports IBC entry points
    pub ibc_port_id: Option<String>,
}

/// The block the transaction executes in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub height: u64,
    /// Block time in nanoseconds since the unix epoch
    pub time_nanos: u64,
    /// The chain id
    pub chain_id: String,
}

/// The environment a contract entry point sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    /// The current block
    pub block: BlockInfo,
    /// The address of the called contract
    pub contract_address: String,
}

/// Who sent the message that triggered an `instantiate` or `execute`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    /// The sender address
    pub sender: String,
}
