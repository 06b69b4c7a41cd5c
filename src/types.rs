// src/types.rs
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Length of an address prefix in `initCode` and `paymasterAndData`.
pub const ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn factory(&self) -> Option<Address> {
        address_prefix(&self.init_code)
    }

    pub fn paymaster(&self) -> Option<Address> {
        address_prefix(&self.paymaster_and_data)
    }

    pub fn init_recipe(&self) -> &[u8] {
        self.init_code.get(ADDRESS_LEN..).unwrap_or_default()
    }

    pub fn paymaster_data(&self) -> &[u8] {
        self.paymaster_and_data.get(ADDRESS_LEN..).unwrap_or_default()
    }
}

fn address_prefix(field: &Bytes) -> Option<Address> {
    if field.len() < ADDRESS_LEN {
        None
    } else {
        Some(Address::from_slice(&field[..ADDRESS_LEN]))
    }
}

/// Layout of `paymasterAndData` understood by the verifying paymaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterAndData {
    pub paymaster: Address,
    pub valid_until: u64,
    pub valid_after: u64,
    pub signature: Bytes,
}

impl PaymasterAndData {
    /// Encode: paymaster address (20 bytes) + validUntil (32 bytes) + validAfter (32 bytes) + signature
    pub fn encode(&self) -> Bytes {
        let mut data = Vec::with_capacity(ADDRESS_LEN + 64 + self.signature.len());
        data.extend_from_slice(self.paymaster.as_bytes());
        data.extend_from_slice(&word(self.valid_until));
        data.extend_from_slice(&word(self.valid_after));
        data.extend_from_slice(&self.signature);
        Bytes::from(data)
    }

    /// Inverse of [`PaymasterAndData::encode`]. Returns `None` for short input
    /// or for time bounds that don't fit in 64 bits.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < ADDRESS_LEN + 64 {
            return None;
        }
        let paymaster = Address::from_slice(&data[..ADDRESS_LEN]);
        let valid_until = read_word(&data[ADDRESS_LEN..ADDRESS_LEN + 32])?;
        let valid_after = read_word(&data[ADDRESS_LEN + 32..ADDRESS_LEN + 64])?;
        Some(Self {
            paymaster,
            valid_until,
            valid_after,
            signature: Bytes::from(data[ADDRESS_LEN + 64..].to_vec()),
        })
    }
}

fn word(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

fn read_word(slot: &[u8]) -> Option<u64> {
    if slot[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&slot[24..32]);
    Some(u64::from_be_bytes(buf))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResponse {
    pub paymaster_and_data: Bytes,
}

/// Who vouched for the signature of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Aggregator {
    #[default]
    VerifiedBySelf,
    VerifiedBy(Address),
    FailedVerification,
}

/// What `validateUserOp` / `validatePaymasterUserOp` hand back to the engine.
///
/// `valid_until == 0` means the operation never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationData {
    pub aggregator: Aggregator,
    pub valid_after: u64,
    pub valid_until: u64,
}

impl ValidationData {
    pub fn window(valid_after: u64, valid_until: u64) -> Self {
        Self {
            aggregator: Aggregator::VerifiedBySelf,
            valid_after,
            valid_until,
        }
    }

    pub fn failed() -> Self {
        Self {
            aggregator: Aggregator::FailedVerification,
            ..Default::default()
        }
    }

    pub fn is_open_at(&self, now: u64) -> bool {
        let not_expired = self.valid_until == 0 || now <= self.valid_until;
        not_expired && now >= self.valid_after
    }

    /// Intersection of the account's and the paymaster's windows.
    pub fn intersect(self, other: ValidationData) -> ValidationData {
        let aggregator = match self.aggregator {
            Aggregator::VerifiedBySelf => other.aggregator,
            aggregator => aggregator,
        };
        let valid_until = match (self.valid_until, other.valid_until) {
            (0, until) | (until, 0) => until,
            (a, b) => a.min(b),
        };
        ValidationData {
            aggregator,
            valid_after: self.valid_after.max(other.valid_after),
            valid_until,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEnv {
    pub timestamp: u64,
    pub base_fee: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PostOpMode {
    OpSucceeded,
    OpReverted,
}

/// Stake of an entity as reported by simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    pub address: Address,
    pub stake: U256,
    pub unstake_delay_sec: u64,
}
