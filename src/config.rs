// src/config.rs
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::EntryPointError;

/// Address the reference deployment of the v0.6 entry point lives at.
pub const DEFAULT_ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryPointConfig {
    pub chain_id: u64,
    /// The engine's own address. Part of every operation hash.
    pub entry_point: Address,
    pub paymaster_verification_multiplier: u64,
    pub min_paymaster_stake: U256,
    /// Lower bound on the unstake delay accepted by `add_stake`, in seconds.
    pub min_unstake_delay: u64,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            entry_point: DEFAULT_ENTRY_POINT.parse().unwrap_or_default(),
            paymaster_verification_multiplier: 3,
            min_paymaster_stake: U256::zero(),
            min_unstake_delay: 1,
        }
    }
}

impl EntryPointConfig {
    pub fn validate(&self) -> Result<(), EntryPointError> {
        if self.paymaster_verification_multiplier == 0 {
            return Err(EntryPointError::InvalidConfig(
                "paymaster verification multiplier must be at least 1".to_string(),
            ));
        }
        if self.entry_point.is_zero() {
            return Err(EntryPointError::InvalidConfig(
                "entry point address must not be zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EntryPointConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.entry_point,
            "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789".parse().unwrap()
        );
    }

    #[test]
    fn test_rejects_zero_multiplier() {
        let config = EntryPointConfig {
            paymaster_verification_multiplier: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EntryPointError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EntryPointConfig = serde_json::from_str(r#"{"chainId": 10}"#).unwrap();
        assert_eq!(config.chain_id, 10);
        assert_eq!(config.paymaster_verification_multiplier, 3);
    }
}
