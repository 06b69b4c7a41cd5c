// src/events.rs
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Log entries appended by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EntryPointEvent {
    /// Marks the start of a batch's operations.
    BeforeExecution,

    #[serde(rename_all = "camelCase")]
    AccountDeployed {
        user_op_hash: H256,
        sender: Address,
        factory: Address,
        paymaster: Option<Address>,
    },

    /// One per operation that reached execution.
    #[serde(rename_all = "camelCase")]
    UserOperationEvent {
        user_op_hash: H256,
        sender: Address,
        paymaster: Option<Address>,
        nonce: U256,
        success: bool,
        actual_gas_cost: U256,
        actual_gas_used: U256,
    },

    #[serde(rename_all = "camelCase")]
    UserOperationRevertReason {
        user_op_hash: H256,
        sender: Address,
        nonce: U256,
        revert_reason: String,
    },

    #[serde(rename_all = "camelCase")]
    PostOpReverted {
        user_op_hash: H256,
        paymaster: Address,
        revert_reason: String,
    },

    #[serde(rename_all = "camelCase")]
    Deposited { account: Address, total_deposit: U256 },

    #[serde(rename_all = "camelCase")]
    Withdrawn {
        account: Address,
        withdraw_address: Address,
        amount: U256,
    },

    #[serde(rename_all = "camelCase")]
    StakeLocked {
        account: Address,
        total_staked: U256,
        unstake_delay_sec: u64,
    },

    #[serde(rename_all = "camelCase")]
    StakeUnlocked { account: Address, withdraw_time: u64 },

    #[serde(rename_all = "camelCase")]
    StakeWithdrawn {
        account: Address,
        withdraw_address: Address,
        amount: U256,
    },
}
