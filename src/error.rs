// src/error.rs
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an operation was refused before anything was charged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum RejectionReason {
    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    #[error("sender mismatch: initCode deploys {derived:?}, not {sender:?}")]
    SenderMismatch { sender: Address, derived: Address },

    #[error("insufficient funds: prefund {required} exceeds {available}")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("validation failed")]
    ValidationFailed,

    #[error("paymaster rejected the operation")]
    PaymasterRejected,

    #[error("paymaster {0:?} is underfunded")]
    PaymasterUnderfunded(Address),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("abi decoding failed: {0}")]
    Abi(String),

    #[error("unexpected field layout")]
    FieldLayout,

    #[error("non-canonical encoding")]
    NonCanonical,

    #[error("initCode shorter than a factory address")]
    ShortInitCode,

    #[error("paymasterAndData shorter than a paymaster address")]
    ShortPaymasterAndData,

    #[error("gas value {0} does not fit in 128 bits")]
    GasValueOverflow(&'static str),
}

impl From<CodecError> for RejectionReason {
    fn from(err: CodecError) -> Self {
        RejectionReason::MalformedOperation(err.to_string())
    }
}

/// Failures of deposit and stake bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: U256, available: U256 },

    #[error("stake is locked until {withdraw_time}")]
    StakeLocked { withdraw_time: u64 },

    #[error("must specify unstake delay")]
    MustSpecifyUnstakeDelay,

    #[error("unstake delay {requested}s is below the minimum {minimum}s")]
    UnstakeDelayTooLow { requested: u64, minimum: u64 },

    #[error("cannot decrease unstake time")]
    CannotDecreaseUnstakeTime,

    #[error("no stake specified")]
    NoStakeSpecified,

    #[error("not staked")]
    NotStaked,

    #[error("already unstaking")]
    AlreadyUnstaking,

    #[error("no stake to withdraw")]
    NoStakeToWithdraw,

    #[error("must call unlockStake() first")]
    MustCallUnlockStakeFirst,

    #[error("deposit overflow")]
    DepositOverflow,
}

/// How an untrusted call ended when it did not return normally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("out of gas")]
    OutOfGas,

    #[error("reverted: {0}")]
    Reverted(String),
}

impl CallError {
    pub fn revert(reason: impl Into<String>) -> Self {
        CallError::Reverted(reason.into())
    }
}

/// Refusals that apply to a whole request rather than a single operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryPointError {
    #[error("invalid beneficiary")]
    InvalidBeneficiary,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("address {0:?} already has code")]
    AddressInUse(Address),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum PaymasterError {
    #[error("Invalid UserOperation: {0}")]
    InvalidUserOperation(String),

    #[error("Paymaster deposit {available} cannot cover {required}")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("Signature generation failed: {0}")]
    Signing(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
