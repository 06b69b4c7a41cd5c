// src/contracts/simple_account.rs
use ethers::{
    abi::{decode, encode, ParamType, Token},
    types::{Address, Bytes, H256, U256},
};

use super::{recover_signer, ECRECOVER_GAS, TRANSFER_GAS};
use crate::{
    capability::{Account, CallContext},
    error::CallError,
    types::{UserOperation, ValidationData},
};

const NONCE_GAS: u64 = 5_000;

/// Minimal account owned by a single ECDSA key, with a sequential nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleAccount {
    owner: Address,
    nonce: U256,
}

impl SimpleAccount {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            nonce: U256::zero(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Next nonce the account accepts.
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// `callData` that sends `value` of native currency to `dest`.
    pub fn transfer_call_data(dest: Address, value: U256) -> Bytes {
        encode(&[Token::Address(dest), Token::Uint(value)]).into()
    }
}

impl Account for SimpleAccount {
    fn validate_user_op(
        &mut self,
        ctx: &mut CallContext,
        op: &UserOperation,
        op_hash: H256,
        missing_account_funds: U256,
    ) -> Result<ValidationData, CallError> {
        ctx.use_gas(ECRECOVER_GAS)?;
        if recover_signer(op_hash, &op.signature) != Some(self.owner) {
            return Ok(ValidationData::failed());
        }

        ctx.use_gas(NONCE_GAS)?;
        if op.nonce != self.nonce {
            return Err(CallError::revert("account: invalid nonce"));
        }
        self.nonce += U256::one();

        if !missing_account_funds.is_zero() {
            ctx.pay_prefund(missing_account_funds);
        }
        Ok(ValidationData::default())
    }

    fn execute(&mut self, ctx: &mut CallContext, call_data: &[u8]) -> Result<(), CallError> {
        if call_data.is_empty() {
            return Ok(());
        }
        let tokens = decode(&[ParamType::Address, ParamType::Uint(256)], call_data)
            .map_err(|_| CallError::revert("account: invalid callData"))?;
        let (dest, value) = match tokens.as_slice() {
            [Token::Address(dest), Token::Uint(value)] => (*dest, *value),
            _ => return Err(CallError::revert("account: invalid callData")),
        };
        ctx.use_gas(TRANSFER_GAS)?;
        ctx.transfer(dest, value);
        Ok(())
    }
}
