// src/contracts/token_paymaster.rs
use std::collections::HashMap;

use ethers::{
    abi::{decode, encode, ParamType, Token},
    types::{Address, H256, U256},
};
use tracing::debug;

use crate::{
    capability::{CallContext, Paymaster, PaymasterValidation},
    error::CallError,
    types::{PostOpMode, UserOperation, ValidationData},
};

const VALIDATE_GAS: u64 = 4_000;
const POST_OP_GAS: u64 = 6_000;

/// Pays gas for holders of its token and bills them in tokens afterwards.
#[derive(Debug, Clone)]
pub struct TokenPaymaster {
    /// Tokens per wei of gas cost.
    rate: U256,
    balances: HashMap<Address, U256>,
}

impl TokenPaymaster {
    pub fn new(rate: U256) -> Self {
        Self {
            rate,
            balances: HashMap::new(),
        }
    }

    pub fn mint(&mut self, holder: Address, amount: U256) {
        let balance = self.balances.entry(holder).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or_default()
    }

    fn token_cost(&self, wei: U256) -> Result<U256, CallError> {
        wei.checked_mul(self.rate)
            .ok_or_else(|| CallError::revert("token paymaster: cost overflow"))
    }
}

impl Paymaster for TokenPaymaster {
    fn validate_paymaster_user_op(
        &mut self,
        ctx: &mut CallContext,
        op: &UserOperation,
        _op_hash: H256,
        max_cost: U256,
    ) -> Result<PaymasterValidation, CallError> {
        ctx.use_gas(VALIDATE_GAS)?;
        let required = self.token_cost(max_cost)?;
        if self.balance_of(op.sender) < required {
            return Err(CallError::revert("token paymaster: insufficient tokens"));
        }
        Ok(PaymasterValidation {
            context: encode(&[Token::Address(op.sender)]).into(),
            validation_data: ValidationData::default(),
        })
    }

    fn post_op(
        &mut self,
        ctx: &mut CallContext,
        mode: PostOpMode,
        context: &[u8],
        actual_gas_cost: U256,
    ) -> Result<(), CallError> {
        ctx.use_gas(POST_OP_GAS)?;
        let holder = match decode(&[ParamType::Address], context).as_deref() {
            Ok([Token::Address(holder)]) => *holder,
            _ => return Err(CallError::revert("token paymaster: invalid context")),
        };
        let cost = self.token_cost(actual_gas_cost)?;
        let balance = self.balance_of(holder);
        if balance < cost {
            return Err(CallError::revert("token paymaster: insufficient tokens"));
        }
        self.balances.insert(holder, balance - cost);
        debug!("billed {:?} {} tokens ({:?})", holder, cost, mode);
        Ok(())
    }
}
