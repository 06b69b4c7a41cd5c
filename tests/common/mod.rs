#![allow(dead_code)]

use arka_entrypoint::{
    capability::{Account, CallContext, Paymaster, PaymasterValidation, SignatureAggregator},
    types::PostOpMode,
    BlockEnv, CallError, EntryPoint, EntryPointConfig, UserOperation, ValidationData,
};
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, H256, U256},
};

pub const NOW: u64 = 1_000;

/// Gas used by [`CounterAccount::validate_user_op`].
pub const COUNTER_VALIDATE_GAS: u64 = 1_000;
/// Gas used by one [`CounterAccount`] action.
pub const COUNTER_ACTION_GAS: u64 = 5_000;
pub const PAYMASTER_VALIDATE_GAS: u64 = 2_000;
pub const PAYMASTER_POST_OP_GAS: u64 = 3_000;

pub const INCREMENT: u8 = 0x01;
pub const REQUIRE_INCREMENTED: u8 = 0x02;
pub const BURN_ALL_GAS: u8 = 0xff;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn beneficiary() -> Address {
    addr(0xbe)
}

pub fn owner() -> LocalWallet {
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        .parse()
        .unwrap()
}

pub fn sponsor_key() -> &'static str {
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
}

/// Engine at `NOW` with a zero base fee, so every test op pays 1 wei per gas.
pub fn entry_point() -> EntryPoint {
    let mut ep = EntryPoint::new(EntryPointConfig::default()).unwrap();
    ep.set_block(BlockEnv {
        timestamp: NOW,
        base_fee: U256::zero(),
    });
    ep
}

/// Prefund 171_000 without a paymaster, 371_000 with one.
pub fn user_op(sender: Address, nonce: u64) -> UserOperation {
    UserOperation {
        sender,
        nonce: nonce.into(),
        call_gas_limit: 50_000.into(),
        verification_gas_limit: 100_000.into(),
        pre_verification_gas: 21_000.into(),
        max_fee_per_gas: 1.into(),
        max_priority_fee_per_gas: 1.into(),
        ..Default::default()
    }
}

pub fn with_call(op: UserOperation, action: u8) -> UserOperation {
    UserOperation {
        call_data: Bytes::from(vec![action]),
        ..op
    }
}

pub fn with_paymaster(op: UserOperation, paymaster: Address) -> UserOperation {
    UserOperation {
        paymaster_and_data: Bytes::from(paymaster.as_bytes().to_vec()),
        ..op
    }
}

pub async fn sign(ep: &EntryPoint, op: UserOperation, wallet: &LocalWallet) -> UserOperation {
    let hash = ep.get_user_op_hash(&op);
    let signature = wallet.sign_message(hash.as_bytes()).await.unwrap();
    UserOperation {
        signature: signature.to_vec().into(),
        ..op
    }
}

/// Account that accepts everything and keeps a counter its actions read and
/// write.
#[derive(Debug, Clone, Default)]
pub struct CounterAccount {
    pub counter: u64,
    pub validation_data: ValidationData,
}

impl CounterAccount {
    pub fn returning(validation_data: ValidationData) -> Self {
        Self {
            counter: 0,
            validation_data,
        }
    }
}

impl Account for CounterAccount {
    fn validate_user_op(
        &mut self,
        ctx: &mut CallContext,
        _op: &UserOperation,
        _op_hash: H256,
        missing_account_funds: U256,
    ) -> Result<ValidationData, CallError> {
        ctx.use_gas(COUNTER_VALIDATE_GAS)?;
        if !missing_account_funds.is_zero() {
            ctx.pay_prefund(missing_account_funds);
        }
        Ok(self.validation_data)
    }

    fn execute(&mut self, ctx: &mut CallContext, call_data: &[u8]) -> Result<(), CallError> {
        match call_data.first() {
            Some(&INCREMENT) => {
                ctx.use_gas(COUNTER_ACTION_GAS)?;
                self.counter += 1;
                Ok(())
            }
            Some(&REQUIRE_INCREMENTED) => {
                ctx.use_gas(COUNTER_ACTION_GAS)?;
                if self.counter == 0 {
                    return Err(CallError::revert("counter not incremented"));
                }
                Ok(())
            }
            Some(&BURN_ALL_GAS) => ctx.use_gas(u64::MAX),
            _ => Err(CallError::revert("unknown action")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPaymaster {
    pub reject_validation: bool,
    pub revert_post_op: bool,
    pub validation_data: ValidationData,
}

impl Paymaster for ScriptedPaymaster {
    fn validate_paymaster_user_op(
        &mut self,
        ctx: &mut CallContext,
        _op: &UserOperation,
        _op_hash: H256,
        _max_cost: U256,
    ) -> Result<PaymasterValidation, CallError> {
        ctx.use_gas(PAYMASTER_VALIDATE_GAS)?;
        if self.reject_validation {
            return Err(CallError::revert("not sponsoring"));
        }
        Ok(PaymasterValidation {
            context: Bytes::from(vec![0xc0]),
            validation_data: self.validation_data,
        })
    }

    fn post_op(
        &mut self,
        ctx: &mut CallContext,
        _mode: PostOpMode,
        context: &[u8],
        _actual_gas_cost: U256,
    ) -> Result<(), CallError> {
        ctx.use_gas(PAYMASTER_POST_OP_GAS)?;
        assert_eq!(context, &[0xc0]);
        if self.revert_post_op {
            return Err(CallError::revert("postOp failed"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AcceptingAggregator;

impl SignatureAggregator for AcceptingAggregator {
    fn validate_user_op_signature(
        &self,
        ctx: &mut CallContext,
        _op: &UserOperation,
    ) -> Result<(), CallError> {
        ctx.use_gas(500)
    }
}
