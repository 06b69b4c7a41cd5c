// src/capability.rs
//! Interfaces implemented by untrusted account, paymaster, factory and
//! aggregator code, and the metered boundary every call to them goes through.

use std::fmt;

use ethers::types::{Address, Bytes, H256, U256};

use crate::{
    error::CallError,
    gas::GasMeter,
    types::{BlockEnv, PostOpMode, UserOperation, ValidationData},
};

/// Execution context handed to untrusted code for the duration of one call.
///
/// Value movements requested through the context are buffered and only take
/// effect if the call returns successfully.
#[derive(Debug)]
pub struct CallContext {
    address: Address,
    block: BlockEnv,
    gas: GasMeter,
    out_of_gas: bool,
    effects: CallEffects,
}

/// Value movements requested by a call, applied by the engine afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallEffects {
    /// Native value to move from the callee into its own deposit.
    pub prefund_payment: U256,
    pub transfers: Vec<(Address, U256)>,
}

impl CallEffects {
    pub fn is_empty(&self) -> bool {
        self.prefund_payment.is_zero() && self.transfers.is_empty()
    }

    /// Total native value leaving the callee.
    pub fn total_out(&self) -> Option<U256> {
        self.transfers
            .iter()
            .try_fold(self.prefund_payment, |acc, (_, value)| acc.checked_add(*value))
    }
}

impl CallContext {
    pub fn new(address: Address, block: BlockEnv, gas_limit: U256) -> Self {
        Self {
            address,
            block,
            gas: GasMeter::new(gas_limit),
            out_of_gas: false,
            effects: CallEffects::default(),
        }
    }

    /// Address of the code being called.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn block(&self) -> &BlockEnv {
        &self.block
    }

    pub fn use_gas(&mut self, amount: u64) -> Result<(), CallError> {
        self.gas.charge(amount).map_err(|_| {
            self.out_of_gas = true;
            CallError::OutOfGas
        })
    }

    pub fn gas_left(&self) -> U256 {
        self.gas.remaining()
    }

    /// Pays `amount` of the callee's native balance into its deposit.
    pub fn pay_prefund(&mut self, amount: U256) {
        self.effects.prefund_payment = self.effects.prefund_payment.saturating_add(amount);
    }

    /// Sends `amount` of the callee's native balance to `to`.
    pub fn transfer(&mut self, to: Address, amount: U256) {
        self.effects.transfers.push((to, amount));
    }
}

/// Result of a metered call.
#[derive(Debug)]
pub struct CallOutcome<T> {
    pub result: Result<T, CallError>,
    pub gas_used: U256,
    /// Empty unless the call succeeded.
    pub effects: CallEffects,
}

/// Runs `f` against a fresh context capped at `gas_limit`.
///
/// Running out of gas wins over whatever the callee returned, so code that
/// swallows its own out-of-gas error still fails.
pub fn invoke<T>(
    address: Address,
    block: BlockEnv,
    gas_limit: U256,
    f: impl FnOnce(&mut CallContext) -> Result<T, CallError>,
) -> CallOutcome<T> {
    let mut ctx = CallContext::new(address, block, gas_limit);
    let result = f(&mut ctx);
    let result = if ctx.out_of_gas {
        Err(CallError::OutOfGas)
    } else {
        result
    };
    let effects = if result.is_ok() {
        std::mem::take(&mut ctx.effects)
    } else {
        CallEffects::default()
    };
    CallOutcome {
        result,
        gas_used: ctx.gas.used(),
        effects,
    }
}

pub trait Account: AccountClone + fmt::Debug + Send + Sync {
    /// Authorizes `op`. `missing_account_funds` is what the account must pay
    /// into its deposit for the operation to be covered.
    fn validate_user_op(
        &mut self,
        ctx: &mut CallContext,
        op: &UserOperation,
        op_hash: H256,
        missing_account_funds: U256,
    ) -> Result<ValidationData, CallError>;

    /// Performs the action described by `call_data`.
    fn execute(&mut self, ctx: &mut CallContext, call_data: &[u8]) -> Result<(), CallError>;
}

/// What a paymaster hands back when it agrees to sponsor an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymasterValidation {
    /// Forwarded untouched to `post_op`.
    pub context: Bytes,
    pub validation_data: ValidationData,
}

pub trait Paymaster: PaymasterClone + fmt::Debug + Send + Sync {
    fn validate_paymaster_user_op(
        &mut self,
        ctx: &mut CallContext,
        op: &UserOperation,
        op_hash: H256,
        max_cost: U256,
    ) -> Result<PaymasterValidation, CallError>;

    fn post_op(
        &mut self,
        ctx: &mut CallContext,
        mode: PostOpMode,
        context: &[u8],
        actual_gas_cost: U256,
    ) -> Result<(), CallError>;
}

/// A freshly constructed account and the address the factory put it at.
#[derive(Debug)]
pub struct Deployment {
    pub address: Address,
    pub account: Box<dyn Account>,
}

pub trait Factory: FactoryClone + fmt::Debug + Send + Sync {
    fn deploy(&mut self, ctx: &mut CallContext, recipe: &[u8]) -> Result<Deployment, CallError>;
}

/// Accepts operations whose accounts delegate signature checking.
pub trait SignatureAggregator: AggregatorClone + fmt::Debug + Send + Sync {
    fn validate_user_op_signature(
        &self,
        ctx: &mut CallContext,
        op: &UserOperation,
    ) -> Result<(), CallError>;
}

macro_rules! boxed_clone {
    ($helper:ident, $capability:ident) => {
        pub trait $helper {
            fn clone_box(&self) -> Box<dyn $capability>;
        }

        impl<T> $helper for T
        where
            T: 'static + $capability + Clone,
        {
            fn clone_box(&self) -> Box<dyn $capability> {
                Box::new(self.clone())
            }
        }

        impl Clone for Box<dyn $capability> {
            fn clone(&self) -> Self {
                self.clone_box()
            }
        }
    };
}

boxed_clone!(AccountClone, Account);
boxed_clone!(PaymasterClone, Paymaster);
boxed_clone!(FactoryClone, Factory);
boxed_clone!(AggregatorClone, SignatureAggregator);
