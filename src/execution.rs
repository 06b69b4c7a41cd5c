// src/execution.rs
//! Sequential batch execution and settlement.

use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    capability::invoke,
    entry_point::EntryPoint,
    error::{CallError, EntryPointError, LedgerError, RejectionReason},
    events::EntryPointEvent,
    gas::{gas_price, required_prefund, settle, BatchBudget},
    types::{PostOpMode, UserOperation},
    validation::{PrefundSource, ValidatedOp, ValidationFailure},
};

/// What happened to one operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OpOutcome {
    #[serde(rename_all = "camelCase")]
    Executed {
        actual_gas_cost: U256,
        actual_gas_used: U256,
    },
    Rejected {
        reason: RejectionReason,
    },
    #[serde(rename_all = "camelCase")]
    DeploymentFailed { actual_gas_cost: U256 },
    #[serde(rename_all = "camelCase")]
    CallReverted {
        actual_gas_cost: U256,
        actual_gas_used: U256,
        revert_reason: String,
    },
}

impl OpOutcome {
    /// Fee collected from this operation.
    pub fn actual_gas_cost(&self) -> U256 {
        match self {
            OpOutcome::Executed {
                actual_gas_cost, ..
            }
            | OpOutcome::DeploymentFailed { actual_gas_cost }
            | OpOutcome::CallReverted {
                actual_gas_cost, ..
            } => *actual_gas_cost,
            OpOutcome::Rejected { .. } => U256::zero(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleOpsReport {
    /// One entry per submitted operation, in submission order.
    pub outcomes: Vec<OpOutcome>,
    /// Total credited to the beneficiary.
    pub collected: U256,
    pub events: Vec<EntryPointEvent>,
}

impl EntryPoint {
    /// Validates and executes `ops` in order, then pays the collected fees
    /// to `beneficiary`.
    pub fn handle_ops(
        &mut self,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<HandleOpsReport, EntryPointError> {
        if beneficiary.is_zero() {
            return Err(EntryPointError::InvalidBeneficiary);
        }
        let first_event = self.events.len();
        self.emit(EntryPointEvent::BeforeExecution);

        let mut budget = BatchBudget::default();
        let outcomes: Vec<OpOutcome> = ops
            .iter()
            .map(|op| self.process_op(op, &mut budget))
            .collect();

        self.chain.credit(beneficiary, budget.collected);
        info!(
            "Executed batch of {} ops, collected {} for {:?}",
            ops.len(),
            budget.collected,
            beneficiary
        );
        Ok(HandleOpsReport {
            outcomes,
            collected: budget.collected,
            events: self.events[first_event..].to_vec(),
        })
    }

    /// Runs one operation through validation and execution on a snapshot.
    pub fn simulate_handle_op(&self, op: &UserOperation) -> OpOutcome {
        let mut scratch = self.snapshot();
        scratch.process_op(op, &mut BatchBudget::default())
    }

    fn process_op(&mut self, op: &UserOperation, budget: &mut BatchBudget) -> OpOutcome {
        match self.validate_user_op(op) {
            Ok(validated) => self.execute_validated(op, validated, budget),
            Err(ValidationFailure::Rejected(reason)) => {
                debug!("op from {:?} rejected: {}", op.sender, reason);
                OpOutcome::Rejected { reason }
            }
            Err(ValidationFailure::DeploymentFailed { gas_used, reason }) => {
                self.charge_failed_deployment(op, gas_used, &reason, budget)
            }
        }
    }

    /// Charges the funding source PrefundCheck approved for a deployment
    /// attempt that ran untrusted code.
    fn charge_failed_deployment(
        &mut self,
        op: &UserOperation,
        gas_used: U256,
        reason: &str,
        budget: &mut BatchBudget,
    ) -> OpOutcome {
        let fees = self.fee_params();
        let price = gas_price(op, fees.base_fee);
        let prefund = required_prefund(op, &fees).unwrap_or_default();
        let actual_gas_used = op.pre_verification_gas.saturating_add(gas_used);
        let cost = actual_gas_used.saturating_mul(price).min(prefund);

        let source = match op.paymaster() {
            Some(paymaster) => PrefundSource::Paymaster(paymaster),
            None => PrefundSource::Account(op.sender),
        };
        let charge = match self.withdraw_deployment_charge(source, cost) {
            Ok(charge) => {
                budget.reserve(charge);
                budget.collect(charge)
            }
            Err(e) => {
                warn!("could not charge {:?} for deployment: {}", source.address(), e);
                U256::zero()
            }
        };
        let op_hash = self.get_user_op_hash(op);
        self.emit(EntryPointEvent::UserOperationRevertReason {
            user_op_hash: op_hash,
            sender: op.sender,
            nonce: op.nonce,
            revert_reason: reason.to_string(),
        });
        self.emit(EntryPointEvent::UserOperationEvent {
            user_op_hash: op_hash,
            sender: op.sender,
            paymaster: op.paymaster(),
            nonce: op.nonce,
            success: false,
            actual_gas_cost: charge,
            actual_gas_used,
        });
        OpOutcome::DeploymentFailed {
            actual_gas_cost: charge,
        }
    }

    /// Takes `cost` from the paymaster's deposit, or from the account's
    /// deposit topped up by its native balance.
    fn withdraw_deployment_charge(
        &mut self,
        source: PrefundSource,
        cost: U256,
    ) -> Result<U256, LedgerError> {
        match source {
            PrefundSource::Paymaster(paymaster) => {
                self.ledger.withdraw(paymaster, cost)?;
            }
            PrefundSource::Account(sender) => {
                let from_deposit = cost.min(self.ledger.balance_of(sender));
                self.chain.debit(sender, cost - from_deposit)?;
                self.ledger.withdraw(sender, from_deposit)?;
            }
        }
        Ok(cost)
    }

    fn execute_validated(
        &mut self,
        op: &UserOperation,
        validated: ValidatedOp,
        budget: &mut BatchBudget,
    ) -> OpOutcome {
        let op_hash = validated.op_hash;
        let sender = validated.sender;
        let prefund = validated.prefund;
        let source = validated.source;
        let pre_op_gas = validated.pre_op_gas(op);

        // commit the prefund
        if let Err(e) = self.ledger.withdraw(source.address(), prefund) {
            warn!("op {:?}: prefund withdrawal failed: {}", op_hash, e);
            let reason = match source {
                PrefundSource::Account(_) => RejectionReason::InsufficientFunds {
                    required: prefund,
                    available: self.ledger.balance_of(sender),
                },
                PrefundSource::Paymaster(paymaster) => {
                    RejectionReason::PaymasterUnderfunded(paymaster)
                }
            };
            return OpOutcome::Rejected { reason };
        }
        budget.reserve(prefund);
        self.used_nonces.insert((sender, op.nonce));

        let (call_result, call_gas_used) = self.run_call(op, sender);
        let post_op_gas_used = match &validated.context {
            Some(context) => self.run_post_op(
                op,
                &validated,
                context,
                call_result.is_ok(),
                pre_op_gas.saturating_add(call_gas_used),
            ),
            None => Ok(U256::zero()),
        };

        let (post_op_ok, post_op_gas_used) = match post_op_gas_used {
            Ok(gas) => (true, gas),
            Err(gas) => (false, gas),
        };
        let actual_gas_used = pre_op_gas
            .saturating_add(call_gas_used)
            .saturating_add(post_op_gas_used);
        let settlement = settle(prefund, actual_gas_used, validated.gas_price);
        if let Err(e) = self.ledger.deposit(source.address(), settlement.refund) {
            warn!("op {:?}: refund failed: {}", op_hash, e);
        }
        let charge = budget.collect(settlement.charge);

        if let Err(e) = &call_result {
            self.emit(EntryPointEvent::UserOperationRevertReason {
                user_op_hash: op_hash,
                sender,
                nonce: op.nonce,
                revert_reason: e.to_string(),
            });
        }
        self.emit(EntryPointEvent::UserOperationEvent {
            user_op_hash: op_hash,
            sender,
            paymaster: op.paymaster(),
            nonce: op.nonce,
            success: call_result.is_ok() && post_op_ok,
            actual_gas_cost: charge,
            actual_gas_used,
        });
        debug!(
            "op {:?} settled: gas used {}, charge {}, refund {}",
            op_hash, actual_gas_used, charge, settlement.refund
        );

        match call_result {
            Ok(()) => OpOutcome::Executed {
                actual_gas_cost: charge,
                actual_gas_used,
            },
            Err(e) => OpOutcome::CallReverted {
                actual_gas_cost: charge,
                actual_gas_used,
                revert_reason: e.to_string(),
            },
        }
    }

    /// Runs the account's action under `callGasLimit`. A failure is
    /// contained to this operation.
    fn run_call(&mut self, op: &UserOperation, sender: Address) -> (Result<(), CallError>, U256) {
        if op.call_data.is_empty() {
            return (Ok(()), U256::zero());
        }
        let block = self.block;
        let Some(account) = self.chain.account_mut(sender) else {
            return (Err(CallError::revert("sender has no code")), U256::zero());
        };
        let outcome = invoke(sender, block, op.call_gas_limit, |ctx| {
            account.execute(ctx, &op.call_data)
        });
        let result = outcome
            .result
            .and_then(|()| self.apply_call_effects(sender, &outcome.effects));
        if let Err(e) = &result {
            warn!(
                "call of {:?} reverted: {} (callData 0x{})",
                sender,
                e,
                hex::encode(&op.call_data)
            );
        }
        (result, outcome.gas_used)
    }

    /// Calls the paymaster's post-execution hook. Returns the gas it used,
    /// as `Err` when the hook reverted.
    fn run_post_op(
        &mut self,
        op: &UserOperation,
        validated: &ValidatedOp,
        context: &Bytes,
        call_succeeded: bool,
        gas_used_so_far: U256,
    ) -> Result<U256, U256> {
        let PrefundSource::Paymaster(paymaster) = validated.source else {
            return Ok(U256::zero());
        };
        let mode = if call_succeeded {
            PostOpMode::OpSucceeded
        } else {
            PostOpMode::OpReverted
        };
        let actual_gas_cost = gas_used_so_far
            .saturating_mul(validated.gas_price)
            .min(validated.prefund);

        let block = self.block;
        let outcome = match self.chain.paymaster_mut(paymaster) {
            Some(handler) => invoke(paymaster, block, op.verification_gas_limit, |ctx| {
                handler.post_op(ctx, mode, context, actual_gas_cost)
            }),
            None => {
                return Err(U256::zero());
            }
        };
        let gas_used = outcome.gas_used;
        let result = outcome
            .result
            .and_then(|()| self.apply_call_effects(paymaster, &outcome.effects));
        match result {
            Ok(()) => Ok(gas_used),
            Err(e) => {
                warn!("postOp of {:?} reverted: {}", paymaster, e);
                self.emit(EntryPointEvent::PostOpReverted {
                    user_op_hash: validated.op_hash,
                    paymaster,
                    revert_reason: e.to_string(),
                });
                Err(gas_used)
            }
        }
    }
}
