// src/validation.rs
//! Per-operation validation: resolve, prefund check, deployment, account
//! authorization, paymaster sponsorship and the aggregator hook.
//!
//! Nothing here moves a prefund. Code called during validation may change
//! its own state or pay into its own deposit, and those changes stay.

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    capability::{invoke, CallEffects, PaymasterValidation},
    codec,
    entry_point::EntryPoint,
    error::{CallError, RejectionReason},
    events::EntryPointEvent,
    gas::{gas_price, required_prefund},
    resolver,
    types::{Aggregator, StakeInfo, UserOperation, ValidationData},
};

/// Who backs the prefund of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "camelCase")]
pub enum PrefundSource {
    Account(Address),
    Paymaster(Address),
}

impl PrefundSource {
    pub fn address(&self) -> Address {
        match self {
            PrefundSource::Account(address) | PrefundSource::Paymaster(address) => *address,
        }
    }
}

/// An operation that passed every validation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOp {
    pub op_hash: H256,
    pub sender: Address,
    pub prefund: U256,
    pub source: PrefundSource,
    pub gas_price: U256,
    /// Paymaster context, present iff a paymaster sponsors the operation.
    pub context: Option<Bytes>,
    /// Gas spent on deployment, account, paymaster and aggregator checks.
    pub verification_gas_used: U256,
    pub validation_data: ValidationData,
}

impl ValidatedOp {
    /// Gas consumed before the call phase.
    pub fn pre_op_gas(&self, op: &UserOperation) -> U256 {
        op.pre_verification_gas
            .saturating_add(self.verification_gas_used)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Refused before anything was charged.
    Rejected(RejectionReason),
    /// The factory failed to deploy the sender. Untrusted code ran, so the
    /// gas it burned is chargeable.
    DeploymentFailed { gas_used: U256, reason: String },
}

impl From<RejectionReason> for ValidationFailure {
    fn from(reason: RejectionReason) -> Self {
        ValidationFailure::Rejected(reason)
    }
}

fn validation_failed(op_hash: H256, step: &str, detail: impl std::fmt::Display) -> ValidationFailure {
    warn!("op {:?} failed {}: {}", op_hash, step, detail);
    ValidationFailure::Rejected(RejectionReason::ValidationFailed)
}

fn paymaster_rejected(op_hash: H256, detail: impl std::fmt::Display) -> ValidationFailure {
    warn!("op {:?} rejected by paymaster: {}", op_hash, detail);
    ValidationFailure::Rejected(RejectionReason::PaymasterRejected)
}

/// Classification returned by the offline simulation surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SimulationOutcome {
    Valid,
    Rejected { reason: RejectionReason },
    DeploymentFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub outcome: SimulationOutcome,
    pub required_prefund: U256,
    pub pre_op_gas: U256,
    pub valid_after: u64,
    pub valid_until: u64,
    pub sender_info: StakeInfo,
    pub paymaster_info: Option<StakeInfo>,
}

impl EntryPoint {
    /// Runs validation against a snapshot and reports what the
    /// authoritative pass would decide. Leaves `self` untouched.
    pub fn simulate_validation(&self, op: &UserOperation) -> SimulationResult {
        let mut scratch = self.snapshot();
        let required_prefund = required_prefund(op, &self.fee_params()).unwrap_or_default();
        let sender_info = self.ledger.stake_info(op.sender);
        let paymaster_info = op.paymaster().map(|p| self.ledger.stake_info(p));

        let mut result = SimulationResult {
            outcome: SimulationOutcome::Valid,
            required_prefund,
            pre_op_gas: U256::zero(),
            valid_after: 0,
            valid_until: 0,
            sender_info,
            paymaster_info,
        };
        match scratch.validate_user_op(op) {
            Ok(validated) => {
                result.pre_op_gas = validated.pre_op_gas(op);
                result.valid_after = validated.validation_data.valid_after;
                result.valid_until = validated.validation_data.valid_until;
            }
            Err(ValidationFailure::Rejected(reason)) => {
                result.outcome = SimulationOutcome::Rejected { reason };
            }
            Err(ValidationFailure::DeploymentFailed { reason, .. }) => {
                result.outcome = SimulationOutcome::DeploymentFailed { reason };
            }
        }
        result
    }

    /// The authoritative validation of one operation.
    pub(crate) fn validate_user_op(
        &mut self,
        op: &UserOperation,
    ) -> Result<ValidatedOp, ValidationFailure> {
        let op_hash = self.get_user_op_hash(op);

        // Resolve
        codec::check_well_formed(op).map_err(RejectionReason::from)?;
        let sender = resolver::resolve_address(op)?;
        let fees = self.fee_params();
        let prefund = required_prefund(op, &fees).map_err(RejectionReason::from)?;
        let price = gas_price(op, fees.base_fee);
        if self.is_nonce_used(sender, op.nonce) {
            return Err(validation_failed(op_hash, "nonce check", "nonce already used"));
        }
        debug!("op {:?} resolved to {:?}, prefund {}", op_hash, sender, prefund);

        // PrefundCheck
        let source = match op.paymaster() {
            Some(paymaster) => PrefundSource::Paymaster(paymaster),
            None => PrefundSource::Account(sender),
        };
        self.check_prefund(source, prefund)?;

        let verification_limit = op.verification_gas_limit;
        let mut verification_gas_used = U256::zero();

        // Deployment
        if !self.chain.has_code(sender) {
            if op.init_code.is_empty() {
                return Err(validation_failed(op_hash, "account lookup", "account not deployed"));
            }
            verification_gas_used += self.deploy_sender(op, sender, op_hash)?;
        } else if !op.init_code.is_empty() {
            return Err(validation_failed(op_hash, "account lookup", "sender already constructed"));
        }

        // AccountValidation
        let missing_account_funds = match source {
            PrefundSource::Account(_) => prefund.saturating_sub(self.ledger.balance_of(sender)),
            PrefundSource::Paymaster(_) => U256::zero(),
        };
        let block = self.block;
        let account = self
            .chain
            .account_mut(sender)
            .ok_or_else(|| validation_failed(op_hash, "account lookup", "sender is not an account"))?;
        let outcome = invoke(
            sender,
            block,
            verification_limit.saturating_sub(verification_gas_used),
            |ctx| account.validate_user_op(ctx, op, op_hash, missing_account_funds),
        );
        verification_gas_used += outcome.gas_used;
        let account_data = outcome
            .result
            .map_err(|e| validation_failed(op_hash, "account validation", e))?;
        self.apply_call_effects(sender, &outcome.effects)
            .map_err(|e| validation_failed(op_hash, "account prefund payment", e))?;

        if account_data.aggregator == Aggregator::FailedVerification {
            return Err(validation_failed(op_hash, "account validation", "signature error"));
        }
        if !account_data.is_open_at(block.timestamp) {
            return Err(validation_failed(op_hash, "account validation", "expired or not due"));
        }
        if let PrefundSource::Account(_) = source {
            let deposit = self.ledger.balance_of(sender);
            if deposit < prefund {
                warn!("op {:?}: account didn't pay prefund", op_hash);
                return Err(RejectionReason::InsufficientFunds {
                    required: prefund,
                    available: deposit,
                }
                .into());
            }
        }

        // PaymasterValidation
        let (context, paymaster_data) = match source {
            PrefundSource::Paymaster(paymaster) => {
                let remaining = verification_limit.saturating_sub(verification_gas_used);
                let (validation, gas_used) =
                    self.validate_paymaster(op, op_hash, paymaster, prefund, remaining)?;
                verification_gas_used += gas_used;
                (Some(validation.context), validation.validation_data)
            }
            PrefundSource::Account(_) => (None, ValidationData::default()),
        };

        // Aggregate-signature hook
        if let Aggregator::VerifiedBy(aggregator) = account_data.aggregator {
            let remaining = verification_limit.saturating_sub(verification_gas_used);
            let handler = self
                .chain
                .aggregator(aggregator)
                .ok_or_else(|| validation_failed(op_hash, "aggregator lookup", "unknown aggregator"))?;
            let outcome = invoke(aggregator, block, remaining, |ctx| {
                handler.validate_user_op_signature(ctx, op)
            });
            verification_gas_used += outcome.gas_used;
            outcome
                .result
                .map_err(|e| validation_failed(op_hash, "aggregated signature", e))?;
        }

        debug!(
            "op {:?} valid, verification gas used {}",
            op_hash, verification_gas_used
        );
        Ok(ValidatedOp {
            op_hash,
            sender,
            prefund,
            source,
            gas_price: price,
            context,
            verification_gas_used,
            validation_data: account_data.intersect(paymaster_data),
        })
    }

    fn check_prefund(&self, source: PrefundSource, prefund: U256) -> Result<(), RejectionReason> {
        match source {
            PrefundSource::Paymaster(paymaster) => {
                if self.ledger.balance_of(paymaster) < prefund {
                    return Err(RejectionReason::PaymasterUnderfunded(paymaster));
                }
            }
            PrefundSource::Account(sender) => {
                // the account may top up its deposit from its native balance
                let available = self
                    .ledger
                    .balance_of(sender)
                    .saturating_add(self.chain.balance(sender));
                if available < prefund {
                    return Err(RejectionReason::InsufficientFunds {
                        required: prefund,
                        available,
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies the effects of a successful call to `from` and credits any
    /// prefund payment to its deposit.
    pub(crate) fn apply_call_effects(
        &mut self,
        from: Address,
        effects: &CallEffects,
    ) -> Result<(), CallError> {
        if effects.is_empty() {
            return Ok(());
        }
        let paid = self
            .chain
            .apply_effects(from, effects)
            .map_err(|e| CallError::revert(e.to_string()))?;
        if !paid.is_zero() {
            self.ledger
                .deposit(from, paid)
                .map_err(|e| CallError::revert(e.to_string()))?;
        }
        Ok(())
    }

    /// Deploys the sender through its factory under the verification gas
    /// limit. Returns the gas the factory used.
    fn deploy_sender(
        &mut self,
        op: &UserOperation,
        sender: Address,
        op_hash: H256,
    ) -> Result<U256, ValidationFailure> {
        let block = self.block;
        let Some(factory_address) = op.factory() else {
            return Err(validation_failed(op_hash, "deployment", "missing factory"));
        };
        let Some(factory) = self.chain.factory_mut(factory_address) else {
            return Err(deployment_failed(op_hash, U256::zero(), "factory has no code"));
        };
        let outcome = invoke(factory_address, block, op.verification_gas_limit, |ctx| {
            factory.deploy(ctx, op.init_recipe())
        });
        let gas_used = outcome.gas_used;
        let deployment = outcome
            .result
            .map_err(|e| deployment_failed(op_hash, gas_used, e))?;
        if deployment.address != sender {
            return Err(deployment_failed(
                op_hash,
                gas_used,
                format!("factory deployed {:?}", deployment.address),
            ));
        }
        self.chain
            .apply_effects(factory_address, &outcome.effects)
            .map_err(|e| deployment_failed(op_hash, gas_used, e))?;
        self.chain
            .install_account(sender, deployment.account)
            .map_err(|e| deployment_failed(op_hash, gas_used, e))?;

        info!("Deployed account {:?} via factory {:?}", sender, factory_address);
        self.emit(EntryPointEvent::AccountDeployed {
            user_op_hash: op_hash,
            sender,
            factory: factory_address,
            paymaster: op.paymaster(),
        });
        Ok(gas_used)
    }

    fn validate_paymaster(
        &mut self,
        op: &UserOperation,
        op_hash: H256,
        paymaster: Address,
        max_cost: U256,
        gas_limit: U256,
    ) -> Result<(PaymasterValidation, U256), ValidationFailure> {
        let block = self.block;
        let handler = self
            .chain
            .paymaster_mut(paymaster)
            .ok_or_else(|| paymaster_rejected(op_hash, "paymaster has no code"))?;
        let outcome = invoke(paymaster, block, gas_limit, |ctx| {
            handler.validate_paymaster_user_op(ctx, op, op_hash, max_cost)
        });
        let validation = outcome.result.map_err(|e| paymaster_rejected(op_hash, e))?;
        self.apply_call_effects(paymaster, &outcome.effects)
            .map_err(|e| paymaster_rejected(op_hash, e))?;

        let data = validation.validation_data;
        if data.aggregator == Aggregator::FailedVerification {
            return Err(paymaster_rejected(op_hash, "signature error"));
        }
        if !data.is_open_at(block.timestamp) {
            return Err(paymaster_rejected(op_hash, "expired or not due"));
        }

        let info = self.ledger.deposit_info(paymaster);
        let backing = info.deposit.saturating_add(info.stake);
        if info.stake < self.config.min_paymaster_stake || backing < max_cost {
            warn!(
                "op {:?}: paymaster {:?} underfunded (deposit {}, stake {})",
                op_hash, paymaster, info.deposit, info.stake
            );
            return Err(RejectionReason::PaymasterUnderfunded(paymaster).into());
        }
        Ok((validation, outcome.gas_used))
    }
}

fn deployment_failed(op_hash: H256, gas_used: U256, detail: impl std::fmt::Display) -> ValidationFailure {
    let reason = detail.to_string();
    warn!("op {:?} deployment failed: {}", op_hash, reason);
    ValidationFailure::DeploymentFailed { gas_used, reason }
}
