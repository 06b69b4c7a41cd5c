// src/entry_point.rs
//! The engine's state and its deposit-management surface.

use std::collections::HashSet;

use ethers::types::{Address, H256, U256};
use tracing::info;

use crate::{
    chain::ChainState,
    codec,
    config::EntryPointConfig,
    error::{CodecError, EntryPointError},
    events::EntryPointEvent,
    gas::FeeParams,
    ledger::{DepositInfo, DepositLedger},
    resolver,
    types::{BlockEnv, UserOperation},
};

/// Ledger, substrate and replay protection shared by validation and
/// execution. Cloning it yields an independent snapshot for simulation.
///
/// Events accumulate until [`EntryPoint::drain_events`] is called, and the
/// set of executed `(sender, nonce)` pairs is never pruned. Long-lived
/// callers must drain events after each batch.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub(crate) config: EntryPointConfig,
    pub(crate) block: BlockEnv,
    pub(crate) ledger: DepositLedger,
    pub(crate) chain: ChainState,
    pub(crate) used_nonces: HashSet<(Address, U256)>,
    pub(crate) events: Vec<EntryPointEvent>,
}

impl EntryPoint {
    pub fn new(config: EntryPointConfig) -> Result<Self, EntryPointError> {
        config.validate()?;
        info!(
            "Initialized entry point {:?} on chain {}",
            config.entry_point, config.chain_id
        );
        Ok(Self {
            ledger: DepositLedger::new(config.min_unstake_delay),
            config,
            block: BlockEnv::default(),
            chain: ChainState::default(),
            used_nonces: HashSet::new(),
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    pub fn block(&self) -> BlockEnv {
        self.block
    }

    pub fn set_block(&mut self, block: BlockEnv) {
        self.block = block;
    }

    pub fn chain(&self) -> &ChainState {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut ChainState {
        &mut self.chain
    }

    pub fn ledger(&self) -> &DepositLedger {
        &self.ledger
    }

    pub fn fee_params(&self) -> FeeParams {
        FeeParams {
            base_fee: self.block.base_fee,
            paymaster_verification_multiplier: self.config.paymaster_verification_multiplier,
        }
    }

    pub fn get_user_op_hash(&self, op: &UserOperation) -> H256 {
        codec::canonical_hash(op, self.config.entry_point, self.config.chain_id)
    }

    pub fn get_sender_address(&self, init_code: &[u8]) -> Result<Address, CodecError> {
        resolver::get_sender_address(init_code)
    }

    pub fn is_nonce_used(&self, sender: Address, nonce: U256) -> bool {
        self.used_nonces.contains(&(sender, nonce))
    }

    pub fn snapshot(&self) -> EntryPoint {
        self.clone()
    }

    pub(crate) fn emit(&mut self, event: EntryPointEvent) {
        self.events.push(event);
    }

    /// Hands out every event appended since the last drain.
    pub fn drain_events(&mut self) -> Vec<EntryPointEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get_deposit_info(&self, account: Address) -> DepositInfo {
        self.ledger.deposit_info(account)
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.ledger.balance_of(account)
    }

    /// Adds `amount` to the deposit of `account`. Returns the new total.
    pub fn deposit_to(&mut self, account: Address, amount: U256) -> Result<U256, EntryPointError> {
        let total_deposit = self.ledger.deposit(account, amount)?;
        self.emit(EntryPointEvent::Deposited {
            account,
            total_deposit,
        });
        Ok(total_deposit)
    }

    /// Moves `amount` of `account`'s deposit to the native balance of
    /// `withdraw_address`.
    pub fn withdraw_to(
        &mut self,
        account: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), EntryPointError> {
        self.ledger.withdraw(account, amount)?;
        self.chain.credit(withdraw_address, amount);
        self.emit(EntryPointEvent::Withdrawn {
            account,
            withdraw_address,
            amount,
        });
        Ok(())
    }

    pub fn add_stake(
        &mut self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u64,
    ) -> Result<U256, EntryPointError> {
        let total_staked = self.ledger.stake(account, amount, unstake_delay_sec)?;
        self.emit(EntryPointEvent::StakeLocked {
            account,
            total_staked,
            unstake_delay_sec,
        });
        Ok(total_staked)
    }

    pub fn unlock_stake(&mut self, account: Address) -> Result<u64, EntryPointError> {
        let withdraw_time = self.ledger.unlock_stake(account, self.block.timestamp)?;
        self.emit(EntryPointEvent::StakeUnlocked {
            account,
            withdraw_time,
        });
        Ok(withdraw_time)
    }

    pub fn withdraw_stake(
        &mut self,
        account: Address,
        withdraw_address: Address,
    ) -> Result<U256, EntryPointError> {
        let amount = self.ledger.withdraw_stake(account, self.block.timestamp)?;
        self.chain.credit(withdraw_address, amount);
        self.emit(EntryPointEvent::StakeWithdrawn {
            account,
            withdraw_address,
            amount,
        });
        Ok(amount)
    }
}
