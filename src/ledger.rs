// src/ledger.rs
//! Deposits and stakes of accounts and paymasters.
//!
//! The available deposit pays for gas; the stake is locked collateral that
//! can only leave after `unlock_stake` and the unstake delay.

use std::collections::HashMap;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::LedgerError, types::StakeInfo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositInfo {
    pub deposit: U256,
    pub staked: bool,
    pub stake: U256,
    pub unstake_delay_sec: u64,
    /// Zero unless `unlock_stake` was called.
    pub withdraw_time: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DepositLedger {
    deposits: HashMap<Address, DepositInfo>,
    min_unstake_delay: u64,
}

impl DepositLedger {
    pub fn new(min_unstake_delay: u64) -> Self {
        Self {
            deposits: HashMap::new(),
            min_unstake_delay,
        }
    }

    pub fn deposit_info(&self, account: Address) -> DepositInfo {
        self.deposits.get(&account).copied().unwrap_or_default()
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.deposit_info(account).deposit
    }

    pub fn stake_info(&self, account: Address) -> StakeInfo {
        let info = self.deposit_info(account);
        StakeInfo {
            address: account,
            stake: info.stake,
            unstake_delay_sec: info.unstake_delay_sec,
        }
    }

    /// Credits `amount` to the available balance and returns the new total.
    pub fn deposit(&mut self, account: Address, amount: U256) -> Result<U256, LedgerError> {
        let info = self.deposits.entry(account).or_default();
        info.deposit = info
            .deposit
            .checked_add(amount)
            .ok_or(LedgerError::DepositOverflow)?;
        debug!("deposit {} to {:?}, total {}", amount, account, info.deposit);
        Ok(info.deposit)
    }

    /// Debits `amount` from the available balance. Never goes negative.
    pub fn withdraw(&mut self, account: Address, amount: U256) -> Result<U256, LedgerError> {
        let available = self.balance_of(account);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let info = self.deposits.entry(account).or_default();
        info.deposit = available - amount;
        Ok(info.deposit)
    }

    /// Locks `amount` more stake and sets the unstake delay, which may only
    /// grow. Returns the total stake.
    pub fn stake(
        &mut self,
        account: Address,
        amount: U256,
        unstake_delay_sec: u64,
    ) -> Result<U256, LedgerError> {
        let info = self.deposit_info(account);
        if unstake_delay_sec == 0 {
            return Err(LedgerError::MustSpecifyUnstakeDelay);
        }
        if unstake_delay_sec < self.min_unstake_delay {
            return Err(LedgerError::UnstakeDelayTooLow {
                requested: unstake_delay_sec,
                minimum: self.min_unstake_delay,
            });
        }
        if unstake_delay_sec < info.unstake_delay_sec {
            return Err(LedgerError::CannotDecreaseUnstakeTime);
        }
        let stake = info
            .stake
            .checked_add(amount)
            .ok_or(LedgerError::DepositOverflow)?;
        if stake.is_zero() {
            return Err(LedgerError::NoStakeSpecified);
        }
        self.deposits.insert(
            account,
            DepositInfo {
                deposit: info.deposit,
                staked: true,
                stake,
                unstake_delay_sec,
                withdraw_time: 0,
            },
        );
        Ok(stake)
    }

    /// Starts the unstake delay. Returns the time the stake becomes
    /// withdrawable.
    pub fn unlock_stake(&mut self, account: Address, now: u64) -> Result<u64, LedgerError> {
        let info = self.deposit_info(account);
        if info.unstake_delay_sec == 0 {
            return Err(LedgerError::NotStaked);
        }
        if !info.staked {
            return Err(LedgerError::AlreadyUnstaking);
        }
        let withdraw_time = now.saturating_add(info.unstake_delay_sec);
        self.deposits.insert(
            account,
            DepositInfo {
                staked: false,
                withdraw_time,
                ..info
            },
        );
        Ok(withdraw_time)
    }

    /// Releases the whole stake once the delay has elapsed.
    pub fn withdraw_stake(&mut self, account: Address, now: u64) -> Result<U256, LedgerError> {
        let info = self.deposit_info(account);
        if info.stake.is_zero() {
            return Err(LedgerError::NoStakeToWithdraw);
        }
        if info.withdraw_time == 0 {
            return Err(LedgerError::MustCallUnlockStakeFirst);
        }
        if info.withdraw_time > now {
            return Err(LedgerError::StakeLocked {
                withdraw_time: info.withdraw_time,
            });
        }
        self.deposits.insert(
            account,
            DepositInfo {
                unstake_delay_sec: 0,
                withdraw_time: 0,
                stake: U256::zero(),
                ..info
            },
        );
        Ok(info.stake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let mut ledger = DepositLedger::default();
        assert_eq!(ledger.deposit(addr(1), 100.into()), Ok(100.into()));
        assert_eq!(ledger.deposit(addr(1), 50.into()), Ok(150.into()));
        assert_eq!(ledger.withdraw(addr(1), 120.into()), Ok(30.into()));
        assert_eq!(
            ledger.withdraw(addr(1), 31.into()),
            Err(LedgerError::InsufficientBalance {
                requested: 31.into(),
                available: 30.into(),
            })
        );
        assert_eq!(ledger.balance_of(addr(1)), 30.into());
        assert_eq!(ledger.balance_of(addr(2)), U256::zero());
    }

    #[test]
    fn test_deposit_overflow() {
        let mut ledger = DepositLedger::default();
        ledger.deposit(addr(1), U256::MAX).unwrap();
        assert_eq!(
            ledger.deposit(addr(1), 1.into()),
            Err(LedgerError::DepositOverflow)
        );
        assert_eq!(ledger.balance_of(addr(1)), U256::MAX);
    }

    #[test]
    fn test_stake_lifecycle() {
        let mut ledger = DepositLedger::new(10);
        assert_eq!(
            ledger.stake(addr(1), 5.into(), 0),
            Err(LedgerError::MustSpecifyUnstakeDelay)
        );
        assert_eq!(
            ledger.stake(addr(1), 5.into(), 9),
            Err(LedgerError::UnstakeDelayTooLow {
                requested: 9,
                minimum: 10
            })
        );
        assert_eq!(
            ledger.stake(addr(1), U256::zero(), 10),
            Err(LedgerError::NoStakeSpecified)
        );
        assert_eq!(ledger.stake(addr(1), 5.into(), 20), Ok(5.into()));
        assert_eq!(
            ledger.stake(addr(1), 5.into(), 15),
            Err(LedgerError::CannotDecreaseUnstakeTime)
        );
        assert_eq!(ledger.stake(addr(1), 5.into(), 20), Ok(10.into()));

        assert_eq!(
            ledger.withdraw_stake(addr(1), 1_000),
            Err(LedgerError::MustCallUnlockStakeFirst)
        );
        assert_eq!(ledger.unlock_stake(addr(1), 100), Ok(120));
        assert_eq!(
            ledger.unlock_stake(addr(1), 101),
            Err(LedgerError::AlreadyUnstaking)
        );
        assert_eq!(
            ledger.withdraw_stake(addr(1), 119),
            Err(LedgerError::StakeLocked { withdraw_time: 120 })
        );
        assert_eq!(ledger.withdraw_stake(addr(1), 120), Ok(10.into()));
        assert_eq!(ledger.deposit_info(addr(1)), DepositInfo::default());
        assert_eq!(
            ledger.withdraw_stake(addr(1), 200),
            Err(LedgerError::NoStakeToWithdraw)
        );
        assert_eq!(ledger.unlock_stake(addr(1), 200), Err(LedgerError::NotStaked));
    }

    #[test]
    fn test_stake_is_not_spendable() {
        let mut ledger = DepositLedger::default();
        ledger.stake(addr(1), 100.into(), 60).unwrap();
        ledger.deposit(addr(1), 10.into()).unwrap();
        assert!(ledger.withdraw(addr(1), 11.into()).is_err());
        let info = ledger.deposit_info(addr(1));
        assert_eq!(info.deposit, 10.into());
        assert_eq!(info.stake, 100.into());
        assert_eq!(ledger.stake_info(addr(1)).unstake_delay_sec, 60);
    }
}
