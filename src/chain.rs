// src/chain.rs
//! In-memory execution substrate: which code lives at which address, and
//! native balances.

use std::collections::HashMap;

use ethers::types::{Address, U256};

use crate::{
    capability::{Account, CallEffects, Factory, Paymaster, SignatureAggregator},
    error::{EntryPointError, LedgerError},
};

#[derive(Debug, Clone, Default)]
pub struct ChainState {
    accounts: HashMap<Address, Box<dyn Account>>,
    paymasters: HashMap<Address, Box<dyn Paymaster>>,
    factories: HashMap<Address, Box<dyn Factory>>,
    aggregators: HashMap<Address, Box<dyn SignatureAggregator>>,
    balances: HashMap<Address, U256>,
}

impl ChainState {
    pub fn has_code(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
            || self.paymasters.contains_key(&address)
            || self.factories.contains_key(&address)
            || self.aggregators.contains_key(&address)
    }

    fn ensure_free(&self, address: Address) -> Result<(), EntryPointError> {
        if self.has_code(address) {
            return Err(EntryPointError::AddressInUse(address));
        }
        Ok(())
    }

    pub fn install_account(
        &mut self,
        address: Address,
        account: Box<dyn Account>,
    ) -> Result<(), EntryPointError> {
        self.ensure_free(address)?;
        self.accounts.insert(address, account);
        Ok(())
    }

    pub fn install_paymaster(
        &mut self,
        address: Address,
        paymaster: Box<dyn Paymaster>,
    ) -> Result<(), EntryPointError> {
        self.ensure_free(address)?;
        self.paymasters.insert(address, paymaster);
        Ok(())
    }

    pub fn install_factory(
        &mut self,
        address: Address,
        factory: Box<dyn Factory>,
    ) -> Result<(), EntryPointError> {
        self.ensure_free(address)?;
        self.factories.insert(address, factory);
        Ok(())
    }

    pub fn install_aggregator(
        &mut self,
        address: Address,
        aggregator: Box<dyn SignatureAggregator>,
    ) -> Result<(), EntryPointError> {
        self.ensure_free(address)?;
        self.aggregators.insert(address, aggregator);
        Ok(())
    }

    pub fn account_mut(&mut self, address: Address) -> Option<&mut Box<dyn Account>> {
        self.accounts.get_mut(&address)
    }

    pub fn paymaster_mut(&mut self, address: Address) -> Option<&mut Box<dyn Paymaster>> {
        self.paymasters.get_mut(&address)
    }

    pub fn factory_mut(&mut self, address: Address) -> Option<&mut Box<dyn Factory>> {
        self.factories.get_mut(&address)
    }

    pub fn aggregator(&self, address: Address) -> Option<&dyn SignatureAggregator> {
        self.aggregators.get(&address).map(|a| &**a)
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, address: Address, amount: U256) {
        let balance = self.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn debit(&mut self, address: Address, amount: U256) -> Result<(), LedgerError> {
        let available = self.balance(address);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        self.balances.insert(address, available - amount);
        Ok(())
    }

    /// Applies the value movements of a successful call made to `from`,
    /// all or nothing. Returns the prefund payment, which the caller credits
    /// to `from`'s deposit.
    pub fn apply_effects(&mut self, from: Address, effects: &CallEffects) -> Result<U256, LedgerError> {
        let total = effects.total_out().ok_or(LedgerError::DepositOverflow)?;
        self.debit(from, total)?;
        for (to, value) in &effects.transfers {
            self.credit(*to, *value);
        }
        Ok(effects.prefund_payment)
    }
}
