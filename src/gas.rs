// src/gas.rs
//! Gas pricing, prefund computation and settlement.

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use crate::{error::CodecError, types::UserOperation};

/// Fee parameters in force for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    pub base_fee: U256,
    /// Multiplier on `verificationGasLimit` when a paymaster sponsors the
    /// operation. Covers paymaster validation and its post-op hook.
    pub paymaster_verification_multiplier: u64,
}

pub fn gas_price(op: &UserOperation, base_fee: U256) -> U256 {
    if op.max_fee_per_gas == op.max_priority_fee_per_gas {
        // legacy mode (for networks that don't support basefee)
        return op.max_fee_per_gas;
    }
    op.max_fee_per_gas
        .min(base_fee.saturating_add(op.max_priority_fee_per_gas))
}

/// Total gas an operation may consume, with the paymaster multiplier applied.
pub fn max_gas(op: &UserOperation, multiplier: u64) -> Result<U256, CodecError> {
    let mul = if op.paymaster().is_some() { multiplier } else { 1 };
    op.verification_gas_limit
        .checked_mul(U256::from(mul))
        .and_then(|verification| verification.checked_add(op.pre_verification_gas))
        .and_then(|sum| sum.checked_add(op.call_gas_limit))
        .ok_or(CodecError::GasValueOverflow("maxGas"))
}

/// Worst-case cost that must be covered before any untrusted code runs.
pub fn required_prefund(op: &UserOperation, fees: &FeeParams) -> Result<U256, CodecError> {
    max_gas(op, fees.paymaster_verification_multiplier)?
        .checked_mul(gas_price(op, fees.base_fee))
        .ok_or(CodecError::GasValueOverflow("requiredPrefund"))
}

/// Outcome of settling one operation against its prefund.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub actual_gas_used: U256,
    pub charge: U256,
    pub refund: U256,
}

/// Splits the prefund into the charge (paid to the beneficiary) and the
/// refund (returned to whoever prefunded). The charge never exceeds the
/// prefund.
pub fn settle(prefund: U256, actual_gas_used: U256, gas_price: U256) -> Settlement {
    let cost = actual_gas_used.saturating_mul(gas_price);
    let charge = cost.min(prefund);
    Settlement {
        actual_gas_used,
        charge,
        refund: prefund - charge,
    }
}

/// Meters gas for a single untrusted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: U256,
    used: U256,
}

impl GasMeter {
    pub fn new(limit: U256) -> Self {
        Self {
            limit,
            used: U256::zero(),
        }
    }

    /// Consumes `amount`. Running past the limit burns everything that was
    /// left and reports out-of-gas.
    pub fn charge(&mut self, amount: u64) -> Result<(), OutOfGas> {
        let next = self.used.saturating_add(U256::from(amount));
        if next > self.limit {
            self.used = self.limit;
            return Err(OutOfGas);
        }
        self.used = next;
        Ok(())
    }

    pub fn used(&self) -> U256 {
        self.used
    }

    pub fn limit(&self) -> U256 {
        self.limit
    }

    pub fn remaining(&self) -> U256 {
        self.limit - self.used
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfGas;

/// Running totals across a batch. Charges can't outgrow reservations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBudget {
    pub reserved: U256,
    pub collected: U256,
}

impl BatchBudget {
    pub fn reserve(&mut self, prefund: U256) {
        self.reserved = self.reserved.saturating_add(prefund);
    }

    /// Records a charge, clamped to what is still reserved and not yet
    /// collected. Returns the amount actually recorded.
    pub fn collect(&mut self, charge: U256) -> U256 {
        let headroom = self.reserved - self.collected;
        let charge = charge.min(headroom);
        self.collected += charge;
        charge
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Address, Bytes};

    use super::*;

    fn op() -> UserOperation {
        UserOperation {
            call_gas_limit: 100_000.into(),
            verification_gas_limit: 50_000.into(),
            pre_verification_gas: 21_000.into(),
            max_fee_per_gas: 30.into(),
            max_priority_fee_per_gas: 2.into(),
            ..Default::default()
        }
    }

    fn fees(base_fee: u64) -> FeeParams {
        FeeParams {
            base_fee: base_fee.into(),
            paymaster_verification_multiplier: 3,
        }
    }

    #[test]
    fn test_gas_price() {
        assert_eq!(gas_price(&op(), 10.into()), 12.into());
        assert_eq!(gas_price(&op(), 100.into()), 30.into());

        let legacy = UserOperation {
            max_priority_fee_per_gas: 30.into(),
            ..op()
        };
        assert_eq!(gas_price(&legacy, 100.into()), 30.into());
    }

    #[test]
    fn test_required_prefund() {
        assert_eq!(
            required_prefund(&op(), &fees(10)).unwrap(),
            U256::from(171_000 * 12)
        );

        let mut paymaster_and_data = Address::from_low_u64_be(9).as_bytes().to_vec();
        paymaster_and_data.push(1);
        let sponsored = UserOperation {
            paymaster_and_data: Bytes::from(paymaster_and_data),
            ..op()
        };
        assert_eq!(
            required_prefund(&sponsored, &fees(10)).unwrap(),
            U256::from((21_000 + 100_000 + 3 * 50_000) * 12)
        );
    }

    #[test]
    fn test_required_prefund_overflow() {
        let huge = UserOperation {
            call_gas_limit: U256::from(u128::MAX),
            verification_gas_limit: U256::from(u128::MAX),
            max_fee_per_gas: U256::from(u128::MAX),
            max_priority_fee_per_gas: U256::from(u128::MAX),
            ..Default::default()
        };
        assert!(required_prefund(&huge, &fees(0)).is_err());
    }

    #[test]
    fn test_settle_caps_charge() {
        let s = settle(1_000.into(), 40.into(), 10.into());
        assert_eq!(s.charge, 400.into());
        assert_eq!(s.refund, 600.into());

        let s = settle(1_000.into(), 400.into(), 10.into());
        assert_eq!(s.charge, 1_000.into());
        assert_eq!(s.refund, U256::zero());
    }

    #[test]
    fn test_gas_meter() {
        let mut meter = GasMeter::new(100.into());
        assert!(meter.charge(60).is_ok());
        assert_eq!(meter.remaining(), 40.into());
        assert_eq!(meter.charge(41), Err(OutOfGas));
        assert_eq!(meter.used(), 100.into());
    }

    #[test]
    fn test_batch_budget() {
        let mut budget = BatchBudget::default();
        budget.reserve(100.into());
        assert_eq!(budget.collect(70.into()), 70.into());
        assert_eq!(budget.collect(70.into()), 30.into());
        assert_eq!(budget.collected, budget.reserved);
    }
}
