// src/paymaster.rs
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::contracts::{sponsor_digest, sponsored_op_hash};
use crate::error::PaymasterError;
use crate::types::{PaymasterAndData, PaymasterResponse, UserOperation};

/// Off-chain half of the verifying paymaster: signs `paymasterAndData` for
/// operations it agrees to sponsor.
#[derive(Debug, Clone)]
pub struct PaymasterSigner {
    wallet: LocalWallet,
    pub paymaster_address: Address,
    entry_point: Address,
    chain_id: u64,
    // The validity time window in seconds
    valid_duration: u64,
}

impl PaymasterSigner {
    pub fn new(
        private_key: &str,
        paymaster_address: Address,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<Self, PaymasterError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| PaymasterError::InvalidParameters(e.to_string()))?
            .with_chain_id(chain_id);

        info!(
            "Initialized paymaster signer {:?} for paymaster {:?}",
            wallet.address(),
            paymaster_address
        );

        Ok(Self {
            wallet,
            paymaster_address,
            entry_point,
            chain_id,
            valid_duration: 3600, // Default 1 hour validity
        })
    }

    pub fn with_valid_duration(mut self, valid_duration: u64) -> Self {
        self.valid_duration = valid_duration;
        self
    }

    /// Address the verifying paymaster must be configured with.
    pub fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    /// Signs a sponsorship of `user_op` valid from `now` for the configured
    /// duration.
    pub async fn sign_user_operation(
        &self,
        user_op: &UserOperation,
        now: u64,
    ) -> Result<PaymasterResponse, PaymasterError> {
        self.validate_user_operation(user_op)?;

        let valid_after = now;
        let valid_until = now.saturating_add(self.valid_duration);

        let digest = sponsor_digest(
            self.paymaster_address,
            valid_until,
            valid_after,
            sponsored_op_hash(user_op, self.entry_point, self.chain_id),
        );
        let signature = self
            .wallet
            .sign_message(digest.as_bytes())
            .await
            .map_err(|e| PaymasterError::Signing(e.to_string()))?;
        debug!("Signed sponsorship for {:?} until {}", user_op.sender, valid_until);

        let paymaster_and_data = PaymasterAndData {
            paymaster: self.paymaster_address,
            valid_until,
            valid_after,
            signature: Bytes::from(signature.to_vec()),
        }
        .encode();

        Ok(PaymasterResponse { paymaster_and_data })
    }

    fn validate_user_operation(&self, user_op: &UserOperation) -> Result<(), PaymasterError> {
        if user_op.max_fee_per_gas.is_zero() || user_op.max_priority_fee_per_gas.is_zero() {
            return Err(PaymasterError::InvalidUserOperation(
                "Gas price cannot be zero".to_string(),
            ));
        }
        if user_op.call_gas_limit > U256::from(u128::MAX)
            || user_op.verification_gas_limit > U256::from(u128::MAX)
        {
            return Err(PaymasterError::InvalidUserOperation(
                "Gas limit overflow".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::VerifyingPaymaster;
    use crate::capability::{invoke, Paymaster};
    use crate::types::{Aggregator, BlockEnv};
    use ethers::types::H256;

    const KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

    fn user_op() -> UserOperation {
        UserOperation {
            sender: Address::from_low_u64_be(1),
            max_fee_per_gas: 10.into(),
            max_priority_fee_per_gas: 1.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_signature_accepted_by_verifying_paymaster() {
        let paymaster = Address::from_low_u64_be(0x9a);
        let entry_point = Address::from_low_u64_be(0xe9);
        let signer = PaymasterSigner::new(KEY, paymaster, entry_point, 1337).unwrap();

        let mut op = user_op();
        let response = signer.sign_user_operation(&op, 1_000).await.unwrap();
        op.paymaster_and_data = response.paymaster_and_data;

        let decoded = PaymasterAndData::decode(&op.paymaster_and_data).unwrap();
        assert_eq!(decoded.paymaster, paymaster);
        assert_eq!((decoded.valid_after, decoded.valid_until), (1_000, 4_600));

        let mut handler = VerifyingPaymaster::new(signer.signer_address(), entry_point, 1337);
        let outcome = invoke(paymaster, BlockEnv::default(), 100_000.into(), |ctx| {
            handler.validate_paymaster_user_op(ctx, &op, H256::zero(), U256::zero())
        });
        assert_eq!(
            outcome.result.unwrap().validation_data.aggregator,
            Aggregator::VerifiedBySelf
        );
    }

    #[tokio::test]
    async fn test_rejects_zero_gas_price() {
        let signer =
            PaymasterSigner::new(KEY, Address::zero(), Address::zero(), 1337).unwrap();
        let op = UserOperation {
            max_fee_per_gas: U256::zero(),
            ..user_op()
        };
        assert!(matches!(
            signer.sign_user_operation(&op, 0).await,
            Err(PaymasterError::InvalidUserOperation(_))
        ));
    }

    #[test]
    fn test_rejects_bad_key() {
        assert!(PaymasterSigner::new("not a key", Address::zero(), Address::zero(), 1).is_err());
    }
}
