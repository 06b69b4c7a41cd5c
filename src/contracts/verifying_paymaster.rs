// src/contracts/verifying_paymaster.rs
use ethers::{
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};

use super::{recover_signer, ECRECOVER_GAS};
use crate::{
    capability::{CallContext, Paymaster, PaymasterValidation},
    codec,
    error::CallError,
    types::{Aggregator, PaymasterAndData, PostOpMode, UserOperation, ValidationData},
};

const SIGNATURE_LEN: usize = 65;
const POST_OP_GAS: u64 = 3_000;

/// Hash of `op` with `paymasterAndData` cleared, since the sponsor signs
/// before that field is final.
pub fn sponsored_op_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let unsigned = UserOperation {
        paymaster_and_data: Bytes::default(),
        ..op.clone()
    };
    codec::canonical_hash(&unsigned, entry_point, chain_id)
}

/// Message the sponsor signs: `paymaster ‖ validUntil ‖ validAfter ‖ opHash`.
pub fn sponsor_digest(paymaster: Address, valid_until: u64, valid_after: u64, op_hash: H256) -> H256 {
    let mut message = Vec::with_capacity(20 + 8 + 8 + 32);
    message.extend_from_slice(paymaster.as_bytes());
    message.extend_from_slice(&valid_until.to_be_bytes());
    message.extend_from_slice(&valid_after.to_be_bytes());
    message.extend_from_slice(op_hash.as_bytes());
    H256::from(keccak256(&message))
}

/// Sponsors any operation carrying a valid signature of its off-chain signer.
#[derive(Debug, Clone)]
pub struct VerifyingPaymaster {
    signer: Address,
    entry_point: Address,
    chain_id: u64,
}

impl VerifyingPaymaster {
    pub fn new(signer: Address, entry_point: Address, chain_id: u64) -> Self {
        Self {
            signer,
            entry_point,
            chain_id,
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }
}

impl Paymaster for VerifyingPaymaster {
    fn validate_paymaster_user_op(
        &mut self,
        ctx: &mut CallContext,
        op: &UserOperation,
        _op_hash: H256,
        _max_cost: U256,
    ) -> Result<PaymasterValidation, CallError> {
        let data = PaymasterAndData::decode(&op.paymaster_and_data)
            .ok_or_else(|| CallError::revert("paymaster: invalid paymasterAndData"))?;
        if data.signature.len() != SIGNATURE_LEN {
            return Err(CallError::revert("paymaster: invalid signature length"));
        }

        ctx.use_gas(ECRECOVER_GAS)?;
        let digest = sponsor_digest(
            ctx.address(),
            data.valid_until,
            data.valid_after,
            sponsored_op_hash(op, self.entry_point, self.chain_id),
        );
        let mut validation_data = ValidationData::window(data.valid_after, data.valid_until);
        if recover_signer(digest, &data.signature) != Some(self.signer) {
            validation_data.aggregator = Aggregator::FailedVerification;
        }
        Ok(PaymasterValidation {
            context: Bytes::default(),
            validation_data,
        })
    }

    fn post_op(
        &mut self,
        ctx: &mut CallContext,
        _mode: PostOpMode,
        _context: &[u8],
        _actual_gas_cost: U256,
    ) -> Result<(), CallError> {
        ctx.use_gas(POST_OP_GAS)
    }
}

#[cfg(test)]
mod tests {
    use ethers::signers::{LocalWallet, Signer};

    use super::*;
    use crate::{capability::invoke, types::BlockEnv};

    const CHAIN_ID: u64 = 1337;

    fn wallet() -> LocalWallet {
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .parse()
            .unwrap()
    }

    async fn sponsored(op: &UserOperation, paymaster: Address, signer: &LocalWallet) -> UserOperation {
        let (valid_until, valid_after) = (2_000, 1_000);
        let digest = sponsor_digest(
            paymaster,
            valid_until,
            valid_after,
            sponsored_op_hash(op, Address::zero(), CHAIN_ID),
        );
        let signature = signer.sign_message(digest.as_bytes()).await.unwrap();
        UserOperation {
            paymaster_and_data: PaymasterAndData {
                paymaster,
                valid_until,
                valid_after,
                signature: signature.to_vec().into(),
            }
            .encode(),
            ..op.clone()
        }
    }

    #[tokio::test]
    async fn test_accepts_signed_operation() {
        let signer = wallet();
        let paymaster = Address::from_low_u64_be(0x9a);
        let mut handler = VerifyingPaymaster::new(signer.address(), Address::zero(), CHAIN_ID);
        let op = sponsored(&UserOperation::default(), paymaster, &signer).await;

        let outcome = invoke(paymaster, BlockEnv::default(), 100_000.into(), |ctx| {
            handler.validate_paymaster_user_op(ctx, &op, H256::zero(), U256::zero())
        });
        let validation = outcome.result.unwrap();
        assert_eq!(validation.validation_data, ValidationData::window(1_000, 2_000));
    }

    #[tokio::test]
    async fn test_tampered_operation_fails_verification() {
        let signer = wallet();
        let paymaster = Address::from_low_u64_be(0x9a);
        let mut handler = VerifyingPaymaster::new(signer.address(), Address::zero(), CHAIN_ID);
        let mut op = sponsored(&UserOperation::default(), paymaster, &signer).await;
        op.call_gas_limit = 1.into();

        let outcome = invoke(paymaster, BlockEnv::default(), 100_000.into(), |ctx| {
            handler.validate_paymaster_user_op(ctx, &op, H256::zero(), U256::zero())
        });
        assert_eq!(
            outcome.result.unwrap().validation_data.aggregator,
            Aggregator::FailedVerification
        );
    }

    #[test]
    fn test_short_data_reverts() {
        let mut handler = VerifyingPaymaster::new(Address::zero(), Address::zero(), CHAIN_ID);
        let op = UserOperation {
            paymaster_and_data: Address::from_low_u64_be(0x9a).as_bytes().to_vec().into(),
            ..Default::default()
        };
        let outcome = invoke(Address::zero(), BlockEnv::default(), 100_000.into(), |ctx| {
            handler.validate_paymaster_user_op(ctx, &op, H256::zero(), U256::zero())
        });
        assert!(outcome.result.is_err());
    }
}
