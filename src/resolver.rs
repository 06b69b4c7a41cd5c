// src/resolver.rs
//! Counterfactual sender addresses.
//!
//! `initCode` is `factory ‖ recipe`. The account it produces lives at the
//! CREATE2 address of `factory` with a zero salt and `recipe` as init code,
//! so the address depends on nothing but those two inputs.

use ethers::{types::Address, utils::get_create2_address};

use crate::{
    error::{CodecError, RejectionReason},
    types::{UserOperation, ADDRESS_LEN},
};

const DEPLOY_SALT: [u8; 32] = [0u8; 32];

/// Address a factory deploys `recipe` to.
pub fn derive_address(factory: Address, recipe: &[u8]) -> Address {
    get_create2_address(factory, DEPLOY_SALT, recipe.to_vec())
}

/// The account `initCode` would deploy, without deploying it.
pub fn get_sender_address(init_code: &[u8]) -> Result<Address, CodecError> {
    if init_code.len() < ADDRESS_LEN {
        return Err(CodecError::ShortInitCode);
    }
    let factory = Address::from_slice(&init_code[..ADDRESS_LEN]);
    Ok(derive_address(factory, &init_code[ADDRESS_LEN..]))
}

/// Resolves the account an operation targets. Runs no untrusted code.
pub fn resolve_address(op: &UserOperation) -> Result<Address, RejectionReason> {
    if op.init_code.is_empty() {
        return Ok(op.sender);
    }
    let derived = get_sender_address(&op.init_code)?;
    if derived != op.sender {
        return Err(RejectionReason::SenderMismatch {
            sender: op.sender,
            derived,
        });
    }
    Ok(derived)
}
