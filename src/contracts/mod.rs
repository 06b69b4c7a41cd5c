// src/contracts/mod.rs
//! Built-in account, factory and paymaster code.

mod simple_account;
mod simple_account_factory;
mod token_paymaster;
mod verifying_paymaster;

use ethers::types::{Address, Signature, H256};

pub use simple_account::SimpleAccount;
pub use simple_account_factory::{init_code, recipe, SimpleAccountFactory};
pub use token_paymaster::TokenPaymaster;
pub use verifying_paymaster::{sponsor_digest, sponsored_op_hash, VerifyingPaymaster};

/// Gas charged for recovering a signature.
pub const ECRECOVER_GAS: u64 = 6_000;
/// Gas charged for a native value transfer.
pub const TRANSFER_GAS: u64 = 9_000;

/// Recovers the signer of the EIP-191 message over `hash`.
pub fn recover_signer(hash: H256, signature: &[u8]) -> Option<Address> {
    let signature = Signature::try_from(signature).ok()?;
    signature.recover(hash.as_bytes()).ok()
}
