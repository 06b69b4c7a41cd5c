// src/contracts/simple_account_factory.rs
use ethers::{
    abi::{decode, encode, ParamType, Token},
    types::{Address, Bytes, U256},
};

use super::SimpleAccount;
use crate::{
    capability::{CallContext, Deployment, Factory},
    error::CallError,
    resolver::derive_address,
};

const DEPLOY_GAS: u64 = 40_000;

/// Recipe bytes for a [`SimpleAccount`] owned by `owner`.
pub fn recipe(owner: Address, salt: U256) -> Bytes {
    encode(&[Token::Address(owner), Token::Uint(salt)]).into()
}

/// Full `initCode` for deploying through the factory at `factory`.
pub fn init_code(factory: Address, owner: Address, salt: U256) -> Bytes {
    let mut code = factory.as_bytes().to_vec();
    code.extend_from_slice(&recipe(owner, salt));
    code.into()
}

/// Deploys [`SimpleAccount`]s from `abi.encode(owner, salt)` recipes.
#[derive(Debug, Clone, Default)]
pub struct SimpleAccountFactory;

impl SimpleAccountFactory {
    pub fn get_address(factory: Address, owner: Address, salt: U256) -> Address {
        derive_address(factory, &recipe(owner, salt))
    }
}

impl Factory for SimpleAccountFactory {
    fn deploy(&mut self, ctx: &mut CallContext, recipe: &[u8]) -> Result<Deployment, CallError> {
        ctx.use_gas(DEPLOY_GAS)?;
        let tokens = decode(&[ParamType::Address, ParamType::Uint(256)], recipe)
            .map_err(|_| CallError::revert("factory: invalid recipe"))?;
        let owner = match tokens.first() {
            Some(Token::Address(owner)) => *owner,
            _ => return Err(CallError::revert("factory: invalid recipe")),
        };
        Ok(Deployment {
            address: derive_address(ctx.address(), recipe),
            account: Box::new(SimpleAccount::new(owner)),
        })
    }
}
