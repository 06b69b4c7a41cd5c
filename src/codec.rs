// src/codec.rs
//! Wire encoding and canonical hashing of user operations.
//!
//! The wire format is the ABI encoding of the eleven fields in declaration
//! order. The hash covers every field but `signature`, bound to the chain id
//! and the engine's own address.

use ethers::{
    abi::{decode as abi_decode, encode as abi_encode, ParamType, Token},
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};

use crate::{
    error::CodecError,
    types::{UserOperation, ADDRESS_LEN},
};

fn params() -> [ParamType; 11] {
    [
        ParamType::Address,
        ParamType::Uint(256),
        ParamType::Bytes,
        ParamType::Bytes,
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Bytes,
        ParamType::Bytes,
    ]
}

fn tokens(op: &UserOperation) -> Vec<Token> {
    vec![
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::Bytes(op.init_code.to_vec()),
        Token::Bytes(op.call_data.to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::Bytes(op.paymaster_and_data.to_vec()),
        Token::Bytes(op.signature.to_vec()),
    ]
}

pub fn encode(op: &UserOperation) -> Bytes {
    abi_encode(&tokens(op)).into()
}

/// Decodes a wire-encoded operation. Anything that doesn't re-encode to the
/// exact same bytes is refused.
pub fn decode(data: &[u8]) -> Result<UserOperation, CodecError> {
    let mut tokens = abi_decode(&params(), data)
        .map_err(|e| CodecError::Abi(e.to_string()))?
        .into_iter();

    let op = UserOperation {
        sender: next(&mut tokens)?
            .into_address()
            .ok_or(CodecError::FieldLayout)?,
        nonce: next_uint(&mut tokens)?,
        init_code: next_bytes(&mut tokens)?,
        call_data: next_bytes(&mut tokens)?,
        call_gas_limit: next_uint(&mut tokens)?,
        verification_gas_limit: next_uint(&mut tokens)?,
        pre_verification_gas: next_uint(&mut tokens)?,
        max_fee_per_gas: next_uint(&mut tokens)?,
        max_priority_fee_per_gas: next_uint(&mut tokens)?,
        paymaster_and_data: next_bytes(&mut tokens)?,
        signature: next_bytes(&mut tokens)?,
    };

    if encode(&op).as_ref() != data {
        return Err(CodecError::NonCanonical);
    }
    Ok(op)
}

fn next(tokens: &mut impl Iterator<Item = Token>) -> Result<Token, CodecError> {
    tokens.next().ok_or(CodecError::FieldLayout)
}

fn next_uint(tokens: &mut impl Iterator<Item = Token>) -> Result<U256, CodecError> {
    next(tokens)?.into_uint().ok_or(CodecError::FieldLayout)
}

fn next_bytes(tokens: &mut impl Iterator<Item = Token>) -> Result<Bytes, CodecError> {
    next(tokens)?
        .into_bytes()
        .map(Bytes::from)
        .ok_or(CodecError::FieldLayout)
}

/// Structural checks that don't need chain state: address prefixes are
/// complete and every gas value fits in 128 bits.
pub fn check_well_formed(op: &UserOperation) -> Result<(), CodecError> {
    if !op.init_code.is_empty() && op.init_code.len() < ADDRESS_LEN {
        return Err(CodecError::ShortInitCode);
    }
    if !op.paymaster_and_data.is_empty() && op.paymaster_and_data.len() < ADDRESS_LEN {
        return Err(CodecError::ShortPaymasterAndData);
    }
    let gas_values = [
        ("callGasLimit", op.call_gas_limit),
        ("verificationGasLimit", op.verification_gas_limit),
        ("preVerificationGas", op.pre_verification_gas),
        ("maxFeePerGas", op.max_fee_per_gas),
        ("maxPriorityFeePerGas", op.max_priority_fee_per_gas),
    ];
    for (name, value) in gas_values {
        if value.bits() > 128 {
            return Err(CodecError::GasValueOverflow(name));
        }
    }
    Ok(())
}

fn pack_for_hash(op: &UserOperation) -> Vec<u8> {
    abi_encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::FixedBytes(keccak256(&op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&op.call_data).to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::FixedBytes(keccak256(&op.paymaster_and_data).to_vec()),
    ])
}

/// The value accounts sign. Independent of `signature`.
pub fn canonical_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    keccak256(abi_encode(&[
        Token::FixedBytes(keccak256(pack_for_hash(op)).to_vec()),
        Token::Address(entry_point),
        Token::Uint(chain_id.into()),
    ]))
    .into()
}
