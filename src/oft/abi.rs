//! Hand-rolled ABI encoding for the OFT and ERC-20 calls the bridge makes

use super::types::{FeeQuote, SendParam};
use crate::error::{BridgeError, BridgeResult};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use lazy_static::lazy_static;
use sha3::{Digest, Keccak256};

const SEND_PARAM: &str = "(uint32,bytes32,uint256,uint256,bytes,bytes,bytes)";

lazy_static! {
    static ref QUOTE_SEND: [u8; 4] = selector(&format!("quoteSend({},bool)", SEND_PARAM));
    static ref SEND: [u8; 4] = selector(&format!("send({},(uint256,uint256),address)", SEND_PARAM));
    static ref TOKEN: [u8; 4] = selector("token()");
    static ref ALLOWANCE: [u8; 4] = selector("allowance(address,address)");
    static ref APPROVE: [u8; 4] = selector("approve(address,uint256)");
    static ref BALANCE_OF: [u8; 4] = selector("balanceOf(address)");
}

/// First four bytes of keccak256 of the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let mut hasher = Keccak256::new();
    hasher.update(signature.as_bytes());
    let hash = hasher.finalize();
    [hash[0], hash[1], hash[2], hash[3]]
}

fn call(selector: &[u8; 4], args: &[Token]) -> Bytes {
    let mut data = selector.to_vec();
    data.extend(abi::encode(args));
    data.into()
}

fn send_param_token(param: &SendParam) -> Token {
    Token::Tuple(vec![
        Token::Uint(U256::from(param.dst_eid)),
        Token::FixedBytes(param.to.to_vec()),
        Token::Uint(param.amount_ld),
        Token::Uint(param.min_amount_ld),
        Token::Bytes(param.extra_options.to_vec()),
        Token::Bytes(param.compose_msg.to_vec()),
        Token::Bytes(param.oft_cmd.to_vec()),
    ])
}

pub fn encode_quote_send(param: &SendParam, pay_in_lz_token: bool) -> Bytes {
    call(&QUOTE_SEND, &[send_param_token(param), Token::Bool(pay_in_lz_token)])
}

pub fn encode_send(param: &SendParam, fee: &FeeQuote, refund: Address) -> Bytes {
    call(
        &SEND,
        &[
            send_param_token(param),
            Token::Tuple(vec![Token::Uint(fee.native_fee), Token::Uint(fee.lz_token_fee)]),
            Token::Address(refund),
        ],
    )
}

pub fn encode_token() -> Bytes {
    call(&TOKEN, &[])
}

pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    call(&ALLOWANCE, &[Token::Address(owner), Token::Address(spender)])
}

pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    call(&APPROVE, &[Token::Address(spender), Token::Uint(amount)])
}

pub fn encode_balance_of(owner: Address) -> Bytes {
    call(&BALANCE_OF, &[Token::Address(owner)])
}

fn decode(types: &[ParamType], data: &[u8], what: &str) -> BridgeResult<Vec<Token>> {
    abi::decode(types, data)
        .map_err(|e| BridgeError::Contract(format!("Failed to decode {} result: {}", what, e)))
}

pub fn decode_fee_quote(data: &[u8]) -> BridgeResult<FeeQuote> {
    let tokens = decode(
        &[ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Uint(256)])],
        data,
        "quoteSend",
    )?;

    match tokens.as_slice() {
        [Token::Tuple(fields)] => match fields.as_slice() {
            [Token::Uint(native_fee), Token::Uint(lz_token_fee)] => Ok(FeeQuote {
                native_fee: *native_fee,
                lz_token_fee: *lz_token_fee,
            }),
            _ => Err(BridgeError::Contract("Unexpected quoteSend result".to_string())),
        },
        _ => Err(BridgeError::Contract("Unexpected quoteSend result".to_string())),
    }
}

pub fn decode_address(data: &[u8]) -> BridgeResult<Address> {
    match decode(&[ParamType::Address], data, "address")?.as_slice() {
        [Token::Address(address)] => Ok(*address),
        _ => Err(BridgeError::Contract("Unexpected address result".to_string())),
    }
}

pub fn decode_uint(data: &[u8]) -> BridgeResult<U256> {
    match decode(&[ParamType::Uint(256)], data, "uint256")?.as_slice() {
        [Token::Uint(value)] => Ok(*value),
        _ => Err(BridgeError::Contract("Unexpected uint256 result".to_string())),
    }
}
