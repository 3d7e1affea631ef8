//! IRC2 Token Contract Example
//!
//! A fungible token kept entirely in contract storage.
//!
//! Features:
//! - Standard IRC2 interface (name, symbol, decimals, totalSupply, balanceOf, transfer)
//! - One-shot initialization minting the initial supply to the caller
//! - `tokenFallback` notification when tokens are sent to a contract
//! - Payable fallback accepting native coin

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::rc::Rc;
use stepforge_ipc::{api_flag, ApiInfo, DataType, Param};
use stepforge_storage::{DictDb, ValueType, VarDb};
use stepforge_types::{Address, ScoreError, ScoreResult, Value};
use stepforge_vm::{Score, ScoreHost};
use thiserror::Error;

/// Event signature emitted on every balance move.
pub const TRANSFER_EVENT: &str = "Transfer(Address,Address,int,bytes)";

/// Method invoked on a receiving contract.
pub const TOKEN_FALLBACK: &str = "tokenFallback";

/// Token failures, reported to the host as revert codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token already initialized")]
    AlreadyInitialized,
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Anonymous caller")]
    NoSender,
}

impl TokenError {
    pub fn code(&self) -> u32 {
        match self {
            TokenError::AlreadyInitialized => 1,
            TokenError::InvalidAmount => 2,
            TokenError::InsufficientBalance => 3,
            TokenError::NoSender => 4,
        }
    }
}

impl From<TokenError> for ScoreError {
    fn from(e: TokenError) -> Self {
        ScoreError::revert(e.code(), e.to_string())
    }
}

/// IRC2 token contract.
pub struct Token {
    api: ApiInfo,
}

impl Token {
    pub fn new() -> ScoreResult<Self> {
        let ro = api_flag::EXTERNAL | api_flag::READONLY;
        let api = ApiInfo::new()
            .function(
                "initialize",
                api_flag::EXTERNAL,
                vec![
                    Param::new("_name", DataType::String),
                    Param::new("_symbol", DataType::String),
                    Param::new("_decimals", DataType::Integer),
                    Param::new("_initialSupply", DataType::Integer),
                ],
                vec![],
            )?
            .function("name", ro, vec![], vec![DataType::String])?
            .function("symbol", ro, vec![], vec![DataType::String])?
            .function("decimals", ro, vec![], vec![DataType::Integer])?
            .function("totalSupply", ro, vec![], vec![DataType::Integer])?
            .function("balanceOf", ro, vec![Param::new("_owner", DataType::Address)], vec![DataType::Integer])?
            .function(
                "transfer",
                api_flag::EXTERNAL,
                vec![
                    Param::new("_to", DataType::Address),
                    Param::new("_value", DataType::Integer),
                    Param::optional("_data", DataType::Bytes, Value::Nil),
                ],
                vec![],
            )?
            .event(
                "Transfer",
                3,
                vec![
                    Param::new("_from", DataType::Address),
                    Param::new("_to", DataType::Address),
                    Param::new("_value", DataType::Integer),
                    Param::new("_data", DataType::Bytes),
                ],
            )?
            .fallback(api_flag::PAYABLE, vec![]);
        Ok(Self { api })
    }

    /// Registry factory.
    pub fn load() -> Rc<dyn Score> {
        match Self::new() {
            Ok(token) => Rc::new(token),
            Err(e) => Rc::new(Broken(e)),
        }
    }

    fn balance_of(host: &mut dyn ScoreHost, owner: &Address) -> ScoreResult<BigInt> {
        let balances = DictDb::new("balances", &host.db(), ValueType::Int, 1)?;
        let v = balances.get(host.store(), &Value::Address(owner.clone()))?;
        Ok(v.as_int().cloned().unwrap_or_default())
    }

    fn set_balance(host: &mut dyn ScoreHost, owner: &Address, amount: BigInt) -> ScoreResult<()> {
        let balances = DictDb::new("balances", &host.db(), ValueType::Int, 1)?;
        let key = Value::Address(owner.clone());
        if amount.is_zero() {
            balances.remove(host.store(), &key)
        } else {
            balances.set(host.store(), &key, &Value::Int(amount))
        }
    }

    fn initialize(&self, host: &mut dyn ScoreHost, args: &[Value]) -> ScoreResult<Value> {
        let name = VarDb::new("name", &host.db(), ValueType::Str)?;
        if !name.get(host.store())?.as_str().unwrap_or_default().is_empty() {
            return Err(TokenError::AlreadyInitialized.into());
        }
        let owner = host.sender().cloned().ok_or(TokenError::NoSender)?;
        let supply = int_arg(args, 3)?;
        let decimals = int_arg(args, 2)?;
        if supply.is_negative() || decimals.is_negative() {
            return Err(TokenError::InvalidAmount.into());
        }

        name.set(host.store(), &args[0])?;
        VarDb::new("symbol", &host.db(), ValueType::Str)?.set(host.store(), &args[1])?;
        VarDb::new("decimals", &host.db(), ValueType::Int)?.set(host.store(), &Value::Int(decimals))?;
        VarDb::new("total_supply", &host.db(), ValueType::Int)?.set(host.store(), &Value::Int(supply.clone()))?;
        Self::set_balance(host, &owner, supply)?;
        Ok(Value::Nil)
    }

    fn transfer(&self, host: &mut dyn ScoreHost, args: &[Value]) -> ScoreResult<Value> {
        let from = host.sender().cloned().ok_or(TokenError::NoSender)?;
        let to = address_arg(args, 0)?;
        let value = int_arg(args, 1)?;
        let data = match args.get(2) {
            Some(Value::Bytes(b)) => b.clone(),
            _ => Vec::new(),
        };
        if value.is_negative() {
            return Err(TokenError::InvalidAmount.into());
        }
        let from_balance = Self::balance_of(host, &from)?;
        if from_balance < value {
            return Err(TokenError::InsufficientBalance.into());
        }

        Self::set_balance(host, &from, &from_balance - &value)?;
        let to_balance = Self::balance_of(host, &to)?;
        Self::set_balance(host, &to, to_balance + &value)?;

        host.emit_event(
            vec![
                Value::from(TRANSFER_EVENT),
                Value::Address(from.clone()),
                Value::Address(to.clone()),
                Value::Int(value.clone()),
            ],
            vec![Value::Bytes(data.clone())],
        )?;

        if to.is_contract() {
            let params = stepforge_types::dict! {
                "_from" => from,
                "_value" => value,
                "_data" => data,
            };
            host.call(&to, TOKEN_FALLBACK, params, &BigInt::zero())?;
        }
        Ok(Value::Nil)
    }
}

impl Score for Token {
    fn api(&self) -> &ApiInfo {
        &self.api
    }

    fn invoke(&self, host: &mut dyn ScoreHost, method: &str, args: Vec<Value>) -> ScoreResult<Value> {
        match method {
            "initialize" => self.initialize(host, &args),
            "name" => VarDb::new("name", &host.db(), ValueType::Str)?.get(host.store()),
            "symbol" => VarDb::new("symbol", &host.db(), ValueType::Str)?.get(host.store()),
            "decimals" => VarDb::new("decimals", &host.db(), ValueType::Int)?.get(host.store()),
            "totalSupply" => VarDb::new("total_supply", &host.db(), ValueType::Int)?.get(host.store()),
            "balanceOf" => {
                let owner = address_arg(&args, 0)?;
                Ok(Value::Int(Self::balance_of(host, &owner)?))
            }
            "transfer" => self.transfer(host, &args),
            ApiInfo::FALLBACK => Ok(Value::Nil),
            other => Err(ScoreError::MethodNotFound(other.to_string())),
        }
    }
}

/// Stand-in served when a contract's API table is malformed; every call
/// reports the construction failure.
pub(crate) struct Broken(pub(crate) ScoreError);

impl Score for Broken {
    fn api(&self) -> &ApiInfo {
        static EMPTY: std::sync::OnceLock<ApiInfo> = std::sync::OnceLock::new();
        EMPTY.get_or_init(ApiInfo::new)
    }

    fn invoke(&self, _host: &mut dyn ScoreHost, _method: &str, _args: Vec<Value>) -> ScoreResult<Value> {
        Err(self.0.clone())
    }
}

pub(crate) fn int_arg(args: &[Value], i: usize) -> ScoreResult<BigInt> {
    args.get(i)
        .and_then(Value::as_int)
        .cloned()
        .ok_or_else(|| ScoreError::invalid_param(format!("argument {i} is not an int")))
}

pub(crate) fn address_arg(args: &[Value], i: usize) -> ScoreResult<Address> {
    args.get(i)
        .and_then(Value::as_address)
        .cloned()
        .ok_or_else(|| ScoreError::invalid_param(format!("argument {i} is not an address")))
}
