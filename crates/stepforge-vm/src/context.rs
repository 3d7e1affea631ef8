//! Execution context of a single invoke.

use crate::step::{StepCosts, StepCounter};
use num_bigint::BigInt;
use stepforge_ipc::{InfoKey, InvokeRequest};
use stepforge_types::{int::to_u64, Address, Revision, ScoreError, ScoreResult, Value};

/// Kind of invoke. Queries never write state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    Invoke,
    Query,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    pub height: BigInt,
    /// Microseconds.
    pub timestamp: BigInt,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxInfo {
    pub hash: Vec<u8>,
    pub index: BigInt,
    pub origin: Option<Address>,
    pub timestamp: BigInt,
    pub nonce: BigInt,
}

/// Everything a contract may observe about the current invoke, plus its
/// step counter.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub context_type: ContextType,
    /// Code reference the contract was loaded from.
    pub code: String,
    /// Address of the contract being executed.
    pub address: Address,
    pub method: String,
    /// Sender; `None` for host-internal invokes.
    pub sender: Option<Address>,
    pub value: BigInt,
    pub owner: Option<Address>,
    pub block: BlockInfo,
    pub tx: Option<TxInfo>,
    pub revision: Revision,
    pub step: StepCounter,
    /// Set once the target method turns out to be read-only.
    pub func_readonly: bool,
    pub fee_proportion: u32,
}

impl ExecutionContext {
    /// Bare context, used by tools and tests.
    pub fn new(context_type: ContextType, address: Address, step: StepCounter) -> Self {
        Self {
            context_type,
            code: String::new(),
            address,
            method: String::new(),
            sender: None,
            value: BigInt::default(),
            owner: None,
            block: BlockInfo::default(),
            tx: None,
            revision: Revision::default(),
            step,
            func_readonly: false,
            fee_proportion: 0,
        }
    }

    /// Build the context from an INVOKE and its info bundle.
    pub fn from_request(req: &InvokeRequest) -> ScoreResult<Self> {
        let info = &req.info;
        let context_type = if req.is_readonly() {
            ContextType::Query
        } else {
            ContextType::Invoke
        };
        let costs = StepCosts::from_value(info.get(InfoKey::STEP_COSTS).unwrap_or(&Value::Nil))?;
        let revision = match info.get(InfoKey::REVISION) {
            Some(Value::Int(r)) => Revision(to_u64(r)?),
            _ => Revision::default(),
        };
        let tx = match info.get(InfoKey::TX_HASH) {
            Some(Value::Bytes(hash)) => Some(TxInfo {
                hash: hash.clone(),
                index: int_field(info, InfoKey::TX_INDEX)?,
                origin: address_field(info, InfoKey::TX_FROM)?,
                timestamp: int_field(info, InfoKey::TX_TIMESTAMP)?,
                nonce: int_field(info, InfoKey::TX_NONCE)?,
            }),
            _ => None,
        };

        Ok(Self {
            context_type,
            code: req.code.clone(),
            address: req.to.clone(),
            method: req.method.clone(),
            sender: req.from.clone(),
            value: req.value.clone(),
            owner: address_field(info, InfoKey::CONTRACT_OWNER)?,
            block: BlockInfo {
                height: int_field(info, InfoKey::BLOCK_HEIGHT)?,
                timestamp: int_field(info, InfoKey::BLOCK_TIMESTAMP)?,
            },
            tx,
            revision,
            step: StepCounter::new(costs, req.limit.clone()),
            func_readonly: false,
            fee_proportion: 0,
        })
    }

    pub fn is_readonly(&self) -> bool {
        self.context_type == ContextType::Query || self.func_readonly
    }
}

fn int_field(info: &Value, key: &str) -> ScoreResult<BigInt> {
    match info.get(key) {
        None | Some(Value::Nil) => Ok(BigInt::default()),
        Some(Value::Int(v)) => Ok(v.clone()),
        Some(other) => Err(ScoreError::invalid_param(format!(
            "info {key}: expected int, got {}",
            other.type_name()
        ))),
    }
}

fn address_field(info: &Value, key: &str) -> ScoreResult<Option<Address>> {
    match info.get(key) {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Address(a)) => Ok(Some(a.clone())),
        Some(other) => Err(ScoreError::invalid_param(format!(
            "info {key}: expected Address, got {}",
            other.type_name()
        ))),
    }
}
