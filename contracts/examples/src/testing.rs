//! In-process host for exercising contracts without a connection.

use num_bigint::BigInt;
use stepforge_ipc::LogLevel;
use stepforge_storage::{KvBackend, MemoryBackend, ScoreDatabase};
use stepforge_types::{Address, AddressPrefix, Revision, ScoreError, ScoreResult, Value};
use stepforge_vm::{BlockInfo, ScoreHost, TxInfo};

pub struct MockHost {
    pub address: Address,
    pub sender: Option<Address>,
    pub value: BigInt,
    pub readonly: bool,
    pub block: BlockInfo,
    pub store: MemoryBackend,
    pub events: Vec<(Vec<Value>, Vec<Value>)>,
    pub calls: Vec<(Address, String, Value)>,
    pub fee: u32,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            address: Address::from_body(AddressPrefix::Contract, [0xcc; 20]),
            sender: None,
            value: BigInt::default(),
            readonly: false,
            block: BlockInfo::default(),
            store: MemoryBackend::new(),
            events: Vec::new(),
            calls: Vec::new(),
            fee: 0,
        }
    }
}

impl ScoreHost for MockHost {
    fn address(&self) -> &Address {
        &self.address
    }

    fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    fn value(&self) -> &BigInt {
        &self.value
    }

    fn owner(&self) -> Option<&Address> {
        None
    }

    fn block(&self) -> &BlockInfo {
        &self.block
    }

    fn tx(&self) -> Option<&TxInfo> {
        None
    }

    fn revision(&self) -> Revision {
        Revision(Revision::ICON2)
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn step_used(&self) -> BigInt {
        BigInt::default()
    }

    fn step_limit(&self) -> BigInt {
        BigInt::from(u64::MAX)
    }

    fn db(&self) -> ScoreDatabase {
        ScoreDatabase::new(&self.address)
    }

    fn store(&mut self) -> &mut dyn KvBackend {
        &mut self.store
    }

    fn call(&mut self, to: &Address, method: &str, params: Value, _amount: &BigInt) -> ScoreResult<Value> {
        self.calls.push((to.clone(), method.to_string(), params));
        Ok(Value::Nil)
    }

    fn emit_event(&mut self, indexed: Vec<Value>, data: Vec<Value>) -> ScoreResult<()> {
        if !self.readonly {
            self.events.push((indexed, data));
        }
        Ok(())
    }

    fn get_balance(&mut self, _address: &Address) -> ScoreResult<BigInt> {
        Ok(BigInt::default())
    }

    fn get_info(&mut self) -> ScoreResult<Value> {
        Ok(Value::Nil)
    }

    fn sha3_256(&mut self, data: &[u8]) -> ScoreResult<Vec<u8>> {
        Ok(stepforge_crypto::sha3_256(data).to_vec())
    }

    fn set_fee_proportion(&mut self, pct: u32) -> ScoreResult<()> {
        if pct > 100 {
            return Err(ScoreError::invalid_param("fee proportion"));
        }
        self.fee = pct;
        Ok(())
    }

    fn log(&mut self, _level: LogLevel, _msg: &str) -> ScoreResult<()> {
        Ok(())
    }
}
