//! Counter contract that keeps a history of its increments and can drive
//! another counter through a nested call.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::rc::Rc;
use stepforge_ipc::{api_flag, ApiInfo, DataType, Param};
use stepforge_storage::{ArrayDb, DictDb, ValueType, VarDb};
use stepforge_types::{ScoreError, ScoreResult, Value};
use stepforge_vm::{Score, ScoreHost};

use crate::token::{address_arg, int_arg, Broken};

pub const INCREMENTED_EVENT: &str = "Incremented(int,int)";

pub struct Counter {
    api: ApiInfo,
}

impl Counter {
    pub fn new() -> ScoreResult<Self> {
        let ext = api_flag::EXTERNAL;
        let ro = ext | api_flag::READONLY;
        let one = Value::from(1i64);
        let api = ApiInfo::new()
            .function("count", ro, vec![], vec![DataType::Integer])?
            .function(
                "increment",
                ext,
                vec![Param::optional("amount", DataType::Integer, one.clone())],
                vec![DataType::Integer],
            )?
            .function("undo", ext, vec![], vec![DataType::Integer])?
            .function("reset", ext, vec![], vec![])?
            .function("history", ro, vec![], vec![DataType::List])?
            .function("seen", ro, vec![Param::new("amount", DataType::Integer)], vec![DataType::Bool])?
            .function(
                "forward",
                ext,
                vec![
                    Param::new("target", DataType::Address),
                    Param::optional("amount", DataType::Integer, one),
                ],
                vec![DataType::Integer],
            )?
            .function(
                "tokenFallback",
                ext,
                vec![
                    Param::new("_from", DataType::Address),
                    Param::new("_value", DataType::Integer),
                    Param::new("_data", DataType::Bytes),
                ],
                vec![],
            )?
            .function("depositOf", ro, vec![Param::new("_owner", DataType::Address)], vec![DataType::Integer])?
            .function("digest", ro, vec![Param::new("data", DataType::Bytes)], vec![DataType::Bytes])?
            .function("setFeeShare", ext, vec![Param::new("pct", DataType::Integer)], vec![])?
            .event(
                "Incremented",
                1,
                vec![
                    Param::new("amount", DataType::Integer),
                    Param::new("total", DataType::Integer),
                ],
            )?;
        Ok(Self { api })
    }

    /// Registry factory.
    pub fn load() -> Rc<dyn Score> {
        match Self::new() {
            Ok(counter) => Rc::new(counter),
            Err(e) => Rc::new(Broken(e)),
        }
    }

    fn total(host: &mut dyn ScoreHost) -> ScoreResult<(VarDb, BigInt)> {
        let var = VarDb::new("count", &host.db(), ValueType::Int)?;
        let total = var.get(host.store())?.as_int().cloned().unwrap_or_default();
        Ok((var, total))
    }

    fn increment(&self, host: &mut dyn ScoreHost, amount: BigInt) -> ScoreResult<Value> {
        let (var, total) = Self::total(host)?;
        let total = total + &amount;
        var.set(host.store(), &Value::Int(total.clone()))?;
        ArrayDb::new("history", &host.db(), ValueType::Int)?.put(host.store(), &Value::Int(amount.clone()))?;
        host.emit_event(
            vec![Value::from(INCREMENTED_EVENT), Value::Int(amount)],
            vec![Value::Int(total.clone())],
        )?;
        Ok(Value::Int(total))
    }

    fn undo(&self, host: &mut dyn ScoreHost) -> ScoreResult<Value> {
        let history = ArrayDb::new("history", &host.db(), ValueType::Int)?;
        let last = match history.pop(host.store())? {
            Value::Int(v) => v,
            _ => return Ok(Value::Nil),
        };
        let (var, total) = Self::total(host)?;
        var.set(host.store(), &Value::Int(total - &last))?;
        Ok(Value::Int(last))
    }

    fn deposit(&self, host: &mut dyn ScoreHost, args: &[Value]) -> ScoreResult<Value> {
        let from = address_arg(args, 0)?;
        let value = int_arg(args, 1)?;
        let deposits = DictDb::new("deposits", &host.db(), ValueType::Int, 1)?;
        let key = Value::Address(from);
        let held = deposits.get(host.store(), &key)?.as_int().cloned().unwrap_or_default();
        deposits.set(host.store(), &key, &Value::Int(held + value))?;
        Ok(Value::Nil)
    }
}

impl Score for Counter {
    fn api(&self) -> &ApiInfo {
        &self.api
    }

    fn invoke(&self, host: &mut dyn ScoreHost, method: &str, args: Vec<Value>) -> ScoreResult<Value> {
        match method {
            "count" => Ok(Value::Int(Self::total(host)?.1)),
            "increment" => self.increment(host, int_arg(&args, 0)?),
            "undo" => self.undo(host),
            "reset" => {
                VarDb::new("count", &host.db(), ValueType::Int)?.remove(host.store())?;
                Ok(Value::Nil)
            }
            "history" => {
                let history = ArrayDb::new("history", &host.db(), ValueType::Int)?;
                Ok(Value::List(history.to_vec(host.store())?))
            }
            "seen" => {
                let history = ArrayDb::new("history", &host.db(), ValueType::Int)?;
                Ok(Value::Bool(history.contains(host.store(), &args[0])?))
            }
            "forward" => {
                let target = address_arg(&args, 0)?;
                let params = stepforge_types::dict! { "amount" => int_arg(&args, 1)? };
                host.call(&target, "increment", params, &BigInt::zero())
            }
            "tokenFallback" => self.deposit(host, &args),
            "depositOf" => {
                let owner = address_arg(&args, 0)?;
                let deposits = DictDb::new("deposits", &host.db(), ValueType::Int, 1)?;
                deposits.get(host.store(), &Value::Address(owner))
            }
            "digest" => {
                let data = args.first().and_then(Value::as_bytes).unwrap_or_default().to_vec();
                Ok(Value::Bytes(host.sha3_256(&data)?))
            }
            "setFeeShare" => {
                let pct = int_arg(&args, 0)?
                    .to_u32()
                    .ok_or_else(|| ScoreError::invalid_param("pct"))?;
                host.set_fee_proportion(pct)?;
                Ok(Value::Nil)
            }
            other => Err(ScoreError::MethodNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;
    use stepforge_types::{Address, AddressPrefix};

    #[test]
    fn test_increment_and_history() {
        let mut host = MockHost::new();
        let counter = Counter::new().unwrap();
        counter.invoke(&mut host, "increment", vec![Value::from(1i64)]).unwrap();
        let total = counter.invoke(&mut host, "increment", vec![Value::from(5i64)]).unwrap();
        assert_eq!(total, Value::from(6i64));
        assert_eq!(
            counter.invoke(&mut host, "history", vec![]).unwrap(),
            Value::List(vec![Value::from(1i64), Value::from(5i64)])
        );
        assert_eq!(counter.invoke(&mut host, "seen", vec![Value::from(5i64)]).unwrap(), Value::Bool(true));
        assert_eq!(counter.invoke(&mut host, "seen", vec![Value::from(2i64)]).unwrap(), Value::Bool(false));
        assert_eq!(host.events.len(), 2);
    }

    #[test]
    fn test_undo_until_empty() {
        let mut host = MockHost::new();
        let counter = Counter::new().unwrap();
        counter.invoke(&mut host, "increment", vec![Value::from(3i64)]).unwrap();
        assert_eq!(counter.invoke(&mut host, "undo", vec![]).unwrap(), Value::from(3i64));
        assert_eq!(counter.invoke(&mut host, "count", vec![]).unwrap(), Value::from(0i64));
        assert_eq!(counter.invoke(&mut host, "undo", vec![]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_forward_and_deposits() {
        let mut host = MockHost::new();
        let counter = Counter::new().unwrap();
        let other = Address::from_body(AddressPrefix::Contract, [2; 20]);
        counter
            .invoke(&mut host, "forward", vec![Value::Address(other.clone()), Value::from(4i64)])
            .unwrap();
        assert_eq!(host.calls[0].0, other);
        assert_eq!(host.calls[0].1, "increment");

        let from = Address::from_body(AddressPrefix::Eoa, [1; 20]);
        for _ in 0..2 {
            let args = vec![Value::Address(from.clone()), Value::from(10i64), Value::Bytes(vec![])];
            counter.invoke(&mut host, "tokenFallback", args).unwrap();
        }
        assert_eq!(
            counter.invoke(&mut host, "depositOf", vec![Value::Address(from)]).unwrap(),
            Value::from(20i64)
        );
    }

    #[test]
    fn test_fee_share_and_digest() {
        let mut host = MockHost::new();
        let counter = Counter::new().unwrap();
        counter.invoke(&mut host, "setFeeShare", vec![Value::from(30i64)]).unwrap();
        assert_eq!(host.fee, 30);
        assert!(counter.invoke(&mut host, "setFeeShare", vec![Value::from(101i64)]).is_err());

        let digest = counter.invoke(&mut host, "digest", vec![Value::Bytes(b"abc".to_vec())]).unwrap();
        assert_eq!(digest.as_bytes().map(<[u8]>::len), Some(32));
    }
}
