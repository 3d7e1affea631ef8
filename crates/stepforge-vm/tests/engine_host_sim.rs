//! Runs the `ServiceEngine` against a simulated host over a Unix socket pair.
//!
//! The simulated host keeps contract state in a `MemoryBackend`, answers
//! every engine request, and turns each CALL into a nested INVOKE of the
//! same engine, the way a real host re-enters the runtime.

use num_bigint::BigInt;
use num_traits::Zero;
use rmpv::Value as Wire;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::thread::{self, JoinHandle};
use stepforge_ipc::message::set_value_flag;
use stepforge_ipc::{
    api_flag, payload, ApiInfo, Codec, DataType, FramedTransport, InfoKey, MsgType, Param, Proxy, TypeTag,
};
use stepforge_storage::{MemoryBackend, ValueType, VarDb};
use stepforge_types::{bytes_to_int, dict, int_to_bytes, Address, AddressPrefix, ScoreError, ScoreResult, Value};
use stepforge_vm::{Score, ScoreHost, ScoreRegistry, ServiceEngine};

const MAX: usize = 1 << 20;

struct Sample {
    api: ApiInfo,
}

impl Sample {
    fn load() -> Rc<dyn Score> {
        let ext = api_flag::EXTERNAL;
        let api = ApiInfo::new()
            .function("put", ext, vec![Param::new("value", DataType::Bytes)], vec![])
            .and_then(|a| a.function("churn", ext, vec![Param::new("value", DataType::Bytes)], vec![]))
            .and_then(|a| a.function("peek", ext | api_flag::READONLY, vec![], vec![DataType::Bytes]))
            .and_then(|a| a.function("sneak", ext | api_flag::READONLY, vec![], vec![]))
            .and_then(|a| {
                a.function(
                    "relay",
                    ext,
                    vec![
                        Param::new("to", DataType::Address),
                        Param::new("method", DataType::String),
                        Param::optional("data", DataType::Bytes, Value::Nil),
                    ],
                    vec![],
                )
            })
            .and_then(|a| a.function("recurse", ext, vec![], vec![]))
            .and_then(|a| a.function("fail", ext, vec![Param::new("code", DataType::Integer)], vec![]))
            .and_then(|a| a.function("notify", ext, vec![], vec![]))
            .and_then(|a| a.function("hidden", 0, vec![], vec![]))
            .and_then(|a| a.function("spread", ext, vec![], vec![]))
            .and_then(|a| a.function("drop", ext, vec![], vec![]))
            .and_then(|a| a.function("ratio", ext | api_flag::READONLY, vec![], vec![]))
            .map(|a| a.fallback(api_flag::PAYABLE, vec![]))
            .unwrap();
        Rc::new(Sample { api })
    }
}

impl Score for Sample {
    fn api(&self) -> &ApiInfo {
        &self.api
    }

    fn invoke(&self, host: &mut dyn ScoreHost, method: &str, args: Vec<Value>) -> ScoreResult<Value> {
        let slot = VarDb::new("slot", &host.db(), ValueType::Bytes)?;
        match method {
            "put" => {
                slot.set(host.store(), &args[0])?;
                Ok(Value::Nil)
            }
            "churn" => {
                slot.set(host.store(), &args[0])?;
                slot.remove(host.store())?;
                Ok(Value::Nil)
            }
            "peek" => slot.get(host.store()),
            "sneak" => {
                slot.set(host.store(), &Value::Bytes(vec![1]))?;
                Ok(Value::Nil)
            }
            "relay" => {
                let to = args[0].as_address().cloned().ok_or_else(|| ScoreError::invalid_param("to"))?;
                let method = args[1].as_str().unwrap_or_default().to_string();
                let params = match &args[2] {
                    Value::Nil => Value::Nil,
                    data => dict! { "value" => data.clone() },
                };
                host.call(&to, &method, params, &BigInt::zero())
            }
            "recurse" => {
                let me = host.address().clone();
                host.call(&me, "recurse", Value::Nil, &BigInt::zero())
            }
            "fail" => {
                let code = args[0].as_int().and_then(|c| u32::try_from(c).ok()).unwrap_or(0);
                Err(ScoreError::revert(code, "nope"))
            }
            "notify" => {
                host.emit_event(vec![Value::from("Ping(int)"), Value::from(1i64)], vec![Value::from("hi")])?;
                host.set_fee_proportion(50)?;
                host.log(stepforge_ipc::LogLevel::Info, "notified")?;
                Ok(Value::Nil)
            }
            "spread" => {
                let one = Value::Bytes(vec![1]);
                let first = VarDb::new("k0", &host.db(), ValueType::Bytes)?;
                first.set(host.store(), &one)?;
                first.remove(host.store())?;
                for i in 1..=5 {
                    let var = VarDb::new(format!("k{i}"), &host.db(), ValueType::Bytes)?;
                    var.set(host.store(), &one)?;
                }
                Ok(Value::Nil)
            }
            "drop" => {
                slot.remove(host.store())?;
                Ok(Value::Nil)
            }
            "ratio" => Ok(Value::Float(0.5)),
            "fallback" => Ok(Value::Nil),
            other => Err(ScoreError::MethodNotFound(other.to_string())),
        }
    }
}

fn spawn_engine(max_depth: usize) -> (JoinHandle<ScoreResult<()>>, SimHost) {
    let (engine, host) = UnixStream::pair().unwrap();
    let handle = thread::spawn(move || {
        let mut registry = ScoreRegistry::new();
        registry.register("sample", Sample::load);
        let mut engine_impl = ServiceEngine::new(registry).with_max_depth(max_depth);
        let mut proxy = Proxy::new(FramedTransport::new(engine, MAX));
        proxy.run(&mut engine_impl)
    });
    (handle, SimHost::new(host))
}

fn contract(tag: &[u8]) -> Address {
    Address::from_data(AddressPrefix::Contract, tag)
}

/// Plays the host side of the protocol.
struct SimHost {
    transport: FramedTransport<UnixStream>,
    store: MemoryBackend,
    codec: Codec,
    info: Value,
    set_values: usize,
    events: usize,
    logs: Vec<String>,
    fees: Vec<u64>,
}

impl SimHost {
    fn new(stream: UnixStream) -> Self {
        let costs = dict! {
            "set" => 320i64,
            "replace" => 80i64,
            "delete" => -240i64,
            "contractCall" => 1000i64,
            "eventLog" => 100i64,
            "apiCall" => 10000i64,
        };
        let mut info = dict! { InfoKey::REVISION => 14i64, InfoKey::BLOCK_HEIGHT => 7i64 };
        if let Value::Dict(map) = &mut info {
            map.insert(InfoKey::STEP_COSTS.to_string(), costs);
        }
        Self {
            transport: FramedTransport::new(stream, MAX),
            store: MemoryBackend::new(),
            codec: Codec::CURRENT,
            info,
            set_values: 0,
            events: 0,
            logs: Vec::new(),
            fees: Vec::new(),
        }
    }

    fn set_info(&mut self, key: &str, value: Value) {
        if let Value::Dict(map) = &mut self.info {
            map.insert(key.to_string(), value);
        }
    }

    fn with_costs(mut self, costs: Value) -> Self {
        self.set_info(InfoKey::STEP_COSTS, costs);
        self
    }

    fn with_revision(mut self, revision: i64) -> Self {
        self.set_info(InfoKey::REVISION, Value::from(revision));
        self.codec = if revision < 14 { Codec::LEGACY } else { Codec::CURRENT };
        self
    }

    fn invoke(&mut self, to: &Address, method: &str, params: Value, value: i64, limit: &BigInt, flags: u32) -> (u64, BigInt, Value) {
        let payload = Wire::Array(vec![
            Wire::from(format!("/scores/{to}/sample")),
            Wire::from(flags),
            Wire::Binary(contract(b"origin").to_canonical_bytes()),
            Wire::Binary(to.to_canonical_bytes()),
            Wire::Binary(int_to_bytes(&BigInt::from(value))),
            Wire::Binary(int_to_bytes(limit)),
            Wire::from(method),
            self.codec.encode_any(&params).unwrap(),
            self.codec.encode_any(&self.info).unwrap(),
        ]);
        self.transport.send(MsgType::Invoke, &payload).unwrap();
        self.serve()
    }

    fn call(&mut self, to: &Address, method: &str, params: Value) -> (u64, BigInt, Value) {
        self.invoke(to, method, params, 0, &BigInt::from(1_000_000), 0)
    }

    fn serve(&mut self) -> (u64, BigInt, Value) {
        loop {
            let (msg, data) = self.transport.receive().unwrap();
            match msg {
                MsgType::GetValue => {
                    let key = payload::bytes(&data, "key").unwrap();
                    let reply = match self.store.raw_get(key) {
                        Some(v) => Wire::Array(vec![Wire::Boolean(true), Wire::Binary(v)]),
                        None => Wire::Array(vec![Wire::Boolean(false), Wire::Nil]),
                    };
                    self.transport.send(MsgType::GetValue, &reply).unwrap();
                }
                MsgType::SetValue => {
                    self.set_values += 1;
                    let f = payload::array(&data, 3, "SETVALUE").unwrap();
                    let key = payload::bytes(&f[0], "key").unwrap();
                    let flags = payload::uint(&f[1], "flags").unwrap() as u32;
                    let value = payload::opt_bytes(&f[2], "value").unwrap();
                    let old = self.store.apply(key, value);
                    if flags & set_value_flag::OLD_VALUE != 0 {
                        let ack = Wire::Array(vec![
                            Wire::Boolean(old.is_some()),
                            Wire::from(old.unwrap_or(0) as u64),
                        ]);
                        self.transport.send(MsgType::SetValue, &ack).unwrap();
                    }
                }
                MsgType::Call => {
                    let f = payload::array(&data, 5, "CALL").unwrap();
                    let to = match self.codec.decode(TypeTag::ADDRESS, payload::bytes(&f[0], "to").unwrap()).unwrap() {
                        Value::Address(a) => a,
                        other => panic!("bad CALL target {other:?}"),
                    };
                    let limit = bytes_to_int(payload::bytes(&f[2], "limit").unwrap());
                    let body = self.codec.decode_any(&f[4]).unwrap();
                    let method = body.get("method").and_then(Value::as_str).unwrap().to_string();
                    let params = body.get("params").cloned().unwrap_or(Value::Nil);
                    let (status, step, result) = self.invoke(&to, &method, params, 0, &limit, 0);
                    let reply = Wire::Array(vec![
                        Wire::from(status),
                        Wire::Binary(int_to_bytes(&step)),
                        self.codec.encode_any(&result).unwrap(),
                    ]);
                    self.transport.send(MsgType::Result, &reply).unwrap();
                }
                MsgType::Event => self.events += 1,
                MsgType::Log => {
                    let f = payload::array(&data, 3, "LOG").unwrap();
                    self.logs.push(payload::string(&f[2], "msg").unwrap());
                }
                MsgType::SetFeePct => self.fees.push(payload::uint(&data, "pct").unwrap()),
                MsgType::GetBalance => {
                    let reply = Wire::Binary(int_to_bytes(&BigInt::from(1000)));
                    self.transport.send(MsgType::GetBalance, &reply).unwrap();
                }
                MsgType::Result => {
                    let f = payload::array(&data, 3, "RESULT").unwrap();
                    return (
                        payload::uint(&f[0], "status").unwrap(),
                        bytes_to_int(payload::bytes(&f[1], "step").unwrap()),
                        self.codec.decode_any(&f[2]).unwrap(),
                    );
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    fn close(mut self, engine: JoinHandle<ScoreResult<()>>) -> Self {
        self.transport.send(MsgType::Close, &Wire::Nil).unwrap();
        engine.join().unwrap().unwrap();
        self
    }
}

fn bytes4() -> Value {
    dict! { "value" => vec![1u8, 2, 3, 4] }
}

#[test]
fn write_then_delete_nets_to_one_set_minus_refund() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let (status, step, _) = host.call(&a, "churn", bytes4());
    assert_eq!(status, 0);
    // SET 4 * 320, then the delete acknowledgement credits 4 * -240
    assert_eq!(step, BigInt::from(1280 - 960));
    assert!(host.store.is_empty());

    host.close(engine);
}

#[test]
fn overwrite_is_priced_as_replace() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let (_, first, _) = host.call(&a, "put", bytes4());
    assert_eq!(first, BigInt::from(1280));
    let (_, second, _) = host.call(&a, "put", bytes4());
    assert_eq!(second, BigInt::from(320));

    let (status, _, value) = host.invoke(&a, "peek", Value::Nil, 0, &BigInt::from(1000), 0);
    assert_eq!(status, 0);
    assert_eq!(value, Value::Bytes(vec![1, 2, 3, 4]));

    host.close(engine);
}

#[test]
fn nested_call_charges_contract_call_and_callee_usage() {
    let (engine, mut host) = spawn_engine(64);
    let (a, b) = (contract(b"a"), contract(b"b"));

    let params = dict! { "to" => b.clone(), "method" => "put", "data" => vec![9u8, 9] };
    let (status, step, _) = host.call(&a, "relay", params);
    assert_eq!(status, 0);
    assert_eq!(step, BigInt::from(1000 + 2 * 320));

    let (_, _, stored) = host.invoke(&b, "peek", Value::Nil, 0, &BigInt::from(1000), 0);
    assert_eq!(stored, Value::Bytes(vec![9, 9]));
    let (_, _, untouched) = host.invoke(&a, "peek", Value::Nil, 0, &BigInt::from(1000), 0);
    assert_eq!(untouched, Value::Nil);

    host.close(engine);
}

#[test]
fn callee_failure_is_reraised_in_caller() {
    let (engine, mut host) = spawn_engine(64);
    let (a, b) = (contract(b"a"), contract(b"b"));

    let params = dict! { "to" => b, "method" => "put" };
    let (status, _, message) = host.call(&a, "relay", params);
    assert_eq!(status, 6);
    assert!(message.as_str().unwrap().contains("value"));

    host.close(engine);
}

#[test]
fn query_and_readonly_methods_cannot_write() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let (status, _, _) = host.invoke(&a, "put", bytes4(), 0, &BigInt::from(1_000_000), 1);
    assert_eq!(status, 9);
    let (status, _, message) = host.call(&a, "sneak", Value::Nil);
    assert_eq!(status, 9);
    assert!(message.as_str().unwrap().ends_with("No permission to write"));
    assert!(host.store.is_empty());

    host.close(engine);
}

#[test]
fn revert_and_dispatch_failures() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let (status, _, message) = host.call(&a, "fail", dict! { "code" => 5i64 });
    assert_eq!(status, 37);
    assert_eq!(message, Value::from("nope"));

    assert_eq!(host.call(&a, "missing", Value::Nil).0, 3);
    assert_eq!(host.call(&a, "hidden", Value::Nil).0, 3);
    assert_eq!(host.invoke(&a, "put", bytes4(), 5, &BigInt::from(1_000_000), 0).0, 4);
    assert_eq!(host.invoke(&a, "", Value::Nil, 5, &BigInt::from(1_000_000), 0).0, 0);

    host.close(engine);
}

#[test]
fn out_of_step_reports_the_limit() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let limit = BigInt::from(1000);
    let (status, step, _) = host.invoke(&a, "put", bytes4(), 0, &limit, 0);
    assert_eq!(status, 10);
    assert_eq!(step, limit);

    host.close(engine);
}

#[test]
fn self_recursion_hits_the_depth_limit() {
    let (engine, mut host) = spawn_engine(3);
    let a = contract(b"a");

    let (status, step, _) = host.call(&a, "recurse", Value::Nil);
    assert_eq!(status, 13);
    assert_eq!(step, BigInt::from(3 * 1000));

    host.close(engine);
}

#[test]
fn events_fees_and_logs_reach_the_host() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let (status, step, _) = host.call(&a, "notify", Value::Nil);
    assert_eq!(status, 0);
    // "Ping(int)" + int 1 + "hi"
    assert_eq!(step, BigInt::from((9 + 1 + 2) * 100));

    let host = host.close(engine);
    assert_eq!(host.events, 1);
    assert_eq!(host.fees, vec![50]);
    assert_eq!(host.logs, vec!["notified".to_string()]);
}

#[test]
fn get_api_lists_external_methods() {
    let (engine, mut host) = spawn_engine(64);

    host.transport.send(MsgType::GetApi, &Wire::from("/scores/x/sample")).unwrap();
    let (msg, data) = host.transport.receive().unwrap();
    assert_eq!(msg, MsgType::GetApi);
    let f = payload::array(&data, 2, "GETAPI").unwrap();
    assert_eq!(payload::uint(&f[0], "status").unwrap(), 0);
    let entries = payload::array(&f[1], 1, "api").unwrap();
    assert_eq!(entries.len(), 13);

    host.transport.send(MsgType::GetApi, &Wire::from("/scores/x/unknown")).unwrap();
    let (_, data) = host.transport.receive().unwrap();
    let f = payload::array(&data, 2, "GETAPI").unwrap();
    assert_eq!(payload::uint(&f[0], "status").unwrap(), 2);

    host.close(engine);
}

#[test]
fn overwrite_near_the_limit_is_priced_exactly() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    host.call(&a, "put", bytes4());
    let writes = host.set_values;
    // The optimistic SET price (1280) does not fit, the REPLACE price does.
    let (status, step, _) = host.invoke(&a, "put", dict! { "value" => vec![5u8, 6, 7, 8] }, 0, &BigInt::from(1000), 0);
    assert_eq!(status, 0);
    assert_eq!(step, BigInt::from(4 * 80));
    assert_eq!(host.set_values, writes + 1);

    let (_, _, value) = host.invoke(&a, "peek", Value::Nil, 0, &BigInt::from(1000), 0);
    assert_eq!(value, Value::Bytes(vec![5, 6, 7, 8]));

    host.close(engine);
}

#[test]
fn delete_acknowledgement_past_the_limit_is_out_of_step() {
    let (engine, host) = spawn_engine(64);
    let costs = dict! {
        "schema" => 1i64,
        "setBase" => 100i64,
        "set" => 1i64,
        "deleteBase" => 500i64,
        "delete" => 0i64,
    };
    let mut host = host.with_costs(costs);
    let a = contract(b"a");

    // Six writes of 101 each fit; the delete acknowledgement drained by the
    // sixth write adds 500 and overruns the limit.
    let (status, step, _) = host.invoke(&a, "spread", Value::Nil, 0, &BigInt::from(1000), 0);
    assert_eq!(status, 10);
    assert_eq!(step, BigInt::from(1000));
    assert_eq!(host.set_values, 7);

    host.close(engine);
}

#[test]
fn deleting_a_missing_key_sends_no_write() {
    let (engine, mut host) = spawn_engine(64);
    let a = contract(b"a");

    let (status, step, _) = host.call(&a, "drop", Value::Nil);
    assert_eq!(status, 0);
    assert_eq!(step, BigInt::zero());
    assert_eq!(host.set_values, 0);

    host.call(&a, "put", bytes4());
    let (status, step, _) = host.call(&a, "drop", Value::Nil);
    assert_eq!(status, 0);
    assert_eq!(step, BigInt::from(4 * -240));
    assert_eq!(host.set_values, 2);
    assert!(host.store.is_empty());

    host.close(engine);
}

#[test]
fn legacy_revision_result_uses_the_legacy_codec() {
    let (engine, host) = spawn_engine(64);
    let mut host = host.with_revision(13);
    let a = contract(b"a");

    let (status, step, value) = host.call(&a, "ratio", Value::Nil);
    assert_eq!(status, 0);
    assert_eq!(step, BigInt::zero());
    assert_eq!(value, Value::Float(0.5));

    host.close(engine);
}
