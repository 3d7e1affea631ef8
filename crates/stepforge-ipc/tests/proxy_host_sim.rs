//! Drives a `Proxy` against a scripted host over a Unix socket pair.

use num_bigint::BigInt;
use rmpv::Value as Wire;
use std::os::unix::net::UnixStream;
use std::thread;
use stepforge_ipc::payload;
use stepforge_ipc::{
    ApiInfo, Codec, FramedTransport, InvokeHandler, InvokeRequest, InvokeResponse, MsgType, Proxy,
};
use stepforge_types::{int_to_bytes, Address, ScoreError, ScoreResult, Value};

const MAX: usize = 1 << 20;

fn invoke_payload(method: &str, flags: u32, limit: i64) -> Wire {
    let codec = Codec::CURRENT;
    Wire::Array(vec![
        Wire::from("/code/sample"),
        Wire::from(flags),
        Wire::Nil,
        Wire::Binary(Address::GOVERNANCE.to_canonical_bytes()),
        Wire::Binary(int_to_bytes(&BigInt::from(0))),
        Wire::Binary(int_to_bytes(&BigInt::from(limit))),
        Wire::from(method),
        codec.encode_any(&Value::List(vec![])).unwrap(),
        codec.encode_any(&Value::Nil).unwrap(),
    ])
}

fn result_of(data: &Wire) -> (u64, BigInt, Value) {
    let f = payload::array(data, 3, "RESULT").unwrap();
    (
        payload::uint(&f[0], "status").unwrap(),
        stepforge_types::bytes_to_int(payload::bytes(&f[1], "step").unwrap()),
        Codec::CURRENT.decode_any(&f[2]).unwrap(),
    )
}

/// Handler whose behaviour is selected by the invoked method name.
#[derive(Default)]
struct Scripted {
    readonly_seen: Vec<(String, bool)>,
    codecs_seen: Vec<Codec>,
    acks: usize,
}

impl InvokeHandler<UnixStream> for Scripted {
    fn invoke(
        &mut self,
        proxy: &mut Proxy<UnixStream>,
        req: InvokeRequest,
    ) -> ScoreResult<InvokeResponse> {
        self.readonly_seen
            .push((req.method.clone(), proxy.is_readonly()));
        self.codecs_seen.push(proxy.codec());
        let result = match req.method.as_str() {
            "outer" => {
                let res = proxy.call(
                    self,
                    &Address::ZERO,
                    &BigInt::from(0),
                    &BigInt::from(500),
                    "inner",
                    Value::List(vec![]),
                )?;
                self.readonly_seen
                    .push(("outer-after-call".into(), proxy.is_readonly()));
                assert_eq!(res.status, 0);
                assert_eq!(res.step_used, BigInt::from(7));
                res.result
            }
            "inner" => Value::from("inner-done"),
            "writer" => {
                for i in 0..6u8 {
                    proxy.set_value(&[i], Some(&[1, 2, 3, 4]), true)?;
                }
                // Six tracked writes with a threshold of five force one drain.
                assert_eq!(proxy.pending_sets(), 5);
                let got = proxy.get_value(b"k")?;
                assert_eq!(got, Some(b"v".to_vec()));
                assert_eq!(proxy.pending_sets(), 0);
                let acks = proxy.take_resolved_sets();
                self.acks = acks.len();
                assert!(acks.iter().all(|a| a.had_old && a.old_size == 3 && a.new_size == 4));
                Value::Nil
            }
            "query" => {
                let err = proxy.set_value(b"k", Some(b"v"), false).unwrap_err();
                assert!(matches!(err, ScoreError::AccessDenied(_)));
                proxy.send_event(&[Value::from("Ev()")], &[])?;
                Value::Bool(true)
            }
            "boom" => return Err(ScoreError::system("boom")),
            "legacy" => {
                proxy.set_codec(Codec::LEGACY);
                Value::Float(1.5)
            }
            other => panic!("unexpected method {other}"),
        };
        Ok(InvokeResponse {
            status: 0,
            step_used: BigInt::from(10),
            result,
        })
    }

    fn get_api(&mut self, _proxy: &mut Proxy<UnixStream>, _code: &str) -> ScoreResult<ApiInfo> {
        Ok(ApiInfo::new())
    }
}

fn engine_side(stream: UnixStream) -> Scripted {
    let mut proxy = Proxy::new(FramedTransport::new(stream, MAX));
    let mut handler = Scripted::default();
    proxy.run(&mut handler).unwrap();
    handler
}

#[test]
fn reentrant_invoke_during_call() {
    let (engine, host) = UnixStream::pair().unwrap();
    let engine = thread::spawn(move || engine_side(engine));
    let mut host = FramedTransport::new(host, MAX);

    host.send(MsgType::Invoke, &invoke_payload("outer", 0, 1000)).unwrap();

    let (msg, call) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Call);
    let f = payload::array(&call, 5, "CALL").unwrap();
    assert_eq!(payload::bytes(&f[3], "kind").unwrap(), b"call");
    let data = Codec::CURRENT.decode_any(&f[4]).unwrap();
    assert_eq!(data.get("method"), Some(&Value::from("inner")));

    // The callee re-enters the engine read-only before the CALL completes.
    host.send(MsgType::Invoke, &invoke_payload("inner", 1, 500)).unwrap();
    let (msg, nested) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    assert_eq!(result_of(&nested).2, Value::from("inner-done"));

    let call_result = Wire::Array(vec![
        Wire::from(0),
        Wire::Binary(int_to_bytes(&BigInt::from(7))),
        Codec::CURRENT.encode_any(&Value::from("callee")).unwrap(),
    ]);
    host.send(MsgType::Result, &call_result).unwrap();

    let (msg, outer) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    let (status, step, result) = result_of(&outer);
    assert_eq!(status, 0);
    assert_eq!(step, BigInt::from(10));
    assert_eq!(result, Value::from("callee"));

    host.send(MsgType::Close, &Wire::Nil).unwrap();
    let handler = engine.join().unwrap();
    assert_eq!(
        handler.readonly_seen,
        vec![
            ("outer".to_string(), false),
            ("inner".to_string(), true),
            ("outer-after-call".to_string(), false),
        ]
    );
}

#[test]
fn tracked_writes_are_drained_in_order() {
    let (engine, host) = UnixStream::pair().unwrap();
    let engine = thread::spawn(move || engine_side(engine));
    let mut host = FramedTransport::new(host, MAX);

    host.send(MsgType::Invoke, &invoke_payload("writer", 0, 1000)).unwrap();
    for i in 0..6u8 {
        let (msg, data) = host.receive().unwrap();
        assert_eq!(msg, MsgType::SetValue);
        let f = payload::array(&data, 3, "SETVALUE").unwrap();
        assert_eq!(payload::bytes(&f[0], "key").unwrap(), &[i]);
        assert_eq!(payload::uint(&f[1], "flag").unwrap(), 2);
        host.send(
            MsgType::SetValue,
            &Wire::Array(vec![Wire::Boolean(true), Wire::from(3)]),
        )
        .unwrap();
    }
    let (msg, _) = host.receive().unwrap();
    assert_eq!(msg, MsgType::GetValue);
    host.send(
        MsgType::GetValue,
        &Wire::Array(vec![Wire::Boolean(true), Wire::Binary(b"v".to_vec())]),
    )
    .unwrap();

    let (msg, _) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    host.send(MsgType::Close, &Wire::Nil).unwrap();
    assert_eq!(engine.join().unwrap().acks, 6);
}

#[test]
fn readonly_invoke_and_failing_invoke() {
    let (engine, host) = UnixStream::pair().unwrap();
    let engine = thread::spawn(move || engine_side(engine));
    let mut host = FramedTransport::new(host, MAX);

    // No EVENT frame may precede the RESULT of a read-only invoke.
    host.send(MsgType::Invoke, &invoke_payload("query", 1, 1000)).unwrap();
    let (msg, data) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    assert_eq!(result_of(&data).2, Value::Bool(true));

    host.send(MsgType::Invoke, &invoke_payload("boom", 0, 1234)).unwrap();
    let (msg, data) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    let (status, step, result) = result_of(&data);
    assert_eq!(status, 1);
    assert_eq!(step, BigInt::from(1234));
    assert_eq!(
        result,
        Value::from("ExceptionInInvoke(System error: boom)")
    );

    host.send(MsgType::GetApi, &Wire::from("/code/sample")).unwrap();
    let (msg, data) = host.receive().unwrap();
    assert_eq!(msg, MsgType::GetApi);
    let f = payload::array(&data, 2, "GETAPI").unwrap();
    assert_eq!(payload::uint(&f[0], "status").unwrap(), 0);
    assert_eq!(f[1], Wire::Array(vec![]));

    host.send(MsgType::Close, &Wire::Nil).unwrap();
    engine.join().unwrap();
}

#[test]
fn unexpected_message_is_fatal() {
    let (engine, host) = UnixStream::pair().unwrap();
    let engine = thread::spawn(move || {
        let mut proxy = Proxy::new(FramedTransport::new(engine, MAX));
        proxy.run(&mut Scripted::default())
    });
    let mut host = FramedTransport::new(host, MAX);
    host.send(MsgType::Event, &Wire::Nil).unwrap();
    let err = engine.join().unwrap().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn result_uses_the_codec_chosen_by_the_invoke() {
    let (engine, host) = UnixStream::pair().unwrap();
    let engine = thread::spawn(move || engine_side(engine));
    let mut host = FramedTransport::new(host, MAX);

    host.send(MsgType::Invoke, &invoke_payload("legacy", 0, 1000)).unwrap();
    let (msg, data) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    let f = payload::array(&data, 3, "RESULT").unwrap();
    assert_eq!(payload::uint(&f[0], "status").unwrap(), 0);
    assert_eq!(
        stepforge_types::bytes_to_int(payload::bytes(&f[1], "step").unwrap()),
        BigInt::from(10)
    );
    assert_eq!(Codec::LEGACY.decode_any(&f[2]).unwrap(), Value::Float(1.5));

    // The next invoke starts from the restored session codec.
    host.send(MsgType::Invoke, &invoke_payload("inner", 0, 1000)).unwrap();
    let (msg, data) = host.receive().unwrap();
    assert_eq!(msg, MsgType::Result);
    assert_eq!(result_of(&data).2, Value::from("inner-done"));

    host.send(MsgType::Close, &Wire::Nil).unwrap();
    let handler = engine.join().unwrap();
    assert_eq!(handler.codecs_seen, vec![Codec::CURRENT, Codec::CURRENT]);
}
