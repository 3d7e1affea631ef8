//! Engine side of the IPC protocol.
//!
//! Every host-facing operation sends one request and blocks on the matching
//! response. While a CALL is outstanding the host may send INVOKE messages
//! (the callee re-entering this engine); they are dispatched recursively
//! through the [`InvokeHandler`] before the CALL's RESULT is consumed.

use crate::api::ApiInfo;
use crate::codec::{Codec, TypeTag};
use crate::error::IpcError;
use crate::message::{invoke_flag, set_value_flag, LogLevel, MsgType};
use crate::payload;
use crate::transport::FramedTransport;
use crate::MAX_PENDING_SET_VALUES;
use num_bigint::BigInt;
use rmpv::Value as Wire;
use std::collections::VecDeque;
use std::fmt;
use std::io::{Read, Write};
use stepforge_types::{bytes_to_int, int_to_bytes, Address, ScoreError, ScoreResult, Status, Value};
use tracing::{debug, info, warn};

/// Decoded INVOKE request.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeRequest {
    pub code: String,
    pub flags: u32,
    pub from: Option<Address>,
    pub to: Address,
    pub value: BigInt,
    pub limit: BigInt,
    pub method: String,
    pub params: Value,
    pub info: Value,
}

impl InvokeRequest {
    pub fn is_readonly(&self) -> bool {
        self.flags & invoke_flag::READ_ONLY != 0
    }

    pub fn is_trace(&self) -> bool {
        self.flags & invoke_flag::TRACE != 0
    }
}

/// `(status, step_used, result)` triple carried by RESULT.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResponse {
    pub status: u32,
    pub step_used: BigInt,
    pub result: Value,
}

/// Outcome of a nested CALL as reported by the host.
pub type CallResult = InvokeResponse;

/// Acknowledgement of a tracked SETVALUE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetAck {
    pub had_old: bool,
    pub old_size: usize,
    pub new_size: usize,
}

impl SetAck {
    pub fn is_delete(&self) -> bool {
        self.new_size == 0
    }
}

/// Receiver of host-initiated requests.
pub trait InvokeHandler<S> {
    fn invoke(&mut self, proxy: &mut Proxy<S>, req: InvokeRequest) -> ScoreResult<InvokeResponse>;

    fn get_api(&mut self, proxy: &mut Proxy<S>, code: &str) -> ScoreResult<ApiInfo>;
}

pub struct Proxy<S> {
    transport: FramedTransport<S>,
    codec: Codec,
    readonly: bool,
    readonly_stack: Vec<bool>,
    pending: VecDeque<usize>,
    resolved: Vec<SetAck>,
    max_pending: usize,
}

impl<S: Read + Write> Proxy<S> {
    pub fn new(transport: FramedTransport<S>) -> Self {
        Self {
            transport,
            codec: Codec::default(),
            readonly: false,
            readonly_stack: Vec::new(),
            pending: VecDeque::new(),
            resolved: Vec::new(),
            max_pending: MAX_PENDING_SET_VALUES,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn set_codec(&mut self, codec: Codec) {
        self.codec = codec;
    }

    /// Write permission of the innermost invoke.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Nesting depth of INVOKE messages currently being serviced.
    pub fn depth(&self) -> usize {
        self.readonly_stack.len()
    }

    pub fn send_version(&mut self, version: u32, uuid: &str, name: &str) -> ScoreResult<()> {
        let payload = Wire::Array(vec![Wire::from(version), Wire::from(uuid), Wire::from(name)]);
        self.transport.send(MsgType::Version, &payload)?;
        Ok(())
    }

    /// Serve host requests until CLOSE.
    pub fn run(&mut self, handler: &mut dyn InvokeHandler<S>) -> ScoreResult<()> {
        loop {
            let (msg, data) = self.transport.receive()?;
            match msg {
                MsgType::Invoke => self.handle_invoke(handler, &data)?,
                MsgType::GetApi => self.handle_get_api(handler, &data)?,
                MsgType::Close => {
                    info!("host closed the session");
                    return Ok(());
                }
                other => {
                    return Err(IpcError::UnexpectedMessage {
                        got: other,
                        expected: "INVOKE, GETAPI or CLOSE",
                    }
                    .into())
                }
            }
        }
    }

    fn decode_invoke(&self, data: &Wire) -> Result<InvokeRequest, IpcError> {
        let f = payload::array(data, 9, "INVOKE")?;
        let flags = match &f[1] {
            Wire::Boolean(b) => u32::from(*b),
            other => payload::uint(other, "INVOKE flags")? as u32,
        };
        let from = match payload::opt_bytes(&f[2], "INVOKE from")? {
            Some(b) => Some(self.decode_address(b)?),
            None => None,
        };
        let decode_opt_any = |v: &Wire| -> Result<Value, IpcError> {
            match v {
                Wire::Array(_) => self.codec.decode_any(v),
                _ => Ok(Value::Nil),
            }
        };
        Ok(InvokeRequest {
            code: payload::string(&f[0], "INVOKE code")?,
            flags,
            from,
            to: self.decode_address(payload::bytes(&f[3], "INVOKE to")?)?,
            value: bytes_to_int(payload::bytes(&f[4], "INVOKE value")?),
            limit: bytes_to_int(payload::bytes(&f[5], "INVOKE limit")?),
            method: payload::string(&f[6], "INVOKE method")?,
            params: decode_opt_any(&f[7])?,
            info: decode_opt_any(&f[8])?,
        })
    }

    fn decode_address(&self, bytes: &[u8]) -> Result<Address, IpcError> {
        match self.codec.decode(TypeTag::ADDRESS, bytes)? {
            Value::Address(a) => Ok(a),
            _ => Err(IpcError::malformed("address")),
        }
    }

    fn handle_invoke(&mut self, handler: &mut dyn InvokeHandler<S>, data: &Wire) -> ScoreResult<()> {
        let req = self.decode_invoke(data)?;
        let limit = req.limit.clone();
        debug!(
            code = %req.code,
            to = %req.to,
            method = %req.method,
            readonly = req.is_readonly(),
            trace = req.is_trace(),
            "invoke"
        );

        self.readonly_stack.push(self.readonly);
        self.readonly = req.is_readonly();
        let saved_codec = self.codec;

        let outcome = handler.invoke(self, req);

        // The result goes out in the codec the invoke selected.
        let reply = match outcome {
            Ok(resp) => match self.codec.encode_any(&resp.result) {
                Ok(result) => Ok((resp.status, resp.step_used, result)),
                Err(e) => {
                    warn!(error = %e, "unencodable invoke result");
                    Ok((Status::SYSTEM_FAILURE, limit, self.exception_result(&e)))
                }
            },
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "exception in invoke");
                Ok((Status::SYSTEM_FAILURE, limit, self.exception_result(&e)))
            }
        };

        self.codec = saved_codec;
        self.readonly = self.readonly_stack.pop().unwrap_or(false);

        let (status, step_used, result) = reply?;
        let payload = Wire::Array(vec![
            Wire::from(status),
            Wire::Binary(int_to_bytes(&step_used)),
            result,
        ]);
        self.transport.send(MsgType::Result, &payload)?;
        Ok(())
    }

    fn exception_result(&self, e: &dyn fmt::Display) -> Wire {
        let message = Value::from(format!("ExceptionInInvoke({e})"));
        self.codec
            .encode_any(&message)
            .or_else(|_| self.codec.encode_any(&Value::Nil))
            .unwrap_or(Wire::Nil)
    }

    fn handle_get_api(&mut self, handler: &mut dyn InvokeHandler<S>, data: &Wire) -> ScoreResult<()> {
        let code = payload::string(data, "GETAPI code")?;
        debug!(%code, "get api");
        let reply = match handler.get_api(self, &code) {
            Ok(api) => match api.encode(&self.codec) {
                Ok(encoded) => vec![Wire::from(Status::Success.code()), encoded],
                Err(e) => {
                    warn!(error = %e, "unencodable api");
                    vec![Wire::from(Status::SYSTEM_FAILURE), Wire::Nil]
                }
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, %code, "get api failed");
                vec![Wire::from(e.status()), Wire::Nil]
            }
        };
        self.transport.send(MsgType::GetApi, &Wire::Array(reply))?;
        Ok(())
    }

    /// Ask the host to run another contract. INVOKE and GETAPI messages that
    /// arrive before the RESULT are serviced in order through `handler`.
    pub fn call(
        &mut self,
        handler: &mut dyn InvokeHandler<S>,
        to: &Address,
        value: &BigInt,
        limit: &BigInt,
        method: &str,
        params: Value,
    ) -> ScoreResult<CallResult> {
        self.flush_set_values()?;
        let mut data = std::collections::BTreeMap::new();
        data.insert("method".to_string(), Value::from(method));
        data.insert("params".to_string(), params);
        let payload = Wire::Array(vec![
            self.codec.encode(&Value::Address(to.clone()))?,
            Wire::Binary(int_to_bytes(value)),
            Wire::Binary(int_to_bytes(limit)),
            Wire::Binary(b"call".to_vec()),
            self.codec.encode_any(&Value::Dict(data))?,
        ]);
        debug!(%to, %method, %limit, "call");
        self.transport.send(MsgType::Call, &payload)?;

        loop {
            let (msg, data) = self.transport.receive()?;
            match msg {
                MsgType::Invoke => self.handle_invoke(handler, &data)?,
                MsgType::GetApi => self.handle_get_api(handler, &data)?,
                MsgType::Result => {
                    let f = payload::array(&data, 3, "RESULT")?;
                    return Ok(CallResult {
                        status: payload::uint(&f[0], "RESULT status")? as u32,
                        step_used: bytes_to_int(payload::bytes(&f[1], "RESULT step")?),
                        result: self.codec.decode_any(&f[2])?,
                    });
                }
                other => {
                    return Err(IpcError::UnexpectedMessage {
                        got: other,
                        expected: "INVOKE, GETAPI or RESULT",
                    }
                    .into())
                }
            }
        }
    }

    /// Resolve every outstanding SETVALUE acknowledgement.
    /// Returns whether anything was resolved.
    pub fn flush_set_values(&mut self) -> ScoreResult<bool> {
        let count = self.pending.len();
        if count == 0 {
            return Ok(false);
        }
        self.drain_set_values(count)?;
        Ok(true)
    }

    fn drain_set_values(&mut self, count: usize) -> ScoreResult<()> {
        for _ in 0..count {
            let Some(new_size) = self.pending.pop_front() else {
                break;
            };
            let (msg, data) = self.transport.receive()?;
            if msg != MsgType::SetValue {
                return Err(IpcError::UnexpectedMessage {
                    got: msg,
                    expected: "SETVALUE",
                }
                .into());
            }
            let f = payload::array(&data, 2, "SETVALUE ack")?;
            let had_old = payload::boolean(&f[0], "SETVALUE had_old")?;
            let old_size = if had_old {
                payload::uint(&f[1], "SETVALUE old_size")? as usize
            } else {
                0
            };
            self.resolved.push(SetAck {
                had_old,
                old_size,
                new_size,
            });
        }
        Ok(())
    }

    /// Acknowledgements resolved since the last call, in write order.
    pub fn take_resolved_sets(&mut self) -> Vec<SetAck> {
        std::mem::take(&mut self.resolved)
    }

    pub fn pending_sets(&self) -> usize {
        self.pending.len()
    }

    fn send_and_receive(&mut self, msg: MsgType, payload: &Wire) -> ScoreResult<Wire> {
        self.transport.send(msg, payload)?;
        self.flush_set_values()?;
        let (got, data) = self.transport.receive()?;
        if got != msg {
            return Err(IpcError::UnexpectedMessage {
                got,
                expected: msg_name(msg),
            }
            .into());
        }
        Ok(data)
    }

    pub fn get_value(&mut self, key: &[u8]) -> ScoreResult<Option<Vec<u8>>> {
        let data = self.send_and_receive(MsgType::GetValue, &Wire::Binary(key.to_vec()))?;
        let f = payload::array(&data, 2, "GETVALUE")?;
        if payload::boolean(&f[0], "GETVALUE found")? {
            Ok(Some(payload::bytes(&f[1], "GETVALUE value")?.to_vec()))
        } else {
            Ok(None)
        }
    }

    /// Write or delete (`value == None`) a key. With `track` the host
    /// acknowledges the old value, surfaced later through [`Proxy::take_resolved_sets`].
    pub fn set_value(&mut self, key: &[u8], value: Option<&[u8]>, track: bool) -> ScoreResult<()> {
        if self.readonly {
            return Err(ScoreError::access_denied("No permission to write"));
        }
        let mut flag = 0;
        if track {
            flag |= set_value_flag::OLD_VALUE;
        }
        if value.is_none() {
            flag |= set_value_flag::DELETE;
        }
        let payload = Wire::Array(vec![
            Wire::Binary(key.to_vec()),
            Wire::from(flag),
            value.map_or(Wire::Nil, |v| Wire::Binary(v.to_vec())),
        ]);
        self.transport.send(MsgType::SetValue, &payload)?;

        if track {
            self.pending.push_back(value.map_or(0, <[u8]>::len));
            if self.pending.len() > self.max_pending {
                let excess = self.pending.len() - self.max_pending;
                self.drain_set_values(excess)?;
            }
        }
        Ok(())
    }

    pub fn set_fee_proportion(&mut self, pct: u32) -> ScoreResult<()> {
        if self.readonly {
            return Err(ScoreError::access_denied("No permission to write"));
        }
        if pct > 100 {
            return Err(ScoreError::invalid_param(format!("fee proportion {pct}")));
        }
        self.transport.send(MsgType::SetFeePct, &Wire::from(pct))?;
        Ok(())
    }

    pub fn get_info(&mut self) -> ScoreResult<Value> {
        let data = self.send_and_receive(MsgType::GetInfo, &Wire::Binary(Vec::new()))?;
        Ok(self.codec.decode_any(&data)?)
    }

    pub fn get_balance(&mut self, addr: &Address) -> ScoreResult<BigInt> {
        let key = self.codec.encode(&Value::Address(addr.clone()))?;
        let data = self.send_and_receive(MsgType::GetBalance, &key)?;
        Ok(bytes_to_int(payload::bytes(&data, "GETBALANCE")?))
    }

    /// Emit an event log. Silently ignored under a read-only invoke.
    pub fn send_event(&mut self, indexed: &[Value], data: &[Value]) -> ScoreResult<()> {
        if self.readonly {
            return Ok(());
        }
        let encode_all = |values: &[Value]| -> Result<Wire, IpcError> {
            values
                .iter()
                .map(|v| self.codec.encode(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Wire::Array)
        };
        let payload = Wire::Array(vec![encode_all(indexed)?, encode_all(data)?]);
        self.transport.send(MsgType::Event, &payload)?;
        Ok(())
    }

    /// Host-side membership scan: `(found, entries scanned, bytes scanned)`.
    pub fn contains(&mut self, prefix: &[u8], value: &[u8], limit: u64) -> ScoreResult<(bool, u64, u64)> {
        let payload = Wire::Array(vec![
            Wire::Binary(prefix.to_vec()),
            Wire::Binary(value.to_vec()),
            Wire::from(limit),
        ]);
        let data = self.send_and_receive(MsgType::Contains, &payload)?;
        let f = payload::array(&data, 3, "CONTAINS")?;
        Ok((
            payload::boolean(&f[0], "CONTAINS found")?,
            payload::uint(&f[1], "CONTAINS count")?,
            payload::uint(&f[2], "CONTAINS size")?,
        ))
    }

    pub fn log(&mut self, level: LogLevel, msg: &str) -> ScoreResult<()> {
        let payload = Wire::Array(vec![
            Wire::from(level as u32),
            Wire::from(level.flag()),
            Wire::from(msg),
        ]);
        self.transport.send(MsgType::Log, &payload)?;
        Ok(())
    }
}

fn msg_name(msg: MsgType) -> &'static str {
    match msg {
        MsgType::GetValue => "GETVALUE",
        MsgType::GetInfo => "GETINFO",
        MsgType::GetBalance => "GETBALANCE",
        MsgType::Contains => "CONTAINS",
        _ => "response",
    }
}
