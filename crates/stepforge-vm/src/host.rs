//! The [`ScoreHost`] a running contract talks to.

use crate::context::{BlockInfo, ExecutionContext, TxInfo};
use crate::context_db::ContextDb;
use crate::score::ScoreHost;
use num_bigint::BigInt;
use std::io::{Read, Write};
use stepforge_ipc::{InvokeHandler, LogLevel, Proxy};
use stepforge_storage::{KvBackend, ScoreDatabase};
use stepforge_types::{int_to_bytes, Address, Revision, ScoreError, ScoreResult, StepKind, Value};
use tracing::{debug, warn};

/// Upper bound on indexed event values, signature included.
pub const MAX_INDEXED: usize = 4;

/// Services for one executing contract: the charged store plus host calls,
/// with nested CALLs re-entering `handler`.
pub struct Host<'a, S> {
    db: ContextDb<'a, S>,
    handler: &'a mut dyn InvokeHandler<S>,
}

impl<'a, S: Read + Write> Host<'a, S> {
    pub fn new(
        proxy: &'a mut Proxy<S>,
        ctx: &'a mut ExecutionContext,
        handler: &'a mut dyn InvokeHandler<S>,
    ) -> Self {
        Self {
            db: ContextDb::new(proxy, ctx),
            handler,
        }
    }

    fn ctx(&self) -> &ExecutionContext {
        self.db.context()
    }
}

impl<'a, S: Read + Write> ScoreHost for Host<'a, S> {
    fn address(&self) -> &Address {
        &self.ctx().address
    }

    fn sender(&self) -> Option<&Address> {
        self.ctx().sender.as_ref()
    }

    fn value(&self) -> &BigInt {
        &self.ctx().value
    }

    fn owner(&self) -> Option<&Address> {
        self.ctx().owner.as_ref()
    }

    fn block(&self) -> &BlockInfo {
        &self.ctx().block
    }

    fn tx(&self) -> Option<&TxInfo> {
        self.ctx().tx.as_ref()
    }

    fn revision(&self) -> Revision {
        self.ctx().revision
    }

    fn is_readonly(&self) -> bool {
        self.ctx().is_readonly()
    }

    fn step_used(&self) -> BigInt {
        self.ctx().step.used().clone()
    }

    fn step_limit(&self) -> BigInt {
        self.ctx().step.limit().clone()
    }

    fn db(&self) -> ScoreDatabase {
        ScoreDatabase::new(&self.ctx().address)
    }

    fn store(&mut self) -> &mut dyn KvBackend {
        &mut self.db
    }

    fn call(&mut self, to: &Address, method: &str, params: Value, amount: &BigInt) -> ScoreResult<Value> {
        self.db.flush()?;
        self.db.charge(StepKind::ContractCall, 1)?;
        let limit = self.ctx().step.remained();
        let revision = self.ctx().revision;

        let outcome = self
            .db
            .proxy()
            .call(&mut *self.handler, to, amount, &limit, method, params)?;
        self.db.settle()?;

        if outcome.step_used > limit {
            warn!(%to, %method, used = %outcome.step_used, %limit, "callee overran its step limit");
            self.db.context_mut().step.add_step(limit);
            return Err(ScoreError::system(format!(
                "invalid step used by callee: {}",
                outcome.step_used
            )));
        }
        self.db.context_mut().step.add_step(outcome.step_used);

        if outcome.status == 0 {
            return Ok(outcome.result);
        }
        let message = match outcome.result {
            Value::Str(s) => s,
            Value::Nil => String::new(),
            other => other.to_string(),
        };
        debug!(%to, %method, status = outcome.status, "callee failed");
        if revision.is_legacy() && outcome.status == 1 {
            return Err(ScoreError::System(message));
        }
        Err(ScoreError::from_status(outcome.status, message))
    }

    fn emit_event(&mut self, indexed: Vec<Value>, data: Vec<Value>) -> ScoreResult<()> {
        if self.is_readonly() {
            return Ok(());
        }
        match indexed.first() {
            Some(Value::Str(_)) => {}
            _ => return Err(ScoreError::invalid_param("event signature missing")),
        }
        if indexed.len() > MAX_INDEXED {
            return Err(ScoreError::invalid_param(format!(
                "too many indexed values: {}",
                indexed.len()
            )));
        }
        let mut size = 0;
        for v in indexed.iter().chain(data.iter()) {
            size += event_value_size(v)?;
        }
        self.db.charge(StepKind::EventLog, size)?;
        self.db.proxy().send_event(&indexed, &data)
    }

    fn get_balance(&mut self, address: &Address) -> ScoreResult<BigInt> {
        self.db.charge(StepKind::ApiCall, 1)?;
        let balance = self.db.proxy().get_balance(address)?;
        self.db.settle()?;
        Ok(balance)
    }

    fn get_info(&mut self) -> ScoreResult<Value> {
        self.db.charge(StepKind::ApiCall, 1)?;
        let info = self.db.proxy().get_info()?;
        self.db.settle()?;
        Ok(info)
    }

    fn sha3_256(&mut self, data: &[u8]) -> ScoreResult<Vec<u8>> {
        let api = self.ctx().step.cost(StepKind::ApiCall);
        let chunks = BigInt::from((data.len() + 31) / 32);
        let cost = &api + &api * chunks / BigInt::from(10);
        self.db.consume(StepKind::ApiCall, cost)?;
        Ok(stepforge_crypto::sha3_256(data).to_vec())
    }

    fn set_fee_proportion(&mut self, pct: u32) -> ScoreResult<()> {
        if self.is_readonly() {
            return Err(ScoreError::access_denied("No permission to set fee proportion"));
        }
        if pct > 100 {
            return Err(ScoreError::invalid_param(format!("invalid fee proportion {pct}")));
        }
        self.db.context_mut().fee_proportion = pct;
        Ok(())
    }

    fn log(&mut self, level: LogLevel, msg: &str) -> ScoreResult<()> {
        self.db.proxy().log(level, msg)
    }
}

/// Bytes an event value occupies in the log, the unit EVENT_LOG is priced in.
fn event_value_size(v: &Value) -> ScoreResult<usize> {
    Ok(match v {
        Value::Nil => 0,
        Value::Int(i) => int_to_bytes(i).len(),
        Value::Bool(b) => int_to_bytes(&BigInt::from(u8::from(*b))).len(),
        Value::Str(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::Address(a) => a.to_canonical_bytes().len(),
        other => {
            return Err(ScoreError::invalid_param(format!(
                "unsupported event value type {}",
                other.type_name()
            )))
        }
    })
}
