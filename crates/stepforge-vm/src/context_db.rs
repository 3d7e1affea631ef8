//! Step-charging store over the IPC proxy.
//!
//! Every physical access goes to the host through the [`Proxy`] and is priced
//! against the context's step counter in the same call. Overwrite and delete
//! prices depend on the old value, which the host reports asynchronously in
//! SETVALUE acknowledgements; those are applied as they get resolved.

use crate::context::{ContextType, ExecutionContext};
use crate::step::{NoRefund, StepCosts, StepCounter};
use num_bigint::BigInt;
use std::io::{Read, Write};
use stepforge_ipc::{Proxy, SetAck};
use stepforge_storage::KvBackend;
use stepforge_types::{ScoreError, ScoreResult, StepKind};
use tracing::{debug, trace};

/// Price the old-value information carried by a SETVALUE acknowledgement.
pub fn apply_set_ack(counter: &mut StepCounter, context_type: ContextType, ack: &SetAck) -> ScoreResult<()> {
    if context_type != ContextType::Invoke || !ack.had_old {
        return Ok(());
    }
    if ack.is_delete() {
        counter.apply_step(StepKind::Delete, ack.old_size, &mut NoRefund)?;
    } else if counter.schema() == StepCosts::SCHEMA_BASED {
        counter.refund_step(ack.old_size)?;
    } else {
        counter.refund_step(ack.new_size)?;
    }
    Ok(())
}

/// Drain every outstanding acknowledgement and price it. Returns whether
/// anything was drained.
pub fn flush_acks<S: Read + Write>(
    proxy: &mut Proxy<S>,
    counter: &mut StepCounter,
    context_type: ContextType,
) -> ScoreResult<bool> {
    let flushed = proxy.flush_set_values()?;
    settle_acks(proxy, counter, context_type)?;
    Ok(flushed)
}

/// Price acknowledgements the proxy already resolved.
pub fn settle_acks<S: Read + Write>(
    proxy: &mut Proxy<S>,
    counter: &mut StepCounter,
    context_type: ContextType,
) -> ScoreResult<()> {
    for ack in proxy.take_resolved_sets() {
        apply_set_ack(counter, context_type, &ack)?;
    }
    Ok(())
}

/// Store of one executing contract.
pub struct ContextDb<'a, S> {
    proxy: &'a mut Proxy<S>,
    ctx: &'a mut ExecutionContext,
}

impl<'a, S: Read + Write> ContextDb<'a, S> {
    pub fn new(proxy: &'a mut Proxy<S>, ctx: &'a mut ExecutionContext) -> Self {
        Self { proxy, ctx }
    }

    pub fn proxy(&mut self) -> &mut Proxy<S> {
        &mut *self.proxy
    }

    pub fn context(&self) -> &ExecutionContext {
        &*self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut *self.ctx
    }

    /// Price acknowledgements resolved by the last proxy operation.
    pub fn settle(&mut self) -> ScoreResult<()> {
        let context_type = self.ctx.context_type;
        settle_acks(&mut *self.proxy, &mut self.ctx.step, context_type)
    }

    /// Drain and price every outstanding acknowledgement.
    pub fn flush(&mut self) -> ScoreResult<bool> {
        let context_type = self.ctx.context_type;
        flush_acks(&mut *self.proxy, &mut self.ctx.step, context_type)
    }

    /// Charge `unit * count` (plus base) with the ack drain as refund handler.
    pub fn charge(&mut self, kind: StepKind, count: usize) -> ScoreResult<BigInt> {
        let context_type = self.ctx.context_type;
        let proxy = &mut *self.proxy;
        let mut refund = |counter: &mut StepCounter| flush_acks(proxy, counter, context_type);
        self.ctx.step.apply_step(kind, count, &mut refund)
    }

    /// Charge a precomputed amount with the ack drain as refund handler.
    pub fn consume(&mut self, kind: StepKind, cost: BigInt) -> ScoreResult<BigInt> {
        let context_type = self.ctx.context_type;
        let proxy = &mut *self.proxy;
        let mut refund = |counter: &mut StepCounter| flush_acks(proxy, counter, context_type);
        self.ctx.step.consume_step(kind, cost, &mut refund)
    }

    fn check_writable(&self, what: &str) -> ScoreResult<()> {
        if self.ctx.is_readonly() {
            return Err(ScoreError::access_denied(format!("No permission to {what}")));
        }
        Ok(())
    }

    /// Exact pricing once the optimistic SET charge ran out of step.
    fn fallback_put(&mut self, key: &[u8], value: &[u8], limit: &BigInt, attempted: &BigInt, requested: &BigInt) -> ScoreResult<()> {
        let restore = attempted - requested - limit;
        self.ctx.step.add_step(restore);
        let old = self.proxy.get_value(key)?;
        self.settle()?;
        debug!(size = value.len(), had_old = old.is_some(), "set fallback pricing");
        match (&old, self.ctx.step.schema()) {
            (Some(old), StepCosts::SCHEMA_BASED) => {
                self.ctx.step.refund_step(old.len())?;
                self.charge(StepKind::Set, value.len())?;
            }
            (Some(_), _) => {
                self.charge(StepKind::Replace, value.len())?;
            }
            (None, _) => {
                self.charge(StepKind::Set, value.len())?;
            }
        }
        self.proxy.set_value(key, Some(value), false)?;
        self.settle()
    }
}

impl<'a, S: Read + Write> KvBackend for ContextDb<'a, S> {
    fn get(&mut self, key: &[u8]) -> ScoreResult<Option<Vec<u8>>> {
        let value = self.proxy.get_value(key)?;
        self.settle()?;
        let count = value.as_ref().map_or(1, |v| v.len().max(1));
        self.charge(StepKind::Get, count)?;
        trace!(found = value.is_some(), "get");
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> ScoreResult<()> {
        self.check_writable("write")?;
        if value.is_empty() {
            return self.delete(key);
        }
        // Only a failed SET charge falls back to exact pricing; faults from
        // settling earlier acknowledgements propagate with the counter pinned.
        match self.charge(StepKind::Set, value.len()) {
            Ok(_) => {}
            Err(ScoreError::OutOfStep {
                limit,
                attempted,
                requested,
                kind: StepKind::Set,
            }) => return self.fallback_put(key, value, &limit, &attempted, &requested),
            Err(e) => return Err(e),
        }
        self.proxy.set_value(key, Some(value), true)?;
        self.settle()
    }

    fn delete(&mut self, key: &[u8]) -> ScoreResult<()> {
        self.check_writable("delete")?;
        let existing = self.proxy.get_value(key)?;
        self.settle()?;
        if existing.is_none() {
            trace!("delete of a missing key");
            return Ok(());
        }
        self.proxy.set_value(key, None, true)?;
        self.settle()
    }

    fn contains(&mut self, prefix: &[u8], value: &[u8], limit: u64) -> ScoreResult<Option<bool>> {
        let (found, count, size) = self.proxy.contains(prefix, value, limit)?;
        self.settle()?;
        let context_type = self.ctx.context_type;
        let proxy = &mut *self.proxy;
        let mut refund = |counter: &mut StepCounter| flush_acks(proxy, counter, context_type);
        self.ctx
            .step
            .apply_multi_step(StepKind::Get, count, size, &mut refund)?;
        Ok(Some(found))
    }
}
