//! Step metering.
//!
//! Every metered operation is priced from the host's cost table and charged
//! against a per-invoke limit. Two cost schemas coexist; the table's
//! `schema` entry selects one at construction time.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::collections::BTreeMap;
use stepforge_types::{ScoreError, ScoreResult, StepKind, Value};
use tracing::trace;

/// Called when a charge would exceed the limit. Returns whether it freed
/// capacity, in which case the charge is checked once more.
pub trait RefundHandler {
    fn refund(&mut self, counter: &mut StepCounter) -> ScoreResult<bool>;
}

impl<F> RefundHandler for F
where
    F: FnMut(&mut StepCounter) -> ScoreResult<bool>,
{
    fn refund(&mut self, counter: &mut StepCounter) -> ScoreResult<bool> {
        self(counter)
    }
}

/// Refund handler that never frees anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRefund;

impl RefundHandler for NoRefund {
    fn refund(&mut self, _counter: &mut StepCounter) -> ScoreResult<bool> {
        Ok(false)
    }
}

/// Step cost table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepCosts {
    costs: BTreeMap<StepKind, BigInt>,
    schema: u32,
}

impl StepCosts {
    pub const SCHEMA_LEGACY: u32 = 0;
    pub const SCHEMA_BASED: u32 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: StepKind, cost: impl Into<BigInt>) -> Self {
        self.costs.insert(kind, cost.into());
        self
    }

    pub fn with_schema(mut self, schema: u32) -> Self {
        self.schema = schema;
        self
    }

    /// Build from the host's cost dictionary. Unknown keys are ignored;
    /// a missing `schema` entry selects the legacy schema.
    pub fn from_value(value: &Value) -> ScoreResult<Self> {
        let mut costs = Self::new();
        let Some(table) = value.as_dict() else {
            return match value {
                Value::Nil => Ok(costs),
                other => Err(ScoreError::invalid_param(format!(
                    "step costs must be a dict, got {}",
                    other.type_name()
                ))),
            };
        };
        for (name, cost) in table {
            let Some(cost) = cost.as_int() else {
                return Err(ScoreError::invalid_param(format!("step cost {name} is not an integer")));
            };
            if name == StepKind::SCHEMA_KEY {
                costs.schema = u32::try_from(cost)
                    .map_err(|_| ScoreError::invalid_param(format!("invalid schema {cost}")))?;
            } else if let Some(kind) = StepKind::from_name(name) {
                costs.costs.insert(kind, cost.clone());
            }
        }
        if costs.schema > Self::SCHEMA_BASED {
            return Err(ScoreError::invalid_param(format!("unknown step schema {}", costs.schema)));
        }
        Ok(costs)
    }

    pub fn schema(&self) -> u32 {
        self.schema
    }

    pub fn get(&self, kind: StepKind) -> BigInt {
        self.costs.get(&kind).cloned().unwrap_or_default()
    }
}

/// Counts steps used by one invoke.
#[derive(Debug, Clone)]
pub struct StepCounter {
    costs: StepCosts,
    limit: BigInt,
    used: BigInt,
}

impl StepCounter {
    pub fn new(costs: StepCosts, limit: BigInt) -> Self {
        Self {
            costs,
            limit,
            used: BigInt::zero(),
        }
    }

    pub fn limit(&self) -> &BigInt {
        &self.limit
    }

    pub fn used(&self) -> &BigInt {
        &self.used
    }

    pub fn remained(&self) -> BigInt {
        &self.limit - &self.used
    }

    pub fn schema(&self) -> u32 {
        self.costs.schema()
    }

    pub fn cost(&self, kind: StepKind) -> BigInt {
        self.costs.get(kind)
    }

    /// Fixed part of an operation's price. Zero under the legacy schema.
    pub fn base_cost(&self, kind: StepKind) -> BigInt {
        if self.costs.schema() != StepCosts::SCHEMA_BASED {
            return BigInt::zero();
        }
        match kind {
            StepKind::Get => self.costs.get(StepKind::GetBase),
            StepKind::Set => self.costs.get(StepKind::SetBase),
            StepKind::Delete => self.costs.get(StepKind::DeleteBase),
            StepKind::EventLog => self.costs.get(StepKind::LogBase),
            _ => BigInt::zero(),
        }
    }

    /// Price per unit (usually per byte) of an operation.
    pub fn unit_cost(&self, kind: StepKind) -> BigInt {
        match (self.costs.schema(), kind) {
            (StepCosts::SCHEMA_BASED, StepKind::EventLog) => self.costs.get(StepKind::Log),
            _ => self.costs.get(kind),
        }
    }

    /// Charge `base + unit * count` for `kind`.
    pub fn apply_step(
        &mut self,
        kind: StepKind,
        count: usize,
        handler: &mut dyn RefundHandler,
    ) -> ScoreResult<BigInt> {
        let cost = self.base_cost(kind) + self.unit_cost(kind) * BigInt::from(count);
        if cost.is_zero() {
            return Ok(self.used.clone());
        }
        self.consume_step(kind, cost, handler)
    }

    /// Charge `base * count + unit * size`, pricing `count` operations that
    /// touched `size` units in total.
    pub fn apply_multi_step(
        &mut self,
        kind: StepKind,
        count: u64,
        size: u64,
        handler: &mut dyn RefundHandler,
    ) -> ScoreResult<BigInt> {
        let cost = self.base_cost(kind) * BigInt::from(count) + self.unit_cost(kind) * BigInt::from(size);
        if cost.is_zero() {
            return Ok(self.used.clone());
        }
        self.consume_step(kind, cost, handler)
    }

    /// Charge a precomputed `cost`. On overflow the refund handler gets one
    /// chance to free capacity; if the charge still does not fit, the counter
    /// is pinned at the limit and `OutOfStep` is raised.
    pub fn consume_step(
        &mut self,
        kind: StepKind,
        cost: BigInt,
        handler: &mut dyn RefundHandler,
    ) -> ScoreResult<BigInt> {
        if &self.used + &cost > self.limit {
            let freed = handler.refund(self)?;
            if !freed || &self.used + &cost > self.limit {
                let attempted = &self.used + &cost;
                trace!(%kind, %cost, used = %self.used, limit = %self.limit, "out of step");
                self.used = self.limit.clone();
                return Err(ScoreError::OutOfStep {
                    limit: self.limit.clone(),
                    attempted,
                    requested: cost,
                    kind,
                });
            }
        }
        self.used += cost;
        Ok(self.used.clone())
    }

    /// Credit back storage reclaimed by an overwrite or delete. Schema 1
    /// tables can make the adjustment positive, in which case it is charged
    /// like any other operation and must fit the limit.
    pub fn refund_step(&mut self, count: usize) -> ScoreResult<BigInt> {
        let amount = self.refund_amount(count);
        if amount.is_positive() {
            return self.consume_step(StepKind::Replace, amount, &mut NoRefund);
        }
        Ok(self.add_step(amount))
    }

    fn refund_amount(&self, count: usize) -> BigInt {
        let count = BigInt::from(count);
        if self.costs.schema() == StepCosts::SCHEMA_BASED {
            let set_base = self.costs.get(StepKind::SetBase);
            let delete_base = self.costs.get(StepKind::DeleteBase);
            floor_half(&(&set_base + delete_base)) - set_base + self.costs.get(StepKind::Delete) * count
        } else {
            (self.costs.get(StepKind::Replace) - self.costs.get(StepKind::Set)) * count
        }
    }

    /// Unconditional increment.
    pub fn add_step(&mut self, amount: BigInt) -> BigInt {
        self.used += amount;
        self.used.clone()
    }
}

fn floor_half(v: &BigInt) -> BigInt {
    let two = BigInt::from(2);
    let q = v / &two;
    if v.is_negative() && !(v % &two).is_zero() {
        q - 1
    } else {
        q
    }
}
