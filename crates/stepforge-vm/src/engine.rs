//! Dispatch of INVOKE and GETAPI requests to loaded contracts.
//!
//! One engine serves one connection. Nested INVOKEs arriving while a contract
//! waits on a CALL re-enter the same engine through the proxy, so the call
//! stack and the contract cache are shared across the whole chain.

use crate::callstack::CallStack;
use crate::context::ExecutionContext;
use crate::context_db::flush_acks;
use crate::convert::convert_params;
use crate::host::Host;
use crate::score::{validate_api, Score, ScoreLoader};
use num_bigint::BigInt;
use num_traits::Zero;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;
use stepforge_crypto::{code_hash, Hash};
use stepforge_ipc::{ApiInfo, ApiKind, Codec, InvokeHandler, InvokeRequest, InvokeResponse, Proxy};
use stepforge_storage::{DummyBackend, ScoreDatabase};
use stepforge_types::{Address, ScoreError, ScoreResult, Status, Value};
use tracing::{debug, warn};

/// Contract dispatcher driven by the [`Proxy`].
pub struct ServiceEngine<L> {
    loader: L,
    cache: HashMap<Hash, Rc<dyn Score>>,
    callstack: CallStack,
    verify_package: bool,
}

impl<L: ScoreLoader> ServiceEngine<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
            callstack: CallStack::new(),
            verify_package: false,
        }
    }

    /// Bound the nesting depth of re-entrant invokes.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.callstack = CallStack::with_max_depth(max_depth);
        self
    }

    /// Check each contract's API when it is first loaded.
    pub fn with_verify_package(mut self, verify: bool) -> Self {
        self.verify_package = verify;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Number of contracts loaded so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn depth(&self) -> usize {
        self.callstack.depth()
    }

    fn resolve(&mut self, code: &str) -> ScoreResult<Rc<dyn Score>> {
        let key = code_hash(code);
        if let Some(score) = self.cache.get(&key) {
            return Ok(Rc::clone(score));
        }
        let score = self.loader.load(code)?;
        let sentinel = ScoreDatabase::new(&Address::api_sentinel());
        score.on_load(&sentinel, &mut DummyBackend)?;
        if self.verify_package {
            validate_api(score.api())?;
        }
        debug!(%code, "contract loaded");
        self.cache.insert(key, Rc::clone(&score));
        Ok(score)
    }

    fn execute<S: Read + Write>(
        &mut self,
        proxy: &mut Proxy<S>,
        ctx: &mut ExecutionContext,
        params: &Value,
    ) -> ScoreResult<Value> {
        self.callstack.enter(&ctx.address, ctx.sender.as_ref())?;
        let result = self.dispatch(proxy, ctx, params);
        self.callstack.exit();
        result
    }

    fn dispatch<S: Read + Write>(
        &mut self,
        proxy: &mut Proxy<S>,
        ctx: &mut ExecutionContext,
        params: &Value,
    ) -> ScoreResult<Value> {
        let score = self.resolve(&ctx.code)?;
        let name = if ctx.method.is_empty() {
            ApiInfo::FALLBACK
        } else {
            ctx.method.as_str()
        };
        let method = score
            .api()
            .method(name)
            .filter(|m| m.kind == ApiKind::Fallback || m.is_external())
            .cloned()
            .ok_or_else(|| ScoreError::MethodNotFound(format!("{} at {}", name, ctx.address)))?;

        if ctx.value > BigInt::zero() && !method.is_payable() {
            return Err(ScoreError::NotPayable(format!("{} is not payable", method.name)));
        }
        if method.is_readonly() {
            ctx.func_readonly = true;
        }
        let args = convert_params(&method, params, ctx.revision)?;

        let mut host = Host::new(proxy, ctx, self);
        score.invoke(&mut host, &method.name, args)
    }

    /// Settle deferred acknowledgements and report fee sharing, whatever the
    /// outcome of the invoke itself.
    fn finish<S: Read + Write>(
        proxy: &mut Proxy<S>,
        ctx: &mut ExecutionContext,
        outcome: ScoreResult<Value>,
    ) -> ScoreResult<Value> {
        let flushed = flush_acks(proxy, &mut ctx.step, ctx.context_type);
        let outcome = match (outcome, flushed) {
            (_, Err(e)) if e.is_fatal() => return Err(e),
            (Ok(_), Err(e)) => Err(e),
            (outcome, _) => outcome,
        };

        if ctx.fee_proportion != 0 && !ctx.is_readonly() {
            if let Err(e) = proxy.set_fee_proportion(ctx.fee_proportion) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(error = %e, "fee proportion not reported");
            }
        }
        outcome
    }
}

impl<S: Read + Write, L: ScoreLoader> InvokeHandler<S> for ServiceEngine<L> {
    fn invoke(&mut self, proxy: &mut Proxy<S>, req: InvokeRequest) -> ScoreResult<InvokeResponse> {
        let mut ctx = ExecutionContext::from_request(&req)?;
        proxy.set_codec(Codec::for_revision(ctx.revision));

        let outcome = self.execute(proxy, &mut ctx, &req.params);
        let outcome = Self::finish(proxy, &mut ctx, outcome);

        let step_used = ctx.step.used().clone();
        match outcome {
            Ok(result) => {
                debug!(method = %ctx.method, %step_used, "invoke done");
                Ok(InvokeResponse {
                    status: Status::Success.code(),
                    step_used,
                    result,
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(method = %ctx.method, status = e.status(), error = %e, "invoke failed");
                Ok(InvokeResponse {
                    status: e.status(),
                    step_used,
                    result: Value::Str(e.message()),
                })
            }
        }
    }

    fn get_api(&mut self, _proxy: &mut Proxy<S>, code: &str) -> ScoreResult<ApiInfo> {
        let score = self.resolve(code)?;
        Ok(score.api().clone())
    }
}
