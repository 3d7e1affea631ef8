//! Contract seams: what a loaded contract looks like, what it can ask of the
//! engine, and how code references resolve to contracts.

use crate::context::{BlockInfo, TxInfo};
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use stepforge_ipc::{ApiInfo, ApiKind, LogLevel};
use stepforge_storage::{KvBackend, ScoreDatabase};
use stepforge_types::{Address, Revision, ScoreError, ScoreResult, Value};

/// A loaded contract.
///
/// `api` is the static registration table the engine dispatches against:
/// it decides which methods exist and whether they are external, payable or
/// read-only. `invoke` receives arguments already converted to the declared
/// parameter types, in declaration order.
pub trait Score {
    fn api(&self) -> &ApiInfo;

    fn invoke(&self, host: &mut dyn ScoreHost, method: &str, args: Vec<Value>) -> ScoreResult<Value>;

    /// Runs once when the contract is first loaded, bound to the
    /// introspection sentinel and a store that rejects every access.
    fn on_load(&self, db: &ScoreDatabase, store: &mut dyn KvBackend) -> ScoreResult<()> {
        let _ = (db, store);
        Ok(())
    }
}

/// Engine services available to a running contract.
pub trait ScoreHost {
    /// Address of the running contract.
    fn address(&self) -> &Address;

    fn sender(&self) -> Option<&Address>;

    fn value(&self) -> &BigInt;

    fn owner(&self) -> Option<&Address>;

    fn block(&self) -> &BlockInfo;

    fn tx(&self) -> Option<&TxInfo>;

    fn revision(&self) -> Revision;

    fn is_readonly(&self) -> bool;

    fn step_used(&self) -> BigInt;

    fn step_limit(&self) -> BigInt;

    /// Root key namespace of the running contract.
    fn db(&self) -> ScoreDatabase;

    /// Charged backend the containers read and write through.
    fn store(&mut self) -> &mut dyn KvBackend;

    /// Call another contract. Named arguments go in a dict, positional ones
    /// in a list.
    fn call(&mut self, to: &Address, method: &str, params: Value, amount: &BigInt) -> ScoreResult<Value>;

    fn emit_event(&mut self, indexed: Vec<Value>, data: Vec<Value>) -> ScoreResult<()>;

    fn get_balance(&mut self, address: &Address) -> ScoreResult<BigInt>;

    /// Snapshot of the host's block, transaction and step-cost info.
    fn get_info(&mut self) -> ScoreResult<Value>;

    fn sha3_256(&mut self, data: &[u8]) -> ScoreResult<Vec<u8>>;

    fn set_fee_proportion(&mut self, pct: u32) -> ScoreResult<()>;

    fn log(&mut self, level: LogLevel, msg: &str) -> ScoreResult<()>;
}

/// Resolves a code reference to a contract.
pub trait ScoreLoader {
    fn load(&mut self, code: &str) -> ScoreResult<Rc<dyn Score>>;
}

type Factory = Box<dyn Fn() -> Rc<dyn Score>>;

/// Static table of contracts known at build time, keyed by name.
///
/// A code reference resolves by exact name first, then by its final path
/// component, so `/data/scores/cx01/token` finds a score registered as
/// `token`.
#[derive(Default)]
pub struct ScoreRegistry {
    factories: HashMap<String, Factory>,
}

impl ScoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Rc<dyn Score> + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn resolve(&self, code: &str) -> Option<&Factory> {
        self.factories.get(code).or_else(|| {
            let name = code.trim_end_matches('/').rsplit('/').next()?;
            self.factories.get(name)
        })
    }
}

impl ScoreLoader for ScoreRegistry {
    fn load(&mut self, code: &str) -> ScoreResult<Rc<dyn Score>> {
        match self.resolve(code) {
            Some(factory) => Ok(factory()),
            None => Err(ScoreError::ContractNotFound(code.to_string())),
        }
    }
}

impl fmt::Debug for ScoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoreRegistry").field("scores", &self.names()).finish()
    }
}

/// Structural checks applied to a freshly loaded contract's API.
pub fn validate_api(api: &ApiInfo) -> ScoreResult<()> {
    let has_external = api
        .methods()
        .iter()
        .any(|m| m.kind == ApiKind::Function && m.is_external());
    if !has_external {
        return Err(ScoreError::IllegalFormat(
            "There is no external method in the SCORE".into(),
        ));
    }
    for m in api.methods() {
        if m.kind == ApiKind::Function && m.is_readonly() && m.is_payable() {
            return Err(ScoreError::IllegalFormat(format!(
                "{}: read-only method cannot be payable",
                m.name
            )));
        }
    }
    Ok(())
}
