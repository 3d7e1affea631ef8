//! Stepforge VM - step-metered contract dispatch.
//!
//! This crate provides:
//! - Step counting with the legacy and base-cost pricing schemas
//! - Execution contexts built from INVOKE requests
//! - The charged contract store over the IPC proxy
//! - Parameter conversion against declared method APIs
//! - The [`ServiceEngine`] that answers INVOKE and GETAPI

pub mod callstack;
pub mod context;
pub mod context_db;
pub mod convert;
pub mod engine;
pub mod host;
pub mod score;
pub mod step;

pub use callstack::{CallFrame, CallStack};
pub use context::{BlockInfo, ContextType, ExecutionContext, TxInfo};
pub use context_db::ContextDb;
pub use convert::convert_params;
pub use engine::ServiceEngine;
pub use host::Host;
pub use score::{validate_api, Score, ScoreHost, ScoreLoader, ScoreRegistry};
pub use step::{NoRefund, RefundHandler, StepCosts, StepCounter};

/// Maximum nesting of re-entrant invokes on one connection
pub const MAX_CALL_DEPTH: usize = 64;
