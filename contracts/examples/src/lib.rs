//! Stepforge Sample Scores
//!
//! Contracts the engine binary serves out of its static registry.

pub mod counter;
pub mod token;

#[cfg(test)]
mod testing;

pub use counter::Counter;
pub use token::{Token, TokenError};

use stepforge_vm::ScoreRegistry;

/// Contract version
pub const CONTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registry holding every sample contract under its code name.
pub fn registry() -> ScoreRegistry {
    let mut registry = ScoreRegistry::new();
    registry.register("token", Token::load).register("counter", Counter::load);
    registry
}
