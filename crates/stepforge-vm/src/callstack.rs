//! Call depth tracking for nested invokes.
//!
//! Re-entrant calls are legal; only the nesting depth is bounded.

use crate::MAX_CALL_DEPTH;
use stepforge_types::{Address, ScoreError, ScoreResult};

/// Tracks the chain of contracts currently executing on one connection.
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

/// A single frame in the call stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Contract being executed
    pub address: Address,
    /// Sender of the invoke, if any
    pub caller: Option<Address>,
    /// Depth (0 for top-level)
    pub depth: usize,
}

impl CallStack {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_CALL_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Push a frame.
    ///
    /// # Errors
    /// `StackOverflow` once `max_depth` frames are active.
    pub fn enter(&mut self, address: &Address, caller: Option<&Address>) -> ScoreResult<usize> {
        let depth = self.frames.len();
        if depth >= self.max_depth {
            return Err(ScoreError::StackOverflow(format!(
                "call depth {depth} reached calling {address}"
            )));
        }
        self.frames.push(CallFrame {
            address: address.clone(),
            caller: caller.cloned(),
            depth,
        });
        Ok(depth)
    }

    pub fn exit(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        let mut body = [0u8; 20];
        body[19] = n;
        Address::from_body(stepforge_types::AddressPrefix::Contract, body)
    }

    #[test]
    fn test_enter_exit() {
        let mut stack = CallStack::new();
        let user: Address = "hx0000000000000000000000000000000000000009".parse().unwrap();
        assert_eq!(stack.enter(&addr(1), Some(&user)).unwrap(), 0);
        assert_eq!(stack.enter(&addr(2), Some(&addr(1))).unwrap(), 1);
        assert_eq!(stack.depth(), 2);

        let frame = stack.exit().unwrap();
        assert_eq!(frame.address, addr(2));
        assert_eq!(frame.caller, Some(addr(1)));
        assert_eq!(frame.depth, 1);
        let frame = stack.exit().unwrap();
        assert_eq!(frame.caller, Some(user));
        assert!(stack.is_empty());
        assert!(stack.exit().is_none());
    }

    #[test]
    fn test_reentry_allowed() {
        let mut stack = CallStack::new();
        stack.enter(&addr(1), None).unwrap();
        stack.enter(&addr(2), Some(&addr(1))).unwrap();
        assert!(stack.enter(&addr(1), Some(&addr(2))).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let mut stack = CallStack::with_max_depth(3);
        for _ in 0..3 {
            stack.enter(&addr(1), None).unwrap();
        }
        let err = stack.enter(&addr(1), None).unwrap_err();
        assert_eq!(err.status(), 13);
        assert_eq!(stack.depth(), 3);
    }
}
