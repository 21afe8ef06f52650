//! Call correlation
//!
//! Every call entry gets a fresh identifier that stays on the stack until the
//! matching return, so all events of one invocation share it.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("Return event with no matching call on this thread")]
    Unbalanced,
}

/// Stack of call identifiers for one traced thread
#[derive(Debug, Default)]
pub struct CallCorrelator {
    stack: Vec<String>,
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a call and return its new identifier.
    pub fn push(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.stack.push(id.clone());
        id
    }

    /// Leave the innermost call.
    pub fn pop(&mut self) -> Result<String, CorrelationError> {
        self.stack.pop().ok_or(CorrelationError::Unbalanced)
    }

    /// Identifier of the call currently executing, if any.
    pub fn top(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
