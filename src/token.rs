//! Staleness tokens.
//!
//! Every outbound request carries a [`RequestToken`]. When its response
//! arrives, the token is compared against the issuing [`TokenCounter`]; only
//! the most recently issued token is current, so older responses are dropped
//! without touching any state.

use std::fmt;

/// Identifies one outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Issues monotonically increasing tokens.
#[derive(Debug, Default)]
pub struct TokenCounter {
    counter: u64,
    retired: bool,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next token; it becomes the only current one.
    pub fn issue(&mut self) -> RequestToken {
        self.counter += 1;
        RequestToken(self.counter)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        !self.retired && token.0 == self.counter
    }

    /// Make every issued token stale without issuing a new one.
    pub fn invalidate(&mut self) {
        self.counter += 1;
    }

    /// Permanently stop any token from being current.
    pub fn retire(&mut self) {
        self.retired = true;
        self.counter += 1;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}
