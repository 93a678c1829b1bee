//! Calculation pass tokens
//!
//! A pass mints one token and hands it to every parameter it refreshes. A
//! parameter that already recorded the same token skips its formula, which
//! keeps evaluation to at most once per pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifier shared by all evaluations within one calculation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PassToken(u64);

impl PassToken {
    /// The empty token. Always forces re-evaluation.
    pub const NONE: PassToken = PassToken(0);

    /// Mint a token that no earlier pass in this process has used
    pub fn mint() -> Self {
        PassToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        PassToken(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PassToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass#{}", self.0)
    }
}
