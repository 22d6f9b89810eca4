//! Tags for the collaborators a checkout calls out to.

use std::fmt;
use std::time::Duration;

/// Collaborators a checkout session depends on.
///
/// Each tag carries a default timeout and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Deal/promotion feed, fetched once per pricing pass.
    Deals,
    /// Inventory ledger row operations.
    Ledger,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deals => "deals",
            Self::Ledger => "ledger",
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Deals => Duration::from_millis(300),
            Self::Ledger => Duration::from_millis(1000),
        }
    }

    /// Retries after the first attempt.
    pub fn default_max_retries(&self) -> u32 {
        match self {
            // Version conflicts are expected under contention
            Self::Ledger => 3,
            Self::Deals => 1,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
