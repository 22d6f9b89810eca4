//! Timeout configuration for external calls.

use std::future::Future;
use std::time::Duration;

use crate::Dependency;

/// Timeout configuration for an external call.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Total operation timeout.
    pub total: Duration,
}

impl TimeoutConfig {
    /// Create from a single total timeout.
    pub fn from_total(total: Duration) -> Self {
        Self { total }
    }

    /// Create from a dependency's default.
    pub fn for_dependency(dependency: Dependency) -> Self {
        Self::from_total(dependency.default_timeout())
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total: Duration::from_millis(500),
        }
    }
}

/// Error when an external call does not finish in time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeoutError {
    #[error("{dependency} unavailable: no response within {elapsed:?}")]
    Unavailable {
        dependency: Dependency,
        elapsed: Duration,
    },
}

impl TimeoutError {
    /// The dependency that timed out.
    pub fn dependency(&self) -> Dependency {
        match self {
            Self::Unavailable { dependency, .. } => *dependency,
        }
    }
}

/// Await `call`, giving up after `config.total`.
///
/// The inner future is dropped on expiry, so calls must be cancel-safe.
pub async fn with_timeout<F, T>(
    dependency: Dependency,
    config: &TimeoutConfig,
    call: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(config.total, call).await {
        Ok(value) => Ok(value),
        Err(_) => {
            tracing::warn!(
                dependency = %dependency,
                timeout_ms = config.total.as_millis() as u64,
                "external call timed out"
            );
            Err(TimeoutError::Unavailable {
                dependency,
                elapsed: config.total,
            })
        }
    }
}
