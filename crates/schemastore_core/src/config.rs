//! Storage configuration.

/// How often an optimistic transaction body is re-run after a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry until the commit succeeds.
    #[default]
    Unbounded,
    /// Run at most `max_attempts` times in total.
    Bounded {
        /// Total attempts, the first one included.
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// At most `max_attempts` runs. Zero is treated as one.
    #[must_use]
    pub const fn bounded(max_attempts: u32) -> Self {
        Self::Bounded {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    /// A single attempt; a conflict is reported immediately.
    #[must_use]
    pub const fn none() -> Self {
        Self::bounded(1)
    }

    /// Returns `true` if another attempt may follow attempt number
    /// `attempt` (one based).
    #[must_use]
    pub const fn allows_retry(&self, attempt: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded { max_attempts } => attempt < *max_attempts,
        }
    }
}

/// Configuration for a [`Storage`](crate::Storage) facade.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Retry policy for transactions whose commit conflicts.
    pub retry: RetryPolicy,

    /// Whether typed operations register unknown schemas on first use.
    pub auto_register: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::Unbounded,
            auto_register: true,
        }
    }
}

impl StorageConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets whether schemas are registered automatically.
    #[must_use]
    pub const fn auto_register(mut self, value: bool) -> Self {
        self.auto_register = value;
        self
    }
}
