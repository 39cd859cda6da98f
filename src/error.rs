/// Construction-time configuration error.
///
/// Returned before any limiter state exists; fix the configuration and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("tokens per second must be greater than 0")]
    ZeroRate,
    /// Rates above one token per nanosecond would truncate the refill
    /// interval to zero.
    #[error("tokens per second must not exceed 1000000000")]
    RateTooHigh,
    #[error("bucket capacity must be greater than 0")]
    ZeroBucketCapacity,
    #[error("cache capacity must be greater than 0")]
    ZeroCacheCapacity,
}

/// A rejected admission.
///
/// Produced by [`wait`](crate::TokenBucketLimiter::wait) when the caller's
/// [`CancelToken`](crate::CancelToken) fires before a token becomes
/// available, and reported to the deny hook on every denial. The limiter
/// stays usable after it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("admission denied: {reason}")]
pub struct DeniedError {
    reason: String,
}

impl DeniedError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Why the admission was denied.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
