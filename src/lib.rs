//! Tollgate is an embeddable per-key token-bucket rate limiter.
//!
//! For each key (a client IP, tenant id, API token) the limiter enforces a
//! steady admission rate with a configurable burst, backed by a bounded LRU
//! cache of per-key buckets. Two modes of interaction:
//!
//! - [`TokenBucketLimiter::allow`]: non-blocking admission check
//! - [`TokenBucketLimiter::wait`]: blocking admission honoring cancellation
//!
//! Time is injected through the [`Clock`] trait, so tests can drive virtual
//! time deterministically with [`TestClock`].
//!
//! # Quick start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tollgate::{CancelToken, LimiterOptions, TokenBucketLimiter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let limiter = TokenBucketLimiter::new(LimiterOptions {
//!         tokens_per_second: 5,
//!         bucket_capacity: 10,
//!         ..LimiterOptions::default()
//!     })
//!     .unwrap();
//!
//!     let key = "203.0.113.7";
//!     if limiter.allow(key).await {
//!         // proceed
//!     }
//!
//!     // Block until a token is available or the deadline passes.
//!     let ctx = CancelToken::new();
//!     ctx.cancel_after(Duration::from_millis(100));
//!     match limiter.wait(&ctx, key).await {
//!         Ok(()) => { /* proceed */ }
//!         Err(denied) => {
//!             let _reason = denied.reason();
//!             // back off
//!         }
//!     }
//! }
//! ```

mod bucket;
pub use bucket::*;

mod cache;
pub use cache::*;

mod cancel;
pub use cancel::*;

mod clock;
pub use clock::*;

mod error;
pub use error::*;

mod observe;
pub use observe::*;

mod token_bucket_limiter;
pub use token_bucket_limiter::*;

#[cfg(test)]
mod tests;
