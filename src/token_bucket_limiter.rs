use std::sync::Arc;
use std::time::Duration;

use crate::clock::NANOS_PER_SEC;
use crate::{
    Bucket, Cache, CancelToken, Clock, ConfigError, DeniedError, InMemoryCache, KeyLock,
    ObserveHooks, SystemClock,
};

/// Limiter configuration; validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterOptions {
    /// Steady admission rate per key, in `1..=1_000_000_000`.
    pub tokens_per_second: u64,
    /// Maximum burst per key. Must be greater than 0.
    pub bucket_capacity: u64,
    /// Capacity of the default in-memory cache. Ignored when a cache is
    /// injected through [`TokenBucketLimiter::with_parts`].
    pub cache_capacity: usize,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            tokens_per_second: 10,
            bucket_capacity: 10,
            cache_capacity: 100,
        }
    }
}

impl LimiterOptions {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens_per_second == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.tokens_per_second > NANOS_PER_SEC {
            return Err(ConfigError::RateTooHigh);
        }
        if self.bucket_capacity == 0 {
            return Err(ConfigError::ZeroBucketCapacity);
        }
        Ok(())
    }

    fn refill_interval_nanos(&self) -> u64 {
        NANOS_PER_SEC / self.tokens_per_second
    }
}

/// Token-bucket rate limiter over a bounded cache of per-key buckets.
///
/// `C` is the clock and `S` the bucket cache; both default to the shipped
/// [`SystemClock`] and [`InMemoryCache`]. All methods are safe to call
/// concurrently: admissions on the same key serialize through that key's
/// lock, while disjoint keys contend only on the cache's momentary index
/// lock.
pub struct TokenBucketLimiter<C = SystemClock, S = InMemoryCache<String, Bucket>>
where
    C: Clock,
    S: Cache<String, Bucket>,
{
    bucket_capacity: u64,
    refill_interval_nanos: u64,
    cache: S,
    clock: C,
    hooks: ObserveHooks,
}

impl TokenBucketLimiter {
    /// Limiter with the system clock, an in-memory LRU cache, and no-op
    /// hooks.
    pub fn new(options: LimiterOptions) -> Result<Self, ConfigError> {
        let cache = InMemoryCache::new(options.cache_capacity)?;
        Self::with_parts(options, SystemClock, cache, ObserveHooks::default())
    }
}

impl<C, S> TokenBucketLimiter<C, S>
where
    C: Clock,
    S: Cache<String, Bucket>,
{
    /// Limiter over an injected clock, cache, and hooks.
    pub fn with_parts(
        options: LimiterOptions,
        clock: C,
        cache: S,
        hooks: ObserveHooks,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        tracing::debug!(
            tokens_per_second = options.tokens_per_second,
            bucket_capacity = options.bucket_capacity,
            "token bucket limiter configured"
        );
        Ok(Self {
            bucket_capacity: options.bucket_capacity,
            refill_interval_nanos: options.refill_interval_nanos(),
            cache,
            clock,
            hooks,
        })
    }

    /// Steady per-key admission rate.
    pub fn tokens_per_second(&self) -> u64 {
        NANOS_PER_SEC / self.refill_interval_nanos
    }

    /// Maximum per-key burst.
    pub fn bucket_capacity(&self) -> u64 {
        self.bucket_capacity
    }

    /// The bucket cache, for introspection.
    pub fn cache(&self) -> &S {
        &self.cache
    }

    /// Non-blocking admission check for `key`.
    ///
    /// Consumes one token and returns `true` when the key's bucket has one
    /// available; returns `false` otherwise. Never sleeps on time, though it
    /// may briefly yield on the key's lock.
    pub async fn allow(&self, key: &str) -> bool {
        let _guard = self.lock_record(key).await;

        let now = self.clock.now();
        let mut bucket = self
            .cache
            .get(key)
            .unwrap_or_else(|| Bucket::fresh(self.bucket_capacity, now));
        bucket.refill(self.bucket_capacity, self.refill_interval_nanos, now);

        let admitted = bucket.try_consume();
        self.cache.put(key.to_owned(), bucket);

        if admitted {
            tracing::trace!(key, tokens_left = bucket.tokens(), "admitted");
            self.hooks.allow(key, now);
        } else {
            tracing::trace!(key, "denied");
            let error = DeniedError::new("insufficient token");
            self.hooks.deny(key, &error);
        }

        admitted
    }

    /// Blocking admission for `key`.
    ///
    /// Resolves with `Ok(())` once a token has been consumed, sleeping on the
    /// clock between refill boundaries. Cancellation through `ctx` is honored
    /// at the sleeping points and resolves with a [`DeniedError`] carrying
    /// the cancellation reason; the bucket is left untouched on that path. A
    /// call that finds a token immediately never observes cancellation.
    pub async fn wait(&self, ctx: &CancelToken, key: &str) -> Result<(), DeniedError> {
        loop {
            let guard = self.lock_record(key).await;

            let now = self.clock.now();
            let mut bucket = self
                .cache
                .get(key)
                .unwrap_or_else(|| Bucket::fresh(self.bucket_capacity, now));
            bucket.refill(self.bucket_capacity, self.refill_interval_nanos, now);

            // Fast path: a token is available right now.
            if bucket.try_consume() {
                self.cache.put(key.to_owned(), bucket);
                tracing::trace!(key, tokens_left = bucket.tokens(), "admitted after wait");
                self.hooks.allow(key, now);
                return Ok(());
            }

            // Slow path: sleep until the next refill boundary. The refilled
            // state is not written back; the next locked reader recomputes
            // it from the same virtual-time origin.
            let elapsed = now.saturating_sub(bucket.last_refill_at());
            let time_to_wait =
                Duration::from_nanos(self.refill_interval_nanos.saturating_sub(elapsed));
            drop(guard);

            tracing::trace!(
                key,
                wait_nanos = time_to_wait.as_nanos() as u64,
                "bucket empty; sleeping until next refill"
            );
            let wakeup = self.clock.after(time_to_wait);
            tokio::select! {
                reason = ctx.cancelled() => {
                    let error = DeniedError::new(reason.as_ref());
                    self.hooks.deny(key, &error);
                    return Err(error);
                }
                _ = wakeup => {}
            }
        }
    }

    // Seed the record if needed and acquire its per-key lock. The handle is
    // revalidated after acquisition: when the record was evicted or replaced
    // while we slept on the lock, the stale guard is dropped and the loop
    // retries against the current record.
    async fn lock_record(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        loop {
            let lock: KeyLock = match self.cache.key_lock(key) {
                Some(lock) => lock,
                None => {
                    let fresh = Bucket::fresh(self.bucket_capacity, self.clock.now());
                    self.cache.get_or_store(key.to_owned(), fresh);
                    match self.cache.key_lock(key) {
                        Some(lock) => lock,
                        // Evicted already; seed again.
                        None => continue,
                    }
                }
            };

            let guard = Arc::clone(&lock).lock_owned().await;
            match self.cache.key_lock(key) {
                Some(current) if Arc::ptr_eq(&current, &lock) => return guard,
                _ => {} // record gone or replaced while we slept; retry
            }
        }
    }
}
