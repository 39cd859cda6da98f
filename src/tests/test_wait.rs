use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{
    CancelToken, InMemoryCache, LimiterOptions, ObserveHooks, TestClock, Timestamp,
    TokenBucketLimiter,
};

const T0: Timestamp = 946_684_800_000_000_000; // 2000-01-01T00:00:00Z

type TestLimiter = TokenBucketLimiter<TestClock>;

fn fixture(tokens_per_second: u64, bucket_capacity: u64) -> (TestLimiter, TestClock) {
    fixture_with_hooks(tokens_per_second, bucket_capacity, ObserveHooks::default())
}

fn fixture_with_hooks(
    tokens_per_second: u64,
    bucket_capacity: u64,
    hooks: ObserveHooks,
) -> (TestLimiter, TestClock) {
    let clock = TestClock::new(T0);
    let options = LimiterOptions {
        tokens_per_second,
        bucket_capacity,
        ..LimiterOptions::default()
    };
    let cache = InMemoryCache::new(options.cache_capacity).unwrap();
    let limiter = TokenBucketLimiter::with_parts(options, clock.clone(), cache, hooks).unwrap();
    (limiter, clock)
}

#[tokio::test]
async fn wait_takes_an_available_token_immediately() {
    let (limiter, _clock) = fixture(1, 1);
    let ctx = CancelToken::new();

    limiter.wait(&ctx, "k").await.unwrap();
    // The fast path consumed the only token.
    assert!(!limiter.allow("k").await);
}

#[tokio::test]
async fn fast_path_never_observes_cancellation() {
    let (limiter, _clock) = fixture(1, 1);
    let ctx = CancelToken::new();
    ctx.cancel("context canceled");

    assert!(limiter.wait(&ctx, "k").await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_blocks_until_a_refill_arrives() {
    let (limiter, clock) = fixture(2, 1);
    assert!(limiter.allow("k").await);

    let limiter = Arc::new(limiter);
    let waiter = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move {
            let ctx = CancelToken::new();
            limiter.wait(&ctx, "k").await
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished(), "wait should still be blocked");

    // Half a second of virtual time is one refill at 2 tokens/s.
    clock.forward(Duration::from_millis(500));
    tokio::time::timeout(Duration::from_millis(50), waiter)
        .await
        .expect("wait should return once the token refills")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn wait_honors_a_deadline() {
    let (limiter, _clock) = fixture(1, 1);
    assert!(limiter.allow("k").await);

    let ctx = CancelToken::new();
    ctx.cancel_after(Duration::from_millis(5));

    let Err(denied) = limiter.wait(&ctx, "k").await else {
        panic!("wait should be denied once the deadline fires");
    };
    assert_eq!(denied.reason(), CancelToken::DEADLINE_EXCEEDED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_waiters_drain_sequential_refills() {
    let (limiter, clock) = fixture(1, 1);
    let limiter = Arc::new(limiter);

    let first = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move {
            let ctx = CancelToken::new();
            limiter.wait(&ctx, "k").await
        }
    });
    let second = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move {
            let ctx = CancelToken::new();
            limiter.wait(&ctx, "k").await
        }
    });

    // One waiter takes the initial token; the other parks on the clock.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let finished = usize::from(first.is_finished()) + usize::from(second.is_finished());
    assert_eq!(finished, 1, "exactly one waiter should have been admitted");

    clock.forward(Duration::from_secs(1));
    tokio::time::timeout(Duration::from_millis(200), async {
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    })
    .await
    .expect("both waiters should finish after the refill");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_refill_admits_exactly_one_waiter() {
    let (limiter, clock) = fixture(1, 1);
    let limiter = Arc::new(limiter);
    assert!(limiter.allow("k").await);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            tokio::spawn({
                let limiter = Arc::clone(&limiter);
                async move {
                    let ctx = CancelToken::new();
                    limiter.wait(&ctx, "k").await
                }
            })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    for expected in 1..=3 {
        clock.forward(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let finished = waiters.iter().filter(|handle| handle.is_finished()).count();
        assert_eq!(finished, expected);
    }

    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn cancellation_leaves_the_bucket_untouched() {
    let (limiter, clock) = fixture(1, 1);
    assert!(limiter.allow("k").await);

    let ctx = CancelToken::new();
    ctx.cancel_after(Duration::from_millis(5));
    assert!(limiter.wait(&ctx, "k").await.is_err());

    // The refill that arrives later is intact: exactly one token.
    clock.forward(Duration::from_secs(1));
    assert!(limiter.allow("k").await);
    assert!(!limiter.allow("k").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiter_on_one_key_does_not_block_another_key() {
    let (limiter, clock) = fixture(1, 1);
    assert!(limiter.allow("A").await);

    let limiter = Arc::new(limiter);
    let waiter = tokio::spawn({
        let limiter = Arc::clone(&limiter);
        async move {
            let ctx = CancelToken::new();
            limiter.wait(&ctx, "A").await
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(limiter.allow("B").await);

    clock.forward(Duration::from_secs(1));
    tokio::time::timeout(Duration::from_millis(100), waiter)
        .await
        .expect("waiter on A should finish after the refill")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn deny_hook_reports_the_cancellation_reason() {
    let denies = Arc::new(AtomicUsize::new(0));
    let last_reason = Arc::new(parking_lot::Mutex::new(String::new()));

    let hooks = ObserveHooks::new(|_, _| {}, {
        let denies = Arc::clone(&denies);
        let last_reason = Arc::clone(&last_reason);
        move |_key, error| {
            denies.fetch_add(1, Ordering::SeqCst);
            *last_reason.lock() = error.reason().to_owned();
        }
    });

    let (limiter, _clock) = fixture_with_hooks(1, 1, hooks);
    assert!(limiter.allow("k").await);

    let ctx = CancelToken::new();
    ctx.cancel("shutting down");
    assert!(limiter.wait(&ctx, "k").await.is_err());

    assert_eq!(denies.load(Ordering::SeqCst), 1);
    assert_eq!(*last_reason.lock(), "shutting down");
}
