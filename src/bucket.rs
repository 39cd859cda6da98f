use crate::Timestamp;

/// Per-key token-bucket state.
///
/// Mutated only while the owning cache record's per-key lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    last_refill_at: Timestamp,
    tokens: u64,
}

impl Bucket {
    /// Full bucket for a key seen for the first time at `now`.
    pub(crate) fn fresh(capacity: u64, now: Timestamp) -> Self {
        Self {
            last_refill_at: now,
            tokens: capacity,
        }
    }

    /// Tokens available as of the last refill.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Virtual time of the last refill.
    pub fn last_refill_at(&self) -> Timestamp {
        self.last_refill_at
    }

    /// Advance the bucket to `now`, crediting one token per whole refill
    /// interval elapsed.
    ///
    /// Anything short of a whole interval leaves the bucket untouched,
    /// `last_refill_at` included; the sub-interval residual carries into the
    /// next refill.
    pub(crate) fn refill(&mut self, capacity: u64, interval_nanos: u64, now: Timestamp) {
        let elapsed = now.saturating_sub(self.last_refill_at);
        let tokens_to_add = elapsed / interval_nanos;
        if elapsed > 0 && tokens_to_add > 0 {
            self.tokens = capacity.min(self.tokens.saturating_add(tokens_to_add));
            let leftover = elapsed % interval_nanos;
            self.last_refill_at = now - leftover;
        }
    }

    /// Take one token if any is available.
    pub(crate) fn try_consume(&mut self) -> bool {
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}
