use std::fmt;

use crate::{DeniedError, Timestamp};

type AllowHook = dyn Fn(&str, Timestamp) + Send + Sync;
type DenyHook = dyn Fn(&str, &DeniedError) + Send + Sync;

/// Callbacks invoked on every admission decision.
///
/// On the admit and immediate-deny paths the hooks run while the key's lock
/// is held, so their invocation order matches the admission order for that
/// key. They must return quickly and must not call back into the limiter.
pub struct ObserveHooks {
    on_allow: Box<AllowHook>,
    on_deny: Box<DenyHook>,
}

impl ObserveHooks {
    pub fn new(
        on_allow: impl Fn(&str, Timestamp) + Send + Sync + 'static,
        on_deny: impl Fn(&str, &DeniedError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_allow: Box::new(on_allow),
            on_deny: Box::new(on_deny),
        }
    }

    /// Hooks that do nothing.
    pub fn noop() -> Self {
        Self::new(|_, _| {}, |_, _| {})
    }

    pub(crate) fn allow(&self, key: &str, now: Timestamp) {
        (self.on_allow)(key, now);
    }

    pub(crate) fn deny(&self, key: &str, error: &DeniedError) {
        (self.on_deny)(key, error);
    }
}

impl Default for ObserveHooks {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ObserveHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObserveHooks")
    }
}
