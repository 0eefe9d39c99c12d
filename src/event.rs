use std::sync::Arc;

use tokio::sync::Notify;

/// A one-slot, coalescing wake-up signal: the `resetTimer` / `skipTimer` / `commitUpdated`
/// events from spec §9. Setting it any number of times before it is waited on has the same
/// effect as setting it once; `tokio::sync::Notify::notify_one` already has this property, so
/// this type exists mostly to give the signal a name at call sites.
#[derive(Clone)]
pub struct Event(Arc<Notify>);

impl Event {
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    /// Fires the signal. Coalesces with any pending, unconsumed `set()`.
    pub fn set(&self) {
        self.0.notify_one();
    }

    /// Waits until the signal fires. Returns immediately if it already fired since the last
    /// `wait()`.
    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
