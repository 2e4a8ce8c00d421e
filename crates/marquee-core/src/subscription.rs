//! Subscription bookkeeping
//!
//! Every adapter owns an explicit list of `(event name, handle)` pairs for the
//! subscriptions it created, so `destroy()` removes exactly those.

/// Handle for a subscription on a third-party engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Subscriptions created by one owner
#[derive(Debug)]
pub struct Subscriptions<Id> {
    entries: Vec<(String, Id)>,
}

impl<Id> Default for Subscriptions<Id> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<Id: Copy> Subscriptions<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, event: impl Into<String>, id: Id) {
        self.entries.push((event.into(), id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every tracked subscription, leaving the list empty.
    ///
    /// The caller unregisters the returned pairs after releasing any borrow
    /// on the owner, since unregistering may call back into the engine.
    pub fn drain(&mut self) -> Vec<(String, Id)> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_releases_everything_once() {
        let mut subscriptions = Subscriptions::new();
        subscriptions.track("error", SubscriptionId(1));
        subscriptions.track("streamActivated", SubscriptionId(2));
        assert_eq!(subscriptions.len(), 2);

        let released = subscriptions.drain();
        assert_eq!(
            released,
            [
                ("error".to_string(), SubscriptionId(1)),
                ("streamActivated".to_string(), SubscriptionId(2)),
            ]
        );
        assert!(subscriptions.is_empty());
        assert!(subscriptions.drain().is_empty());
    }
}
