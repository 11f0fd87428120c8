//! Event fan-out to host callbacks.
//!
//! Subscriptions are keyed by an opaque id and tagged with an owner name so
//! a screen that goes away can drop all of its callbacks at once.

use std::fmt;

use tracing::debug;

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Subscription<E> {
    id: SubscriptionId,
    owner: String,
    callback: Box<dyn FnMut(&E)>,
}

/// Registered callbacks for events of type `E`, called in subscription order.
pub struct ObserverRegistry<E> {
    subscriptions: Vec<Subscription<E>>,
    next_id: u64,
}

impl<E> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 1,
        }
    }

    pub fn subscribe<F>(&mut self, owner: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let owner = owner.into();
        debug!("Observer {} subscribed for {}", id, owner);
        self.subscriptions.push(Subscription {
            id,
            owner,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove one subscription. Unknown ids are ignored.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Remove every subscription registered by `owner`.
    pub fn unsubscribe_owner(&mut self, owner: &str) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.owner != owner);
        let removed = before - self.subscriptions.len();
        if removed > 0 {
            debug!("Removed {} observer(s) owned by {}", removed, owner);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn emit(&mut self, event: &E) {
        for sub in &mut self.subscriptions {
            (sub.callback)(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for ObserverRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ObserverRegistry::<u32>::new();

        let l = log.clone();
        registry.subscribe("first", move |e| l.borrow_mut().push(format!("first:{e}")));
        let l = log.clone();
        registry.subscribe("second", move |e| l.borrow_mut().push(format!("second:{e}")));

        registry.emit(&7);
        assert_eq!(*log.borrow(), vec!["first:7", "second:7"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let mut registry = ObserverRegistry::<()>::new();
        let c = count.clone();
        let id = registry.subscribe("screen", move |_| *c.borrow_mut() += 1);

        registry.emit(&());
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.emit(&());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_unsubscribe_owner() {
        let mut registry = ObserverRegistry::<()>::new();
        registry.subscribe("home", |_| {});
        registry.subscribe("banking", |_| {});
        registry.subscribe("home", |_| {});

        assert_eq!(registry.unsubscribe_owner("home"), 2);
        assert_eq!(registry.unsubscribe_owner("home"), 0);
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_unique() {
        let mut registry = ObserverRegistry::<()>::new();
        let a = registry.subscribe("x", |_| {});
        let b = registry.subscribe("x", |_| {});
        assert_ne!(a, b);
        assert_eq!(a.to_string(), format!("sub-{}", a.raw()));
    }
}
