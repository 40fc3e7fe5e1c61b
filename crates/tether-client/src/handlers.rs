//! Rebindable callback slots.
//!
//! The socket subscription is established once per connection, but the
//! callbacks it feeds can change at any time. Each dispatch looks up the
//! current callback instead of capturing it, so rebinding never requires
//! reopening the channel and never invokes a stale callback.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Single-slot callback registry shared between a handle and its runtime.
pub struct HandlerSlot<T> {
    current: Arc<RwLock<Option<Handler<T>>>>,
}

impl<T> HandlerSlot<T> {
    /// Empty slot.
    pub fn new() -> Self {
        Self { current: Arc::new(RwLock::new(None)) }
    }

    /// Replace the callback.
    pub fn set<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        *self.current.write() = Some(Arc::new(handler));
    }

    /// Remove the callback.
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Whether a callback is bound.
    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }

    /// Invoke the current callback. Returns `false` if none is bound.
    ///
    /// The lock is released before the callback runs, so a callback may
    /// rebind its own slot.
    pub fn call(&self, value: &T) -> bool {
        let handler = self.current.read().clone();
        match handler {
            Some(handler) => {
                handler(value);
                true
            },
            None => false,
        }
    }
}

impl<T> Clone for HandlerSlot<T> {
    fn clone(&self) -> Self {
        Self { current: Arc::clone(&self.current) }
    }
}

impl<T> Default for HandlerSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandlerSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSlot").field("bound", &self.is_set()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn empty_slot_reports_unhandled() {
        let slot: HandlerSlot<u32> = HandlerSlot::new();
        assert!(!slot.call(&1));
    }

    #[test]
    fn rebinding_is_seen_by_clones() {
        let slot: HandlerSlot<u32> = HandlerSlot::new();
        let runtime_side = slot.clone();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        slot.set(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });
        assert!(runtime_side.call(&2));

        let counter = Arc::clone(&second);
        slot.set(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });
        assert!(runtime_side.call(&5));

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 5);

        slot.clear();
        assert!(!runtime_side.call(&1));
    }

    #[test]
    fn handler_may_rebind_itself() {
        let slot: HandlerSlot<()> = HandlerSlot::new();
        let inner = slot.clone();
        slot.set(move |()| inner.clear());
        assert!(slot.call(&()));
        assert!(!slot.is_set());
    }
}
