//! One-to-many change notification.
//!
//! An observable keeps an [`ObserverSet`] of non-owning references to its
//! observers and hands itself to each of them on notification, so every
//! observer reads just the published fields it cares about.

use std::sync::{Arc, Weak};

/// Receives change notifications from an observable of type `S`.
pub trait Observer<S: ?Sized>: Send + Sync {
    fn update(&self, source: &S);
}

/// Registered observers, held weakly.
///
/// An observer that has been dropped simply stops receiving updates; its
/// entry is pruned on the next registration change. Notification order is
/// unspecified.
pub struct ObserverSet<S: ?Sized> {
    observers: Vec<Weak<dyn Observer<S>>>,
}

impl<S: ?Sized> ObserverSet<S> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    fn position(&self, target: *const ()) -> Option<usize> {
        self.observers
            .iter()
            .position(|o| o.as_ptr() as *const () == target)
    }

    /// Register `observer`. Returns false if it was already registered.
    pub fn add<O: Observer<S> + 'static>(&mut self, observer: &Arc<O>) -> bool {
        self.observers.retain(|o| o.strong_count() > 0);
        if self.position(Arc::as_ptr(observer) as *const ()).is_some() {
            return false;
        }
        let weak: Weak<dyn Observer<S>> = Arc::downgrade(observer) as Weak<dyn Observer<S>>;
        self.observers.push(weak);
        true
    }

    /// Revoke a registration. Returns false if `observer` was not registered.
    pub fn remove<O: Observer<S> + 'static>(&mut self, observer: &Arc<O>) -> bool {
        self.observers.retain(|o| o.strong_count() > 0);
        match self.position(Arc::as_ptr(observer) as *const ()) {
            Some(index) => {
                self.observers.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registered observers that are still alive.
    pub fn len(&self) -> usize {
        self.observers.iter().filter(|o| o.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `update(source)` on every live observer.
    pub fn notify(&self, source: &S) {
        for observer in self.observers.iter().filter_map(Weak::upgrade) {
            observer.update(source);
        }
    }
}

impl<S: ?Sized> Default for ObserverSet<S> {
    fn default() -> Self {
        Self::new()
    }
}
