//! Current-value observables for session state.

use crate::core::events::{EventChannel, Subscription};

/// A value plus subscribers notified on every change.
///
/// New subscribers are called immediately with the current value, so UI
/// attaching mid-session never misses state.
pub struct Observable<T: Clone> {
    value: T,
    channel: EventChannel<T, ()>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: initial,
            channel: EventChannel::new(),
        }
    }

    /// The current value, cloned.
    pub fn get(&self) -> T {
        self.value.clone()
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Stores the new value and notifies every subscriber.
    pub fn set(&mut self, value: T) {
        self.value = value;
        let snapshot = self.value.clone();
        self.channel.emit(&snapshot, &mut ());
    }

    /// Subscribes and immediately delivers the current value.
    pub fn subscribe<F>(&mut self, mut handler: F) -> Subscription
    where
        F: FnMut(&T) + 'static,
    {
        handler(&self.value);
        self.channel.subscribe(0, move |value, _| handler(value))
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.channel.unsubscribe(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscriber_gets_current_value_immediately() {
        let mut observable = Observable::new(42);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        observable.subscribe(move |v| s.borrow_mut().push(*v));

        observable.set(7);
        assert_eq!(*seen.borrow(), vec![42, 7]);
    }

    #[test]
    fn unsubscribed_handler_is_silent() {
        let mut observable = Observable::new(0);
        let seen = Rc::new(RefCell::new(0));
        let s = seen.clone();
        let sub = observable.subscribe(move |v| *s.borrow_mut() = *v);

        observable.unsubscribe(sub);
        observable.set(99);
        assert_eq!(*seen.borrow(), 0);
        assert_eq!(observable.get(), 99);
    }
}
