//! Priority-ordered synchronous event dispatch.
//!
//! Engine subsystems communicate through [`EventChannel`]s owned by the
//! [`World`](crate::core::world::World): handlers run in ascending priority
//! order (ties broken by subscription order) and receive the payload plus a
//! mutable context. A panicking handler is caught and logged so one broken
//! subscriber cannot take down the frame loop.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Token returned by [`EventChannel::subscribe`]; pass it back to
/// [`EventChannel::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

struct Entry<P, C> {
    id: u64,
    priority: i32,
    handler: Box<dyn FnMut(&P, &mut C)>,
}

/// A list of subscribers invoked synchronously on [`emit`](Self::emit).
///
/// `P` is the payload type, `C` the mutable context every handler receives
/// (use `()` for plain notification channels).
pub struct EventChannel<P, C = ()> {
    entries: Vec<Entry<P, C>>,
    next_id: u64,
}

impl<P, C> Default for EventChannel<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, C> EventChannel<P, C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a handler at the given priority. Lower priorities run
    /// first; handlers at the same priority run in subscription order.
    pub fn subscribe<F>(&mut self, priority: i32, handler: F) -> Subscription
    where
        F: FnMut(&P, &mut C) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        // Subscription ids are monotonic, so (priority, id) gives the
        // stable tie-break the dispatch order requires.
        let pos = self
            .entries
            .iter()
            .position(|e| (e.priority, e.id) > (priority, id))
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            Entry {
                id,
                priority,
                handler: Box::new(handler),
            },
        );
        Subscription(id)
    }

    /// Removes a previously registered handler. Returns `false` if the
    /// subscription was already removed (safe to call twice).
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != subscription.0);
        self.entries.len() != before
    }

    /// Invokes every handler in order. A handler that panics is caught,
    /// logged, and skipped for this dispatch; later handlers still run.
    pub fn emit(&mut self, payload: &P, ctx: &mut C) {
        for entry in &mut self.entries {
            let handler = &mut entry.handler;
            let result = catch_unwind(AssertUnwindSafe(|| handler(payload, ctx)));
            if result.is_err() {
                log::error!(
                    "event handler (priority {}) panicked; skipping for this dispatch",
                    entry.priority
                );
            }
        }
    }

    /// Drops all handlers.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn handlers_run_in_priority_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut channel: EventChannel<u32, ()> = EventChannel::new();

        let o = order.clone();
        channel.subscribe(5, move |_, _| o.borrow_mut().push("renderer"));
        let o = order.clone();
        channel.subscribe(0, move |_, _| o.borrow_mut().push("camera"));
        let o = order.clone();
        channel.subscribe(0, move |_, _| o.borrow_mut().push("measure"));

        channel.emit(&0, &mut ());
        assert_eq!(*order.borrow(), vec!["camera", "measure", "renderer"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hits = Rc::new(RefCell::new(0));
        let mut channel: EventChannel<u32, ()> = EventChannel::new();

        let h = hits.clone();
        let sub = channel.subscribe(0, move |_, _| *h.borrow_mut() += 1);

        channel.emit(&0, &mut ());
        assert!(channel.unsubscribe(sub));
        channel.emit(&0, &mut ());
        assert_eq!(*hits.borrow(), 1);

        // Second removal is a no-op, not an error.
        assert!(!channel.unsubscribe(sub));
    }

    #[test]
    fn panicking_handler_does_not_stop_later_handlers() {
        let hits = Rc::new(RefCell::new(0));
        let mut channel: EventChannel<u32, ()> = EventChannel::new();

        channel.subscribe(0, |_, _| panic!("boom"));
        let h = hits.clone();
        channel.subscribe(1, move |_, _| *h.borrow_mut() += 1);

        channel.emit(&0, &mut ());
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn handlers_mutate_shared_context() {
        let mut channel: EventChannel<u32, Vec<u32>> = EventChannel::new();
        channel.subscribe(0, |payload, ctx| ctx.push(*payload * 2));
        channel.subscribe(1, |payload, ctx| ctx.push(*payload * 3));

        let mut ctx = Vec::new();
        channel.emit(&7, &mut ctx);
        assert_eq!(ctx, vec![14, 21]);
    }
}
