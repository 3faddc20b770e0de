//! Explicit subscription hub for application lifecycle events
//!
//! The host application publishes foreground/background transitions here;
//! interested parties register a handler and get back an id to unregister it.

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    WillEnterForeground,
    DidEnterBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    event: LifecycleEvent,
    handler: Box<dyn FnMut(LifecycleEvent)>,
}

/// Registry of lifecycle event handlers
#[derive(Default)]
pub struct EventHub {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` every time `event` is published
    pub fn register(
        &mut self,
        event: LifecycleEvent,
        handler: impl FnMut(LifecycleEvent) + 'static,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            event,
            handler: Box::new(handler),
        });
        debug!("Registered {:?} handler {:?}", event, id);
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn unregister(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    /// Deliver `event` to its handlers, returning how many ran
    pub fn publish(&mut self, event: LifecycleEvent) -> usize {
        let mut delivered = 0;
        for subscriber in self.subscribers.iter_mut().filter(|s| s.event == event) {
            (subscriber.handler)(event);
            delivered += 1;
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
