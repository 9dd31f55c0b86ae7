use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Identifier the server assigns to each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct EventEntry {
    subscribers: BTreeSet<ClientId>,
    /// Clients eligible for the next trigger, in subscription order.
    wait_queue: VecDeque<ClientId>,
}

/// Events, their subscribers and their wait queues.
///
/// The registry does no locking of its own. It lives inside
/// [`ServerState`](crate::ServerState), which guards it together with the
/// client table and the job queue.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    events: BTreeMap<String, EventEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `client` to the event's subscribers and wait queue, creating the
    /// event if needed. Subscribing twice has no further effect.
    pub fn subscribe(&mut self, client: ClientId, event: &str) {
        let entry = self.events.entry(event.to_string()).or_default();
        entry.subscribers.insert(client);
        if !entry.wait_queue.contains(&client) {
            entry.wait_queue.push_back(client);
        }
    }

    /// Removes `client` from the event. Returns whether it was subscribed.
    pub fn unsubscribe(&mut self, client: ClientId, event: &str) -> bool {
        let Some(entry) = self.events.get_mut(event) else {
            return false;
        };
        entry.wait_queue.retain(|queued| *queued != client);
        entry.subscribers.remove(&client)
    }

    /// Empties the wait queue of `event` and returns it in FIFO order.
    ///
    /// Subscribers stay subscribed.
    pub fn drain_wait_queue(&mut self, event: &str) -> Vec<ClientId> {
        self.events
            .get_mut(event)
            .map(|entry| entry.wait_queue.drain(..).collect())
            .unwrap_or_default()
    }

    /// Purges `client` from every event.
    pub fn remove_client(&mut self, client: ClientId) {
        for entry in self.events.values_mut() {
            entry.subscribers.remove(&client);
            entry.wait_queue.retain(|queued| *queued != client);
        }
    }

    /// Creates an empty event. Returns `false` if it already existed.
    pub fn add_event(&mut self, event: &str) -> bool {
        if self.events.contains_key(event) {
            return false;
        }
        self.events.insert(event.to_string(), EventEntry::default());
        true
    }

    /// Deletes an event with its subscribers and wait queue. Returns `false`
    /// if there was no such event.
    pub fn remove_event(&mut self, event: &str) -> bool {
        self.events.remove(event).is_some()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn subscribers(&self, event: &str) -> Vec<ClientId> {
        self.events
            .get(event)
            .map(|entry| entry.subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn wait_queue(&self, event: &str) -> Vec<ClientId> {
        self.events
            .get(event)
            .map(|entry| entry.wait_queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `client` appears anywhere in the registry.
    pub fn knows(&self, client: ClientId) -> bool {
        self.events
            .values()
            .any(|entry| entry.subscribers.contains(&client) || entry.wait_queue.contains(&client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ClientId = ClientId(1);
    const B: ClientId = ClientId(2);

    #[test]
    fn subscribe_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(A, "news");
        registry.subscribe(A, "news");
        assert_eq!(registry.subscribers("news"), vec![A]);
        assert_eq!(registry.wait_queue("news"), vec![A]);
    }

    #[test]
    fn drain_keeps_subscribers_and_fifo_order() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(B, "news");
        registry.subscribe(A, "news");

        assert_eq!(registry.drain_wait_queue("news"), vec![B, A]);
        assert!(registry.wait_queue("news").is_empty());
        assert_eq!(registry.subscribers("news"), vec![A, B]);
        assert!(registry.drain_wait_queue("news").is_empty());

        // Subscribing again re-queues for the next trigger.
        registry.subscribe(A, "news");
        assert_eq!(registry.wait_queue("news"), vec![A]);
    }

    #[test]
    fn unknown_events_are_no_ops() {
        let mut registry = SubscriptionRegistry::new();
        assert!(!registry.unsubscribe(A, "ghost"));
        assert!(registry.drain_wait_queue("ghost").is_empty());
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn unsubscribe_and_remove_client_purge_everything() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(A, "news");
        registry.subscribe(A, "sports");
        registry.subscribe(B, "sports");

        assert!(registry.unsubscribe(A, "news"));
        assert!(registry.subscribers("news").is_empty());
        assert!(registry.wait_queue("news").is_empty());

        registry.remove_client(A);
        assert!(!registry.knows(A));
        assert_eq!(registry.wait_queue("sports"), vec![B]);
    }

    #[test]
    fn add_and_remove_events() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.add_event("news"));
        assert!(!registry.add_event("news"));
        registry.subscribe(A, "news");
        assert!(registry.remove_event("news"));
        assert!(!registry.remove_event("news"));
        assert!(!registry.knows(A));
        assert_eq!(registry.events().count(), 0);
    }
}
