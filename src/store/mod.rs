//! In-memory status store with publish/subscribe fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::sync::mpsc;

use crate::status::StatusResult;

/// Buffered updates per subscriber before new ones are dropped for it.
const SUBSCRIBER_BUFFER: usize = 100;

/// A live observer's registration with the store.
///
/// Holds a private bounded queue of updates. Receiving is the only
/// operation; tear down with [`StatusStore::unsubscribe`], which consumes
/// the handle (so a subscription cannot be torn down twice). Dropping the
/// handle without unsubscribing is also safe: the store prunes the dead
/// queue on the next update.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<StatusResult>,
}

impl Subscription {
    /// Waits for the next update. Returns `None` once unsubscribed and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<StatusResult> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Result<StatusResult, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

/// Concurrency-safe map of endpoint name → latest status, with pub/sub.
///
/// [`StatusStore::update`] stores the latest result per endpoint name and
/// fans it out to every subscriber with a non-blocking send: a subscriber
/// whose queue is full misses that update (at-most-once delivery), and
/// neither the writer nor other subscribers are affected. A fresh
/// subscriber bounds its staleness by reading [`StatusStore::get_all`]
/// before entering the live stream.
#[derive(Default)]
pub struct StatusStore {
    statuses: RwLock<HashMap<String, StatusResult>>,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<StatusResult>>>,
    next_id: AtomicU64,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result` keyed by endpoint name, replacing any previous
    /// entry, then notifies all subscribers. Never blocks on a slow
    /// subscriber.
    pub fn update(&self, result: StatusResult) {
        if let Ok(mut statuses) = self.statuses.write() {
            statuses.insert(result.name.clone(), result.clone());
        }
        // notify without holding the map lock
        self.notify_subscribers(result);
    }

    /// Returns a point-in-time snapshot of every stored entry. Order is
    /// not guaranteed.
    pub fn get_all(&self) -> Vec<StatusResult> {
        match self.statuses.read() {
            Ok(statuses) => statuses.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Creates a subscription with a private queue of 100 updates.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.insert(id, tx);
        }

        Subscription { id, rx }
    }

    /// Removes a subscription and closes its queue.
    ///
    /// Consuming the handle makes double-unsubscribe unrepresentable;
    /// unsubscribing a handle whose sender was already pruned is a no-op.
    pub fn unsubscribe(&self, subscription: Subscription) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.remove(&subscription.id);
        }
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn notify_subscribers(&self, result: StatusResult) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };

        let mut dead: Vec<u64> = Vec::new();
        for (id, tx) in subscribers.iter() {
            match tx.try_send(result.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // subscriber is slow, drop the update for it
                    tracing::debug!(endpoint = %result.name, "dropping update for slow subscriber");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            subscribers.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use chrono::Utc;
    use std::time::Duration;

    fn result(name: &str, status: Status) -> StatusResult {
        StatusResult {
            name: name.to_string(),
            url: format!("https://example.com/{name}"),
            status,
            labels: HashMap::new(),
            latency: Duration::from_millis(10),
            checked_at: Utc::now(),
            error: None,
            raw_response: Vec::new(),
            status_code: 200,
        }
    }

    #[test]
    fn test_update_replaces_entry() {
        let store = StatusStore::new();
        store.update(result("api", Status::Up));
        store.update(result("api", Status::Down));

        let all = store.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, Status::Down);
    }

    #[test]
    fn test_get_all_is_a_snapshot() {
        let store = StatusStore::new();
        store.update(result("api", Status::Up));

        let snapshot = store.get_all();
        store.update(result("api", Status::Down));
        assert_eq!(snapshot[0].status, Status::Up);
    }

    #[tokio::test]
    async fn test_subscribe_receives_update() {
        let store = StatusStore::new();
        let mut sub = store.subscribe();

        store.update(result("api", Status::Up));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.name, "api");
        assert_eq!(received.status, Status::Up);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let store = StatusStore::new();
        let sub = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);

        store.unsubscribe(sub);
        assert_eq!(store.subscriber_count(), 0);

        // updating after unsubscribe must not error
        store.update(result("api", Status::Up));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let store = StatusStore::new();
        let sub = store.subscribe();
        drop(sub);

        store.update(result("api", Status::Up));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_starved_subscriber_does_not_block_others() {
        let store = StatusStore::new();
        let _starved = store.subscribe();
        let mut active = store.subscribe();

        // flood beyond the buffer; every update must complete immediately
        for i in 0..(SUBSCRIBER_BUFFER + 50) {
            store.update(result(&format!("ep-{i}"), Status::Up));
        }

        // the active subscriber holds a full buffer of the earliest updates
        let mut received = 0;
        while active.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }
}
