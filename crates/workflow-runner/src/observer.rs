//! State-change notification.
//!
//! Observers are plain callbacks. Hosts that prefer awaiting changes can
//! subscribe to a `watch` channel carrying the latest snapshot instead.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::state::WorkflowSnapshot;

/// Callback invoked with every new snapshot.
pub type StateCallback = Arc<dyn Fn(&WorkflowSnapshot) + Send + Sync>;

/// Handle returned on registration, used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Registry {
    next_id: u64,
    callbacks: Vec<(ObserverId, StateCallback)>,
}

/// Fan-out of snapshots to callbacks and watch subscribers.
///
/// The runner reserves delivery while it still holds its state lock, so
/// snapshots reach observers one at a time and in sequence order.
pub(crate) struct Observers {
    registry: Mutex<Registry>,
    latest: watch::Sender<WorkflowSnapshot>,
}

/// Exclusive right to deliver the next snapshot.
pub(crate) struct Delivery<'a> {
    registry: MutexGuard<'a, Registry>,
    latest: &'a watch::Sender<WorkflowSnapshot>,
}

impl Delivery<'_> {
    /// Call every observer, then publish to watch subscribers.
    ///
    /// Callbacks run on the delivering thread with the registry locked; they
    /// must not register observers or issue runner commands synchronously.
    pub(crate) fn deliver(self, snapshot: WorkflowSnapshot) {
        for (_, callback) in &self.registry.callbacks {
            callback(&snapshot);
        }
        self.latest.send_replace(snapshot);
    }
}

impl Observers {
    pub(crate) fn new(initial: WorkflowSnapshot) -> Self {
        let (latest, _) = watch::channel(initial);
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                callbacks: Vec::new(),
            }),
            latest,
        }
    }

    pub(crate) fn register(&self, callback: StateCallback) -> ObserverId {
        let mut registry = self.lock();
        let id = ObserverId(registry.next_id);
        registry.next_id += 1;
        registry.callbacks.push((id, callback));
        tracing::debug!(observer = id.0, "Observer registered");
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut registry = self.lock();
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(existing, _)| *existing != id);
        registry.callbacks.len() != before
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.latest.subscribe()
    }

    /// Lock the registry for one delivery.
    ///
    /// Callers take this while holding the state lock and release the state
    /// lock before delivering.
    pub(crate) fn delivery(&self) -> Delivery<'_> {
        Delivery {
            registry: self.lock(),
            latest: &self.latest,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineDefinition;
    use crate::state::WorkflowState;

    fn snapshot(sequence: u64) -> WorkflowSnapshot {
        WorkflowSnapshot {
            sequence,
            state: WorkflowState::new(&PipelineDefinition::default().steps),
        }
    }

    fn recorder(observers: &Observers) -> (ObserverId, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = observers.register(Arc::new(move |s: &WorkflowSnapshot| {
            sink.lock().unwrap().push(s.sequence);
        }));
        (id, seen)
    }

    #[test]
    fn test_every_observer_is_notified() {
        let observers = Observers::new(snapshot(0));
        let (_, first) = recorder(&observers);
        let (_, second) = recorder(&observers);

        observers.delivery().deliver(snapshot(1));
        observers.delivery().deliver(snapshot(2));

        assert_eq!(*first.lock().unwrap(), vec![1, 2]);
        assert_eq!(*second.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_every_snapshot_is_delivered() {
        let observers = Observers::new(snapshot(0));
        let (_, seen) = recorder(&observers);

        for sequence in 1..=5 {
            observers.delivery().deliver(snapshot(sequence));
        }

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(observers.subscribe().borrow().sequence, 5);
    }

    #[test]
    fn test_removed_observer_is_not_called() {
        let observers = Observers::new(snapshot(0));
        let (id, seen) = recorder(&observers);

        assert!(observers.remove(id));
        assert!(!observers.remove(id));
        observers.delivery().deliver(snapshot(1));

        assert!(seen.lock().unwrap().is_empty());
    }
}
