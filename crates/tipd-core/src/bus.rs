use crate::machine::MachineState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type Listener = Box<dyn FnMut(&MachineState) + Send>;

type SharedListener = Arc<Mutex<Listener>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(SubscriptionId, SharedListener)>,
}

impl Registry {
    fn contains(&self, id: SubscriptionId) -> bool {
        self.listeners.iter().any(|(sid, _)| *sid == id)
    }
}

/// A poisoned lock only means a listener panicked mid-call; the data is
/// still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observer registry notified after every committed transition.
#[derive(Clone, Default)]
pub struct SubscriptionBus {
    registry: Arc<Mutex<Registry>>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. It stays registered until the returned handle is
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&MachineState) + Send + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        let listener: Listener = Box::new(listener);
        registry.listeners.push((id, Arc::new(Mutex::new(listener))));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove(&self.registry, id)
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `state` to every listener in registration order.
    ///
    /// Iterates over a snapshot, so listeners may subscribe or unsubscribe
    /// while being notified. A listener removed mid-round is skipped; one
    /// added mid-round is first called on the next round.
    pub fn notify(&self, state: &MachineState) {
        let snapshot: Vec<(SubscriptionId, SharedListener)> = lock(&self.registry)
            .listeners
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        for (id, listener) in snapshot {
            if !lock(&self.registry).contains(id) {
                continue;
            }
            let mut listener = lock(&listener);
            (*listener)(state);
        }
    }
}

fn remove(registry: &Mutex<Registry>, id: SubscriptionId) -> bool {
    let mut registry = lock(registry);
    let before = registry.listeners.len();
    registry.listeners.retain(|(sid, _)| *sid != id);
    registry.listeners.len() != before
}

/// Handle for one registered listener. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
