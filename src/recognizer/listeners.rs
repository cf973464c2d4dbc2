use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Emitted once per confirmed gesture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeEvent {
    /// Name of the recognizer that fired.
    pub recognizer: String,
    /// Program that confirmed the gesture.
    pub program: String,
    /// Host timestamp of the last transition plus the settle delay.
    pub at_ms: u64,
    pub requested_at: DateTime<Utc>,
}

pub trait WakeListener: Send + Sync {
    fn on_wake_requested(&self, event: &WakeEvent);
}

impl<F> WakeListener for F
where
    F: Fn(&WakeEvent) + Send + Sync,
{
    fn on_wake_requested(&self, event: &WakeEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(Uuid);

/// Explicitly owned listener list: whoever registers must unregister.
#[derive(Clone, Default)]
pub struct WakeListeners {
    inner: Arc<Mutex<Vec<(ListenerId, Arc<dyn WakeListener>)>>>,
}

impl WakeListeners {
    pub fn register(&self, listener: Arc<dyn WakeListener>) -> ListenerId {
        let id = ListenerId(Uuid::new_v4());
        self.lock().push((id, listener));
        id
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Calls every listener outside the lock, so a listener may register,
    /// unregister or drive the recognizer from inside the callback.
    pub fn notify(&self, event: &WakeEvent) {
        let listeners: Vec<Arc<dyn WakeListener>> =
            self.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener.on_wake_requested(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn WakeListener>)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
