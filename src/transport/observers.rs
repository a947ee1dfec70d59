// Observer registry: subscription id -> handler, notified in subscription order

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use super::TransportError;
use crate::models::StreamMessage;

/// Returned by every `on_*` subscription; pass to `unsubscribe` to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

pub(crate) type MessageHandler = Arc<dyn Fn(&StreamMessage) + Send + Sync>;
pub(crate) type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;
pub(crate) type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: u64,
    message: BTreeMap<SubscriptionId, MessageHandler>,
    error: BTreeMap<SubscriptionId, ErrorHandler>,
    connect: BTreeMap<SubscriptionId, LifecycleHandler>,
    disconnect: BTreeMap<SubscriptionId, LifecycleHandler>,
}

impl Handlers {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// Shared between the transport handle (subscribe/unsubscribe) and the driver task (notify).
/// Handlers are cloned out before being invoked, so a handler may subscribe or
/// unsubscribe without deadlocking; the change takes effect from the next notification.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    inner: Mutex<Handlers>,
}

impl ObserverRegistry {
    fn lock(&self) -> MutexGuard<'_, Handlers> {
        // Handlers never run under the lock, so poisoning cannot leave it half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn add_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        let mut h = self.lock();
        let id = h.next_id();
        h.message.insert(id, Arc::new(handler));
        id
    }

    pub(crate) fn add_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        let mut h = self.lock();
        let id = h.next_id();
        h.error.insert(id, Arc::new(handler));
        id
    }

    pub(crate) fn add_connect<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut h = self.lock();
        let id = h.next_id();
        h.connect.insert(id, Arc::new(handler));
        id
    }

    pub(crate) fn add_disconnect<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut h = self.lock();
        let id = h.next_id();
        h.disconnect.insert(id, Arc::new(handler));
        id
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut h = self.lock();
        h.message.remove(&id).is_some()
            || h.error.remove(&id).is_some()
            || h.connect.remove(&id).is_some()
            || h.disconnect.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        let h = self.lock();
        h.message.len() + h.error.len() + h.connect.len() + h.disconnect.len()
    }

    pub(crate) fn notify_message(&self, message: &StreamMessage) {
        let handlers: Vec<_> = self
            .lock()
            .message
            .iter()
            .map(|(id, f)| (*id, f.clone()))
            .collect();
        for (id, f) in handlers {
            invoke("message", id, || f(message));
        }
    }

    pub(crate) fn notify_error(&self, error: &TransportError) {
        let handlers: Vec<_> = self
            .lock()
            .error
            .iter()
            .map(|(id, f)| (*id, f.clone()))
            .collect();
        for (id, f) in handlers {
            invoke("error", id, || f(error));
        }
    }

    pub(crate) fn notify_connect(&self) {
        let handlers: Vec<_> = self
            .lock()
            .connect
            .iter()
            .map(|(id, f)| (*id, f.clone()))
            .collect();
        for (id, f) in handlers {
            invoke("connect", id, || f());
        }
    }

    pub(crate) fn notify_disconnect(&self) {
        let handlers: Vec<_> = self
            .lock()
            .disconnect
            .iter()
            .map(|(id, f)| (*id, f.clone()))
            .collect();
        for (id, f) in handlers {
            invoke("disconnect", id, || f());
        }
    }
}

/// A panicking handler is logged and skipped; the rest still run.
fn invoke(kind: &'static str, id: SubscriptionId, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            kind,
            subscription = id.0,
            panic = panic_message(payload.as_ref()),
            "observer panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
