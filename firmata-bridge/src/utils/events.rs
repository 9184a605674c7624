//! Defines the event manager: the notification sink the controller reports its lifecycle to.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{trace, warn};
use parking_lot::Mutex;

use crate::errors::Error;
use crate::utils::task;

type SyncedCallbackMap = Mutex<HashMap<String, Vec<CallbackWrapper>>>;
type HandlerFuture = BoxFuture<'static, Result<(), Error>>;
pub type EventHandler = usize;

#[derive(Clone, Default)]
pub struct EventManager {
    callbacks: Arc<SyncedCallbackMap>,
    next_id: Arc<AtomicUsize>,
    queue: Arc<Mutex<Delivery>>,
}

/// Handler futures waiting to run, in emit order.
#[derive(Default)]
struct Delivery {
    pending: VecDeque<HandlerFuture>,
    /// A task is draining `pending`.
    draining: bool,
}

struct CallbackWrapper {
    id: EventHandler,
    callback: Box<dyn FnMut(Arc<dyn Any + Send + Sync>) -> HandlerFuture + Send>,
}

impl EventManager {
    /// Registers an event handler for a specific event name.
    ///
    /// # Parameters
    /// * `event` - The event name (any type that matches an Into<String>)
    /// * `callback` - An async moved callback that accepts a single parameter as an argument.
    ///   The argument can be anything that is `Send + Sync + Clone`.
    ///   Multiple parameters can be passed as a single tuple.
    ///
    /// # Return
    /// Returns an EventHandler that can be used by the `unregister()` method.
    ///
    /// # Errors
    /// If the callback parameter type does not match the emitted payload type exactly, the
    /// callback is silently skipped.
    pub fn on<S, F, T, Fut>(&self, event: S, mut callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
    {
        let event_name = event.into();
        let callback_event = event_name.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let boxed_callback = Box::new(move |arg: Arc<dyn Any + Send + Sync>| {
            match arg.downcast::<T>() {
                Ok(arg) => (callback)((*arg).clone()).boxed(),
                Err(_) => {
                    warn!(
                        "The callback for event '{}' could not be called because parameter does not match",
                        callback_event
                    );
                    Box::pin(async { Ok(()) })
                }
            }
        });

        self.callbacks
            .lock()
            .entry(event_name)
            .or_default()
            .push(CallbackWrapper {
                id,
                callback: boxed_callback,
            });

        id
    }

    /// Invokes all event handlers registered for a specific event name.
    ///
    /// Handlers run in a background task: `emit` never waits for them. They run one after the
    /// other in emit order, so a handler never sees a later event before an earlier one.
    /// Handlers whose declared parameter type does not match the payload are skipped.
    pub fn emit<S, T>(&self, event: S, payload: T)
    where
        S: Into<String>,
        T: 'static + Send + Sync,
    {
        let event = event.into();
        let payload_any: Arc<dyn Any + Send + Sync> = Arc::new(payload);
        let futures: Vec<HandlerFuture> = match self.callbacks.lock().get_mut(&event) {
            Some(callbacks) => {
                trace!("Emit '{}' to {} handler(s)", event, callbacks.len());
                callbacks
                    .iter_mut()
                    .map(|wrapper| (wrapper.callback)(payload_any.clone()))
                    .collect()
            }
            None => return,
        };

        let mut queue = self.queue.lock();
        queue.pending.extend(futures);
        if queue.draining || queue.pending.is_empty() {
            return;
        }
        queue.draining = true;
        if let Err(err) = task::run(Self::drain(self.queue.clone())) {
            warn!("Handlers for event '{}' could not run: {}", event, err);
            queue.pending.clear();
            queue.draining = false;
        }
    }

    /// Runs the queued handler futures until the queue is empty.
    async fn drain(queue: Arc<Mutex<Delivery>>) {
        loop {
            let next = {
                let mut queue = queue.lock();
                match queue.pending.pop_front() {
                    Some(future) => future,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            if let Err(err) = next.await {
                warn!("Event handler failed: {}", err);
            }
        }
    }

    /// Unregisters a given handler if found.
    pub fn unregister(&self, handler: EventHandler) {
        self.callbacks
            .lock()
            .values_mut()
            .for_each(|v| v.retain(|cb| cb.id != handler));
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lock = self.callbacks.lock();
        f.debug_struct("EventManager")
            .field("events", &lock.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU8};

    use serial_test::serial;

    use super::*;
    use crate::pause;

    #[tokio::test]
    #[serial]
    async fn test_register_and_emit_event() {
        let events: EventManager = Default::default();
        let payload = Arc::new(AtomicBool::new(false));

        events.on("register", |flag: Arc<AtomicBool>| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        events.emit("register", payload.clone());

        pause!(100);
        assert!(
            payload.load(Ordering::SeqCst),
            "The flag have been set by the triggered event."
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_unregister_event_handler() {
        let events: EventManager = Default::default();
        let flag = Arc::new(AtomicBool::new(false));

        let handler = events.on("unregister", |flag: Arc<AtomicBool>| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        events.unregister(handler);
        events.emit("unregister", flag.clone());

        pause!(100);
        assert!(
            !flag.load(Ordering::SeqCst),
            "The event was unregistered: the flag have not been set."
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_multiple_handlers() {
        let events: EventManager = Default::default();
        let flag = Arc::new(AtomicUsize::new(0));

        events.on("multiple", |flag: Arc<AtomicUsize>| async move {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        events.on("multiple", |flag: Arc<AtomicUsize>| async move {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        // Not matching the payload type: skipped.
        events.on(
            "multiple",
            |(_not_matching, flag): (u8, Arc<AtomicUsize>)| async move {
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );
        events.emit("multiple", flag.clone());

        pause!(100);
        assert_eq!(flag.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[serial]
    async fn test_event_with_complex_payload() {
        let events: EventManager = Default::default();
        let flag = Arc::new(AtomicU8::new(0));

        events.on(
            "payload",
            |(number1, number2, container): (u8, u8, Arc<AtomicU8>)| async move {
                container.store(number1 + number2, Ordering::SeqCst);
                Ok(())
            },
        );
        events.emit("payload", (42u8, 69u8, flag.clone()));

        pause!(100);
        assert_eq!(flag.load(Ordering::SeqCst), 111);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn test_handlers_receive_events_in_emit_order() {
        let events: EventManager = Default::default();
        let received = Arc::new(Mutex::new(vec![]));

        for event in ["first", "second"] {
            let received = received.clone();
            events.on(event, move |value: u8| {
                let received = received.clone();
                async move {
                    // The earlier event is the slower one.
                    if value % 2 == 0 {
                        pause!(20);
                    }
                    received.lock().push(value);
                    Ok(())
                }
            });
        }
        for value in 0..10u8 {
            let event = match value % 2 {
                0 => "first",
                _ => "second",
            };
            events.emit(event, value);
        }

        pause!(400);
        assert_eq!(received.lock().clone(), (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_emit_without_handlers_or_runtime() {
        let events: EventManager = Default::default();
        events.emit("no_event", ());
        events.on("no_runtime", |_: ()| async move { Ok(()) });
        // No runtime: the handler cannot be spawned, which is logged and ignored.
        events.emit("no_runtime", ());
        assert_eq!(format!("{:?}", events), "EventManager { events: [\"no_runtime\"] }");
    }
}
