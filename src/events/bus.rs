//! Event Bus - pub/sub dispatch with deterministic ordering and isolation
//!
//! Listeners are registered under string event names, persistently or
//! one-shot. `emit` snapshots the listener list at call time, strips
//! one-shot registrations from the live list, then hands the snapshot to a
//! single dispatch worker that runs each callback in its own scheduled
//! turn, strictly after the emitting turn has returned and strictly in
//! registration order. One worker drains one queue, so listeners also
//! observe distinct emissions in arrival order, on any runtime flavor. A
//! panicking listener neither stops its siblings nor reaches the emitter;
//! each listener gets its own deep copy of the payload.
//!
//! Removal identity is the exact `(event, callback, once)` triple. Rust has
//! no function equality, so callback identity is `Arc` pointer identity:
//! build listeners with [`listener`] and keep the returned handle around if
//! you intend to remove them later.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::diagnostics::{DiagnosticKind, DiagnosticsHub};
use super::types::READY;

/// Events that fire at most once per process lifetime. Registering for one
/// of these after it has fired invokes the callback on a later tick instead
/// of waiting for an occurrence that will never come.
const SINGLE_SHOT: &[&str] = &[READY];

/// A registered callback. Clone the handle to keep removal identity.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(callback: F) -> Listener
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Malformed call to the bus API. Always surfaced synchronously.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("invalid event name")]
    InvalidEventName,
}

struct Registration {
    callback: Listener,
    once: bool,
}

#[derive(Default)]
struct BusInner {
    handlers: HashMap<String, Vec<Registration>>,
    /// Single-shot events that have already fired.
    fired: HashSet<&'static str>,
}

/// One snapshotted emission awaiting the dispatch worker.
struct DispatchJob {
    event: String,
    callbacks: Vec<Listener>,
    payload: Value,
}

/// Central pub/sub bus. One instance per process, shared behind an `Arc`.
///
/// Requires a running tokio runtime: construction spawns the dispatch
/// worker. The worker stops on its own when the bus is dropped.
pub struct EventBus {
    inner: Mutex<BusInner>,
    dispatch_tx: mpsc::UnboundedSender<DispatchJob>,
    diagnostics: DiagnosticsHub,
}

impl EventBus {
    pub fn new(diagnostics: DiagnosticsHub) -> Self {
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<DispatchJob>();
        let worker_diagnostics = diagnostics.clone();
        tokio::spawn(async move {
            while let Some(job) = dispatch_rx.recv().await {
                for (index, callback) in job.callbacks.iter().enumerate() {
                    // One turn per listener, strictly after the emitting
                    // turn.
                    tokio::task::yield_now().await;
                    invoke(&job.event, index, callback, job.payload.clone(), &worker_diagnostics);
                }
            }
        });
        Self {
            inner: Mutex::new(BusInner::default()),
            dispatch_tx,
            diagnostics,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for `event`.
    ///
    /// Registrations are independent even when the same triple is added
    /// twice. For single-shot events that already fired, the callback is
    /// scheduled immediately instead of being registered.
    pub fn on(&self, event: &str, callback: Listener, once: bool) -> Result<(), BusError> {
        validate_name(event)?;

        let mut inner = self.lock();
        if inner.fired.contains(event) {
            drop(inner);
            debug!(event, "single-shot event already fired, scheduling listener directly");
            // Through the worker queue, so it cannot overtake an emission
            // still awaiting dispatch.
            let _ = self.dispatch_tx.send(DispatchJob {
                event: event.to_string(),
                callbacks: vec![callback],
                payload: Value::Null,
            });
            return Ok(());
        }

        debug!(event, once, "registering listener");
        inner.handlers.entry(event.to_string()).or_default().push(Registration { callback, once });
        Ok(())
    }

    /// Remove at most one registration matching the exact
    /// `(event, callback, once)` triple. Removing an absent triple is a
    /// no-op, not an error.
    pub fn off(&self, event: &str, callback: &Listener, once: bool) -> Result<(), BusError> {
        validate_name(event)?;

        let mut inner = self.lock();
        if let Some(list) = inner.handlers.get_mut(event) {
            if let Some(index) = list
                .iter()
                .position(|r| r.once == once && Arc::ptr_eq(&r.callback, callback))
            {
                debug!(event, once, index, "removing listener");
                list.remove(index);
            }
            if list.is_empty() {
                inner.handlers.remove(event);
            }
        }
        Ok(())
    }

    /// Emit `payload` to every listener currently registered for `event`.
    ///
    /// Listeners registered during dispatch of this emission do not receive
    /// it, and `off` cannot recall a listener already snapshotted here.
    /// User emissions never touch the single-shot bookkeeping, even under a
    /// canonical name: only the engine can mark `ready` as having fired.
    pub fn emit(&self, event: &str, payload: Value) -> Result<(), BusError> {
        validate_name(event)?;
        self.enqueue(event, payload, false);
        Ok(())
    }

    /// Dispatch without name validation; for canonical names owned by the
    /// engine itself.
    pub(crate) fn dispatch(&self, event: &str, payload: Value) {
        let single_shot = SINGLE_SHOT.iter().copied().find(|single| *single == event);
        if let Some(fired) = single_shot {
            self.lock().fired.insert(fired);
        }
        self.enqueue(event, payload, single_shot.is_some());
    }

    /// Snapshot the listener list and hand it to the dispatch worker.
    ///
    /// `consume_all` drains every registration (a single-shot event firing
    /// for the only time it ever will); otherwise only one-shot
    /// registrations are stripped.
    fn enqueue(&self, event: &str, payload: Value, consume_all: bool) {
        let callbacks = {
            let mut inner = self.lock();
            match inner.handlers.get_mut(event) {
                Some(list) if !list.is_empty() => {
                    let snapshot: Vec<Listener> = list.iter().map(|r| r.callback.clone()).collect();
                    if consume_all {
                        list.clear();
                    } else {
                        list.retain(|r| !r.once);
                    }
                    if list.is_empty() {
                        inner.handlers.remove(event);
                    }
                    snapshot
                }
                _ => Vec::new(),
            }
        };

        debug!(event, listeners = callbacks.len(), "dispatching");
        if callbacks.is_empty() {
            return;
        }

        let _ = self.dispatch_tx.send(DispatchJob {
            event: event.to_string(),
            callbacks,
            payload,
        });
    }

    /// Number of live registrations for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }
}

fn validate_name(event: &str) -> Result<(), BusError> {
    if event.is_empty() {
        return Err(BusError::InvalidEventName);
    }
    Ok(())
}

fn invoke(event: &str, index: usize, callback: &Listener, payload: Value, diagnostics: &DiagnosticsHub) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(payload))) {
        let message = panic_message(&*panic);
        warn!(event, listener = index, %message, "listener panicked during dispatch");
        diagnostics.record(DiagnosticKind::ListenerPanicked {
            event: event.to_string(),
            listener: index,
            message,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn test_bus() -> EventBus {
        EventBus::new(DiagnosticsHub::new(16))
    }

    /// Give spawned dispatch tasks enough turns to drain.
    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_listener_with_payload() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on("sceneChange", listener(move |payload| {
            tx.send(payload).unwrap();
        }), false)
        .unwrap();

        bus.emit("sceneChange", json!({"name": "Main"})).unwrap();
        let payload = rx.recv().await.unwrap();
        assert_eq!(payload["name"], "Main");
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for tag in ["first", "second", "third"] {
            let tx = tx.clone();
            bus.on("visibilityChange", listener(move |_| {
                tx.send(tag).unwrap();
            }), false)
            .unwrap();
        }

        bus.emit("visibilityChange", Value::Bool(true)).unwrap();
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
        assert_eq!(rx.try_recv().unwrap(), "third");
    }

    #[tokio::test]
    async fn test_once_listener_fires_exactly_once() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on("streamState", listener(move |_| {
            tx.send(()).unwrap();
        }), true)
        .unwrap();

        bus.emit("streamState", Value::Null).unwrap();
        bus.emit("streamState", Value::Null).unwrap();
        settle().await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.listener_count("streamState"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_triples_are_independent() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx2 = tx.clone();
        let shared = listener(move |_| {
            tx2.send(()).unwrap();
        });
        bus.on("recordState", shared.clone(), false).unwrap();
        bus.on("recordState", shared.clone(), false).unwrap();
        assert_eq!(bus.listener_count("recordState"), 2);

        // Removing one leaves the other registered.
        bus.off("recordState", &shared, false).unwrap();
        assert_eq!(bus.listener_count("recordState"), 1);

        bus.emit("recordState", Value::Null).unwrap();
        settle().await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_off_requires_exact_triple() {
        let bus = test_bus();
        let registered = listener(|_| {});
        bus.on("activeChange", registered.clone(), true).unwrap();

        // Wrong once flag: not removed.
        bus.off("activeChange", &registered, false).unwrap();
        assert_eq!(bus.listener_count("activeChange"), 1);

        // Different callback: not removed.
        let other = listener(|_| {});
        bus.off("activeChange", &other, true).unwrap();
        assert_eq!(bus.listener_count("activeChange"), 1);

        bus.off("activeChange", &registered, true).unwrap();
        assert_eq!(bus.listener_count("activeChange"), 0);
    }

    #[tokio::test]
    async fn test_off_unknown_triple_is_noop() {
        let bus = test_bus();
        let never_registered = listener(|_| {});
        bus.off("sceneChange", &never_registered, false).unwrap();
        bus.off("sceneChange", &never_registered, true).unwrap();
        assert_eq!(bus.listener_count("sceneChange"), 0);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_stop_siblings() {
        let bus = test_bus();
        let mut diagnostics = bus.diagnostics.subscribe();
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.on("visibilityChange", listener(|_| panic!("listener blew up")), false)
            .unwrap();
        bus.on("visibilityChange", listener(move |_| {
            tx.send(()).unwrap();
        }), false)
        .unwrap();

        bus.emit("visibilityChange", Value::Bool(false)).unwrap();
        settle().await;
        assert!(rx.try_recv().is_ok(), "second listener must still run");

        let diagnostic = diagnostics.try_recv().unwrap();
        match diagnostic.kind {
            DiagnosticKind::ListenerPanicked { event, listener, message } => {
                assert_eq!(event, "visibilityChange");
                assert_eq!(listener, 0);
                assert_eq!(message, "listener blew up");
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_listener_registered_during_dispatch_misses_emission() {
        let bus = Arc::new(test_bus());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let bus2 = Arc::clone(&bus);
        let tx_late = tx.clone();
        bus.on("sceneChange", listener(move |_| {
            // Registers a sibling mid-dispatch; it must only see future
            // emissions.
            let tx_late = tx_late.clone();
            bus2.on("sceneChange", listener(move |_| {
                tx_late.send("late").unwrap();
            }), false)
            .unwrap();
            tx.send("original").unwrap();
        }), true)
        .unwrap();

        bus.emit("sceneChange", Value::Null).unwrap();
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), "original");
        assert!(rx.try_recv().is_err(), "late listener must not see this emission");

        bus.emit("sceneChange", Value::Null).unwrap();
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_payload_copies_are_independent() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..2 {
            let tx = tx.clone();
            bus.on("sceneChange", listener(move |mut payload| {
                // In-place mutation must be invisible to the sibling.
                payload["name"] = Value::String("mutated".to_string());
                tx.send(payload["width"].clone()).unwrap();
            }), false)
            .unwrap();
        }

        bus.emit("sceneChange", json!({"name": "Main", "width": 1280})).unwrap();
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), json!(1280));
        assert_eq!(rx.try_recv().unwrap(), json!(1280));
    }

    #[tokio::test]
    async fn test_ready_listener_after_fire_still_called() {
        let bus = test_bus();
        bus.dispatch(READY, Value::Null);

        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on(READY, listener(move |_| {
            tx.send(()).unwrap();
        }), true)
        .unwrap();

        // Not in the registry: scheduled directly.
        assert_eq!(bus.listener_count(READY), 0);
        settle().await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_ready_listeners_consumed_when_fired() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on(READY, listener(move |_| {
            tx.send(()).unwrap();
        }), false)
        .unwrap();

        bus.dispatch(READY, Value::Null);
        bus.dispatch(READY, Value::Null);
        settle().await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "ready listeners fire at most once");
        assert_eq!(bus.listener_count(READY), 0);
    }

    #[tokio::test]
    async fn test_ready_listener_removable_by_exact_triple_before_fire() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registered = listener(move |_| {
            tx.send(()).unwrap();
        });
        // Registered persistent, removed persistent: the stored triple must
        // keep the caller's once flag even for a single-shot event.
        bus.on(READY, registered.clone(), false).unwrap();
        bus.off(READY, &registered, false).unwrap();
        assert_eq!(bus.listener_count(READY), 0);

        bus.dispatch(READY, Value::Null);
        settle().await;
        assert!(rx.try_recv().is_err(), "removed listener must not fire");
    }

    #[tokio::test]
    async fn test_user_emit_does_not_mark_single_shot_fired() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // A user emission under the canonical name is just an emission.
        bus.emit(READY, Value::Null).unwrap();
        settle().await;

        bus.on(READY, listener(move |_| {
            tx.send(()).unwrap();
        }), false)
        .unwrap();
        settle().await;
        assert_eq!(bus.listener_count(READY), 1, "must register, not schedule directly");
        assert!(rx.try_recv().is_err());

        bus.dispatch(READY, Value::Null);
        settle().await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_emissions_reach_listener_in_arrival_order() {
        let bus = test_bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on("streamState", listener(move |payload| {
            tx.send(payload).unwrap();
        }), false)
        .unwrap();

        for phase in ["STARTING", "STARTED", "STOPPING", "INACTIVE"] {
            bus.emit("streamState", Value::String(phase.to_string())).unwrap();
        }

        for expected in ["STARTING", "STARTED", "STOPPING", "INACTIVE"] {
            assert_eq!(rx.recv().await.unwrap(), Value::String(expected.to_string()));
        }
    }

    #[tokio::test]
    async fn test_empty_event_name_rejected() {
        let bus = test_bus();
        assert_eq!(bus.on("", listener(|_| {}), false), Err(BusError::InvalidEventName));
        assert_eq!(bus.off("", &listener(|_| {}), false), Err(BusError::InvalidEventName));
        assert_eq!(bus.emit("", Value::Null), Err(BusError::InvalidEventName));
    }
}
