//! Bridge - the single composition point of the engine
//!
//! One `Bridge` is constructed per process, selecting exactly one input
//! adapter for its lifetime: the host signal adapter when the embedder
//! detected a host, or the fragment adapter otherwise. Everything else
//! (bus, store, router, diagnostics) is wired here and exposed through a
//! stable event-emitter surface.
//!
//! Requires a running tokio runtime: listener dispatch is deferred onto it.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::events::{
    BusError, Diagnostic, DiagnosticsHub, EventBus, LifecyclePhase, Listener, READY, SceneInfo, listener,
};
use crate::fragment::FragmentAdapter;
use crate::host::{HostAdapter, HostChannel, QueuedHostChannel, SceneDescriptor, SignalSender};
use crate::router::EventRouter;
use crate::state::{StateError, StateStore};

/// Stable event-driven view of host application state.
pub struct Bridge {
    bus: Arc<EventBus>,
    store: Arc<StateStore>,
    diagnostics: DiagnosticsHub,
    host_task: Option<JoinHandle<()>>,
}

/// Handle the embedder calls on every address-fragment change. Only
/// obtainable in standalone mode; host mode has no fragment adapter.
pub struct FragmentFeed {
    adapter: FragmentAdapter,
}

impl FragmentFeed {
    /// Feed one changed fragment (leading `#` tolerated).
    pub fn changed(&self, fragment: &str) {
        self.adapter.fragment_changed(fragment);
    }
}

impl Bridge {
    /// Host detected: drive the API from `channel`'s raw signals.
    pub fn with_host(channel: impl HostChannel) -> Self {
        Self::with_host_and_config(channel, BridgeConfig::default())
    }

    /// [`Bridge::with_host`] with explicit tunables.
    pub fn with_host_and_config(channel: impl HostChannel, config: BridgeConfig) -> Self {
        let (mut bridge, router) = Self::assemble(&config);
        debug!("host detected, spawning host signal adapter");
        bridge.host_task = Some(HostAdapter::spawn(channel, router, bridge.diagnostics.clone()));
        bridge
    }

    /// Host present, pushing its signals through an in-process queue sized
    /// by `config.signal_capacity`.
    pub fn queued_host(initial_scene: SceneDescriptor, config: BridgeConfig) -> (Self, SignalSender) {
        let (channel, sender) = QueuedHostChannel::new(initial_scene, config.signal_capacity);
        (Self::with_host_and_config(channel, config), sender)
    }

    /// No host: synthesize events from the address fragment.
    pub fn standalone() -> (Self, FragmentFeed) {
        Self::standalone_with_config(BridgeConfig::default())
    }

    /// [`Bridge::standalone`] with explicit tunables.
    pub fn standalone_with_config(config: BridgeConfig) -> (Self, FragmentFeed) {
        let (bridge, router) = Self::assemble(&config);
        debug!("no host detected, using fragment protocol adapter");
        let feed = FragmentFeed {
            adapter: FragmentAdapter::new(router, bridge.diagnostics.clone()),
        };
        (bridge, feed)
    }

    fn assemble(config: &BridgeConfig) -> (Self, Arc<EventRouter>) {
        let diagnostics = DiagnosticsHub::new(config.diagnostics_capacity);
        let store = Arc::new(StateStore::new());
        let bus = Arc::new(EventBus::new(diagnostics.clone()));
        let router = Arc::new(EventRouter::new(Arc::clone(&store), Arc::clone(&bus), diagnostics.clone()));
        (
            Self {
                bus,
                store,
                diagnostics,
                host_task: None,
            },
            router,
        )
    }

    // === Event-emitter surface ===

    /// Register a persistent listener.
    pub fn on(&self, event: &str, callback: Listener) -> Result<(), BusError> {
        self.bus.on(event, callback, false)
    }

    /// Register a one-shot listener.
    pub fn once(&self, event: &str, callback: Listener) -> Result<(), BusError> {
        self.bus.on(event, callback, true)
    }

    /// Remove a listener registered with [`Bridge::on`].
    pub fn off(&self, event: &str, callback: &Listener) -> Result<(), BusError> {
        self.bus.off(event, callback, false)
    }

    /// Remove a listener registered with [`Bridge::once`].
    pub fn once_off(&self, event: &str, callback: &Listener) -> Result<(), BusError> {
        self.bus.off(event, callback, true)
    }

    /// Emit an event to registered listeners, as the engine itself would.
    pub fn emit(&self, event: &str, payload: Value) -> Result<(), BusError> {
        self.bus.emit(event, payload)
    }

    // === State accessors ===

    /// Whether the readiness gate has opened.
    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// The active scene.
    pub fn current_scene(&self) -> Result<SceneInfo, StateError> {
        self.store.current_scene()
    }

    /// Source visibility.
    pub fn is_visible(&self) -> Result<Option<bool>, StateError> {
        self.store.is_visible()
    }

    /// Source activation.
    pub fn is_active(&self) -> Result<Option<bool>, StateError> {
        self.store.is_active()
    }

    /// Streaming lifecycle phase.
    pub fn stream_state(&self) -> Result<Option<LifecyclePhase>, StateError> {
        self.store.stream_state()
    }

    /// Recording lifecycle phase.
    pub fn record_state(&self) -> Result<Option<LifecyclePhase>, StateError> {
        self.store.record_state()
    }

    /// Resolves once the readiness gate has opened; immediately if it
    /// already has.
    ///
    /// Keyed to the store, not the event alone: a user-emitted `ready`
    /// wakes the waiter, which re-arms until the gate is actually open.
    pub async fn ready(&self) {
        while !self.store.is_ready() {
            let (tx, rx) = oneshot::channel();
            let tx = Mutex::new(Some(tx));
            let callback = listener(move |_| {
                if let Some(tx) = tx.lock().unwrap_or_else(PoisonError::into_inner).take() {
                    let _ = tx.send(());
                }
            });
            // The bus handles the race where ready fired between the check
            // above and this registration.
            let _ = self.bus.on(READY, callback, true);
            let _ = rx.await;
        }
    }

    /// The deferred form of [`Bridge::current_scene`]: waits for the
    /// readiness gate, then reads the scene. Callers attaching before init
    /// use this instead of polling the accessor.
    pub async fn query_current_scene(&self) -> Result<SceneInfo, StateError> {
        self.ready().await;
        self.store.current_scene()
    }

    /// Subscribe to diagnostics (listener panics, rejected raw input).
    pub fn diagnostics(&self) -> tokio::sync::broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(task) = self.host_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_standalone_wiring_smoke() {
        let (bridge, feed) = Bridge::standalone();
        assert!(!bridge.is_ready());
        feed.changed("event=init&scene=Main&width=1280&height=720");
        assert!(bridge.is_ready());
        assert_eq!(bridge.current_scene().unwrap().name, "Main");
    }

    #[tokio::test]
    async fn test_ready_future_resolves_when_gate_opens() {
        let (bridge, feed) = Bridge::standalone();
        let waiter = bridge.ready();
        feed.changed("event=init&scene=Main&width=1280&height=720");
        waiter.await;
        assert!(bridge.is_ready());

        // Already open: resolves immediately.
        bridge.ready().await;
    }

    #[tokio::test]
    async fn test_queued_host_wiring_smoke() {
        let initial = SceneDescriptor::Structured(SceneInfo {
            name: "Main".to_string(),
            width: 1280,
            height: 720,
        });
        let (bridge, _sender) = Bridge::queued_host(initial, BridgeConfig::default());
        bridge.ready().await;
        assert_eq!(bridge.current_scene().unwrap().name, "Main");
    }
}
