//! CanonicalEventRouter - the dispatch hub between adapters and the bus
//!
//! Whichever adapter is active hands its canonical events here. The router
//! updates the store synchronously, inside the turn that delivered the raw
//! input, so listeners scheduled by the bus always observe a settled
//! snapshot. It also enforces the readiness gate: until an init-class event
//! seeds the first snapshot, nothing else reaches user listeners.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::events::{
    ACTIVE_CHANGE, CanonicalEvent, DiagnosticKind, DiagnosticsHub, EventBus, LifecyclePhase, ProtocolViolation, READY,
    RECORD_STATE, SCENE_CHANGE, STREAM_STATE, SceneChange, VISIBILITY_CHANGE,
};
use crate::state::StateStore;

pub(crate) struct EventRouter {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    diagnostics: DiagnosticsHub,
}

impl EventRouter {
    pub(crate) fn new(store: Arc<StateStore>, bus: Arc<EventBus>, diagnostics: DiagnosticsHub) -> Self {
        Self {
            store,
            bus,
            diagnostics,
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    /// Route one canonical event: update the store, then forward to the bus
    /// under the canonical name.
    pub(crate) fn route(&self, event: CanonicalEvent) {
        if !self.store.is_ready() {
            match event {
                CanonicalEvent::Init { scene } => {
                    if self.store.seed(scene) {
                        self.bus.dispatch(READY, Value::Null);
                    }
                }
                other => {
                    // Intentional backpressure: no listener may act on a
                    // state that has no prior snapshot.
                    debug!(event = other.name(), "discarding event before readiness");
                }
            }
            return;
        }

        match event {
            CanonicalEvent::Init { .. } => {
                // Adapters reject duplicate inits; anything arriving here
                // is a misbehaving raw channel.
                self.reject(ProtocolViolation::DuplicateInit);
            }
            CanonicalEvent::SceneChange { scene } => {
                let Some(previous) = self.store.replace_scene(scene.clone()) else {
                    return;
                };
                let change = SceneChange { new: scene, previous };
                self.bus.dispatch(SCENE_CHANGE, json!(change));
            }
            CanonicalEvent::VisibilityChange { visible } => {
                self.store.set_visible(visible);
                self.bus.dispatch(VISIBILITY_CHANGE, Value::Bool(visible));
            }
            CanonicalEvent::ActiveChange { active } => {
                self.store.set_active(active);
                self.bus.dispatch(ACTIVE_CHANGE, Value::Bool(active));
            }
            CanonicalEvent::StreamState { phase } => self.apply_phase(Subsystem::Stream, phase),
            CanonicalEvent::RecordState { phase } => self.apply_phase(Subsystem::Record, phase),
        }
    }

    /// Phase updates get two extra rules: a repeat of the stored phase is
    /// suppressed (noisy raw sources must not double-invoke listeners), and
    /// a jump that breaks the lifecycle cycle is a protocol violation.
    fn apply_phase(&self, subsystem: Subsystem, phase: LifecyclePhase) {
        let stored = match subsystem {
            Subsystem::Stream => self.store.stream_state(),
            Subsystem::Record => self.store.record_state(),
        }
        .unwrap_or(None);

        match stored {
            Some(current) if current == phase => {
                debug!(subsystem = subsystem.name(), phase = phase.as_str(), "duplicate phase suppressed");
                return;
            }
            Some(current) if !current.can_advance_to(phase) => {
                self.reject(ProtocolViolation::IllegalPhaseTransition {
                    subsystem: subsystem.name(),
                    from: current.as_str(),
                    to: phase.as_str(),
                });
                return;
            }
            // Unknown stored phase: the host may attach mid-lifecycle, so
            // the first report is accepted as-is.
            _ => {}
        }

        match subsystem {
            Subsystem::Stream => {
                self.store.set_stream(phase);
                self.bus.dispatch(STREAM_STATE, Value::String(phase.as_str().to_string()));
            }
            Subsystem::Record => {
                self.store.set_record(phase);
                self.bus.dispatch(RECORD_STATE, Value::String(phase.as_str().to_string()));
            }
        }
    }

    fn reject(&self, violation: ProtocolViolation) {
        warn!(%violation, "canonical event rejected");
        self.diagnostics.record(DiagnosticKind::RawInputRejected {
            source: "router",
            reason: violation.to_string(),
        });
    }
}

#[derive(Clone, Copy)]
enum Subsystem {
    Stream,
    Record,
}

impl Subsystem {
    fn name(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Record => "record",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SceneInfo, listener};
    use tokio::sync::mpsc;

    fn harness() -> (EventRouter, Arc<StateStore>, Arc<EventBus>, DiagnosticsHub) {
        let diagnostics = DiagnosticsHub::new(16);
        let store = Arc::new(StateStore::new());
        let bus = Arc::new(EventBus::new(diagnostics.clone()));
        let router = EventRouter::new(Arc::clone(&store), Arc::clone(&bus), diagnostics.clone());
        (router, store, bus, diagnostics)
    }

    fn scene(name: &str) -> SceneInfo {
        SceneInfo {
            name: name.to_string(),
            width: 1280,
            height: 720,
        }
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_init_seeds_and_emits_single_ready() {
        let (router, store, bus, _) = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on(READY, listener(move |_| {
            tx.send(()).unwrap();
        }), false)
        .unwrap();

        router.route(CanonicalEvent::Init { scene: scene("Main") });
        assert!(store.is_ready());
        assert_eq!(store.current_scene().unwrap().name, "Main");

        settle().await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "ready fires exactly once");
    }

    #[tokio::test]
    async fn test_pre_ready_events_discarded_silently() {
        let (router, store, bus, _) = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on(VISIBILITY_CHANGE, listener(move |_| {
            tx.send(()).unwrap();
        }), false)
        .unwrap();

        router.route(CanonicalEvent::VisibilityChange { visible: true });
        router.route(CanonicalEvent::StreamState {
            phase: LifecyclePhase::Starting,
        });
        settle().await;
        assert!(rx.try_recv().is_err());
        assert!(!store.is_ready());
    }

    #[tokio::test]
    async fn test_init_after_ready_is_violation() {
        let (router, store, _, diagnostics) = harness();
        let mut diag_rx = diagnostics.subscribe();
        router.route(CanonicalEvent::Init { scene: scene("Main") });
        router.route(CanonicalEvent::Init { scene: scene("Other") });

        assert_eq!(store.current_scene().unwrap().name, "Main");
        let diagnostic = diag_rx.try_recv().unwrap();
        match diagnostic.kind {
            DiagnosticKind::RawInputRejected { reason, .. } => {
                assert!(reason.contains("duplicate init"), "got: {reason}");
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scene_change_carries_previous() {
        let (router, _, bus, _) = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on(SCENE_CHANGE, listener(move |payload| {
            tx.send(payload).unwrap();
        }), false)
        .unwrap();

        router.route(CanonicalEvent::Init { scene: scene("Main") });
        router.route(CanonicalEvent::SceneChange { scene: scene("Game") });
        router.route(CanonicalEvent::SceneChange { scene: scene("Outro") });
        settle().await;

        let first = rx.try_recv().unwrap();
        assert_eq!(first["new"]["name"], "Game");
        assert_eq!(first["previous"]["name"], "Main");
        let second = rx.try_recv().unwrap();
        assert_eq!(second["new"]["name"], "Outro");
        assert_eq!(second["previous"]["name"], "Game");
    }

    #[tokio::test]
    async fn test_duplicate_phase_suppressed() {
        let (router, _, bus, _) = harness();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on(STREAM_STATE, listener(move |payload| {
            tx.send(payload).unwrap();
        }), false)
        .unwrap();

        router.route(CanonicalEvent::Init { scene: scene("Main") });
        router.route(CanonicalEvent::StreamState {
            phase: LifecyclePhase::Starting,
        });
        router.route(CanonicalEvent::StreamState {
            phase: LifecyclePhase::Starting,
        });
        settle().await;

        assert_eq!(rx.try_recv().unwrap(), Value::String("STARTING".to_string()));
        assert!(rx.try_recv().is_err(), "identical phase repeat must not re-emit");
    }

    #[tokio::test]
    async fn test_illegal_phase_jump_rejected() {
        let (router, store, _, diagnostics) = harness();
        let mut diag_rx = diagnostics.subscribe();
        router.route(CanonicalEvent::Init { scene: scene("Main") });
        router.route(CanonicalEvent::RecordState {
            phase: LifecyclePhase::Starting,
        });
        // Starting -> Stopping skips Started.
        router.route(CanonicalEvent::RecordState {
            phase: LifecyclePhase::Stopping,
        });

        assert_eq!(store.record_state().unwrap(), Some(LifecyclePhase::Starting));
        let diagnostic = diag_rx.try_recv().unwrap();
        match diagnostic.kind {
            DiagnosticKind::RawInputRejected { reason, .. } => {
                assert!(reason.contains("STARTING -> STOPPING"), "got: {reason}");
            }
            other => panic!("unexpected diagnostic: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_phase_report_accepted_mid_lifecycle() {
        let (router, store, _, _) = harness();
        router.route(CanonicalEvent::Init { scene: scene("Main") });
        // Host attached while already streaming.
        router.route(CanonicalEvent::StreamState {
            phase: LifecyclePhase::Started,
        });
        assert_eq!(store.stream_state().unwrap(), Some(LifecyclePhase::Started));
    }

    #[tokio::test]
    async fn test_subsystems_are_independent() {
        let (router, store, _, _) = harness();
        router.route(CanonicalEvent::Init { scene: scene("Main") });
        router.route(CanonicalEvent::StreamState {
            phase: LifecyclePhase::Starting,
        });
        router.route(CanonicalEvent::RecordState {
            phase: LifecyclePhase::Inactive,
        });
        assert_eq!(store.stream_state().unwrap(), Some(LifecyclePhase::Starting));
        assert_eq!(store.record_state().unwrap(), Some(LifecyclePhase::Inactive));
    }
}
