//! HostSignalAdapter - drives a [`HostChannel`] into canonical events
//!
//! Spawned once when a host is detected. At startup it issues the
//! current-scene query; the answer seeds the store and opens the readiness
//! gate. From then on every raw signal maps 1:1 onto one canonical event.
//! Should a scene signal beat the query's answer, that signal does the
//! seeding instead and the late answer is refused by the store.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{CanonicalEvent, DiagnosticKind, DiagnosticsHub};
use crate::router::EventRouter;

use super::signals::{HostChannel, RawHostSignal, SceneDescriptor, Subsystem};

pub(crate) struct HostAdapter {
    router: Arc<EventRouter>,
    diagnostics: DiagnosticsHub,
}

impl HostAdapter {
    /// Spawn the adapter over `channel`. The returned handle lives as long
    /// as the host keeps its signal queue open.
    pub(crate) fn spawn(
        mut channel: impl HostChannel,
        router: Arc<EventRouter>,
        diagnostics: DiagnosticsHub,
    ) -> JoinHandle<()> {
        let adapter = Self { router, diagnostics };
        tokio::spawn(async move {
            let mut signals = channel.signals();

            if let Some(descriptor) = channel.current_scene().await {
                adapter.scene_observed(descriptor);
            } else {
                debug!("host cannot answer current-scene query, waiting for a scene signal");
            }

            while let Some(signal) = signals.recv().await {
                adapter.translate(signal);
            }
            debug!("host signal channel closed, adapter stopping");
        })
    }

    /// Translate one raw signal into exactly one canonical event.
    fn translate(&self, signal: RawHostSignal) {
        if let Some((subsystem, phase)) = signal.phase() {
            let event = match subsystem {
                Subsystem::Stream => CanonicalEvent::StreamState { phase },
                Subsystem::Record => CanonicalEvent::RecordState { phase },
            };
            self.router.route(event);
            return;
        }

        match signal {
            RawHostSignal::SceneChanged(descriptor) => self.scene_observed(descriptor),
            RawHostSignal::VisibilityChanged(visible) => {
                self.router.route(CanonicalEvent::VisibilityChange { visible });
            }
            RawHostSignal::ActiveChanged(active) => {
                self.router.route(CanonicalEvent::ActiveChange { active });
            }
            // Phase signals were handled above.
            _ => {}
        }
    }

    /// The first scene observation seeds the store; later ones become
    /// scene changes.
    fn scene_observed(&self, descriptor: SceneDescriptor) {
        let scene = match descriptor.resolve() {
            Ok(scene) => scene,
            Err(violation) => {
                warn!(%violation, "host scene descriptor rejected");
                self.diagnostics.record(DiagnosticKind::RawInputRejected {
                    source: "host",
                    reason: violation.to_string(),
                });
                return;
            }
        };

        let event = if self.router.is_ready() {
            CanonicalEvent::SceneChange { scene }
        } else {
            CanonicalEvent::Init { scene }
        };
        self.router.route(event);
    }
}
