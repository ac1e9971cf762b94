//! StateStore - the single authoritative snapshot of observable host state
//!
//! Created empty at process start and alive for the process lifetime.
//! Mutated exclusively by the router, synchronously within the turn that
//! delivered the triggering input, so readers never observe a torn write.
//! Every accessor is guarded by the readiness gate: until the first full
//! snapshot is known, callers get `NotReady` rather than a guessed value.

use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::events::{LifecyclePhase, SceneInfo};

/// A state accessor was invoked before the readiness gate opened.
///
/// Surfaced synchronously so callers can distinguish "no data yet" from
/// "empty data".
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("host state not ready")]
    NotReady,
}

#[derive(Debug, Default)]
struct Snapshot {
    ready: bool,
    scene: Option<SceneInfo>,
    visible: Option<bool>,
    active: Option<bool>,
    stream: Option<LifecyclePhase>,
    record: Option<LifecyclePhase>,
}

/// Holder of the canonical observable state.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<Snapshot>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the first full snapshot has been captured. Never reverts to
    /// false once true.
    pub fn is_ready(&self) -> bool {
        self.read().ready
    }

    /// The active scene. Always known once ready.
    pub fn current_scene(&self) -> Result<SceneInfo, StateError> {
        let snapshot = self.read();
        snapshot.scene.clone().filter(|_| snapshot.ready).ok_or(StateError::NotReady)
    }

    /// Source visibility; `None` if the host has not reported it yet.
    pub fn is_visible(&self) -> Result<Option<bool>, StateError> {
        let snapshot = self.read();
        if !snapshot.ready {
            return Err(StateError::NotReady);
        }
        Ok(snapshot.visible)
    }

    /// Source activation; `None` if the host has not reported it yet.
    pub fn is_active(&self) -> Result<Option<bool>, StateError> {
        let snapshot = self.read();
        if !snapshot.ready {
            return Err(StateError::NotReady);
        }
        Ok(snapshot.active)
    }

    /// Streaming phase; `None` if the host has not reported it yet.
    pub fn stream_state(&self) -> Result<Option<LifecyclePhase>, StateError> {
        let snapshot = self.read();
        if !snapshot.ready {
            return Err(StateError::NotReady);
        }
        Ok(snapshot.stream)
    }

    /// Recording phase; `None` if the host has not reported it yet.
    pub fn record_state(&self) -> Result<Option<LifecyclePhase>, StateError> {
        let snapshot = self.read();
        if !snapshot.ready {
            return Err(StateError::NotReady);
        }
        Ok(snapshot.record)
    }

    /// Seed the first snapshot and open the readiness gate. Returns false
    /// without touching anything if the gate is already open.
    pub(crate) fn seed(&self, scene: SceneInfo) -> bool {
        let mut snapshot = self.write();
        if snapshot.ready {
            return false;
        }
        debug!(scene = %scene.name, "seeding state, readiness gate opens");
        snapshot.scene = Some(scene);
        snapshot.ready = true;
        true
    }

    /// Replace the scene wholesale, returning the displaced one. `None` if
    /// the gate has not opened (the caller must not emit in that case).
    pub(crate) fn replace_scene(&self, scene: SceneInfo) -> Option<SceneInfo> {
        let mut snapshot = self.write();
        if !snapshot.ready {
            return None;
        }
        snapshot.scene.replace(scene)
    }

    pub(crate) fn set_visible(&self, visible: bool) {
        self.write().visible = Some(visible);
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.write().active = Some(active);
    }

    pub(crate) fn set_stream(&self, phase: LifecyclePhase) {
        self.write().stream = Some(phase);
    }

    pub(crate) fn set_record(&self, phase: LifecyclePhase) {
        self.write().record = Some(phase);
    }
}
