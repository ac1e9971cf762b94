//! Raw host signal boundary
//!
//! The host delivers state transitions as named side-channel signals, plus
//! one current-scene query answered once at startup. The delivery
//! mechanism itself is opaque; embedders implement [`HostChannel`] over
//! whatever transport the host actually uses. [`QueuedHostChannel`] is a
//! ready-made implementation for hosts that push signals through a queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::{LifecyclePhase, ProtocolViolation, SceneInfo};

/// One raw host signal, exactly as the side channel names them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawHostSignal {
    StreamingStarting,
    StreamingStarted,
    StreamingStopping,
    StreamingStopped,
    RecordingStarting,
    RecordingStarted,
    RecordingStopping,
    RecordingStopped,
    SceneChanged(SceneDescriptor),
    VisibilityChanged(bool),
    ActiveChanged(bool),
}

impl RawHostSignal {
    /// The lifecycle phase a streaming/recording signal advances to, and
    /// which subsystem it belongs to. `None` for non-phase signals.
    pub(crate) fn phase(&self) -> Option<(Subsystem, LifecyclePhase)> {
        match self {
            Self::StreamingStarting => Some((Subsystem::Stream, LifecyclePhase::Starting)),
            Self::StreamingStarted => Some((Subsystem::Stream, LifecyclePhase::Started)),
            Self::StreamingStopping => Some((Subsystem::Stream, LifecyclePhase::Stopping)),
            Self::StreamingStopped => Some((Subsystem::Stream, LifecyclePhase::Inactive)),
            Self::RecordingStarting => Some((Subsystem::Record, LifecyclePhase::Starting)),
            Self::RecordingStarted => Some((Subsystem::Record, LifecyclePhase::Started)),
            Self::RecordingStopping => Some((Subsystem::Record, LifecyclePhase::Stopping)),
            Self::RecordingStopped => Some((Subsystem::Record, LifecyclePhase::Inactive)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Subsystem {
    Stream,
    Record,
}

/// A scene descriptor as the host delivers it: either structured, or the
/// same structure JSON-encoded into a string. Callers must tolerate both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SceneDescriptor {
    Structured(SceneInfo),
    Encoded(String),
}

impl SceneDescriptor {
    /// Resolve to a concrete [`SceneInfo`], decoding the stringified form.
    pub fn resolve(self) -> Result<SceneInfo, ProtocolViolation> {
        match self {
            Self::Structured(scene) => Ok(scene),
            Self::Encoded(text) => {
                serde_json::from_str(&text).map_err(|e| ProtocolViolation::MalformedScene(e.to_string()))
            }
        }
    }
}

/// The opaque raw signal source a host exposes.
///
/// `signals` is called once; handing over the receiver makes the adapter
/// the exclusive consumer, so each raw signal is observed exactly once.
/// `current_scene` is the single-resolution startup query; `None` means the
/// host cannot answer it (readiness then waits for the first scene signal).
#[async_trait]
pub trait HostChannel: Send + 'static {
    fn signals(&mut self) -> mpsc::Receiver<RawHostSignal>;

    async fn current_scene(&mut self) -> Option<SceneDescriptor>;
}

/// Push side of a [`QueuedHostChannel`]. Cheap to clone.
#[derive(Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<RawHostSignal>,
}

impl SignalSender {
    /// Deliver one raw signal. Awaits if the adapter is behind.
    pub async fn send(&self, signal: RawHostSignal) {
        debug!(?signal, "host signal queued");
        let _ = self.tx.send(signal).await;
    }
}

/// A [`HostChannel`] backed by an in-process queue, for embedders whose
/// host pushes signals from FFI or glue code.
pub struct QueuedHostChannel {
    rx: Option<mpsc::Receiver<RawHostSignal>>,
    initial_scene: Option<SceneDescriptor>,
}

impl QueuedHostChannel {
    /// Build a channel answering the startup query with `initial_scene`,
    /// buffering up to `capacity` raw signals.
    pub fn new(initial_scene: SceneDescriptor, capacity: usize) -> (Self, SignalSender) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                rx: Some(rx),
                initial_scene: Some(initial_scene),
            },
            SignalSender { tx },
        )
    }
}

#[async_trait]
impl HostChannel for QueuedHostChannel {
    fn signals(&mut self) -> mpsc::Receiver<RawHostSignal> {
        self.rx.take().unwrap_or_else(|| {
            // Second call: a dead receiver, not a shared one.
            let (_, rx) = mpsc::channel(1);
            rx
        })
    }

    async fn current_scene(&mut self) -> Option<SceneDescriptor> {
        self.initial_scene.take()
    }
}
