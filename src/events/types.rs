//! Canonical event vocabulary
//!
//! Whatever raw channel the process runs against (host side-channel signals
//! or the fragment pseudo-protocol), the adapters normalize everything into
//! the types defined here before it reaches the router or any listener.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Emitted exactly once, when the first full state snapshot is known.
pub const READY: &str = "ready";
/// Emitted when the active scene is replaced. Payload: `{new, previous}`.
pub const SCENE_CHANGE: &str = "sceneChange";
/// Emitted when source visibility flips. Payload: bool.
pub const VISIBILITY_CHANGE: &str = "visibilityChange";
/// Emitted when source activation flips. Payload: bool.
pub const ACTIVE_CHANGE: &str = "activeChange";
/// Emitted when the streaming subsystem changes phase. Payload: phase name.
pub const STREAM_STATE: &str = "streamState";
/// Emitted when the recording subsystem changes phase. Payload: phase name.
pub const RECORD_STATE: &str = "recordState";

/// A complete scene descriptor. Replaced wholesale, never patched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Payload of a [`SCENE_CHANGE`] emission: the replacement scene plus the
/// scene it displaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneChange {
    pub new: SceneInfo,
    pub previous: SceneInfo,
}

/// Lifecycle phase of an independent subsystem (stream or record).
///
/// Legal transitions form a cycle:
/// `Inactive -> Starting -> Started -> Stopping -> Inactive`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecyclePhase {
    Inactive,
    Starting,
    Started,
    Stopping,
}

impl LifecyclePhase {
    /// Resolve a phase from its wire index (`"0"`..`"3"`), as carried by the
    /// fragment protocol's `state` key.
    pub fn from_index(index: &str) -> Option<Self> {
        match index {
            "0" => Some(Self::Inactive),
            "1" => Some(Self::Starting),
            "2" => Some(Self::Started),
            "3" => Some(Self::Stopping),
            _ => None,
        }
    }

    /// The wire index of this phase.
    pub fn index(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::Starting => 1,
            Self::Started => 2,
            Self::Stopping => 3,
        }
    }

    /// The only phase this one may legally advance to.
    pub fn next(self) -> Self {
        match self {
            Self::Inactive => Self::Starting,
            Self::Starting => Self::Started,
            Self::Started => Self::Stopping,
            Self::Stopping => Self::Inactive,
        }
    }

    /// Whether `target` is a legal successor of this phase.
    pub fn can_advance_to(self, target: Self) -> bool {
        self.next() == target
    }

    /// The phase name as emitted in event payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopping => "STOPPING",
        }
    }
}

/// A normalized event, independent of which raw channel produced it.
///
/// Transient: routed, dispatched, then dropped. Arrival order is the only
/// ordering; there is no timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CanonicalEvent {
    /// The first complete scene observation. Seeds the store and opens the
    /// readiness gate; never forwarded under its own name.
    Init { scene: SceneInfo },
    SceneChange { scene: SceneInfo },
    VisibilityChange { visible: bool },
    ActiveChange { active: bool },
    StreamState { phase: LifecyclePhase },
    RecordState { phase: LifecyclePhase },
}

impl CanonicalEvent {
    /// The canonical name this event is dispatched under.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => READY,
            Self::SceneChange { .. } => SCENE_CHANGE,
            Self::VisibilityChange { .. } => VISIBILITY_CHANGE,
            Self::ActiveChange { .. } => ACTIVE_CHANGE,
            Self::StreamState { .. } => STREAM_STATE,
            Self::RecordState { .. } => RECORD_STATE,
        }
    }
}

/// Why a piece of raw input failed to become a canonical event.
///
/// Raw input is untrusted: violations are logged and dropped, never
/// surfaced to callers as errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("fragment has no event parameter")]
    MissingEvent,

    #[error("unknown event kind `{0}`")]
    UnknownEvent(String),

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid value `{value}` for key `{key}`")]
    InvalidValue { key: &'static str, value: String },

    #[error("`{0}` received before init")]
    BeforeInit(String),

    #[error("duplicate init")]
    DuplicateInit,

    #[error("malformed scene descriptor: {0}")]
    MalformedScene(String),

    #[error("illegal {subsystem} phase transition {from} -> {to}")]
    IllegalPhaseTransition {
        subsystem: &'static str,
        from: &'static str,
        to: &'static str,
    },
}
