//! Event system: canonical vocabulary, the pub/sub bus, and diagnostics
//!
//! Raw input (host signals or fragment text) is normalized by an adapter
//! into canonical events, which the router applies to the state store and
//! forwards to the bus for deferred, isolated listener dispatch.
//!
//! Everything a listener can observe is named and shaped in [`types`];
//! [`bus`] carries it; [`diagnostics`] records what was deliberately
//! dropped along the way.

mod bus;
mod diagnostics;
mod types;

pub use bus::{BusError, EventBus, Listener, listener};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsHub};
pub use types::{
    ACTIVE_CHANGE, CanonicalEvent, LifecyclePhase, ProtocolViolation, READY, RECORD_STATE, SCENE_CHANGE, SceneChange,
    SceneInfo, STREAM_STATE, VISIBILITY_CHANGE,
};
