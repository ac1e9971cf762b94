//! hostlink - event-driven host state observation for embedded web surfaces
//!
//! Scripts running inside a host application's embedded web surface get one
//! stable API for observing host state: active scene, visibility,
//! activation, and the streaming/recording lifecycles. When the host is
//! present, its side-channel signals drive the API; when it is absent
//! (ordinary browser, development), the same events are synthesized from a
//! text pseudo-protocol carried in the page's address fragment. Downstream
//! code cannot tell the difference.
//!
//! # Core Guarantees
//!
//! - **Readiness gate**: no observable state and no event (other than
//!   `ready` itself) reaches consumers before the first full snapshot.
//! - **Deterministic dispatch**: listeners run asynchronously, in
//!   registration order within an emission and in arrival order across
//!   emissions, each in its own turn, each with an independent deep copy
//!   of the payload.
//! - **Failure isolation**: a panicking listener affects neither its
//!   siblings nor the emitter; untrusted raw input never crashes the page.
//!
//! # Modules
//!
//! - [`bridge`] - the composition point and public surface
//! - [`events`] - canonical vocabulary, pub/sub bus, diagnostics
//! - [`state`] - the authoritative snapshot behind the readiness gate
//! - [`host`] - raw host signal boundary and its adapter
//! - [`fragment`] - fragment pseudo-protocol parser and fallback adapter
//! - [`config`] - bridge tunables
//!
//! # Usage
//!
//! ```rust,no_run
//! use hostlink::{Bridge, listener};
//!
//! # async fn demo() {
//! // During development, no host is present: feed fragment changes.
//! let (bridge, feed) = Bridge::standalone();
//!
//! bridge.on("sceneChange", listener(|payload| {
//!     println!("scene is now {}", payload["new"]["name"]);
//! })).unwrap();
//!
//! feed.changed("event=init&scene=Main&width=1280&height=720");
//! bridge.ready().await;
//! assert_eq!(bridge.current_scene().unwrap().name, "Main");
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod events;
pub mod fragment;
pub mod host;
pub mod state;

mod router;

// Re-export the public surface at the crate root.
pub use bridge::{Bridge, FragmentFeed};
pub use config::BridgeConfig;
pub use events::{
    ACTIVE_CHANGE, BusError, Diagnostic, DiagnosticKind, EventBus, LifecyclePhase, Listener, ProtocolViolation, READY,
    RECORD_STATE, SCENE_CHANGE, STREAM_STATE, SceneChange, SceneInfo, VISIBILITY_CHANGE, listener,
};
pub use host::{HostChannel, QueuedHostChannel, RawHostSignal, SceneDescriptor, SignalSender};
pub use state::StateError;
