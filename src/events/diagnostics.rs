//! Diagnostics channel - surfaces what the engine deliberately swallows
//!
//! Raw-input violations and listener panics are never allowed to crash the
//! page or reach the emitter, but they should not vanish either. Anything
//! the engine drops is recorded here as a timestamped entry on a broadcast
//! stream that interested consumers can subscribe to.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// What went wrong, without any of it having been surfaced to callers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum DiagnosticKind {
    /// A user listener panicked during dispatch. Sibling listeners and the
    /// emitter were unaffected.
    ListenerPanicked {
        event: String,
        listener: usize,
        message: String,
    },
    /// A raw input (fragment or host signal) failed schema or ordering
    /// validation and was dropped.
    RawInputRejected { source: &'static str, reason: String },
}

/// A timestamped diagnostic record.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Fire-and-forget sender side of the diagnostics stream.
///
/// Cheap to clone; a missing or lagging subscriber never blocks dispatch.
#[derive(Clone)]
pub struct DiagnosticsHub {
    tx: broadcast::Sender<Diagnostic>,
}

impl DiagnosticsHub {
    /// Create a hub whose stream buffers up to `capacity` records.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Record a diagnostic. Dropped if nobody is subscribed.
    pub fn record(&self, kind: DiagnosticKind) {
        debug!(?kind, "diagnostic recorded");
        let _ = self.tx.send(Diagnostic::new(kind));
    }

    /// Subscribe to diagnostics recorded after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.tx.subscribe()
    }
}
