//! FragmentProtocolAdapter - synthesizes the host's event stream from the
//! address fragment
//!
//! When no host is present (ordinary browser, development), the page's
//! address fragment carries a text pseudo-protocol: an `event` key naming
//! the kind, plus the kind's required keys. Every fragment change is
//! parsed, validated against the per-kind schema, and translated into
//! exactly one well-formed canonical event or none. Raw input is
//! untrusted: rejects are logged and recorded, never thrown.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::events::{CanonicalEvent, DiagnosticKind, DiagnosticsHub, LifecyclePhase, ProtocolViolation, SceneInfo};
use crate::router::EventRouter;

use super::parser::{FragmentPairs, parse_fragment, value};

pub(crate) struct FragmentAdapter {
    router: Arc<EventRouter>,
    diagnostics: DiagnosticsHub,
}

impl FragmentAdapter {
    pub(crate) fn new(router: Arc<EventRouter>, diagnostics: DiagnosticsHub) -> Self {
        Self { router, diagnostics }
    }

    /// Handle one fragment change.
    pub(crate) fn fragment_changed(&self, raw: &str) {
        let Some(pairs) = parse_fragment(raw) else {
            // Absent, not an error: ordinary anchors land here too.
            debug!("fragment absent or unusable, ignored");
            return;
        };

        match self.translate(&pairs) {
            Ok(event) => self.router.route(event),
            Err(violation) => {
                warn!(%violation, "fragment rejected");
                self.diagnostics.record(DiagnosticKind::RawInputRejected {
                    source: "fragment",
                    reason: violation.to_string(),
                });
            }
        }
    }

    /// Validate the pairs against the per-event-kind schema and build the
    /// canonical event. Exactly one event or none, never a partial one.
    fn translate(&self, pairs: &FragmentPairs) -> Result<CanonicalEvent, ProtocolViolation> {
        let kind = value(pairs, "event")
            .filter(|kind| !kind.is_empty())
            .ok_or(ProtocolViolation::MissingEvent)?
            .to_lowercase();

        let ready = self.router.is_ready();
        match kind.as_str() {
            "init" if ready => Err(ProtocolViolation::DuplicateInit),
            "init" => Ok(CanonicalEvent::Init {
                scene: scene_schema(pairs)?,
            }),
            // Ordering rule: init must be the first accepted event.
            "scenechange" | "visibilitychange" | "activechange" | "streamstate" | "recordstate"
                if !ready =>
            {
                Err(ProtocolViolation::BeforeInit(kind))
            }
            "scenechange" => Ok(CanonicalEvent::SceneChange {
                scene: scene_schema(pairs)?,
            }),
            "visibilitychange" => Ok(CanonicalEvent::VisibilityChange {
                visible: flag_schema(pairs)?,
            }),
            "activechange" => Ok(CanonicalEvent::ActiveChange {
                active: flag_schema(pairs)?,
            }),
            "streamstate" => Ok(CanonicalEvent::StreamState {
                phase: phase_schema(pairs)?,
            }),
            "recordstate" => Ok(CanonicalEvent::RecordState {
                phase: phase_schema(pairs)?,
            }),
            _ => Err(ProtocolViolation::UnknownEvent(kind)),
        }
    }
}

/// `scene` non-empty, `width`/`height` non-negative integers.
fn scene_schema(pairs: &FragmentPairs) -> Result<SceneInfo, ProtocolViolation> {
    let name = value(pairs, "scene").ok_or(ProtocolViolation::MissingKey("scene"))?;
    if name.is_empty() {
        return Err(ProtocolViolation::InvalidValue {
            key: "scene",
            value: String::new(),
        });
    }
    Ok(SceneInfo {
        name: name.to_string(),
        width: dimension(pairs, "width")?,
        height: dimension(pairs, "height")?,
    })
}

fn dimension(pairs: &FragmentPairs, key: &'static str) -> Result<u32, ProtocolViolation> {
    let raw = value(pairs, key).ok_or(ProtocolViolation::MissingKey(key))?;
    // Digits only: no sign, no exponent, no whitespace.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolViolation::InvalidValue {
            key,
            value: raw.to_string(),
        });
    }
    raw.parse().map_err(|_| ProtocolViolation::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// `state` as `true`/`false` (case-insensitive) or a number coerced to its
/// truthiness.
fn flag_schema(pairs: &FragmentPairs) -> Result<bool, ProtocolViolation> {
    let raw = value(pairs, "state").ok_or(ProtocolViolation::MissingKey("state"))?;
    let lowered = raw.to_lowercase();
    match lowered.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => match other.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number != 0.0),
            _ => Err(ProtocolViolation::InvalidValue {
                key: "state",
                value: raw.to_string(),
            }),
        },
    }
}

/// `state` as a phase index `0..=3`.
fn phase_schema(pairs: &FragmentPairs) -> Result<LifecyclePhase, ProtocolViolation> {
    let raw = value(pairs, "state").ok_or(ProtocolViolation::MissingKey("state"))?;
    LifecyclePhase::from_index(raw).ok_or(ProtocolViolation::InvalidValue {
        key: "state",
        value: raw.to_string(),
    })
}
