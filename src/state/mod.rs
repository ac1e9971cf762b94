//! Canonical observable state and its readiness gate.

mod store;

pub use store::{StateError, StateStore};
